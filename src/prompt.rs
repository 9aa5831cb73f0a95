/// Prompt rendering. The primary prompt comes from the config; a
/// non-zero last status is shown as a `[N] ` prefix, and continuation
/// lines get the secondary prompt.
pub struct ShellPrompt {
    primary: String,
}

impl ShellPrompt {
    pub fn new(primary: &str) -> Self {
        ShellPrompt {
            primary: primary.to_string(),
        }
    }

    pub fn primary(&self, last_status: i32) -> String {
        if last_status == 0 {
            self.primary.clone()
        } else {
            format!("[{last_status}] {}", self.primary)
        }
    }

    pub fn continuation(&self) -> &'static str {
        "> "
    }
}
