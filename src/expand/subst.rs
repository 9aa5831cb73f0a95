//! Command substitution: run an inner command line through the full
//! pipeline with stdout captured, then splice the output back in.
//!
//! The inner line executes against a snapshot of the shell state, like a
//! subshell: variable assignments, `cd`, and option changes made inside
//! `$(...)` do not leak out.

use log::debug;

use super::ExpansionError;
use crate::error::ShellError;
use crate::shell::ShellContext;

/// Find the `)` matching an already-entered `$(`, tracking nesting and
/// quotes. `start` is the index just past the `(`; the returned index is
/// the `)` itself.
pub(super) fn find_closing_paren(chars: &[char], start: usize) -> Result<usize, ExpansionError> {
    let mut depth = 1usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    i += if chars[i] == '\\' { 2 } else { 1 };
                }
                i += 1;
            }
            '(' => {
                depth += 1;
                i += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    Err(ExpansionError::UnclosedSubstitution)
}

/// Find the closing backtick. Backtick substitution does not nest.
pub(super) fn find_closing_backtick(chars: &[char], start: usize) -> Result<usize, ExpansionError> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Ok(i),
            _ => i += 1,
        }
    }
    Err(ExpansionError::UnclosedSubstitution)
}

/// Execute `source` with stdout captured. Returns the captured output
/// with all trailing newlines stripped, plus the inner exit status.
///
/// With `errexit` set, a failing substitution aborts the outer command
/// line (a deliberate divergence from bash, where `set -e` ignores
/// substitution exit codes).
pub fn run_captured(ctx: &mut ShellContext, source: &str) -> Result<(String, i32), ShellError> {
    ctx.enter_recursion()?;
    debug!("command substitution: {source}");

    let saved_env = ctx.env.clone();
    let saved_options = ctx.options;
    let saved_functions = ctx.functions.clone();
    let saved_exit = ctx.pending_exit.take();
    let saved_cwd = std::env::current_dir().ok();
    let previous_capture = ctx.capture.replace(Vec::new());

    let result = crate::shell::execute_source(ctx, source);

    let captured = std::mem::replace(&mut ctx.capture, previous_capture).unwrap_or_default();
    ctx.env = saved_env;
    ctx.options = saved_options;
    ctx.functions = saved_functions;
    ctx.pending_exit = saved_exit;
    if let Some(cwd) = saved_cwd {
        let _ = std::env::set_current_dir(cwd);
    }
    ctx.leave_recursion();

    let status = result?;
    ctx.last_subst_status = status;

    let mut output =
        String::from_utf8(captured).map_err(|_| ExpansionError::InvalidUtf8)?;
    while output.ends_with('\n') {
        output.pop();
    }

    if ctx.options.errexit && status != 0 {
        return Err(ExpansionError::SubstitutionFailed(status).into());
    }
    Ok((output, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn finds_matching_paren() {
        // "$(echo hi)" scanned from just past the "$(".
        let text = chars("echo hi) tail");
        assert_eq!(find_closing_paren(&text, 0).unwrap(), 7);
    }

    #[test]
    fn nesting_is_respected() {
        let text = chars("echo $(whoami)) tail");
        assert_eq!(find_closing_paren(&text, 0).unwrap(), 14);
    }

    #[test]
    fn parens_in_quotes_are_ignored() {
        let text = chars("echo ')' \")\") tail");
        assert_eq!(find_closing_paren(&text, 0).unwrap(), 12);
    }

    #[test]
    fn unclosed_is_an_error() {
        let text = chars("echo $(whoami)");
        assert_eq!(
            find_closing_paren(&text, 0),
            Err(ExpansionError::UnclosedSubstitution)
        );
    }

    #[test]
    fn backtick_close() {
        let text = chars("date` tail");
        assert_eq!(find_closing_backtick(&text, 0).unwrap(), 4);
    }
}
