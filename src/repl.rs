//! The read-eval loop: reap jobs, prompt, read a (possibly continued)
//! line, execute it, repeat. One bad command never ends the loop; only
//! `exit` or EOF does.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::config::Config;
use crate::io::LineInput;
use crate::prompt::ShellPrompt;
use crate::shell::{self, ShellContext};
use crate::signals;
use crate::SHELL_NAME;

pub fn run(ctx: &mut ShellContext, config: &Config, input: &mut dyn LineInput) -> i32 {
    let prompt = ShellPrompt::new(&config.prompt);
    let mut warned_about_jobs = false;

    loop {
        // Reap finished background jobs and report them before prompting.
        signals::take_sigchld();
        ctx.jobs.reap();
        ctx.jobs.notify_and_clean();
        signals::clear_interrupt();

        let line = match input.read_line(&prompt.primary(ctx.last_status)) {
            Ok(Some(line)) => line,
            Ok(None) => {
                // Ctrl+D on an empty line ends the shell, unless jobs are
                // still stopped or running in the background.
                if !ctx.jobs.is_empty() && !warned_about_jobs {
                    eprintln!("{SHELL_NAME}: there are unfinished jobs");
                    warned_about_jobs = true;
                    continue;
                }
                break;
            }
            Err(e) => {
                eprintln!("{SHELL_NAME}: input error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        warned_about_jobs = false;

        let mut accumulated = expand_aliases(&line, &ctx.aliases);
        loop {
            // A line ending in an unescaped backslash asks for more input.
            let trimmed = accumulated.trim_end();
            let trailing_backslashes =
                trimmed.chars().rev().take_while(|&c| c == '\\').count();
            if trailing_backslashes % 2 == 1 {
                accumulated = trimmed[..trimmed.len() - 1].to_string();
                match input.read_line(prompt.continuation()) {
                    Ok(Some(next)) => {
                        accumulated.push_str(&next);
                        continue;
                    }
                    _ => break,
                }
            }

            match shell::execute_line(ctx, &accumulated) {
                Ok(status) => {
                    debug!("line finished with status {status}");
                    break;
                }
                Err(e) if e.needs_more_input() => {
                    // Unterminated quote or open construct: secondary prompt.
                    match input.read_line(prompt.continuation()) {
                        Ok(Some(next)) => {
                            accumulated.push('\n');
                            accumulated.push_str(&next);
                        }
                        _ => {
                            eprintln!("{SHELL_NAME}: {e}");
                            ctx.last_status = e.status();
                            break;
                        }
                    }
                }
                Err(e) => {
                    eprintln!("{SHELL_NAME}: {e}");
                    ctx.last_status = e.status();
                    break;
                }
            }
        }
        ctx.history.borrow_mut().add(&accumulated);

        if let Some(code) = ctx.pending_exit {
            if !ctx.jobs.is_empty() && !warned_about_jobs {
                eprintln!("{SHELL_NAME}: there are unfinished jobs");
                warned_about_jobs = true;
                ctx.pending_exit = None;
                continue;
            }
            return code;
        }
    }
    ctx.last_status
}

/// Replace the first word when it names an alias, repeating until no
/// alias applies. The seen-set stops `alias ls='ls -l'` style cycles.
pub fn expand_aliases(line: &str, aliases: &HashMap<String, String>) -> String {
    let mut seen = HashSet::new();
    let mut current = line.to_string();
    loop {
        let trimmed = current.trim_start();
        let word_end = trimmed
            .find(|c: char| c.is_whitespace())
            .unwrap_or(trimmed.len());
        let first_word = &trimmed[..word_end];
        match aliases.get(first_word) {
            Some(value) if seen.insert(first_word.to_string()) => {
                current = format!("{value}{}", &trimmed[word_end..]);
            }
            _ => return current,
        }
    }
}
