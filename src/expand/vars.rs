//! `$`-reference resolution: named variables, `${NAME}`, and the special
//! parameters `$?`, `$$`, `$0`, `$#`, `$@`, `$1`..`$9`.

use super::ExpansionError;
use crate::shell::ShellContext;

/// Resolve the reference starting at `chars[*i]`, just past a `$`.
/// Advances `*i` past the consumed reference. `Ok(None)` means the `$`
/// was not a reference and stays literal.
pub(super) fn expand_dollar(
    chars: &[char],
    i: &mut usize,
    ctx: &ShellContext,
) -> Result<Option<String>, ExpansionError> {
    match chars.get(*i) {
        Some('{') => {
            let start = *i + 1;
            let Some(close) = chars[start..].iter().position(|&c| c == '}') else {
                let shown: String =
                    std::iter::once('$').chain(chars[*i..].iter().copied()).collect();
                return Err(ExpansionError::BadSubstitution(shown));
            };
            let name: String = chars[start..start + close].iter().collect();
            *i = start + close + 1;
            match resolve(&name, ctx) {
                Some(value) => Ok(Some(value)),
                None => Err(ExpansionError::BadSubstitution(format!("${{{name}}}"))),
            }
        }
        Some(&c) if c == '?' || c == '$' || c == '#' || c == '@' || c.is_ascii_digit() => {
            *i += 1;
            Ok(Some(
                resolve(&c.to_string(), ctx).expect("special parameter resolves"),
            ))
        }
        Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
            let start = *i;
            while matches!(chars.get(*i), Some(c) if c.is_ascii_alphanumeric() || *c == '_') {
                *i += 1;
            }
            let name: String = chars[start..*i].iter().collect();
            // POSIX-lenient: unset expands to empty, no error.
            Ok(Some(ctx.env.get(&name).unwrap_or("").to_string()))
        }
        _ => Ok(None),
    }
}

/// Shared lookup for bare and `${...}` forms. `None` means the name is
/// not valid in braces.
fn resolve(name: &str, ctx: &ShellContext) -> Option<String> {
    match name {
        "?" => Some(ctx.last_status.to_string()),
        "$" => Some(ctx.shell_pid.to_string()),
        "0" => Some(ctx.shell_name.clone()),
        "#" => Some(ctx.positional_count().to_string()),
        "@" => Some(ctx.positionals().join(" ")),
        _ if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) => {
            let n = name.parse::<usize>().ok()?;
            Some(ctx.positional(n).unwrap_or("").to_string())
        }
        _ if crate::parser::is_valid_name(name) => {
            Some(ctx.env.get(name).unwrap_or("").to_string())
        }
        _ => None,
    }
}
