//! Filename pattern matching: `*`, `?`, `[...]`, `[!...]`.
//!
//! Patterns arrive with backslash escapes still in place (quote removal
//! happens after globbing), so `\*` here means a literal asterisk.

use std::fs;
use std::path::Path;

/// True when the pattern contains an unescaped glob metacharacter.
pub fn has_glob_chars(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '*' | '?' | '[' => return true,
            _ => i += 1,
        }
    }
    false
}

/// Remove backslash escapes: quote removal for a field that did not glob.
pub fn unescape(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Expand a pattern against the filesystem, one path segment at a time.
/// Returns `None` when nothing matches so the caller can keep the literal
/// pattern (an argument is never silently dropped).
pub fn expand(pattern: &str) -> Option<Vec<String>> {
    let absolute = pattern.starts_with('/');
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }

    let mut candidates: Vec<String> = vec![if absolute {
        "/".to_string()
    } else {
        String::new()
    }];

    for segment in segments {
        let mut next = Vec::new();
        if !has_glob_chars(segment) {
            // Literal components only need to exist.
            let literal = unescape(segment);
            for base in &candidates {
                let path = join(base, &literal);
                if fs::symlink_metadata(resolve(&path)).is_ok() {
                    next.push(path);
                }
            }
        } else {
            for base in &candidates {
                let dir = if base.is_empty() { "." } else { base.as_str() };
                let Ok(entries) = fs::read_dir(dir) else {
                    continue;
                };
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if segment_matches(segment, &name) {
                        next.push(join(base, &name));
                    }
                }
            }
        }
        candidates = next;
        if candidates.is_empty() {
            return None;
        }
    }

    candidates.sort();
    Some(candidates)
}

/// Whole-string match, used for `case` patterns (where `*` may cross `/`).
pub fn matches(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let chars: Vec<char> = text.chars().collect();
    match_here(&pat, &chars)
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}

fn resolve(path: &str) -> &Path {
    Path::new(if path.is_empty() { "." } else { path })
}

/// Match one directory entry name, applying the hidden-file rule: a name
/// starting with `.` only matches a pattern starting with a literal dot.
fn segment_matches(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !has_literal_dot_prefix(pattern) {
        return false;
    }
    matches(pattern, name)
}

fn has_literal_dot_prefix(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    match chars.next() {
        Some('.') => true,
        Some('\\') => chars.next() == Some('.'),
        _ => false,
    }
}

fn match_here(pat: &[char], text: &[char]) -> bool {
    let Some(&p) = pat.first() else {
        return text.is_empty();
    };
    match p {
        '\\' if pat.len() >= 2 => {
            text.first() == Some(&pat[1]) && match_here(&pat[2..], &text[1..])
        }
        '*' => {
            // Shortest-first: try consuming nothing, then one more character.
            if match_here(&pat[1..], text) {
                return true;
            }
            !text.is_empty() && match_here(pat, &text[1..])
        }
        '?' => !text.is_empty() && match_here(&pat[1..], &text[1..]),
        '[' => match parse_class(&pat[1..]) {
            Some((items, negated, rest)) => {
                let Some(&c) = text.first() else {
                    return false;
                };
                class_matches(&items, negated, c) && match_here(rest, &text[1..])
            }
            // Unclosed class: the bracket is a literal character.
            None => text.first() == Some(&'[') && match_here(&pat[1..], &text[1..]),
        },
        _ => text.first() == Some(&p) && match_here(&pat[1..], &text[1..]),
    }
}

type ClassItems = Vec<(char, char)>;

/// Parse a bracket expression starting just past `[`. Returns the ranges,
/// the negation flag, and the remaining pattern past `]`. `!` (or `^`)
/// first negates; `]` as the first member is literal.
fn parse_class(pat: &[char]) -> Option<(ClassItems, bool, &[char])> {
    let mut i = 0;
    let negated = matches!(pat.first(), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    let mut first_member = true;
    while i < pat.len() {
        let c = pat[i];
        if c == ']' && !first_member {
            return Some((items, negated, &pat[i + 1..]));
        }
        first_member = false;
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            items.push((c, pat[i + 2]));
            i += 3;
        } else {
            items.push((c, c));
            i += 1;
        }
    }
    None
}

fn class_matches(items: &ClassItems, negated: bool, c: char) -> bool {
    let hit = items.iter().any(|&(lo, hi)| c >= lo && c <= hi);
    hit != negated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn fixture(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn expand_in(dir: &TempDir, pattern: &str) -> Option<Vec<String>> {
        let base = dir.path().to_string_lossy();
        expand(&format!("{base}/{pattern}")).map(|paths| {
            paths
                .into_iter()
                .map(|p| p[base.len() + 1..].to_string())
                .collect()
        })
    }

    #[test]
    fn star_matches_sorted() {
        let dir = fixture(&["b.txt", "a.txt", "c.log"]);
        assert_eq!(
            expand_in(&dir, "*.txt"),
            Some(vec!["a.txt".to_string(), "b.txt".to_string()])
        );
    }

    #[test]
    fn question_mark_single_char() {
        let dir = fixture(&["a1", "a22", "b1"]);
        assert_eq!(
            expand_in(&dir, "a?"),
            Some(vec!["a1".to_string()])
        );
    }

    #[test]
    fn bracket_class_and_range() {
        let dir = fixture(&["f1", "f2", "f3", "fx"]);
        assert_eq!(
            expand_in(&dir, "f[12]"),
            Some(vec!["f1".to_string(), "f2".to_string()])
        );
        assert_eq!(
            expand_in(&dir, "f[1-3]"),
            Some(vec!["f1".to_string(), "f2".to_string(), "f3".to_string()])
        );
        assert_eq!(
            expand_in(&dir, "f[!1-3]"),
            Some(vec!["fx".to_string()])
        );
    }

    #[test]
    fn no_match_returns_none() {
        let dir = fixture(&["a.txt"]);
        assert_eq!(expand_in(&dir, "*.log"), None);
    }

    #[test]
    fn hidden_files_need_literal_dot() {
        let dir = fixture(&[".hidden", "shown"]);
        assert_eq!(expand_in(&dir, "*"), Some(vec!["shown".to_string()]));
        assert_eq!(expand_in(&dir, ".*"), Some(vec![".hidden".to_string()]));
    }

    #[test]
    fn escaped_star_is_literal() {
        let dir = fixture(&["x*y", "xzy"]);
        assert_eq!(expand_in(&dir, r"x\*y"), Some(vec!["x*y".to_string()]));
    }

    #[test]
    fn nonexistent_directory_prefix() {
        let dir = fixture(&["a.txt"]);
        assert_eq!(expand_in(&dir, "missing/*.txt"), None);
    }

    #[test]
    fn segment_wise_expansion() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("sub/inner.txt")).unwrap();
        File::create(dir.path().join("top.txt")).unwrap();
        assert_eq!(
            expand_in(&dir, "*/inner.txt"),
            Some(vec!["sub/inner.txt".to_string()])
        );
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        assert!(matches("a[b", "a[b"));
        assert!(!matches("a[b", "ab"));
    }

    #[test]
    fn case_style_full_match() {
        assert!(matches("*.rs", "main.rs"));
        assert!(matches("a*", "a/b/c"));
        assert!(matches("[hH]ello", "Hello"));
        assert!(!matches("*.rs", "main.c"));
    }

    #[test]
    fn unescape_removes_backslashes() {
        assert_eq!(unescape(r"a\*b\\c"), r"a*b\c");
        assert_eq!(unescape(r"plain"), "plain");
    }

    #[test]
    fn glob_char_detection() {
        assert!(has_glob_chars("*.txt"));
        assert!(has_glob_chars("a?b"));
        assert!(has_glob_chars("[ab]"));
        assert!(!has_glob_chars(r"\*\?\["));
        assert!(!has_glob_chars("plain.txt"));
    }
}
