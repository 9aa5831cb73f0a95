//! The expansion pipeline: tilde → variables/command substitution →
//! field splitting → globbing → quote removal.
//!
//! Expansion runs at execution time, per simple command, so loop and
//! function bodies re-expand on every entry. Each word is walked once;
//! quoted and escaped characters go into the glob pattern escaped so the
//! matcher treats them literally, while characters spliced in by unquoted
//! expansions stay live for globbing.

pub mod glob;
mod subst;
mod vars;

use thiserror::Error;

use crate::ast::Word;
use crate::error::ShellError;
use crate::lexer::QuoteContext;
use crate::shell::ShellContext;

pub use subst::run_captured;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    #[error("unclosed command substitution")]
    UnclosedSubstitution,
    #[error("bad substitution: {0}")]
    BadSubstitution(String),
    #[error("command substitution produced invalid UTF-8")]
    InvalidUtf8,
    #[error("recursion depth limit exceeded")]
    RecursionLimit,
    #[error("command substitution failed with status {0}")]
    SubstitutionFailed(i32),
}

/// One expansion result field, carrying both the final text and the
/// escaped pattern form used for glob matching.
#[derive(Debug, Default, Clone)]
struct Field {
    text: String,
    pattern: String,
    quoted: bool,
}

impl Field {
    fn keep(&self) -> bool {
        !self.text.is_empty() || self.quoted
    }
}

struct Fields {
    done: Vec<Field>,
    cur: Field,
    splitting: bool,
}

impl Fields {
    fn new(splitting: bool) -> Self {
        Fields {
            done: Vec::new(),
            cur: Field::default(),
            splitting,
        }
    }

    fn push(&mut self, c: char, protected: bool) {
        self.cur.text.push(c);
        if protected && matches!(c, '*' | '?' | '[' | ']' | '\\') {
            self.cur.pattern.push('\\');
        }
        self.cur.pattern.push(c);
    }

    /// Insert expanded material. When `split` is set (unquoted context)
    /// IFS-style whitespace delimits fields.
    fn splice(&mut self, s: &str, split: bool, protected: bool) {
        for c in s.chars() {
            if split && self.splitting && matches!(c, ' ' | '\t' | '\n') {
                self.delimit();
            } else {
                self.push(c, protected);
            }
        }
    }

    fn delimit(&mut self) {
        if self.cur.keep() {
            self.done.push(std::mem::take(&mut self.cur));
        } else {
            self.cur = Field::default();
        }
    }

    fn finish(mut self) -> Vec<Field> {
        self.delimit();
        self.done
    }
}

/// Expand argv words: splitting and globbing apply.
pub fn expand_words(ctx: &mut ShellContext, words: &[Word]) -> Result<Vec<String>, ShellError> {
    let mut argv = Vec::new();
    for word in words {
        for field in expand_word(ctx, word, true)? {
            if glob::has_glob_chars(&field.pattern) {
                match glob::expand(&field.pattern) {
                    Some(matches) => argv.extend(matches),
                    // Shell convention: no match keeps the literal text.
                    None => argv.push(field.text),
                }
            } else {
                argv.push(field.text);
            }
        }
    }
    Ok(argv)
}

/// Expand to exactly one field: assignment values, redirect targets, and
/// `case` words. No splitting, no globbing.
pub fn expand_single(ctx: &mut ShellContext, word: &Word) -> Result<String, ShellError> {
    let fields = expand_word(ctx, word, false)?;
    Ok(fields.into_iter().map(|f| f.text).collect())
}

/// Expand a `case` pattern, keeping escapes so quoted metacharacters
/// match literally.
pub fn expand_case_pattern(ctx: &mut ShellContext, word: &Word) -> Result<String, ShellError> {
    let fields = expand_word(ctx, word, false)?;
    Ok(fields.into_iter().map(|f| f.pattern).collect())
}

fn expand_word(
    ctx: &mut ShellContext,
    word: &Word,
    splitting: bool,
) -> Result<Vec<Field>, ShellError> {
    let mut fields = Fields::new(splitting);
    for (part_index, part) in word.parts.iter().enumerate() {
        match part.quote {
            QuoteContext::SingleQuoted => {
                fields.cur.quoted = true;
                for c in part.text.chars() {
                    fields.push(c, true);
                }
            }
            QuoteContext::DoubleQuoted => {
                fields.cur.quoted = true;
                expand_double_quoted(ctx, &part.text, &mut fields)?;
            }
            QuoteContext::Unquoted => {
                expand_unquoted(ctx, &part.text, part_index == 0, &mut fields)?;
            }
        }
    }
    Ok(fields.finish())
}

fn expand_double_quoted(
    ctx: &mut ShellContext,
    text: &str,
    fields: &mut Fields,
) -> Result<(), ShellError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() && matches!(chars[i + 1], '"' | '\\' | '$' | '`') => {
                fields.push(chars[i + 1], true);
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                let end = subst::find_closing_paren(&chars, i + 2)?;
                let source: String = chars[i + 2..end].iter().collect();
                let (output, _) = subst::run_captured(ctx, &source)?;
                // Inside double quotes internal newlines are preserved.
                fields.splice(&output, false, true);
                i = end + 1;
            }
            '`' => {
                let end = subst::find_closing_backtick(&chars, i + 1)?;
                let source: String = chars[i + 1..end].iter().collect();
                let (output, _) = subst::run_captured(ctx, &source)?;
                fields.splice(&output, false, true);
                i = end + 1;
            }
            '$' => {
                i += 1;
                match vars::expand_dollar(&chars, &mut i, ctx)? {
                    Some(value) => fields.splice(&value, false, true),
                    None => fields.push('$', true),
                }
            }
            c => {
                fields.push(c, true);
                i += 1;
            }
        }
    }
    Ok(())
}

fn expand_unquoted(
    ctx: &mut ShellContext,
    text: &str,
    first_part: bool,
    fields: &mut Fields,
) -> Result<(), ShellError> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    // Tilde expansion applies only at the very start of a word.
    if first_part && chars.first() == Some(&'~') && matches!(chars.get(1), None | Some('/')) {
        if let Some(home) = ctx.env.get("HOME") {
            let home = home.to_string();
            fields.splice(&home, false, true);
            i = 1;
        }
    }

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if i + 1 < chars.len() {
                    fields.push(chars[i + 1], true);
                    i += 2;
                } else {
                    fields.push('\\', true);
                    i += 1;
                }
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                let end = subst::find_closing_paren(&chars, i + 2)?;
                let source: String = chars[i + 2..end].iter().collect();
                let (output, _) = subst::run_captured(ctx, &source)?;
                fields.splice(&output, true, false);
                i = end + 1;
            }
            '`' => {
                let end = subst::find_closing_backtick(&chars, i + 1)?;
                let source: String = chars[i + 1..end].iter().collect();
                let (output, _) = subst::run_captured(ctx, &source)?;
                fields.splice(&output, true, false);
                i = end + 1;
            }
            '$' => {
                i += 1;
                match vars::expand_dollar(&chars, &mut i, ctx)? {
                    Some(value) => fields.splice(&value, true, false),
                    None => fields.push('$', false),
                }
            }
            c => {
                fields.push(c, false);
                i += 1;
            }
        }
    }
    Ok(())
}
