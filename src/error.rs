use thiserror::Error;

use crate::exec::job::JobControlError;
use crate::exec::ExecError;
use crate::expand::ExpansionError;
use crate::lexer::LexError;
use crate::parser::ParseError;

/// Everything that can abort a command line. All variants are recovered
/// at single-line granularity: the REPL reports them and keeps running.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Expansion(#[from] ExpansionError),
    #[error("{0}")]
    Exec(#[from] ExecError),
    #[error("{0}")]
    JobControl(#[from] JobControlError),
}

impl ShellError {
    /// True when the error means "the line is not finished yet" rather
    /// than "the line is wrong", so the REPL shows a continuation prompt.
    pub fn needs_more_input(&self) -> bool {
        match self {
            ShellError::Lex(e) => e.needs_more_input(),
            ShellError::Parse(e) => e.needs_more_input(),
            _ => false,
        }
    }

    /// Exit status the failed line reports through `$?`.
    pub fn status(&self) -> i32 {
        match self {
            ShellError::Expansion(ExpansionError::SubstitutionFailed(code)) => *code,
            ShellError::Exec(ExecError::CommandNotFound(_)) => 127,
            ShellError::Exec(ExecError::PermissionDenied(_)) => 126,
            ShellError::Lex(_) | ShellError::Parse(_) => 2,
            _ => 1,
        }
    }
}
