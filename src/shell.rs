//! The shell context: every piece of mutable shell state, passed
//! explicitly into each component; there are no globals beyond the
//! signal flags. `execute_source` is the single entry point that the
//! REPL, `-c`, command substitution, and control-flow bodies all share.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::{AndOrList, AndOrOp, List, Statement};
use crate::environment::Environment;
use crate::error::ShellError;
use crate::exec::job::JobTable;
use crate::exec::pipeline;
use crate::expand::ExpansionError;
use crate::history::HistoryManager;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::signals;

/// Nested substitutions and function calls share one depth limit so a
/// runaway recursion becomes a reported error instead of a blown stack.
const MAX_RECURSION_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShellOptions {
    /// `set -e`: a failing command aborts the rest of the line.
    pub errexit: bool,
    /// `set -x`: trace expanded commands to stderr.
    pub xtrace: bool,
    /// `set -o pipefail`: a pipeline fails on its first failing segment.
    pub pipefail: bool,
}

pub struct ShellContext {
    pub env: Environment,
    pub options: ShellOptions,
    pub jobs: JobTable,
    pub functions: HashMap<String, Rc<List>>,
    pub aliases: HashMap<String, String>,
    pub history: Rc<RefCell<HistoryManager>>,
    pub last_status: i32,
    /// Status of the most recent command substitution, which becomes the
    /// status of an assignment-only command.
    pub last_subst_status: i32,
    pub shell_name: String,
    pub shell_pid: i32,
    pub shell_pgid: nix::unistd::Pid,
    pub interactive: bool,
    /// Set by the `exit` builtin; unwinds every loop on the way out.
    pub pending_exit: Option<i32>,
    /// When set, in-process output and the last pipeline segment's stdout
    /// land here instead of the terminal (command substitution).
    pub capture: Option<Vec<u8>>,
    /// `set -e` tripped somewhere below: abandon the rest of the line.
    pub errexit_tripped: bool,
    /// Non-zero while evaluating an `if`/`while`/`until` condition, where
    /// failure is expected and must not trip errexit.
    pub condition_depth: usize,
    positionals: Vec<Vec<String>>,
    recursion_depth: usize,
}

impl ShellContext {
    pub fn new(interactive: bool) -> Self {
        ShellContext {
            env: Environment::new(),
            options: ShellOptions::default(),
            jobs: JobTable::new(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            history: Rc::new(RefCell::new(HistoryManager::default())),
            last_status: 0,
            last_subst_status: 0,
            shell_name: crate::SHELL_NAME.to_string(),
            shell_pid: std::process::id() as i32,
            shell_pgid: nix::unistd::getpgrp(),
            interactive,
            pending_exit: None,
            capture: None,
            errexit_tripped: false,
            condition_depth: 0,
            positionals: Vec::new(),
            recursion_depth: 0,
        }
    }

    pub fn for_tests() -> Self {
        ShellContext::new(false)
    }

    pub fn positional(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return Some(&self.shell_name);
        }
        self.positionals
            .last()?
            .get(n - 1)
            .map(String::as_str)
    }

    pub fn positional_count(&self) -> usize {
        self.positionals.last().map(Vec::len).unwrap_or(0)
    }

    pub fn positionals(&self) -> &[String] {
        self.positionals.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_positionals(&mut self, args: Vec<String>) {
        self.positionals.push(args);
    }

    pub fn pop_positionals(&mut self) {
        self.positionals.pop();
    }

    pub fn shift_positionals(&mut self, n: usize) -> bool {
        let Some(frame) = self.positionals.last_mut() else {
            return n == 0;
        };
        if n > frame.len() {
            return false;
        }
        frame.drain(..n);
        true
    }

    pub fn enter_recursion(&mut self) -> Result<(), ShellError> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(ExpansionError::RecursionLimit.into());
        }
        self.recursion_depth += 1;
        Ok(())
    }

    pub fn leave_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    /// Anything below should stop unwinding work on the current line.
    pub fn should_stop(&self) -> bool {
        self.pending_exit.is_some() || self.errexit_tripped || signals::interrupted()
    }
}

/// Run one source string (a command line, a `-c` argument, a script, or
/// the inside of a substitution) through the full pipeline.
pub fn execute_source(ctx: &mut ShellContext, source: &str) -> Result<i32, ShellError> {
    let tokens = Lexer::tokenize(source)?;
    let list = Parser::parse(&tokens)?;
    execute_list(ctx, &list)
}

/// Entry point for a complete interactive line: clears per-line state
/// first and records the final status.
pub fn execute_line(ctx: &mut ShellContext, line: &str) -> Result<i32, ShellError> {
    ctx.errexit_tripped = false;
    let status = execute_source(ctx, line)?;
    ctx.last_status = status;
    Ok(status)
}

pub fn execute_list(ctx: &mut ShellContext, list: &List) -> Result<i32, ShellError> {
    let mut status = 0;
    for item in &list.items {
        if ctx.should_stop() {
            break;
        }
        status = match &item.statement {
            Statement::AndOr(and_or) => execute_and_or(ctx, and_or, item.background)?,
            Statement::Compound(compound) => crate::interp::exec_compound(ctx, compound)?,
        };
        ctx.last_status = status;
        if ctx.options.errexit && status != 0 && ctx.condition_depth == 0 {
            debug!("errexit: aborting line with status {status}");
            ctx.errexit_tripped = true;
            break;
        }
    }
    Ok(status)
}

fn execute_and_or(
    ctx: &mut ShellContext,
    and_or: &AndOrList,
    background: bool,
) -> Result<i32, ShellError> {
    // `&` backgrounds a plain pipeline; a whole `&&`/`||` chain still
    // runs in the foreground.
    let background = background && and_or.rest.is_empty();
    let mut status = pipeline::run_pipeline(ctx, &and_or.first, background)?;
    for (op, pipe) in &and_or.rest {
        let run = match op {
            AndOrOp::And => status == 0,
            AndOrOp::Or => status != 0,
        };
        if run {
            ctx.last_status = status;
            status = pipeline::run_pipeline(ctx, pipe, false)?;
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_frames_stack() {
        let mut ctx = ShellContext::for_tests();
        assert_eq!(ctx.positional_count(), 0);
        ctx.push_positionals(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ctx.positional(1), Some("a"));
        ctx.push_positionals(vec!["x".to_string()]);
        assert_eq!(ctx.positional(1), Some("x"));
        assert_eq!(ctx.positional_count(), 1);
        ctx.pop_positionals();
        assert_eq!(ctx.positional(2), Some("b"));
        ctx.pop_positionals();
    }

    #[test]
    fn positional_zero_is_shell_name() {
        let ctx = ShellContext::for_tests();
        assert_eq!(ctx.positional(0), Some(crate::SHELL_NAME));
    }

    #[test]
    fn shift_drops_leading() {
        let mut ctx = ShellContext::for_tests();
        ctx.push_positionals(vec!["a".into(), "b".into(), "c".into()]);
        assert!(ctx.shift_positionals(2));
        assert_eq!(ctx.positionals(), &["c".to_string()]);
        assert!(!ctx.shift_positionals(2));
    }

    #[test]
    fn recursion_guard_trips() {
        let mut ctx = ShellContext::for_tests();
        for _ in 0..MAX_RECURSION_DEPTH {
            ctx.enter_recursion().unwrap();
        }
        assert!(ctx.enter_recursion().is_err());
    }
}
