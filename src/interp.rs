//! Control-flow interpretation: conditionals, loops, `case`, and
//! function calls. Bodies are ordinary command lists dispatched back
//! through `execute_list`, so nesting depth is bounded by the recursion
//! guard in the shell context.

use std::rc::Rc;

use crate::ast::{CaseTerminator, CompoundCommand, List};
use crate::error::ShellError;
use crate::expand;
use crate::shell::{execute_list, ShellContext};

pub fn exec_compound(ctx: &mut ShellContext, compound: &CompoundCommand) -> Result<i32, ShellError> {
    match compound {
        CompoundCommand::If { arms, else_body } => exec_if(ctx, arms, else_body.as_ref()),
        CompoundCommand::For { var, words, body } => exec_for(ctx, var, words, body),
        CompoundCommand::While { cond, body } => exec_while(ctx, cond, body, false),
        CompoundCommand::Until { cond, body } => exec_while(ctx, cond, body, true),
        CompoundCommand::Case { word, items } => exec_case(ctx, word, items),
        CompoundCommand::FunctionDef { name, body } => {
            ctx.functions.insert(name.clone(), Rc::new(body.clone()));
            Ok(0)
        }
        CompoundCommand::Subshell(list) => exec_subshell(ctx, list),
        CompoundCommand::BraceGroup(list) => execute_list(ctx, list),
    }
}

/// Evaluate a condition list: exit code 0 means true. Failures inside a
/// condition never trip errexit.
fn eval_condition(ctx: &mut ShellContext, cond: &List) -> Result<i32, ShellError> {
    ctx.condition_depth += 1;
    let result = execute_list(ctx, cond);
    ctx.condition_depth -= 1;
    result
}

fn exec_if(
    ctx: &mut ShellContext,
    arms: &[(List, List)],
    else_body: Option<&List>,
) -> Result<i32, ShellError> {
    for (cond, body) in arms {
        if eval_condition(ctx, cond)? == 0 {
            return execute_list(ctx, body);
        }
        if ctx.should_stop() {
            return Ok(ctx.last_status);
        }
    }
    match else_body {
        Some(body) => execute_list(ctx, body),
        // No branch taken: the construct succeeds.
        None => Ok(0),
    }
}

fn exec_for(
    ctx: &mut ShellContext,
    var: &str,
    words: &[crate::ast::Word],
    body: &List,
) -> Result<i32, ShellError> {
    let items = expand::expand_words(ctx, words)?;
    let mut status = 0;
    for item in items {
        if ctx.should_stop() {
            break;
        }
        ctx.env.set(var, &item);
        status = execute_list(ctx, body)?;
    }
    Ok(status)
}

fn exec_while(
    ctx: &mut ShellContext,
    cond: &List,
    body: &List,
    until: bool,
) -> Result<i32, ShellError> {
    // Never entered means success.
    let mut status = 0;
    loop {
        if ctx.should_stop() {
            break;
        }
        let cond_status = eval_condition(ctx, cond)?;
        let enter = if until {
            cond_status != 0
        } else {
            cond_status == 0
        };
        if !enter {
            break;
        }
        status = execute_list(ctx, body)?;
    }
    Ok(status)
}

fn exec_case(
    ctx: &mut ShellContext,
    word: &crate::ast::Word,
    items: &[crate::ast::CaseItem],
) -> Result<i32, ShellError> {
    // The subject expands (variables, substitution) but never globs.
    let value = expand::expand_single(ctx, word)?;
    let mut status = 0;
    let mut fell_through = false;
    for item in items {
        let matched = fell_through || matches_any(ctx, &item.patterns, &value)?;
        if !matched {
            continue;
        }
        status = execute_list(ctx, &item.body)?;
        match item.terminator {
            CaseTerminator::Break => return Ok(status),
            // `;&` runs the next block unconditionally.
            CaseTerminator::FallThrough => fell_through = true,
            // `;;&` keeps testing the remaining patterns.
            CaseTerminator::Continue => fell_through = false,
        }
    }
    Ok(status)
}

fn matches_any(
    ctx: &mut ShellContext,
    patterns: &[crate::ast::Word],
    value: &str,
) -> Result<bool, ShellError> {
    for pattern in patterns {
        let pattern = expand::expand_case_pattern(ctx, pattern)?;
        if expand::glob::matches(&pattern, value) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `( list )` runs against a snapshot of the shell state; nothing the
/// subshell changes (variables, options, directory, functions, a
/// pending `exit`) survives it.
fn exec_subshell(ctx: &mut ShellContext, list: &List) -> Result<i32, ShellError> {
    ctx.enter_recursion()?;
    let saved_env = ctx.env.clone();
    let saved_options = ctx.options;
    let saved_functions = ctx.functions.clone();
    let saved_cwd = std::env::current_dir().ok();

    let result = execute_list(ctx, list);

    ctx.env = saved_env;
    ctx.options = saved_options;
    ctx.functions = saved_functions;
    if let Some(cwd) = saved_cwd {
        let _ = std::env::set_current_dir(cwd);
    }
    // `exit` inside a subshell ends the subshell, not the shell.
    let status = match ctx.pending_exit.take() {
        Some(code) => Ok(code),
        None => result,
    };
    ctx.errexit_tripped = false;
    ctx.leave_recursion();
    status
}

/// Invoke a defined function with fresh positional parameters and a new
/// `local` scope.
pub fn call_function(ctx: &mut ShellContext, name: &str, args: &[String]) -> Result<i32, ShellError> {
    let body = ctx
        .functions
        .get(name)
        .cloned()
        .expect("caller checked the function exists");
    ctx.enter_recursion()?;
    ctx.push_positionals(args.to_vec());
    ctx.env.push_scope();

    let result = execute_list(ctx, &body);

    ctx.env.pop_scope();
    ctx.pop_positionals();
    ctx.leave_recursion();
    result
}
