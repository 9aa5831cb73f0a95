//! Builtin commands. These run inside the shell process because they
//! mutate shell state (or read state only the shell has, like the job
//! table), so they are only valid as the sole command of an unpiped
//! line. `echo` and `pwd` are the exception: inside a pipeline they fall
//! back to their PATH counterparts.

use std::collections::HashMap;
use std::io::Write;

use nix::sys::signal::{killpg, Signal};

use crate::exec::job::JobState;
use crate::exec::pipeline;
use crate::parser::is_valid_name;
use crate::shell::ShellContext;
use crate::SHELL_NAME;

/// Where a builtin may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Must be the sole, unpiped command.
    InProcessOnly,
    /// Builtin when sole; resolved through PATH inside a pipeline.
    PreferBuiltin,
}

pub trait BuiltinCommand {
    fn name(&self) -> &'static str;
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::InProcessOnly
    }
    /// Builtins report failures themselves and return an exit code
    /// instead of raising.
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32;
}

pub struct BuiltinManager {
    commands: HashMap<&'static str, Box<dyn BuiltinCommand>>,
}

impl BuiltinManager {
    pub fn new() -> Self {
        let mut mgr = BuiltinManager {
            commands: HashMap::new(),
        };
        mgr.register(Box::new(CdCommand));
        mgr.register(Box::new(PwdCommand));
        mgr.register(Box::new(EchoCommand));
        mgr.register(Box::new(ExitCommand));
        mgr.register(Box::new(ExportCommand));
        mgr.register(Box::new(UnsetCommand));
        mgr.register(Box::new(SetCommand));
        mgr.register(Box::new(LocalCommand));
        mgr.register(Box::new(ShiftCommand));
        mgr.register(Box::new(JobsCommand));
        mgr.register(Box::new(FgCommand));
        mgr.register(Box::new(BgCommand));
        mgr.register(Box::new(HistoryCommand));
        mgr.register(Box::new(HelpCommand));
        mgr
    }

    pub fn register(&mut self, cmd: Box<dyn BuiltinCommand>) {
        self.commands.insert(cmd.name(), cmd);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<BuiltinKind> {
        self.commands.get(name).map(|c| c.kind())
    }

    pub fn execute(
        &self,
        name: &str,
        args: &[String],
        ctx: &mut ShellContext,
        out: &mut dyn Write,
    ) -> i32 {
        match self.commands.get(name) {
            Some(cmd) => cmd.run(args, ctx, out),
            None => {
                eprintln!("{SHELL_NAME}: {name}: no such builtin");
                127
            }
        }
    }
}

impl Default for BuiltinManager {
    fn default() -> Self {
        BuiltinManager::new()
    }
}

struct CdCommand;

impl BuiltinCommand for CdCommand {
    fn name(&self) -> &'static str {
        "cd"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let mut announce = false;
        let target = match args.first().map(String::as_str) {
            None => match ctx.env.get("HOME") {
                Some(home) => home.to_string(),
                None => {
                    eprintln!("{SHELL_NAME}: cd: HOME not set");
                    return 1;
                }
            },
            Some("-") => match ctx.env.get("OLDPWD") {
                Some(oldpwd) => {
                    announce = true;
                    oldpwd.to_string()
                }
                None => {
                    eprintln!("{SHELL_NAME}: cd: OLDPWD not set");
                    return 1;
                }
            },
            Some(dir) => dir.to_string(),
        };

        let resolved = resolve_cdpath(ctx, &target);
        if let Err(e) = std::env::set_current_dir(&resolved) {
            eprintln!("{SHELL_NAME}: cd: {target}: {e}");
            return 1;
        }
        let oldpwd = ctx.env.get("PWD").unwrap_or_default().to_string();
        let pwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(resolved);
        ctx.env.set("OLDPWD", &oldpwd);
        ctx.env.export("OLDPWD");
        ctx.env.set("PWD", &pwd);
        ctx.env.export("PWD");
        if announce {
            let _ = writeln!(out, "{pwd}");
        }
        0
    }
}

/// `CDPATH` search for relative targets that do not start with a dot
/// component. The first hit wins; misses fall back to the target as-is.
fn resolve_cdpath(ctx: &ShellContext, target: &str) -> String {
    if target.starts_with('/') || target.starts_with('.') {
        return target.to_string();
    }
    let Some(cdpath) = ctx.env.get("CDPATH") else {
        return target.to_string();
    };
    for dir in cdpath.split(':').filter(|d| !d.is_empty()) {
        let candidate = format!("{dir}/{target}");
        if std::path::Path::new(&candidate).is_dir() {
            return candidate;
        }
    }
    target.to_string()
}

struct PwdCommand;

impl BuiltinCommand for PwdCommand {
    fn name(&self) -> &'static str {
        "pwd"
    }
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::PreferBuiltin
    }
    fn run(&self, _args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let pwd = match ctx.env.get("PWD") {
            Some(pwd) => pwd.to_string(),
            None => match std::env::current_dir() {
                Ok(p) => p.to_string_lossy().into_owned(),
                Err(e) => {
                    eprintln!("{SHELL_NAME}: pwd: {e}");
                    return 1;
                }
            },
        };
        let _ = writeln!(out, "{pwd}");
        0
    }
}

struct EchoCommand;

impl BuiltinCommand for EchoCommand {
    fn name(&self) -> &'static str {
        "echo"
    }
    fn kind(&self) -> BuiltinKind {
        BuiltinKind::PreferBuiltin
    }
    fn run(&self, args: &[String], _ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let (newline, args) = match args.first().map(String::as_str) {
            Some("-n") => (false, &args[1..]),
            _ => (true, args),
        };
        let _ = write!(out, "{}", args.join(" "));
        if newline {
            let _ = writeln!(out);
        }
        0
    }
}

struct ExitCommand;

impl BuiltinCommand for ExitCommand {
    fn name(&self) -> &'static str {
        "exit"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, _out: &mut dyn Write) -> i32 {
        let code = match args.first() {
            Some(arg) => match arg.parse::<i32>() {
                Ok(code) => code,
                Err(_) => {
                    eprintln!("{SHELL_NAME}: exit: {arg}: numeric argument required");
                    2
                }
            },
            None => ctx.last_status,
        };
        ctx.pending_exit = Some(code);
        code
    }
}

struct ExportCommand;

impl BuiltinCommand for ExportCommand {
    fn name(&self) -> &'static str {
        "export"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        if args.is_empty() {
            for (k, v) in ctx.env.exported_vars() {
                let _ = writeln!(out, "export {k}={v}");
            }
            return 0;
        }
        let mut status = 0;
        for arg in args {
            match arg.split_once('=') {
                Some((name, value)) if is_valid_name(name) => {
                    ctx.env.set(name, value);
                    ctx.env.export(name);
                }
                None if is_valid_name(arg) => ctx.env.export(arg),
                _ => {
                    eprintln!("{SHELL_NAME}: export: {arg}: not a valid identifier");
                    status = 1;
                }
            }
        }
        status
    }
}

struct UnsetCommand;

impl BuiltinCommand for UnsetCommand {
    fn name(&self) -> &'static str {
        "unset"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, _out: &mut dyn Write) -> i32 {
        for arg in args {
            ctx.env.unset(arg);
        }
        0
    }
}

struct SetCommand;

impl BuiltinCommand for SetCommand {
    fn name(&self) -> &'static str {
        "set"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        if args.is_empty() {
            for (k, v) in ctx.env.all() {
                let _ = writeln!(out, "{k}={v}");
            }
            return 0;
        }
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            let (enable, flags) = match arg.as_bytes().first() {
                Some(b'-') => (true, &arg[1..]),
                Some(b'+') => (false, &arg[1..]),
                _ => {
                    eprintln!("{SHELL_NAME}: set: {arg}: invalid option");
                    return 2;
                }
            };
            for flag in flags.chars() {
                match flag {
                    'e' => ctx.options.errexit = enable,
                    'x' => ctx.options.xtrace = enable,
                    'o' => {
                        i += 1;
                        let Some(name) = args.get(i) else {
                            // `set -o` alone lists the long options.
                            let _ = writeln!(out, "errexit  \t{}", onoff(ctx.options.errexit));
                            let _ = writeln!(out, "xtrace   \t{}", onoff(ctx.options.xtrace));
                            let _ = writeln!(out, "pipefail \t{}", onoff(ctx.options.pipefail));
                            return 0;
                        };
                        match name.as_str() {
                            "errexit" => ctx.options.errexit = enable,
                            "xtrace" => ctx.options.xtrace = enable,
                            "pipefail" => ctx.options.pipefail = enable,
                            _ => {
                                eprintln!("{SHELL_NAME}: set: {name}: invalid option name");
                                return 2;
                            }
                        }
                    }
                    _ => {
                        eprintln!("{SHELL_NAME}: set: -{flag}: invalid option");
                        return 2;
                    }
                }
            }
            i += 1;
        }
        0
    }
}

fn onoff(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

struct LocalCommand;

impl BuiltinCommand for LocalCommand {
    fn name(&self) -> &'static str {
        "local"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, _out: &mut dyn Write) -> i32 {
        if !ctx.env.in_scope() {
            eprintln!("{SHELL_NAME}: local: can only be used in a function");
            return 1;
        }
        let mut status = 0;
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, value),
                None => (arg.as_str(), ""),
            };
            if !is_valid_name(name) {
                eprintln!("{SHELL_NAME}: local: {arg}: not a valid identifier");
                status = 1;
                continue;
            }
            ctx.env.set_local(name, value);
        }
        status
    }
}

struct ShiftCommand;

impl BuiltinCommand for ShiftCommand {
    fn name(&self) -> &'static str {
        "shift"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, _out: &mut dyn Write) -> i32 {
        let n = match args.first() {
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("{SHELL_NAME}: shift: {arg}: numeric argument required");
                    return 1;
                }
            },
            None => 1,
        };
        if ctx.shift_positionals(n) { 0 } else { 1 }
    }
}

struct JobsCommand;

impl BuiltinCommand for JobsCommand {
    fn name(&self) -> &'static str {
        "jobs"
    }
    fn run(&self, _args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        for job in ctx.jobs.iter() {
            let _ = writeln!(out, "[{}]  {:<8}  {}", job.id, job.state.label(), job.command);
        }
        0
    }
}

struct FgCommand;

impl BuiltinCommand for FgCommand {
    fn name(&self) -> &'static str {
        "fg"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let spec = args.first().map(String::as_str).unwrap_or("%+");
        let id = match ctx.jobs.find(spec) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("{SHELL_NAME}: fg: {e}");
                return 1;
            }
        };
        let job = ctx.jobs.remove(id).expect("job id came from find");
        let _ = writeln!(out, "{}", job.command);
        if let Err(e) = killpg(job.pgid, Signal::SIGCONT) {
            eprintln!("{SHELL_NAME}: fg: {e}");
            return 1;
        }
        let interactive = ctx.interactive;
        let shell_pgid = ctx.shell_pgid;
        let outcome = pipeline::wait_for_group(
            &mut ctx.jobs,
            interactive,
            shell_pgid,
            job.pgid,
            &job.pids,
            &job.command,
        );
        if outcome.stopped {
            128 + Signal::SIGTSTP as i32
        } else {
            outcome.statuses.get(&job.last_pid).copied().unwrap_or(0)
        }
    }
}

struct BgCommand;

impl BuiltinCommand for BgCommand {
    fn name(&self) -> &'static str {
        "bg"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let spec = args.first().map(String::as_str).unwrap_or("%+");
        let id = match ctx.jobs.find(spec) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("{SHELL_NAME}: bg: {e}");
                return 1;
            }
        };
        let job = ctx.jobs.get(id).expect("job id came from find");
        if job.state != JobState::Stopped {
            eprintln!("{SHELL_NAME}: bg: job {id} already in background");
            return 1;
        }
        if let Err(e) = killpg(job.pgid, Signal::SIGCONT) {
            eprintln!("{SHELL_NAME}: bg: {e}");
            return 1;
        }
        let _ = writeln!(out, "[{}] {} &", job.id, job.command);
        ctx.jobs.mark_running(id);
        0
    }
}

struct HistoryCommand;

impl BuiltinCommand for HistoryCommand {
    fn name(&self) -> &'static str {
        "history"
    }
    fn run(&self, args: &[String], ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let history = ctx.history.clone();
        let mut history = history.borrow_mut();

        let mut limit: Option<usize> = None;
        for arg in args {
            match arg.as_str() {
                "-c" | "--clear" => {
                    history.clear();
                    return 0;
                }
                s if s.chars().all(|c| c.is_ascii_digit()) => limit = s.parse().ok(),
                _ => {
                    eprintln!("{SHELL_NAME}: history: unknown option '{arg}'");
                    return 2;
                }
            }
        }

        let entries = history.list();
        let start = limit
            .map(|n| entries.len().saturating_sub(n))
            .unwrap_or(0);
        for (i, cmd) in entries.iter().enumerate().skip(start) {
            let _ = writeln!(out, "{:>4}  {}", i + 1, cmd);
        }
        0
    }
}

struct HelpCommand;

impl BuiltinCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "help"
    }
    fn run(&self, _args: &[String], _ctx: &mut ShellContext, out: &mut dyn Write) -> i32 {
        let _ = writeln!(out, "Builtin commands:");
        let _ = writeln!(out, "  cd [DIR]        change directory (cd - for previous)");
        let _ = writeln!(out, "  pwd             print working directory");
        let _ = writeln!(out, "  echo [-n] ARGS  print arguments");
        let _ = writeln!(out, "  export NAME[=V] mark variables for child processes");
        let _ = writeln!(out, "  unset NAME      remove variables");
        let _ = writeln!(out, "  set -e|-x|-o .. toggle shell options");
        let _ = writeln!(out, "  local NAME[=V]  function-scoped variables");
        let _ = writeln!(out, "  shift [N]       drop leading positional parameters");
        let _ = writeln!(out, "  jobs            list background and stopped jobs");
        let _ = writeln!(out, "  fg [%N]         resume a job in the foreground");
        let _ = writeln!(out, "  bg [%N]         resume a stopped job in the background");
        let _ = writeln!(out, "  history [N|-c]  show or clear command history");
        let _ = writeln!(out, "  exit [CODE]     leave the shell");
        0
    }
}
