//! Process execution: spawning pipeline segments wired together with OS
//! pipes, process-group placement, and foreground waiting.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use log::debug;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::ast::{Pipeline, PipelineSegment, RedirectKind};
use crate::error::ShellError;
use crate::exec::builtins::{BuiltinKind, BuiltinManager};
use crate::exec::job::{JobState, JobTable};
use crate::exec::path_resolver::{PathResolver, Resolution};
use crate::exec::ExecError;
use crate::expand;
use crate::shell::ShellContext;
use crate::signals;
use crate::SHELL_NAME;

/// A segment after expansion: concrete strings, ready to run.
struct Prepared {
    assignments: Vec<(String, String)>,
    argv: Vec<String>,
    redirects: Vec<(RedirectKind, String)>,
}

/// Execute one pipeline. `background` registers a job instead of waiting.
pub fn run_pipeline(
    ctx: &mut ShellContext,
    pipeline: &Pipeline,
    background: bool,
) -> Result<i32, ShellError> {
    ctx.last_subst_status = 0;
    let mut prepared = Vec::with_capacity(pipeline.segments.len());
    for segment in &pipeline.segments {
        prepared.push(prepare_segment(ctx, segment)?);
    }

    // Sole-command forms that run inside the shell process: bare
    // assignments, functions, and builtins.
    if prepared.len() == 1 {
        let prep = &prepared[0];
        if prep.argv.is_empty() {
            return run_bare(ctx, &prepared[0]);
        }
        let name = prep.argv[0].clone();
        if ctx.functions.contains_key(&name) {
            for (k, v) in &prep.assignments {
                ctx.env.set(k, v);
            }
            let args = prep.argv[1..].to_vec();
            return crate::interp::call_function(ctx, &name, &args);
        }
        let builtins = BuiltinManager::new();
        let in_process = match builtins.kind(&name) {
            Some(BuiltinKind::InProcessOnly) => true,
            Some(BuiltinKind::PreferBuiltin) => !background,
            None => false,
        };
        if in_process {
            return run_builtin(ctx, &builtins, &prepared[0]);
        }
    }

    run_external(ctx, &prepared, background)
}

fn prepare_segment(
    ctx: &mut ShellContext,
    segment: &PipelineSegment,
) -> Result<Prepared, ShellError> {
    let mut assignments = Vec::with_capacity(segment.assignments.len());
    for assignment in &segment.assignments {
        let value = expand::expand_single(ctx, &assignment.value)?;
        assignments.push((assignment.name.clone(), value));
    }
    let argv = expand::expand_words(ctx, &segment.words)?;
    let mut redirects = Vec::with_capacity(segment.redirects.len());
    for redirect in &segment.redirects {
        redirects.push((redirect.kind, expand::expand_single(ctx, &redirect.target)?));
    }

    if ctx.options.xtrace && (!argv.is_empty() || !assignments.is_empty()) {
        let mut shown: Vec<String> = assignments
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        shown.extend(argv.iter().cloned());
        eprintln!("+ {}", shown.join(" "));
    }

    Ok(Prepared {
        assignments,
        argv,
        redirects,
    })
}

/// No command words: apply assignments to the shell, touch redirect
/// targets. The status reflects the last command substitution so
/// `x=$(false)` leaves `$?` at 1.
fn run_bare(ctx: &mut ShellContext, prep: &Prepared) -> Result<i32, ShellError> {
    for (k, v) in &prep.assignments {
        ctx.env.set(k, v);
    }
    for (kind, target) in &prep.redirects {
        if let Err(e) = open_redirect(*kind, target) {
            report(ExecError::Redirect {
                target: target.clone(),
                source: e,
            });
            return Ok(1);
        }
    }
    Ok(ctx.last_subst_status)
}

fn report(error: ExecError) {
    eprintln!("{SHELL_NAME}: {error}");
}

fn open_redirect(kind: RedirectKind, target: &str) -> std::io::Result<File> {
    match kind {
        RedirectKind::In => File::open(target),
        RedirectKind::Out => File::create(target),
        RedirectKind::Append => OpenOptions::new()
            .create(true)
            .append(true)
            .open(target),
    }
}

fn run_builtin(
    ctx: &mut ShellContext,
    builtins: &BuiltinManager,
    prep: &Prepared,
) -> Result<i32, ShellError> {
    for (k, v) in &prep.assignments {
        ctx.env.set(k, v);
    }

    // Redirect targets are opened for their side effects; the last output
    // redirect becomes the builtin's stdout.
    let mut out_file: Option<File> = None;
    for (kind, target) in &prep.redirects {
        match open_redirect(*kind, target) {
            Ok(file) => {
                if !matches!(kind, RedirectKind::In) {
                    out_file = Some(file);
                }
            }
            Err(e) => {
                report(ExecError::Redirect {
                    target: target.clone(),
                    source: e,
                });
                return Ok(1);
            }
        }
    }

    let name = &prep.argv[0];
    let args = &prep.argv[1..];
    let status = if let Some(mut file) = out_file {
        builtins.execute(name, args, ctx, &mut file)
    } else if ctx.capture.is_some() {
        // Substitution context: the builtin writes into the capture buffer.
        let mut buf = ctx.capture.take().expect("capture checked above");
        let status = builtins.execute(name, args, ctx, &mut buf);
        ctx.capture = Some(buf);
        status
    } else {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let status = builtins.execute(name, args, ctx, &mut lock);
        let _ = lock.flush();
        status
    };
    Ok(status)
}

fn run_external(
    ctx: &mut ShellContext,
    prepared: &[Prepared],
    background: bool,
) -> Result<i32, ShellError> {
    let n = prepared.len();
    let builtins = BuiltinManager::new();
    let capturing = ctx.capture.is_some() && !background;
    let exported = ctx.env.exported_vars();

    let mut statuses: Vec<Option<i32>> = vec![None; n];
    let mut spawned: Vec<(usize, Pid)> = Vec::new();
    let mut pgid: Option<Pid> = None;
    let mut prev_read: Option<OwnedFd> = None;
    let mut capture_read: Option<OwnedFd> = None;

    for (i, prep) in prepared.iter().enumerate() {
        let stdin_pipe = prev_read.take();
        let mut stdout_pipe: Option<OwnedFd> = None;
        if i < n - 1 {
            let (read, write) = nix::unistd::pipe()
                .map_err(|e| ExecError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
            prev_read = Some(read);
            stdout_pipe = Some(write);
        } else if capturing {
            let (read, write) = nix::unistd::pipe()
                .map_err(|e| ExecError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
            capture_read = Some(read);
            stdout_pipe = Some(write);
        }

        // Assignment-only segments inside a pipeline contribute nothing.
        if prep.argv.is_empty() {
            statuses[i] = Some(0);
            continue;
        }

        let name = &prep.argv[0];
        if ctx.functions.contains_key(name)
            || matches!(builtins.kind(name), Some(BuiltinKind::InProcessOnly))
        {
            // Dropping this segment's pipe ends gives its reader EOF.
            report(ExecError::NotAllowedInPipeline(name.clone()));
            statuses[i] = Some(1);
            continue;
        }

        let path = match PathResolver.resolve(name, &ctx.env) {
            Resolution::Found(path) => path,
            Resolution::NotExecutable(_) => {
                report(ExecError::PermissionDenied(name.clone()));
                statuses[i] = Some(126);
                continue;
            }
            Resolution::NotFound => {
                report(ExecError::CommandNotFound(name.clone()));
                statuses[i] = Some(127);
                continue;
            }
        };

        let mut command = Command::new(&path);
        command.args(&prep.argv[1..]);
        command.env_clear();
        command.envs(exported.iter().cloned());
        command.envs(prep.assignments.iter().cloned());

        if let Some(fd) = stdin_pipe {
            command.stdin(Stdio::from(fd));
        }
        if let Some(fd) = stdout_pipe {
            command.stdout(Stdio::from(fd));
        }

        // Explicit redirections override the pipe wiring.
        let mut redirect_failed = false;
        for (kind, target) in &prep.redirects {
            match open_redirect(*kind, target) {
                Ok(file) => {
                    if matches!(kind, RedirectKind::In) {
                        command.stdin(Stdio::from(file));
                    } else {
                        command.stdout(Stdio::from(file));
                    }
                }
                Err(e) => {
                    report(ExecError::Redirect {
                        target: target.clone(),
                        source: e,
                    });
                    redirect_failed = true;
                    break;
                }
            }
        }
        if redirect_failed {
            statuses[i] = Some(1);
            continue;
        }

        // With job control on, all segments join one process group led by
        // the first child; otherwise they stay in the shell's group so
        // terminal signals still reach them.
        if ctx.interactive {
            command.process_group(pgid.map(Pid::as_raw).unwrap_or(0));
        }
        unsafe {
            command.pre_exec(|| {
                signals::reset_for_child();
                Ok(())
            });
        }

        match command.spawn() {
            Ok(child) => {
                let pid = Pid::from_raw(child.id() as i32);
                let group = pgid.unwrap_or(pid);
                if ctx.interactive {
                    // Mirror the child's setpgid to close the startup race.
                    let _ = nix::unistd::setpgid(pid, group);
                }
                pgid = Some(group);
                debug!("spawned {name} as pid {pid} in group {group}");
                spawned.push((i, pid));
            }
            Err(e) => {
                report(ExecError::Spawn {
                    prog: name.clone(),
                    source: e,
                });
                statuses[i] = Some(126);
            }
        }
    }
    drop(prev_read);

    if spawned.is_empty() {
        return Ok(final_status(&statuses, ctx.options.pipefail));
    }
    let pgid = pgid.expect("pgid set when anything spawned");
    let pids: Vec<Pid> = spawned.iter().map(|&(_, pid)| pid).collect();
    let command_text = prepared
        .iter()
        .map(|p| p.argv.join(" "))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");

    if background {
        let id = ctx
            .jobs
            .add(pgid, pids, command_text, JobState::Running);
        let last = spawned.last().expect("spawned not empty").1;
        println!("[{id}] {last}");
        return Ok(0);
    }

    // Drain captured output before waiting: every parent-side write end is
    // closed by now, so EOF arrives as soon as the children finish.
    if let Some(read) = capture_read {
        let mut file = File::from(read);
        let mut buf = Vec::new();
        let _ = file.read_to_end(&mut buf);
        if let Some(capture) = ctx.capture.as_mut() {
            capture.extend_from_slice(&buf);
        }
    }

    let interactive = ctx.interactive;
    let shell_pgid = ctx.shell_pgid;
    let outcome = wait_for_group(
        &mut ctx.jobs,
        interactive,
        shell_pgid,
        pgid,
        &pids,
        &command_text,
    );
    for (i, pid) in &spawned {
        if let Some(status) = outcome.statuses.get(pid) {
            statuses[*i] = Some(*status);
        }
    }
    if outcome.stopped {
        return Ok(128 + Signal::SIGTSTP as i32);
    }
    Ok(final_status(&statuses, ctx.options.pipefail))
}

/// Pipeline exit code: the last segment's, or the first non-zero under
/// `pipefail`.
fn final_status(statuses: &[Option<i32>], pipefail: bool) -> i32 {
    if pipefail {
        for status in statuses.iter().flatten() {
            if *status != 0 {
                return *status;
            }
        }
    }
    statuses.last().copied().flatten().unwrap_or(0)
}

pub struct WaitOutcome {
    pub statuses: HashMap<Pid, i32>,
    pub stopped: bool,
}

/// Block until every process of the group exits or the group stops.
/// The terminal is handed to the group for the duration and reclaimed
/// afterwards. A stopped group is registered in the job table. Without
/// job control the children share the shell's group, so each pid is
/// waited on directly.
pub fn wait_for_group(
    jobs: &mut JobTable,
    interactive: bool,
    shell_pgid: Pid,
    pgid: Pid,
    pids: &[Pid],
    command: &str,
) -> WaitOutcome {
    if interactive {
        let _ = nix::unistd::tcsetpgrp(std::io::stdin().as_fd(), pgid);
    }

    let mut statuses = HashMap::new();
    let mut remaining: Vec<Pid> = pids.to_vec();
    let mut stopped = false;
    while !remaining.is_empty() {
        let target = if interactive {
            Pid::from_raw(-pgid.as_raw())
        } else {
            remaining[0]
        };
        match waitpid(target, Some(WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                statuses.insert(pid, code);
                remaining.retain(|&p| p != pid);
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                if signal == Signal::SIGINT {
                    // A child dying to Ctrl+C also cancels the rest of the
                    // shell's current line (loops in particular).
                    signals::set_interrupted();
                }
                statuses.insert(pid, 128 + signal as i32);
                remaining.retain(|&p| p != pid);
            }
            Ok(WaitStatus::Stopped(_, _)) => {
                let id = jobs.add(pgid, remaining.clone(), command.to_string(), JobState::Stopped);
                eprintln!("\n[{id}]  Stopped  {command}");
                stopped = true;
                break;
            }
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
            Ok(_) => continue,
        }
    }

    if interactive {
        let _ = nix::unistd::tcsetpgrp(std::io::stdin().as_fd(), shell_pgid);
    }
    WaitOutcome { statuses, stopped }
}
