//! Signal dispositions for the shell process.
//!
//! Handlers only raise atomic flags; the main loop drains them and does
//! the real work (job reaping, abandoning the current line). The shell
//! itself never dies from keyboard signals: SIGINT is flagged, and the
//! stop/terminal signals are ignored so the shell survives job control.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigchld(_: libc::c_int) {
    SIGCHLD_PENDING.store(true, Ordering::SeqCst);
}

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the shell's dispositions. Called once at startup.
pub fn install_shell_handlers() {
    let chld = SigAction::new(
        SigHandler::Handler(on_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let int = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
    unsafe {
        let _ = signal::sigaction(Signal::SIGCHLD, &chld);
        let _ = signal::sigaction(Signal::SIGINT, &int);
        let _ = signal::signal(Signal::SIGQUIT, SigHandler::SigIgn);
        let _ = signal::signal(Signal::SIGTSTP, SigHandler::SigIgn);
        let _ = signal::signal(Signal::SIGTTOU, SigHandler::SigIgn);
        let _ = signal::signal(Signal::SIGTTIN, SigHandler::SigIgn);
    }
}

/// True once per SIGCHLD burst: a child changed state and the job table
/// should be reaped.
pub fn take_sigchld() -> bool {
    SIGCHLD_PENDING.swap(false, Ordering::SeqCst)
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Restore default dispositions in a child about to exec. Runs between
/// fork and exec, so only async-signal-safe calls are allowed.
pub fn reset_for_child() {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGQUIT, libc::SIG_DFL);
        libc::signal(libc::SIGTSTP, libc::SIG_DFL);
        libc::signal(libc::SIGTTOU, libc::SIG_DFL);
        libc::signal(libc::SIGTTIN, libc::SIG_DFL);
        libc::signal(libc::SIGCHLD, libc::SIG_DFL);
    }
}
