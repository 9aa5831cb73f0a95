//! The job table: every background or stopped pipeline gets a small
//! integer id that `jobs`, `fg`, and `bg` operate on, independent of the
//! underlying process ids.

use std::collections::BTreeMap;

use log::debug;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobControlError {
    #[error("{0}: no such job")]
    NoSuchJob(String),
    #[error("no current job")]
    NoCurrentJob,
    #[error("signal delivery failed: {0}")]
    Signal(nix::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done(i32),
}

impl JobState {
    pub fn label(&self) -> String {
        match self {
            JobState::Running => "Running".to_string(),
            JobState::Stopped => "Stopped".to_string(),
            JobState::Done(0) => "Done".to_string(),
            JobState::Done(code) => format!("Exit {code}"),
        }
    }
}

#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    /// Children not yet reaped.
    pub pids: Vec<Pid>,
    /// Pid of the last pipeline segment; its exit code becomes the job's.
    pub last_pid: Pid,
    pub state: JobState,
    pub command: String,
    last_status: i32,
}

#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    pub fn add(&mut self, pgid: Pid, pids: Vec<Pid>, command: String, state: JobState) -> usize {
        let id = self.jobs.keys().next_back().map(|&id| id + 1).unwrap_or(1);
        let last_pid = *pids.last().expect("job has at least one process");
        debug!("job [{id}] registered: pgid {pgid}, {} process(es)", pids.len());
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                pids,
                last_pid,
                state,
                command,
                last_status: 0,
            },
        );
        id
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// The job `fg`/`bg` default to: the most recently created.
    pub fn current(&self) -> Option<usize> {
        self.jobs.keys().next_back().copied()
    }

    /// Look up `%N`, plain `N`, or `%+`/`%%` for the current job.
    pub fn find(&self, spec: &str) -> Result<usize, JobControlError> {
        let body = spec.strip_prefix('%').unwrap_or(spec);
        if body == "+" || body == "%" || body.is_empty() {
            return self.current().ok_or(JobControlError::NoCurrentJob);
        }
        let id: usize = body
            .parse()
            .map_err(|_| JobControlError::NoSuchJob(spec.to_string()))?;
        if self.jobs.contains_key(&id) {
            Ok(id)
        } else {
            Err(JobControlError::NoSuchJob(spec.to_string()))
        }
    }

    pub fn mark_running(&mut self, id: usize) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.state = JobState::Running;
        }
    }

    /// Non-blocking reap of finished or stopped children, called from the
    /// REPL between commands. Handler-driven paths never touch the table;
    /// they only raise the SIGCHLD flag that leads here.
    pub fn reap(&mut self) {
        loop {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Ok(WaitStatus::Exited(pid, code)) => self.record_exit(pid, code),
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    self.record_exit(pid, 128 + signal as i32)
                }
                Ok(WaitStatus::Stopped(pid, _)) => {
                    if let Some(job) = self.job_of_pid_mut(pid) {
                        job.state = JobState::Stopped;
                    }
                }
                Ok(WaitStatus::Continued(pid)) => {
                    if let Some(job) = self.job_of_pid_mut(pid) {
                        job.state = JobState::Running;
                    }
                }
                _ => break,
            }
        }
    }

    /// Report and drop every job that finished since the last prompt.
    pub fn notify_and_clean(&mut self) {
        let done: Vec<usize> = self
            .jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Done(_)))
            .map(|j| j.id)
            .collect();
        for id in done {
            let job = self.jobs.remove(&id).expect("job id collected above");
            eprintln!("[{}]  {}  {}", job.id, job.state.label(), job.command);
        }
    }

    fn record_exit(&mut self, pid: Pid, status: i32) {
        let Some(job) = self.job_of_pid_mut(pid) else {
            return;
        };
        job.pids.retain(|&p| p != pid);
        if pid == job.last_pid {
            job.last_status = status;
        }
        if job.pids.is_empty() {
            job.state = JobState::Done(job.last_status);
        }
    }

    fn job_of_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.values_mut().find(|j| j.pids.contains(&pid))
    }
}
