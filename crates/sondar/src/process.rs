//! Process isolation helpers.
//!
//! Scenarios that can wedge the GPU, the driver or the calling process run
//! in a forked child so the suite survives them: the child's exit status
//! carries the classification back through the standard exit-code contract,
//! and a signal death or missed deadline is observable instead of fatal.

#![allow(unsafe_code)]

use crate::result::{exit_code, SondarError, SondarResult, TestStatus};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// How a helper child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited normally with a code
    Exited(i32),
    /// Killed by a signal
    Signaled(i32),
}

impl ExitOutcome {
    /// Map an outcome onto the test-status classification
    #[must_use]
    pub fn into_status(self) -> TestStatus {
        match self {
            Self::Exited(code) if code == exit_code::SUCCESS => TestStatus::Success,
            Self::Exited(code) if code == exit_code::SKIP => TestStatus::Skip,
            Self::Exited(code) if code == exit_code::TIMEOUT => TestStatus::Timeout,
            Self::Exited(_) => TestStatus::Fail,
            Self::Signaled(_) => TestStatus::Crash,
        }
    }
}

/// A forked helper child
#[derive(Debug)]
pub struct Helper {
    pid: Pid,
}

impl Helper {
    /// The child's pid
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child ends
    pub fn wait(self) -> SondarResult<ExitOutcome> {
        outcome_from_wait(waitpid(self.pid, None)?)
    }
}

fn outcome_from_wait(status: WaitStatus) -> SondarResult<ExitOutcome> {
    match status {
        WaitStatus::Exited(_, code) => Ok(ExitOutcome::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Ok(ExitOutcome::Signaled(signal as i32)),
        other => Err(SondarError::process(format!(
            "unexpected wait status: {other:?}"
        ))),
    }
}

/// Fork a helper child running `f`; its return value becomes the child's
/// exit code.
///
/// The child never returns from this function.
pub fn fork_helper<F>(f: F) -> SondarResult<Helper>
where
    F: FnOnce() -> i32,
{
    match unsafe { fork() }? {
        ForkResult::Parent { child } => Ok(Helper { pid: child }),
        ForkResult::Child => {
            let code = catch_unwind(AssertUnwindSafe(f)).unwrap_or(exit_code::FAILURE);
            unsafe { libc::_exit(code) }
        }
    }
}

fn child_exit_code<F>(f: F) -> i32
where
    F: FnOnce() -> SondarResult<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => exit_code::SUCCESS,
        Ok(Err(err)) if err.is_requirement() => exit_code::SKIP,
        Ok(Err(_)) | Err(_) => exit_code::FAILURE,
    }
}

/// Run a fallible scenario in a forked child and classify its outcome
pub fn run_isolated<F>(f: F) -> SondarResult<TestStatus>
where
    F: FnOnce() -> SondarResult<()>,
{
    let helper = fork_helper(move || child_exit_code(f))?;
    Ok(helper.wait()?.into_status())
}

/// Like [`run_isolated`], but kill the child and report a timeout when it
/// misses the deadline
pub fn run_isolated_timeout<F>(f: F, timeout: Duration) -> SondarResult<TestStatus>
where
    F: FnOnce() -> SondarResult<()>,
{
    let helper = fork_helper(move || child_exit_code(f))?;
    let deadline = Instant::now() + timeout;

    loop {
        match waitpid(helper.pid, Some(WaitPidFlag::WNOHANG))? {
            WaitStatus::StillAlive => {
                if Instant::now() >= deadline {
                    tracing::warn!(pid = %helper.pid, ?timeout, "killing timed-out child");
                    let _ = kill(helper.pid, Signal::SIGKILL);
                    let _ = waitpid(helper.pid, None);
                    return Ok(TestStatus::Timeout);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            status => return Ok(outcome_from_wait(status)?.into_status()),
        }
    }
}
