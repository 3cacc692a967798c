//! [`ProcessController`] backed by real OS children via `tokio::process`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CommandLine, ProcessController, ProcessError, ProcessStatus, Signal, WaitOutcome};

/// Handle to a spawned child.
///
/// `child` is `None` when the spawn itself failed; such a handle reports
/// [`ProcessStatus::NotFound`] and ignores signals.
#[derive(Debug)]
pub struct OsHandle {
    pid: Option<u32>,
    child: Option<Child>,
}

/// Spawns and controls plain subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsController;

impl OsController {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessController for OsController {
    type Handle = OsHandle;

    fn spawn(&self, command: &CommandLine) -> OsHandle {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::null());

        // SAFETY: pre_exec runs in the forked child before exec. PR_SET_PDEATHSIG
        // makes the child receive SIGTERM if the supervisor dies without stopping
        // it. No shared mutable state is touched in the callback.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                debug!(command = %command, pid = ?pid, "Spawned child");
                OsHandle {
                    pid,
                    child: Some(child),
                }
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to spawn child");
                OsHandle {
                    pid: None,
                    child: None,
                }
            }
        }
    }

    fn pid(&self, handle: &OsHandle) -> Option<u32> {
        handle.pid
    }

    fn query_status(&self, handle: &mut OsHandle) -> Result<ProcessStatus, ProcessError> {
        let Some(child) = handle.child.as_mut() else {
            return Ok(ProcessStatus::NotFound);
        };
        match child.try_wait()? {
            Some(status) => Ok(ProcessStatus::Exited {
                code: status.code(),
            }),
            None => Ok(ProcessStatus::Running),
        }
    }

    fn signal(&self, handle: &mut OsHandle, signal: Signal) -> Result<(), ProcessError> {
        let Some(child) = handle.child.as_mut() else {
            return Ok(());
        };
        // Reaped children must not be signalled: their pid may have been reused.
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        let Some(pid) = child.id() else {
            return Ok(());
        };

        match signal {
            #[cfg(unix)]
            Signal::Terminate => send_signal(pid, libc::SIGTERM)
                .map_err(|source| ProcessError::Signal { pid, signal, source }),
            #[cfg(not(unix))]
            Signal::Terminate => child
                .start_kill()
                .map_err(|source| ProcessError::Signal { pid, signal, source }),
            Signal::Kill => child
                .start_kill()
                .map_err(|source| ProcessError::Signal { pid, signal, source }),
        }
    }

    async fn wait(
        &self,
        handle: &mut OsHandle,
        timeout: Duration,
    ) -> Result<WaitOutcome, ProcessError> {
        let Some(child) = handle.child.as_mut() else {
            return Ok(WaitOutcome::Exited);
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = ?handle.pid, code = ?status.code(), "Child exited");
                Ok(WaitOutcome::Exited)
            }
            Ok(Err(e)) => Err(ProcessError::Io(e)),
            Err(_) => Ok(WaitOutcome::StillRunning),
        }
    }
}

/// `kill(2)` that treats a vanished target (ESRCH) as success.
#[cfg(unix)]
fn send_signal(pid: u32, sig: libc::c_int) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(std::io::Error::other)?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let ret = unsafe { libc::kill(pid, sig) };
    if ret == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}
