//! OS process primitives.
//!
//! The [`ProcessController`] trait is the only place the supervisor touches
//! the operating system: spawn a command, ask whether it is still alive, send
//! it a termination request, and wait (bounded) for it to exit. It carries no
//! policy; escalation and rescheduling live in [`crate::lifecycle`].

pub mod os;

pub use os::{OsController, OsHandle};

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// CommandLine
// ============================================================================

/// Program path plus ordered arguments, resolved from a schedule entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

// ============================================================================
// Status / signal / wait results
// ============================================================================

/// Liveness of a spawned child as observed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// The child exited; `code` is `None` when it was killed by a signal.
    Exited {
        code: Option<i32>,
    },
    /// There is no child behind the handle (the spawn itself failed).
    NotFound,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited { code: Some(code) } => write!(f, "exited (code {})", code),
            ProcessStatus::Exited { code: None } => write!(f, "exited (signal)"),
            ProcessStatus::NotFound => write!(f, "not found"),
        }
    }
}

/// Termination request kinds, in increasing order of force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Polite request (SIGTERM on Unix).
    Terminate,
    /// Forceful kill (SIGKILL on Unix).
    Kill,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Terminate => write!(f, "terminate"),
            Signal::Kill => write!(f, "kill"),
        }
    }
}

/// Outcome of a bounded wait for exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited,
    StillRunning,
}

// ============================================================================
// ProcessError
// ============================================================================

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// ProcessController
// ============================================================================

/// OS-level process operations used by the lifecycle state machine.
///
/// `spawn` never fails: a command that cannot be executed still yields a
/// handle, and the failure only shows up as a non-running status on the next
/// [`query_status`](ProcessController::query_status). Callers must not read
/// "got a handle" as "the program is running".
#[async_trait]
pub trait ProcessController: Send + Sync {
    type Handle: Send;

    fn spawn(&self, command: &CommandLine) -> Self::Handle;

    /// OS process id, when a child was actually created.
    fn pid(&self, handle: &Self::Handle) -> Option<u32>;

    fn query_status(&self, handle: &mut Self::Handle) -> Result<ProcessStatus, ProcessError>;

    /// Send a termination request. Silently does nothing if the child is gone.
    fn signal(&self, handle: &mut Self::Handle, signal: Signal) -> Result<(), ProcessError>;

    /// Block for at most `timeout` waiting for the child to exit.
    async fn wait(
        &self,
        handle: &mut Self::Handle,
        timeout: Duration,
    ) -> Result<WaitOutcome, ProcessError>;
}
