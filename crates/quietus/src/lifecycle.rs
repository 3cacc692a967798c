//! Per-process lifecycle state machine.
//!
//! A [`ManagedProcess`] maps a due [`Action`] to [`ProcessController`] calls
//! and returns the follow-up to enqueue:
//!
//! ```text
//!  Pending ──Start──▶ Starting ──┬─ death_after ──▶ Armed ──Stop──▶ Stopping
//!                                └─ otherwise ───▶ Monitoring ◀─┐      │
//!                                                     └─Monitor─┘      │
//!        ┌──────────────────────────────────────────────────────────────┤
//!        │ restart_after                                     otherwise  │
//!        ▼                                                              ▼
//!  StoppedRestarting ──Start──▶ Starting ...                 StoppedTerminal
//! ```
//!
//! Liveness is only polled. A child that dies while `Monitoring` goes
//! unnoticed until the next Monitor action, up to one monitor interval later.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::process::{CommandLine, ProcessController, ProcessError, Signal, WaitOutcome};
use crate::schedule::ScheduleEntry;

/// Termination requests sent by one Stop invocation, in order.
const ESCALATION: [Signal; 3] = [Signal::Terminate, Signal::Terminate, Signal::Kill];

/// Default interval between liveness polls (seconds).
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;

/// Default wait after each termination request during a scheduled stop.
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_millis(10);

/// Default wait after each termination request during shutdown.
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// Default delay before retrying a stop the process survived.
pub const DEFAULT_STOP_RETRY: Duration = Duration::from_secs(1);

// ============================================================================
// Identity, actions and follow-ups
// ============================================================================

/// Stable index of a managed process in the supervisor's process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(usize);

impl ProcessId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Unit of scheduled work against a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Monitor,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => write!(f, "start"),
            Action::Stop => write!(f, "stop"),
            Action::Monitor => write!(f, "monitor"),
        }
    }
}

/// Next action to enqueue, relative to when the current one finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUp {
    pub delay: Duration,
    pub action: Action,
}

impl FollowUp {
    pub fn new(delay: Duration, action: Action) -> Self {
        Self { delay, action }
    }
}

// ============================================================================
// Timings
// ============================================================================

/// Fixed intervals used by the lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub monitor_interval: Duration,
    pub stop_wait: Duration,
    pub shutdown_wait: Duration,
    pub stop_retry: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            stop_wait: DEFAULT_STOP_WAIT,
            shutdown_wait: DEFAULT_SHUTDOWN_WAIT,
            stop_retry: DEFAULT_STOP_RETRY,
        }
    }
}

// ============================================================================
// LifecycleState
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Pending,
    Starting,
    /// Running with no forced lifetime; polled every monitor interval.
    Monitoring,
    /// Running and waiting for its `death_after` stop.
    Armed,
    Stopping,
    StoppedTerminal,
    StoppedRestarting,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Starting => "starting",
            LifecycleState::Monitoring => "monitoring",
            LifecycleState::Armed => "armed",
            LifecycleState::Stopping => "stopping",
            LifecycleState::StoppedTerminal => "stopped",
            LifecycleState::StoppedRestarting => "stopped (restarting)",
        };
        f.write_str(s)
    }
}

// ============================================================================
// ManagedProcess
// ============================================================================

/// Runtime representation of one scheduled process and its child handle.
///
/// `handle` is `Some` only while a child is believed to be alive; the
/// supervisor is its only owner.
#[derive(Debug)]
pub struct ManagedProcess<H> {
    entry: Arc<ScheduleEntry>,
    command: CommandLine,
    handle: Option<H>,
    state: LifecycleState,
    starts: u32,
}

impl<H> ManagedProcess<H> {
    pub fn new(entry: Arc<ScheduleEntry>) -> Self {
        let command = entry.command_line();
        Self {
            entry,
            command,
            handle: None,
            state: LifecycleState::Pending,
            starts: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn entry(&self) -> &ScheduleEntry {
        &self.entry
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of times a child has been spawned.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Run the transition for `action` and return the follow-up, if any.
    pub async fn execute<C>(
        &mut self,
        action: Action,
        controller: &C,
        timings: &Timings,
    ) -> Result<Option<FollowUp>, ProcessError>
    where
        C: ProcessController<Handle = H>,
    {
        match action {
            Action::Start => self.start(controller, timings).await.map(Some),
            Action::Stop => self.stop(controller, timings).await,
            Action::Monitor => self.monitor(controller, timings).map(Some),
        }
    }

    /// Spawn a child and arm the next action.
    ///
    /// The returned handle only means there is something to track; a program
    /// that fails to execute shows up on the next status check.
    pub async fn start<C>(
        &mut self,
        controller: &C,
        timings: &Timings,
    ) -> Result<FollowUp, ProcessError>
    where
        C: ProcessController<Handle = H>,
    {
        if let Some(handle) = self.handle.as_mut() {
            warn!(process = %self.entry.name, "Start requested while a child is still tracked, stopping it first");
            if !terminate(controller, handle, timings.stop_wait).await? {
                self.state = LifecycleState::Stopping;
                return Ok(FollowUp::new(timings.stop_retry, Action::Stop));
            }
            self.handle = None;
        }

        self.state = LifecycleState::Starting;
        let handle = controller.spawn(&self.command);
        let pid = controller.pid(&handle);
        self.handle = Some(handle);
        self.starts += 1;
        info!(
            process = %self.entry.name,
            pid = ?pid,
            starts = self.starts,
            "Started {}",
            self.command
        );

        match self.entry.death_after {
            Some(death_after) => {
                self.state = LifecycleState::Armed;
                Ok(FollowUp::new(death_after, Action::Stop))
            }
            None => {
                self.state = LifecycleState::Monitoring;
                Ok(FollowUp::new(timings.monitor_interval, Action::Monitor))
            }
        }
    }

    /// Poll liveness and re-arm the next poll.
    ///
    /// A child found dead is released and reported; polling continues.
    pub fn monitor<C>(&mut self, controller: &C, timings: &Timings) -> Result<FollowUp, ProcessError>
    where
        C: ProcessController<Handle = H>,
    {
        let (status, pid) = match self.handle.as_mut() {
            Some(handle) => (
                Some(controller.query_status(handle)?),
                controller.pid(handle),
            ),
            None => (None, None),
        };

        match status {
            Some(status) => {
                info!(process = %self.entry.name, pid = ?pid, %status, "Status of {}", self.command);
                if !status.is_running() {
                    warn!(process = %self.entry.name, pid = ?pid, %status, "Process is no longer running");
                    self.handle = None;
                }
            }
            None => {
                info!(process = %self.entry.name, "Status of {} is unknown (no child)", self.command);
            }
        }

        Ok(FollowUp::new(timings.monitor_interval, Action::Monitor))
    }

    /// Run the termination escalation, then decide between restart and stop.
    ///
    /// Idempotent: with no tracked child no signal is sent and the result is
    /// the same as after a successful stop. If the child survives the whole
    /// escalation, a single retry is returned instead of looping here.
    pub async fn stop<C>(
        &mut self,
        controller: &C,
        timings: &Timings,
    ) -> Result<Option<FollowUp>, ProcessError>
    where
        C: ProcessController<Handle = H>,
    {
        if let Some(handle) = self.handle.as_mut() {
            self.state = LifecycleState::Stopping;
            if !terminate(controller, handle, timings.stop_wait).await? {
                warn!(
                    process = %self.entry.name,
                    retry_in = ?timings.stop_retry,
                    "Process survived termination, will retry"
                );
                return Ok(Some(FollowUp::new(timings.stop_retry, Action::Stop)));
            }
            self.handle = None;
            info!(process = %self.entry.name, "Stopped {}", self.command);
        }

        match self.entry.restart_after {
            Some(restart_after) => {
                self.state = LifecycleState::StoppedRestarting;
                Ok(Some(FollowUp::new(restart_after, Action::Start)))
            }
            None => {
                self.state = LifecycleState::StoppedTerminal;
                Ok(None)
            }
        }
    }

    /// Best-effort stop used when the supervisor exits. Restart policy is ignored.
    pub async fn shutdown<C>(&mut self, controller: &C, wait: Duration) -> Result<(), ProcessError>
    where
        C: ProcessController<Handle = H>,
    {
        self.state = LifecycleState::StoppedTerminal;
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        if terminate(controller, handle, wait).await? {
            self.handle = None;
            info!(process = %self.entry.name, "Stopped {}", self.command);
        } else {
            warn!(process = %self.entry.name, "Process survived termination during shutdown");
        }
        Ok(())
    }

    /// Take the process out of scheduling after a failed transition.
    ///
    /// The handle is kept so shutdown can still try to stop the child.
    pub fn mark_faulted(&mut self) {
        self.state = LifecycleState::StoppedTerminal;
    }
}

/// One pass of the escalation. Returns `true` once the child is gone.
async fn terminate<C>(
    controller: &C,
    handle: &mut C::Handle,
    wait: Duration,
) -> Result<bool, ProcessError>
where
    C: ProcessController,
{
    if !controller.query_status(handle)?.is_running() {
        return Ok(true);
    }

    for (attempt, signal) in ESCALATION.iter().copied().enumerate() {
        debug!(pid = ?controller.pid(handle), attempt = attempt + 1, %signal, "Sending termination request");
        controller.signal(handle, signal)?;
        let outcome = controller.wait(handle, wait).await?;
        if outcome == WaitOutcome::Exited || !controller.query_status(handle)?.is_running() {
            return Ok(true);
        }
    }

    Ok(false)
}

// ============================================================================
// Tests
// ============================================================================
