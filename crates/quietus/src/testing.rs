//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::process::{
    CommandLine, ProcessController, ProcessError, ProcessStatus, Signal, WaitOutcome,
};
use crate::schedule::{BinaryDefinition, ScheduleEntry};
use crate::scheduler::ManualClock;

/// Build a schedule entry whose binary location is `program`.
pub(crate) fn entry(
    name: &str,
    program: &str,
    start_after: u64,
    death_after: Option<u64>,
    restart_after: Option<u64>,
) -> Arc<ScheduleEntry> {
    Arc::new(ScheduleEntry {
        name: name.to_string(),
        binary: Arc::new(BinaryDefinition {
            name: program.to_string(),
            location: PathBuf::from(program),
            arguments: Vec::new(),
        }),
        extra_arguments: Vec::new(),
        start_after: Duration::from_secs(start_after),
        death_after: death_after.map(Duration::from_secs),
        restart_after: restart_after.map(Duration::from_secs),
    })
}

/// How a fake child reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Dies on the first terminate (default).
    ExitOnTerminate,
    /// Ignores terminate, dies on kill.
    ExitOnKill,
    /// Survives everything.
    NeverExit,
    /// Exits with code 0 right after spawning.
    ExitImmediately,
    /// No child is ever created.
    FailToSpawn,
    /// Every signal fails with a permission error.
    RejectSignals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Spawn {
        program: PathBuf,
        at: Duration,
    },
    Signal {
        pid: u32,
        signal: Signal,
        at: Duration,
    },
}

#[derive(Debug)]
pub(crate) struct FakeHandle {
    pid: Option<u32>,
    behavior: Behavior,
    alive: bool,
    exit_code: Option<i32>,
}

/// In-memory [`ProcessController`] that records every spawn and signal.
///
/// Waiting on a live child advances the shared [`ManualClock`] by the full
/// timeout, as a real bounded wait would.
pub(crate) struct FakeController {
    clock: ManualClock,
    behaviors: HashMap<PathBuf, Behavior>,
    calls: Mutex<Vec<Call>>,
    next_pid: AtomicU32,
}

impl FakeController {
    pub(crate) fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            behaviors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(100),
        }
    }

    pub(crate) fn with_behavior(mut self, program: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(PathBuf::from(program), behavior);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn signals(&self) -> Vec<Signal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Signal { signal, .. } => Some(signal),
                Call::Spawn { .. } => None,
            })
            .collect()
    }

    /// Clock offsets of every spawn of `program`.
    pub(crate) fn spawn_times(&self, program: &str) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Spawn { program: p, at } if p == PathBuf::from(program) => Some(at),
                _ => None,
            })
            .collect()
    }

    /// Clock offsets of every signal sent, in order.
    pub(crate) fn signal_times(&self) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Signal { at, .. } => Some(at),
                Call::Spawn { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProcessController for FakeController {
    type Handle = FakeHandle;

    fn spawn(&self, command: &CommandLine) -> FakeHandle {
        let behavior = self
            .behaviors
            .get(&command.program)
            .copied()
            .unwrap_or(Behavior::ExitOnTerminate);
        self.record(Call::Spawn {
            program: command.program.clone(),
            at: self.clock.elapsed(),
        });

        match behavior {
            Behavior::FailToSpawn => FakeHandle {
                pid: None,
                behavior,
                alive: false,
                exit_code: None,
            },
            Behavior::ExitImmediately => FakeHandle {
                pid: Some(self.next_pid.fetch_add(1, Ordering::Relaxed)),
                behavior,
                alive: false,
                exit_code: Some(0),
            },
            _ => FakeHandle {
                pid: Some(self.next_pid.fetch_add(1, Ordering::Relaxed)),
                behavior,
                alive: true,
                exit_code: None,
            },
        }
    }

    fn pid(&self, handle: &FakeHandle) -> Option<u32> {
        handle.pid
    }

    fn query_status(&self, handle: &mut FakeHandle) -> Result<ProcessStatus, ProcessError> {
        Ok(match (handle.pid, handle.alive) {
            (None, _) => ProcessStatus::NotFound,
            (Some(_), true) => ProcessStatus::Running,
            (Some(_), false) => ProcessStatus::Exited {
                code: handle.exit_code,
            },
        })
    }

    fn signal(&self, handle: &mut FakeHandle, signal: Signal) -> Result<(), ProcessError> {
        let Some(pid) = handle.pid.filter(|_| handle.alive) else {
            return Ok(());
        };
        if handle.behavior == Behavior::RejectSignals {
            return Err(ProcessError::Signal {
                pid,
                signal,
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        self.record(Call::Signal {
            pid,
            signal,
            at: self.clock.elapsed(),
        });

        let dies = match (handle.behavior, signal) {
            (Behavior::ExitOnTerminate, _) => true,
            (Behavior::ExitOnKill, Signal::Kill) => true,
            _ => false,
        };
        if dies {
            handle.alive = false;
        }
        Ok(())
    }

    async fn wait(
        &self,
        handle: &mut FakeHandle,
        timeout: Duration,
    ) -> Result<WaitOutcome, ProcessError> {
        if handle.alive {
            self.clock.advance(timeout);
            Ok(WaitOutcome::StillRunning)
        } else {
            Ok(WaitOutcome::Exited)
        }
    }
}
