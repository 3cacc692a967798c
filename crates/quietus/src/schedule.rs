//! Resolved, immutable schedule data handed to the supervisor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::Timings;
use crate::process::CommandLine;

/// An executable and its base arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDefinition {
    /// Reference name used by schedule entries.
    pub name: String,
    pub location: PathBuf,
    pub arguments: Vec<String>,
}

/// Timing and restart policy for one named process.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub name: String,
    pub binary: Arc<BinaryDefinition>,
    /// Appended after the binary's own arguments.
    pub extra_arguments: Vec<String>,
    /// Delay from supervisor start to the first spawn.
    pub start_after: Duration,
    /// Forced lifetime; `None` means the process is only polled.
    pub death_after: Option<Duration>,
    /// Delay from a completed stop to the next spawn; `None` means stop for good.
    pub restart_after: Option<Duration>,
}

impl ScheduleEntry {
    pub fn command_line(&self) -> CommandLine {
        let args = self
            .binary
            .arguments
            .iter()
            .chain(&self.extra_arguments)
            .cloned()
            .collect();
        CommandLine::new(self.binary.location.clone(), args)
    }
}

/// Everything the supervisor needs to run.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub entries: Vec<Arc<ScheduleEntry>>,
    pub timings: Timings,
}
