//! Quietus - a minimal supervisor that starts, polls and stops external
//! processes on a declarative timed schedule.

pub mod config;
pub mod lifecycle;
pub mod process;
pub mod schedule;
pub mod scheduler;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ConfigError};
pub use lifecycle::{Action, LifecycleState, ManagedProcess, ProcessId, Timings};
pub use process::{OsController, ProcessController, ProcessError, ProcessStatus};
pub use schedule::{BinaryDefinition, Schedule, ScheduleEntry};
pub use scheduler::{Clock, TokioClock};
pub use supervisor::{RunOutcome, Supervisor};
