//! Time-ordered action queue and the clock it is measured against.

mod clock;
mod queue;

pub use clock::{Clock, TokioClock};
pub use queue::{ActionQueue, ScheduledAction};

#[cfg(test)]
pub(crate) use clock::ManualClock;
