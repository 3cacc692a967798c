//! Single-threaded event loop driving the schedule.
//!
//! The [`Supervisor`] owns the action queue and the process table. It
//! repeatedly peeks at the earliest action, waits until it is due (the wait
//! can be interrupted through the shutdown token), runs the lifecycle
//! transition and pushes back whatever follow-up the transition returns.
//! Nothing else reads or writes the queue, so no locking is involved.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::lifecycle::{Action, ManagedProcess, ProcessId, Timings};
use crate::process::ProcessController;
use crate::schedule::Schedule;
use crate::scheduler::{ActionQueue, Clock, ScheduledAction, TokioClock};

/// How a call to [`Supervisor::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every process reached a terminal state and the queue drained.
    Completed,
    /// The shutdown token fired; all tracked processes were stopped.
    Interrupted,
    /// The next action is due after the horizon passed to [`Supervisor::run_until`].
    HorizonReached,
}

/// Why a wait for the next due action returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Due,
    Interrupted,
}

pub struct Supervisor<C: ProcessController, K: Clock = TokioClock> {
    controller: C,
    clock: K,
    timings: Timings,
    processes: Vec<ManagedProcess<C::Handle>>,
    queue: ActionQueue,
    shutdown: CancellationToken,
}

impl<C: ProcessController, K: Clock> Supervisor<C, K> {
    /// Build the process table and seed one Start per entry at
    /// `now + start_after`.
    pub fn new(schedule: Schedule, controller: C, clock: K) -> Self {
        let started_at = clock.now();
        let mut queue = ActionQueue::new();
        let mut processes: Vec<_> = schedule
            .entries
            .into_iter()
            .map(ManagedProcess::new)
            .collect();

        for (index, process) in processes.iter_mut().enumerate() {
            match started_at.checked_add(process.entry().start_after) {
                Some(due) => queue.push(due, Action::Start, ProcessId::new(index)),
                None => {
                    error!(
                        process = %process.name(),
                        start_after = ?process.entry().start_after,
                        "Start time is out of range, process will never run"
                    );
                    process.mark_faulted();
                }
            }
        }

        Self {
            controller,
            clock,
            timings: schedule.timings,
            processes,
            queue,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that interrupts [`run`](Self::run) and triggers shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn processes(&self) -> &[ManagedProcess<C::Handle>] {
        &self.processes
    }

    pub fn process(&self, id: ProcessId) -> Option<&ManagedProcess<C::Handle>> {
        self.processes.get(id.index())
    }

    /// Number of actions waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Drive the schedule until every process is terminal or shutdown is requested.
    pub async fn run(&mut self) -> RunOutcome {
        self.drive(None).await
    }

    /// Like [`run`](Self::run), but return as soon as the next action is due
    /// after `horizon`. Processes are left as they are.
    pub async fn run_until(&mut self, horizon: Instant) -> RunOutcome {
        self.drive(Some(horizon)).await
    }

    async fn drive(&mut self, horizon: Option<Instant>) -> RunOutcome {
        loop {
            if self.shutdown.is_cancelled() {
                self.shutdown_all().await;
                return RunOutcome::Interrupted;
            }

            let Some(next) = self.queue.peek().copied() else {
                info!("All scheduled processes have stopped");
                return RunOutcome::Completed;
            };
            if horizon.is_some_and(|h| next.due > h) {
                return RunOutcome::HorizonReached;
            }

            let now = self.clock.now();
            if next.due > now {
                if let Some(process) = self.processes.get(next.process.index()) {
                    info!(
                        process = %process.name(),
                        action = %next.action,
                        "Sleeping for {:.2} seconds until next scheduled trigger of {} ({})",
                        (next.due - now).as_secs_f64(),
                        process.command(),
                        next.action
                    );
                }
                if self.wait_until(next.due).await == Wake::Interrupted {
                    self.shutdown_all().await;
                    return RunOutcome::Interrupted;
                }
                // Re-peek: the queue may have changed while waiting.
                continue;
            }

            if let Some(scheduled) = self.queue.pop() {
                self.execute(scheduled).await;
            }
        }
    }

    /// Cancellable wait until `deadline`.
    async fn wait_until(&self, deadline: Instant) -> Wake {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Wake::Interrupted,
            _ = self.clock.sleep_until(deadline) => Wake::Due,
        }
    }

    async fn execute(&mut self, scheduled: ScheduledAction) {
        let ScheduledAction {
            action, process, ..
        } = scheduled;
        let Some(managed) = self.processes.get_mut(process.index()) else {
            error!(index = process.index(), %action, "Scheduled action targets an unknown process");
            return;
        };

        info!(
            process = %managed.name(),
            %action,
            "Running scheduled trigger of {} ({})",
            managed.command(),
            action
        );

        match managed
            .execute(action, &self.controller, &self.timings)
            .await
        {
            Ok(Some(follow_up)) => match self.clock.now().checked_add(follow_up.delay) {
                Some(due) => self.queue.push(due, follow_up.action, process),
                None => {
                    error!(
                        process = %managed.name(),
                        action = %follow_up.action,
                        delay = ?follow_up.delay,
                        "Follow-up is out of range, removing process from the schedule"
                    );
                    managed.mark_faulted();
                }
            },
            Ok(None) => {
                info!(process = %managed.name(), "Process reached terminal state");
            }
            Err(e) => {
                error!(
                    process = %managed.name(),
                    %action,
                    error = %e,
                    "Scheduled action failed, removing process from the schedule"
                );
                managed.mark_faulted();
            }
        }
    }

    /// Best-effort stop of every tracked process. Never fails.
    async fn shutdown_all(&mut self) {
        info!(processes = self.processes.len(), "Shutting down managed processes");
        self.queue.clear();
        for managed in &mut self.processes {
            if let Err(e) = managed
                .shutdown(&self.controller, self.timings.shutdown_wait)
                .await
            {
                warn!(process = %managed.name(), error = %e, "Failed to stop process during shutdown");
            }
        }
    }
}
