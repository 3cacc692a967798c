//! Priority queue of pending actions.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tokio::time::Instant;

use crate::lifecycle::{Action, ProcessId};

/// One pending action against one managed process.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledAction {
    pub due: Instant,
    pub action: Action,
    pub process: ProcessId,
    /// Insertion sequence number; breaks ties between equal due-times.
    seq: u64,
}

impl ScheduledAction {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

// Ordering looks only at (due, seq). seq is unique per queue, so this is a
// total order and never needs to compare actions or processes.
impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledAction {}

impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of [`ScheduledAction`]s keyed by due-time, then insertion order.
#[derive(Debug, Default)]
pub struct ActionQueue {
    heap: BinaryHeap<Reverse<ScheduledAction>>,
    next_seq: u64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: Instant, action: Action, process: ProcessId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduledAction {
            due,
            action,
            process,
            seq,
        }));
    }

    /// Remove and return the earliest-due action.
    pub fn pop(&mut self) -> Option<ScheduledAction> {
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// The earliest-due action, without removing it.
    pub fn peek(&self) -> Option<&ScheduledAction> {
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending action. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::Rng;

    use super::*;

    fn drain(queue: &mut ActionQueue) -> Vec<ScheduledAction> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn empty_queue_pops_none() {
        let mut queue = ActionQueue::new();
        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn pops_earliest_due_first() {
        let base = Instant::now();
        let mut queue = ActionQueue::new();
        queue.push(base + Duration::from_secs(5), Action::Stop, ProcessId::new(0));
        queue.push(base + Duration::from_secs(1), Action::Start, ProcessId::new(1));
        queue.push(base + Duration::from_secs(3), Action::Monitor, ProcessId::new(2));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek().map(|a| a.process), Some(ProcessId::new(1)));

        let order: Vec<_> = drain(&mut queue).iter().map(|a| a.process).collect();
        assert_eq!(
            order,
            vec![ProcessId::new(1), ProcessId::new(2), ProcessId::new(0)]
        );
    }

    #[test]
    fn equal_due_times_pop_in_insertion_order() {
        let due = Instant::now();
        let mut queue = ActionQueue::new();
        for i in 0..10 {
            queue.push(due, Action::Start, ProcessId::new(i));
        }
        let order: Vec<_> = drain(&mut queue).iter().map(|a| a.process.index()).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = ActionQueue::new();
        queue.push(Instant::now(), Action::Monitor, ProcessId::new(7));
        assert!(queue.peek().is_some());
        assert!(queue.peek().is_some());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_keeps_sequence_monotonic() {
        let due = Instant::now();
        let mut queue = ActionQueue::new();
        queue.push(due, Action::Start, ProcessId::new(0));
        queue.clear();
        assert!(queue.is_empty());
        queue.push(due, Action::Start, ProcessId::new(1));
        assert_eq!(queue.pop().map(|a| a.seq()), Some(1));
    }

    #[test]
    fn randomized_pushes_drain_sorted_and_stable() {
        let mut rng = rand::rng();
        let base = Instant::now();

        for _ in 0..50 {
            let mut queue = ActionQueue::new();
            let count = rng.random_range(1..200);
            for i in 0..count {
                // Narrow range forces plenty of ties.
                let offset = Duration::from_millis(rng.random_range(0..8));
                queue.push(base + offset, Action::Monitor, ProcessId::new(i));
            }

            let drained = drain(&mut queue);
            assert_eq!(drained.len(), count);
            for pair in drained.windows(2) {
                assert!(pair[0].due <= pair[1].due);
                if pair[0].due == pair[1].due {
                    // Pushed in index order, so ties must keep it.
                    assert!(pair[0].process.index() < pair[1].process.index());
                }
            }
        }
    }

    #[test]
    fn randomized_interleaving_always_pops_minimum() {
        let mut rng = rand::rng();
        let base = Instant::now();
        let mut queue = ActionQueue::new();
        // Reference model: (due, insertion index)
        let mut model: Vec<(Instant, usize)> = Vec::new();
        let mut inserted = 0usize;

        for _ in 0..2000 {
            if model.is_empty() || rng.random_bool(0.6) {
                let due = base + Duration::from_millis(rng.random_range(0..20));
                queue.push(due, Action::Start, ProcessId::new(inserted));
                model.push((due, inserted));
                inserted += 1;
            } else {
                let (pos, (due, index)) = model
                    .iter()
                    .copied()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.cmp(b))
                    .unwrap();
                model.swap_remove(pos);

                let popped = queue.pop().unwrap();
                assert_eq!(popped.due, due);
                assert_eq!(popped.process.index(), index);
            }
            assert_eq!(queue.len(), model.len());
        }
    }
}
