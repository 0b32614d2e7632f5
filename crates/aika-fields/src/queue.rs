//! Step queue: deterministic ordering of deferred work
//!
//! Every deferred step of a document (field commits, linking, propagation,
//! training) enters one ordered queue keyed by phase, then round, then
//! insertion order. The owner drains it in a loop; running a step may add
//! more steps, so draining continues until the queue is empty.

use aika_core::Phase;
use std::collections::BTreeMap;
use tracing::trace;

// ---------------------------------------------------------------------------
// QueueKey: processing order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    pub phase: Phase,
    pub round: u32,
    /// Insertion sequence, unique per queue.
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Queue<S> {
    steps: BTreeMap<QueueKey, S>,
    next_seq: u64,
    processed: u64,
}

impl<S> Default for Queue<S> {
    fn default() -> Self {
        Self {
            steps: BTreeMap::new(),
            next_seq: 0,
            processed: 0,
        }
    }
}

impl<S> Queue<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, phase: Phase, round: u32, step: S) -> QueueKey {
        let key = QueueKey {
            phase,
            round,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.steps.insert(key, step);
        key
    }

    /// Remove and return the first step, if any.
    pub fn pop(&mut self) -> Option<(QueueKey, S)> {
        let entry = self.steps.pop_first();
        if entry.is_some() {
            self.processed += 1;
        }
        entry
    }

    /// Remove and return the first step whose phase is at most `max_phase`.
    pub fn pop_until(&mut self, max_phase: Phase) -> Option<(QueueKey, S)> {
        match self.steps.first_key_value() {
            Some((key, _)) if key.phase <= max_phase => {
                trace!(phase = ?key.phase, round = key.round, seq = key.seq, "step");
                self.pop()
            }
            _ => None,
        }
    }

    pub fn peek_phase(&self) -> Option<Phase> {
        self.steps.keys().next().map(|k| k.phase)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps handed out so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_phase_then_round_then_insertion() {
        let mut q = Queue::new();
        q.add(Phase::Training, 0, "train");
        q.add(Phase::Linking, 1, "link-r1");
        q.add(Phase::Linking, 0, "link-a");
        q.add(Phase::Linking, 0, "link-b");
        let order: Vec<_> = std::iter::from_fn(|| q.pop().map(|(_, s)| s)).collect();
        assert_eq!(order, vec!["link-a", "link-b", "link-r1", "train"]);
        assert_eq!(q.processed(), 4);
    }

    #[test]
    fn pop_until_stops_at_phase() {
        let mut q = Queue::new();
        q.add(Phase::Training, 0, 2);
        q.add(Phase::Inference, 0, 1);
        assert_eq!(q.pop_until(Phase::Inference).map(|(_, s)| s), Some(1));
        assert!(q.pop_until(Phase::Inference).is_none());
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek_phase(), Some(Phase::Training));
    }
}
