//! Queue of QUEUED jobs waiting for a worker slot.
//!
//! Pure synchronous state: no I/O, no locking. The orchestrator owns one
//! behind its scheduler lock.
//!
//! # Ordering
//!
//! Jobs are handed out in ascending `queue_seq`, the sequence number the
//! orchestrator assigns on every transition into QUEUED. Jobs re-queued after
//! a recoverable error carry a `not_before` instant and are skipped until it
//! passes; the FIFO order among eligible jobs is unchanged.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

/// A queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: String,
    pub not_before: Option<Instant>,
}

/// FIFO queue keyed by queue sequence number.
#[derive(Debug, Default)]
pub struct JobQueue {
    entries: BTreeMap<u64, QueuedJob>,
    seq_by_id: HashMap<String, u64>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` at `seq`, replacing any earlier entry for the same id.
    pub fn push(&mut self, id: &str, seq: u64, not_before: Option<Instant>) {
        self.remove(id);
        self.entries.insert(
            seq,
            QueuedJob {
                id: id.to_string(),
                not_before,
            },
        );
        self.seq_by_id.insert(id.to_string(), seq);
    }

    /// Drop `id` from the queue. Returns whether it was queued.
    pub fn remove(&mut self, id: &str) -> bool {
        self.seq_by_id
            .remove(id)
            .and_then(|seq| self.entries.remove(&seq))
            .is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seq_by_id.contains_key(id)
    }

    /// Take the oldest job that is eligible at `now`.
    pub fn pop_ready(&mut self, now: Instant) -> Option<String> {
        let seq = self
            .entries
            .iter()
            .find(|(_, job)| job.not_before.is_none_or(|at| at <= now))
            .map(|(seq, _)| *seq)?;
        let job = self.entries.remove(&seq)?;
        self.seq_by_id.remove(&job.id);
        Some(job.id)
    }

    /// Earliest future instant at which a delayed job becomes eligible.
    pub fn next_ready_after(&self, now: Instant) -> Option<Instant> {
        self.entries
            .values()
            .filter_map(|job| job.not_before)
            .filter(|at| *at > now)
            .min()
    }

    /// Queued ids in hand-out order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.values().map(|job| job.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_by_sequence() {
        let mut queue = JobQueue::new();
        queue.push("b", 2, None);
        queue.push("a", 1, None);
        queue.push("c", 3, None);

        let now = Instant::now();
        assert_eq!(queue.pop_ready(now).as_deref(), Some("a"));
        assert_eq!(queue.pop_ready(now).as_deref(), Some("b"));
        assert_eq!(queue.pop_ready(now).as_deref(), Some("c"));
        assert!(queue.pop_ready(now).is_none());
    }

    #[test]
    fn test_requeue_moves_to_back() {
        let mut queue = JobQueue::new();
        queue.push("a", 1, None);
        queue.push("b", 2, None);
        queue.push("a", 3, None);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_delayed_entries_are_skipped() {
        let mut queue = JobQueue::new();
        let now = Instant::now();
        let later = now + Duration::from_secs(5);
        queue.push("retry", 1, Some(later));
        queue.push("fresh", 2, None);

        assert_eq!(queue.pop_ready(now).as_deref(), Some("fresh"));
        assert!(queue.pop_ready(now).is_none());
        assert_eq!(queue.next_ready_after(now), Some(later));
        assert_eq!(queue.pop_ready(later).as_deref(), Some("retry"));
    }

    #[test]
    fn test_remove() {
        let mut queue = JobQueue::new();
        queue.push("a", 1, None);
        assert!(queue.contains("a"));
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert!(queue.is_empty());
    }
}
