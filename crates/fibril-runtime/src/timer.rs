//! Min-heap timer
//!
//! Ordered collection of (deadline, owner-fiber) items backing `sleep` and
//! per-operation I/O timeouts.
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) amortized (lazy cancellation)
//! - Drain due: O(k log n) where k = number of due items
//!
//! Cancelled handles go into a set and are skipped when popped; the set is
//! cleared whenever the heap empties. Ties on deadline break by insertion
//! order via a monotonically increasing sequence number. The clock is
//! `Instant` (monotonic).

use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use crate::fiber::Fiber;

/// Identifies one timer item for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct TimerItem {
    deadline: Instant,
    seq: u64,
    fiber: *mut Fiber,
}

/// Wrapper for heap ordering (min-heap by deadline, then insertion order)
struct HeapEntry(TimerItem);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.deadline == other.0.deadline && self.0.seq == other.0.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering for min-heap (earliest deadline, lowest seq first)
        match other.0.deadline.cmp(&self.0.deadline) {
            std::cmp::Ordering::Equal => other.0.seq.cmp(&self.0.seq),
            ord => ord,
        }
    }
}

/// Min-heap timer with lazy cancellation.
pub struct Timer {
    heap: BinaryHeap<HeapEntry>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
        }
    }

    /// Add an item with deadline = now + delay. Negative delays are due
    /// immediately.
    pub fn insert(&mut self, fiber: *mut Fiber, delay_ms: i32) -> TimerHandle {
        let deadline = Instant::now() + Duration::from_millis(delay_ms.max(0) as u64);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry(TimerItem {
            deadline,
            seq,
            fiber,
        }));
        TimerHandle(seq)
    }

    /// Cancel an item. Idempotent; returns whether this call cancelled it.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.cancelled.insert(handle.0)
    }

    /// Milliseconds until the next live deadline: 0 if one is already due,
    /// -1 if the timer is empty (wait forever).
    ///
    /// Cancelled entries at the heap front are purged here so the reported
    /// timeout is exact.
    pub fn poll_timeout(&mut self, now: Instant) -> i32 {
        loop {
            let Some(entry) = self.heap.peek() else {
                if !self.cancelled.is_empty() {
                    self.cancelled.clear();
                }
                return -1;
            };
            if self.cancelled.contains(&entry.0.seq) {
                let entry = self.heap.pop().unwrap();
                self.cancelled.remove(&entry.0.seq);
                continue;
            }
            let deadline = entry.0.deadline;
            if deadline <= now {
                return 0;
            }
            // Round up so a poll timeout never fires short of the deadline
            let delta = deadline - now;
            let mut ms = delta.as_millis();
            if delta > Duration::from_millis(ms as u64) {
                ms += 1;
            }
            return ms.min(i32::MAX as u128) as i32;
        }
    }

    /// Remove every item whose deadline has passed, appending the owner
    /// fibers to `out` in deadline order.
    pub fn drain_due(&mut self, now: Instant, out: &mut Vec<*mut Fiber>) {
        while let Some(entry) = self.heap.peek() {
            if entry.0.deadline > now {
                break;
            }
            let entry = self.heap.pop().unwrap();
            if self.cancelled.remove(&entry.0.seq) {
                continue;
            }
            out.push(entry.0.fiber);
        }
        if self.heap.is_empty() {
            self.cancelled.clear();
        }
    }

    /// Live item count (cancelled-but-unpopped items excluded).
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiber(n: usize) -> *mut Fiber {
        // Opaque token for ownership tests; never dereferenced
        n as *mut Fiber
    }

    #[test]
    fn test_drain_in_deadline_order() {
        let mut timer = Timer::new();
        timer.insert(fiber(3), 30);
        timer.insert(fiber(1), 10);
        timer.insert(fiber(2), 20);

        let mut due = Vec::new();
        timer.drain_due(Instant::now() + Duration::from_millis(50), &mut due);

        assert_eq!(due, vec![fiber(1), fiber(2), fiber(3)]);
        assert!(timer.is_empty());
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let mut timer = Timer::new();
        timer.insert(fiber(1), 0);
        timer.insert(fiber(2), 0);
        timer.insert(fiber(3), 0);

        let mut due = Vec::new();
        timer.drain_due(Instant::now() + Duration::from_millis(1), &mut due);

        assert_eq!(due, vec![fiber(1), fiber(2), fiber(3)]);
    }

    #[test]
    fn test_cancel() {
        let mut timer = Timer::new();
        let handle = timer.insert(fiber(1), 0);
        assert_eq!(timer.len(), 1);

        assert!(timer.cancel(handle));
        assert_eq!(timer.len(), 0);

        let mut due = Vec::new();
        timer.drain_due(Instant::now() + Duration::from_millis(1), &mut due);
        assert!(due.is_empty());
    }

    #[test]
    fn test_cancel_idempotent() {
        let mut timer = Timer::new();
        let handle = timer.insert(fiber(1), 1000);
        assert!(timer.cancel(handle));
        assert!(!timer.cancel(handle));
    }

    #[test]
    fn test_poll_timeout() {
        let mut timer = Timer::new();
        let now = Instant::now();
        assert_eq!(timer.poll_timeout(now), -1);

        timer.insert(fiber(1), 100);
        let ms = timer.poll_timeout(now);
        assert!(ms > 0 && ms <= 101, "unexpected timeout {}", ms);

        timer.insert(fiber(2), 0);
        assert_eq!(timer.poll_timeout(now + Duration::from_millis(1)), 0);
    }

    #[test]
    fn test_poll_timeout_skips_cancelled_front() {
        let mut timer = Timer::new();
        let now = Instant::now();
        let near = timer.insert(fiber(1), 10);
        timer.insert(fiber(2), 500);

        timer.cancel(near);
        let ms = timer.poll_timeout(now);
        assert!(ms > 10, "cancelled head must not shorten the timeout, got {}", ms);
    }

    #[test]
    fn test_cancelled_set_cleared_when_empty() {
        let mut timer = Timer::new();
        for _ in 0..10 {
            let handle = timer.insert(fiber(1), 0);
            timer.cancel(handle);
        }
        let mut due = Vec::new();
        timer.drain_due(Instant::now() + Duration::from_millis(1), &mut due);
        assert!(due.is_empty());
        assert_eq!(timer.heap.len(), 0);
        assert_eq!(timer.cancelled.len(), 0);
    }
}
