//! Match clock and epoch-tagged deadlines
//!
//! Fuses, bot re-decisions and the end-of-match presentation delay are all
//! deadlines against the match clock, checked once per tick. The clock only
//! advances while the match is running, so pausing freezes every deadline at
//! once. Bumping the epoch invalidates everything scheduled before it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Simulated match time in milliseconds
#[derive(Debug, Clone, Default)]
pub struct MatchClock {
    now_ms: u64,
    carry_ms: f32,
    paused: bool,
}

impl MatchClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt_ms` unless paused. Returns the delta actually applied.
    pub fn advance(&mut self, dt_ms: f32) -> f32 {
        if self.paused {
            return 0.0;
        }
        let total = self.carry_ms + dt_ms;
        let whole = total.floor();
        self.now_ms += whole as u64;
        self.carry_ms = total - whole;
        dt_ms
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[derive(Debug)]
struct Entry<T> {
    at_ms: u64,
    seq: u64,
    epoch: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.at_ms, self.seq) == (other.at_ms, other.seq)
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at_ms, self.seq).cmp(&(other.at_ms, other.seq))
    }
}

/// Min-heap of deadlines, each tagged with the epoch it was scheduled under
#[derive(Debug)]
pub struct DeadlineQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    epoch: u64,
    next_seq: u64,
}

impl<T> DeadlineQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            epoch: 0,
            next_seq: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Schedule `payload` to fire at `at_ms` under the current epoch
    pub fn schedule(&mut self, at_ms: u64, payload: T) {
        let entry = Entry {
            at_ms,
            seq: self.next_seq,
            epoch: self.epoch,
            payload,
        };
        self.next_seq += 1;
        self.heap.push(Reverse(entry));
    }

    /// Pop every deadline due at `now_ms`, in deadline order. Entries from an
    /// older epoch are discarded without being returned.
    pub fn drain_due(&mut self, now_ms: u64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.at_ms > now_ms {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                if entry.epoch == self.epoch {
                    due.push(entry.payload);
                }
            }
        }
        due
    }

    /// Invalidate every pending deadline in O(1)
    pub fn invalidate(&mut self) {
        self.epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_freezes_while_paused() {
        let mut clock = MatchClock::new();
        clock.advance(100.0);
        clock.pause();
        assert_eq!(clock.advance(500.0), 0.0);
        assert_eq!(clock.now_ms(), 100);
        clock.resume();
        clock.advance(50.0);
        assert_eq!(clock.now_ms(), 150);
    }

    #[test]
    fn test_clock_accumulates_fractional_ticks() {
        let mut clock = MatchClock::new();
        for _ in 0..60 {
            clock.advance(1000.0 / 60.0);
        }
        assert!(clock.now_ms() == 999 || clock.now_ms() == 1000);
    }

    #[test]
    fn test_drain_due_in_deadline_order() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(300, "c");
        queue.schedule(100, "a");
        queue.schedule(200, "b");
        queue.schedule(900, "late");

        assert_eq!(queue.drain_due(300), vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 1);
        assert!(queue.drain_due(899).is_empty());
    }

    #[test]
    fn test_invalidate_discards_pending() {
        let mut queue = DeadlineQueue::new();
        queue.schedule(10, 1);
        queue.invalidate();
        queue.schedule(20, 2);

        assert_eq!(queue.drain_due(100), vec![2]);
        assert_eq!(queue.len(), 0);
    }
}
