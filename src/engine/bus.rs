//! Single ordered event queue.
//!
//! Events pop in timestamp order; events with equal timestamps pop in the order
//! they were pushed. Every source (timers, user input) goes through one bus so the
//! reducer sees one deterministic sequence.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::events::{Event, Timestamp};

#[derive(Debug)]
struct Queued {
    ts: Timestamp,
    seq: u64,
    event: Event,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // reversed: BinaryHeap is a max-heap, we want the earliest first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ts
            .cmp(&self.ts)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued {
            ts: event.timestamp(),
            seq,
            event,
        });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }

    pub fn peek_ts(&self) -> Option<Timestamp> {
        self.heap.peek().map(|q| q.ts)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::ShotTarget;

    #[test]
    fn test_pops_in_timestamp_order() {
        let mut bus = EventBus::new();
        bus.push(Event::TimeoutSweep { ts: 300 });
        bus.push(Event::SpawnTick { ts: 100 });
        bus.push(Event::CountdownTick { ts: 200 });
        let order: Vec<Timestamp> = std::iter::from_fn(|| bus.pop()).map(|e| e.timestamp()).collect();
        assert_eq!(order, vec![100, 200, 300]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut bus = EventBus::new();
        bus.push(Event::Shoot { ts: 900, target: ShotTarget::Slot(4) });
        bus.push(Event::TimeoutSweep { ts: 900 });
        assert_eq!(bus.peek_ts(), Some(900));
        assert_eq!(bus.pop().unwrap().name(), "shoot");
        assert_eq!(bus.pop().unwrap().name(), "timeout_sweep");
        assert!(bus.is_empty());
    }
}
