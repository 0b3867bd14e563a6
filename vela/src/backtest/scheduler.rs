use chrono::{DateTime, Utc};
use std::{cmp::Ordering, collections::BinaryHeap};

/// Min-heap event queue keyed by `visible_time`, with a monotonic tiebreak
/// sequence so same-instant events dispatch in schedule order.
#[derive(Debug)]
pub struct EventScheduler<E> {
    heap: BinaryHeap<Scheduled<E>>,
    sequence: u64,
    clock: DateTime<Utc>,
}

#[derive(Debug)]
struct Scheduled<E> {
    visible_time: DateTime<Utc>,
    sequence: u64,
    payload: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.visible_time == other.visible_time && self.sequence == other.sequence
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, the scheduler needs earliest-first.
        other
            .visible_time
            .cmp(&self.visible_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<E> EventScheduler<E> {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
            clock: start,
        }
    }

    /// Current simulated time: the visible time of the last dispatched event.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Schedule a payload to become visible at `visible_time`.
    pub fn schedule(&mut self, visible_time: DateTime<Utc>, payload: E) {
        self.sequence += 1;
        self.heap.push(Scheduled {
            visible_time,
            sequence: self.sequence,
            payload,
        });
    }

    /// Remove the earliest event and advance the simulated clock to it.
    pub fn pop(&mut self) -> Option<(DateTime<Utc>, E)> {
        let scheduled = self.heap.pop()?;
        // The clock never runs backwards, even for late-scheduled events.
        if scheduled.visible_time > self.clock {
            self.clock = scheduled.visible_time;
        }
        Some((self.clock, scheduled.payload))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    #[test]
    fn test_earliest_first_with_stable_ties() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut scheduler = EventScheduler::new(t0);

        scheduler.schedule(t0 + TimeDelta::milliseconds(5), "c");
        scheduler.schedule(t0 + TimeDelta::milliseconds(1), "a");
        scheduler.schedule(t0 + TimeDelta::milliseconds(5), "d");
        scheduler.schedule(t0 + TimeDelta::milliseconds(3), "b");

        let order: Vec<&str> = std::iter::from_fn(|| scheduler.pop().map(|(_, e)| e)).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_clock_advances_monotonically() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut scheduler = EventScheduler::new(t0);

        scheduler.schedule(t0 + TimeDelta::milliseconds(10), "later");
        scheduler.schedule(t0 + TimeDelta::milliseconds(2), "early");

        let (time, _) = scheduler.pop().unwrap();
        assert_eq!(time, t0 + TimeDelta::milliseconds(2));
        assert_eq!(scheduler.now(), time);

        let (time, _) = scheduler.pop().unwrap();
        assert_eq!(time, t0 + TimeDelta::milliseconds(10));
        assert!(scheduler.is_empty());
    }
}
