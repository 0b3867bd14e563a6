use crate::{
    books::{DeltaOutcome, OrderBook},
    error::DataError,
    event::OrderBookEvent,
};
use tracing::debug;

/// Enforces the snapshot-then-delta discipline for one symbol's book feed.
///
/// Deltas arriving before the initial snapshot are dropped (the snapshot is
/// in flight after every subscribe). A sequence gap or crossing delta
/// surfaces a [`DataError`]; the adapter reacts by calling [`reset`](Self::reset)
/// and resubscribing for a fresh snapshot.
#[derive(Debug, Clone, Default)]
pub struct BookSequencer {
    book: OrderBook,
    synced: bool,
    deltas_dropped_pre_snapshot: u64,
}

impl BookSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local book state. Only meaningful once [`is_synced`](Self::is_synced).
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// True once the initial snapshot has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Process the next book event from the venue feed.
    ///
    /// Returns `Some(&book)` when local state advanced, `None` when the event
    /// was dropped (stale, or a delta ahead of the first snapshot).
    pub fn process(&mut self, event: &OrderBookEvent) -> Result<Option<&OrderBook>, DataError> {
        match event {
            OrderBookEvent::Snapshot(snapshot) => {
                if self.book.apply_snapshot(snapshot) {
                    self.synced = true;
                    Ok(Some(&self.book))
                } else {
                    Ok(None)
                }
            }
            OrderBookEvent::Delta(delta) => {
                if !self.synced {
                    self.deltas_dropped_pre_snapshot += 1;
                    debug!(
                        sequence = delta.sequence,
                        "dropping delta ahead of initial snapshot"
                    );
                    return Ok(None);
                }

                match self.book.apply_delta(delta)? {
                    DeltaOutcome::Applied => Ok(Some(&self.book)),
                    DeltaOutcome::Stale => Ok(None),
                }
            }
        }
    }

    /// Discard local state ahead of a resubscribe. The next snapshot starts
    /// a fresh sequence.
    pub fn reset(&mut self) {
        self.book = OrderBook::default();
        self.synced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::{BookDelta, Level};
    use rust_decimal_macros::dec;

    fn snapshot(sequence: u64) -> OrderBookEvent {
        OrderBookEvent::Snapshot(OrderBook::new(
            sequence,
            None,
            vec![Level::new(dec!(99), dec!(1))],
            vec![Level::new(dec!(100), dec!(1))],
        ))
    }

    fn delta(sequence: u64) -> OrderBookEvent {
        OrderBookEvent::Delta(BookDelta {
            sequence,
            time_exchange: None,
            bids: vec![Level::new(dec!(98), dec!(2))],
            asks: vec![],
        })
    }

    #[test]
    fn test_delta_before_snapshot_dropped() {
        let mut sequencer = BookSequencer::new();
        assert!(sequencer.process(&delta(5)).unwrap().is_none());
        assert!(!sequencer.is_synced());

        assert!(sequencer.process(&snapshot(10)).unwrap().is_some());
        assert!(sequencer.is_synced());
        assert!(sequencer.process(&delta(11)).unwrap().is_some());
        assert_eq!(sequencer.book().sequence(), 11);
    }

    #[test]
    fn test_gap_then_reset_resyncs() {
        let mut sequencer = BookSequencer::new();
        sequencer.process(&snapshot(10)).unwrap();

        let error = sequencer.process(&delta(13)).unwrap_err();
        assert!(error.requires_resubscribe());

        sequencer.reset();
        assert!(!sequencer.is_synced());
        assert!(sequencer.process(&snapshot(20)).unwrap().is_some());
        assert_eq!(sequencer.book().sequence(), 20);
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let mut sequencer = BookSequencer::new();
        sequencer.process(&snapshot(10)).unwrap();
        assert!(sequencer.process(&snapshot(9)).unwrap().is_none());
        assert_eq!(sequencer.book().sequence(), 10);
    }
}
