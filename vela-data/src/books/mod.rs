use crate::error::DataError;
use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Snapshot+delta discipline enforcement for a venue book feed.
pub mod sequencer;

/// Outcome of applying a [`BookDelta`] to an [`OrderBook`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeltaOutcome {
    /// Delta applied and local state advanced.
    Applied,
    /// Delta carried a sequence at or before the applied one and was dropped.
    Stale,
}

/// Local L2 order book: price-sorted bid/ask ladders with a monotonic
/// sequence number.
///
/// Invariants held after every successful application:
/// * bids iterate descending, asks ascending, all quantities positive,
/// * no bid price equals or exceeds any ask price,
/// * `sequence` is strictly increasing.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct OrderBook {
    sequence: u64,
    time_exchange: Option<DateTime<Utc>>,
    bids: BookSide<Bids>,
    asks: BookSide<Asks>,
}

impl OrderBook {
    /// Construct a new sorted [`OrderBook`]. Input levels need not be
    /// pre-sorted; zero-quantity levels are discarded.
    pub fn new<IterBids, IterAsks, L>(
        sequence: u64,
        time_exchange: Option<DateTime<Utc>>,
        bids: IterBids,
        asks: IterAsks,
    ) -> Self
    where
        IterBids: IntoIterator<Item = L>,
        IterAsks: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        Self {
            sequence,
            time_exchange,
            bids: BookSide::bids(bids),
            asks: BookSide::asks(asks),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn time_exchange(&self) -> Option<DateTime<Utc>> {
        self.time_exchange
    }

    pub fn bids(&self) -> &BookSide<Bids> {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide<Asks> {
        &self.asks
    }

    /// Replace the entire book with `snapshot` state.
    ///
    /// A snapshot carrying a sequence at or before the applied one is
    /// discarded and `false` is returned.
    pub fn apply_snapshot(&mut self, snapshot: &OrderBook) -> bool {
        if self.sequence > 0 && snapshot.sequence <= self.sequence {
            debug!(
                applied = self.sequence,
                received = snapshot.sequence,
                "discarding stale order book snapshot"
            );
            return false;
        }
        *self = snapshot.clone();
        true
    }

    /// Apply an incremental [`BookDelta`].
    ///
    /// * `delta.sequence <= self.sequence` => dropped as [`DeltaOutcome::Stale`].
    /// * `delta.sequence > self.sequence + 1` => [`DataError::SequenceGap`].
    /// * A delta that would cross or lock the book is rejected with
    ///   [`DataError::CrossedBook`] and local state is left untouched; the
    ///   caller must resubscribe for a fresh snapshot.
    pub fn apply_delta(&mut self, delta: &BookDelta) -> Result<DeltaOutcome, DataError> {
        if delta.sequence <= self.sequence {
            debug!(
                applied = self.sequence,
                received = delta.sequence,
                "dropping stale order book delta"
            );
            return Ok(DeltaOutcome::Stale);
        }
        if delta.sequence > self.sequence + 1 {
            return Err(DataError::SequenceGap {
                last: self.sequence,
                received: delta.sequence,
            });
        }

        // Stage the application so a crossing delta never corrupts state.
        let mut staged_bids = self.bids.clone();
        let mut staged_asks = self.asks.clone();
        staged_bids.upsert(&delta.bids);
        staged_asks.upsert(&delta.asks);

        if let (Some(best_bid), Some(best_ask)) = (staged_bids.best(), staged_asks.best()) {
            if best_bid.price >= best_ask.price {
                return Err(DataError::CrossedBook {
                    bid: best_bid.price,
                    ask: best_ask.price,
                });
            }
        }

        self.bids = staged_bids;
        self.asks = staged_asks;
        self.sequence = delta.sequence;
        if delta.time_exchange.is_some() {
            self.time_exchange = delta.time_exchange;
        }
        Ok(DeltaOutcome::Applied)
    }

    /// Best (highest) bid level.
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.best()
    }

    /// Best (lowest) ask level.
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.best()
    }

    /// Mid-price: average of the best bid and ask prices.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bids.best(), self.asks.best()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Spread between the best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bids.best(), self.asks.best()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Top `levels` of each side, best first.
    pub fn depth(&self, levels: usize) -> (&[Level], &[Level]) {
        (
            &self.bids.levels()[..levels.min(self.bids.levels().len())],
            &self.asks.levels()[..levels.min(self.asks.levels().len())],
        )
    }

    /// True if any bid price equals or exceeds any ask price.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best(), self.asks.best()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}

/// Incremental L2 update: for each level, quantity zero removes the level,
/// any other quantity replaces it.
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BookDelta {
    pub sequence: u64,
    pub time_exchange: Option<DateTime<Utc>>,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Unit type tagging a [`BookSide`] as the bid side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display)]
pub struct Bids;

/// Unit type tagging a [`BookSide`] as the ask side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display)]
pub struct Asks;

/// Price-sorted levels for one side of an [`OrderBook`].
#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct BookSide<S> {
    side: S,
    levels: Vec<Level>,
}

impl BookSide<Bids> {
    /// Construct a descending-sorted bid side, discarding empty levels.
    pub fn bids<Iter, L>(levels: Iter) -> Self
    where
        Iter: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        let mut levels = levels
            .into_iter()
            .map(L::into)
            .filter(|level| !level.amount.is_zero())
            .collect::<Vec<_>>();
        levels.sort_unstable_by(|a, b| b.price.cmp(&a.price));
        Self { side: Bids, levels }
    }

    /// Upsert levels, keeping descending price order.
    pub fn upsert(&mut self, levels: &[Level]) {
        for upsert in levels {
            self.upsert_single(*upsert, |existing| existing.price.cmp(&upsert.price).reverse());
        }
    }
}

impl BookSide<Asks> {
    /// Construct an ascending-sorted ask side, discarding empty levels.
    pub fn asks<Iter, L>(levels: Iter) -> Self
    where
        Iter: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        let mut levels = levels
            .into_iter()
            .map(L::into)
            .filter(|level| !level.amount.is_zero())
            .collect::<Vec<_>>();
        levels.sort_unstable_by(|a, b| a.price.cmp(&b.price));
        Self { side: Asks, levels }
    }

    /// Upsert levels, keeping ascending price order.
    pub fn upsert(&mut self, levels: &[Level]) {
        for upsert in levels {
            self.upsert_single(*upsert, |existing| existing.price.cmp(&upsert.price));
        }
    }
}

impl<S> BookSide<S>
where
    S: std::fmt::Display,
{
    /// Best level on this side (first in sort order).
    pub fn best(&self) -> Option<&Level> {
        self.levels.first()
    }

    /// Sorted levels, best first.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Total quantity across all levels.
    pub fn total_amount(&self) -> Decimal {
        self.levels.iter().map(|level| level.amount).sum()
    }

    fn upsert_single<FnOrd>(&mut self, new_level: Level, fn_ord: FnOrd)
    where
        FnOrd: Fn(&Level) -> Ordering,
    {
        match (self.levels.binary_search_by(fn_ord), new_level.amount) {
            (Ok(index), amount) if amount.is_zero() => {
                let _removed = self.levels.remove(index);
            }
            (Ok(index), amount) => {
                self.levels[index].amount = amount;
            }
            (Err(_), amount) if amount.is_zero() => {
                debug!(
                    ?new_level,
                    side = %self.side,
                    "received zero-quantity level removal for absent level"
                );
            }
            (Err(index), _) => {
                self.levels.insert(index, new_level);
            }
        }
    }
}

/// Single order book price level.
#[derive(Debug, Copy, Clone, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

impl Eq for Level {}

impl Level {
    pub fn new<T>(price: T, amount: T) -> Self
    where
        T: Into<Decimal>,
    {
        Self {
            price: price.into(),
            amount: amount.into(),
        }
    }
}

impl<T> From<(T, T)> for Level
where
    T: Into<Decimal>,
{
    fn from((price, amount): (T, T)) -> Self {
        Self::new(price, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book() -> OrderBook {
        OrderBook::new(
            1,
            None,
            vec![
                Level::new(dec!(99), dec!(10)),
                Level::new(dec!(98), dec!(20)),
            ],
            vec![
                Level::new(dec!(100), dec!(5)),
                Level::new(dec!(101), dec!(15)),
            ],
        )
    }

    #[test]
    fn test_snapshot_sorted_and_derived_reads() {
        let book = book();
        assert_eq!(book.best_bid(), Some(&Level::new(dec!(99), dec!(10))));
        assert_eq!(book.best_ask(), Some(&Level::new(dec!(100), dec!(5))));
        assert_eq!(book.mid_price(), Some(dec!(99.5)));
        assert_eq!(book.spread(), Some(dec!(1)));

        let (bids, asks) = book.depth(1);
        assert_eq!(bids, &[Level::new(dec!(99), dec!(10))]);
        assert_eq!(asks, &[Level::new(dec!(100), dec!(5))]);
    }

    #[test]
    fn test_delta_merge_remove_and_insert() {
        // Mirrors the canonical L2 merge scenario: remove bid 99, add bid 97.
        let mut book = book();
        let outcome = book
            .apply_delta(&BookDelta {
                sequence: 2,
                time_exchange: None,
                bids: vec![Level::new(dec!(99), dec!(0)), Level::new(dec!(97), dec!(5))],
                asks: vec![],
            })
            .unwrap();

        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(
            book.bids().levels(),
            &[Level::new(dec!(98), dec!(20)), Level::new(dec!(97), dec!(5))]
        );
        assert_eq!(book.best_bid().unwrap().price, dec!(98));

        // Ask side move stays uncrossed: remove ask 100, add ask 99.5.
        let outcome = book
            .apply_delta(&BookDelta {
                sequence: 3,
                time_exchange: None,
                bids: vec![],
                asks: vec![
                    Level::new(dec!(100), dec!(0)),
                    Level::new(dec!(99.5), dec!(2)),
                ],
            })
            .unwrap();
        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(book.best_ask().unwrap().price, dec!(99.5));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_crossing_delta_rejected_without_corruption() {
        let mut book = book();
        let before = book.clone();

        // Bid at 100 would lock against ask 100.
        let error = book
            .apply_delta(&BookDelta {
                sequence: 2,
                time_exchange: None,
                bids: vec![Level::new(dec!(100), dec!(3))],
                asks: vec![],
            })
            .unwrap_err();

        assert!(matches!(
            error,
            DataError::CrossedBook { bid, ask } if bid == dec!(100) && ask == dec!(100)
        ));
        assert!(error.requires_resubscribe());
        assert_eq!(book, before);
    }

    #[test]
    fn test_delta_sequence_discipline() {
        let mut book = book();

        // Stale delta dropped.
        let outcome = book
            .apply_delta(&BookDelta {
                sequence: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(outcome, DeltaOutcome::Stale);

        // Gap surfaces an error for the adapter to resubscribe.
        let error = book
            .apply_delta(&BookDelta {
                sequence: 5,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            error,
            DataError::SequenceGap { last: 1, received: 5 }
        ));
    }

    #[test]
    fn test_remove_then_restore_level() {
        let mut book = book();

        book.apply_delta(&BookDelta {
            sequence: 2,
            bids: vec![Level::new(dec!(98), dec!(0))],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(book.bids().levels().len(), 1);

        book.apply_delta(&BookDelta {
            sequence: 3,
            bids: vec![Level::new(dec!(98), dec!(7))],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            book.bids().levels(),
            &[Level::new(dec!(99), dec!(10)), Level::new(dec!(98), dec!(7))]
        );
    }

    #[test]
    fn test_stale_snapshot_discarded() {
        let mut book = book();
        let stale = OrderBook::new(1, None, vec![Level::new(dec!(1), dec!(1))], Vec::<Level>::new());
        assert!(!book.apply_snapshot(&stale));
        assert_eq!(book.sequence(), 1);

        let fresh = OrderBook::new(9, None, vec![Level::new(dec!(50), dec!(1))], Vec::<Level>::new());
        assert!(book.apply_snapshot(&fresh));
        assert_eq!(book.sequence(), 9);
    }
}
