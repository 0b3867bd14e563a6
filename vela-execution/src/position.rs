use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};
use vela_instrument::{Side, decimal, pair::TradingPair};

/// Source of the mark price used to value open positions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPriceSource {
    LastTrade,
    #[default]
    Mid,
    MarkFeed,
}

/// Per-symbol position with signed size (positive = long, negative = short).
///
/// Entry price is the quantity-weighted average of position-increasing fills.
/// Realised PnL accumulates on reducing fills at the old entry price; when
/// size returns to zero the entry price and unrealised PnL reset but the
/// record persists so per-symbol realised PnL keeps accumulating.
///
/// Invariant: `size == 0 => entry_price == 0 && unrealized_pnl == 0`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub pair: TradingPair,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub mark_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Effect of applying one fill to a [`Position`].
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PositionUpdate {
    /// Realised PnL generated by the reducing portion of the fill.
    pub realized_delta: Decimal,
    /// Absolute quantity closed against the prior position.
    pub closed_quantity: Decimal,
}

impl Position {
    /// Construct a flat position record for `pair`.
    pub fn flat(pair: TradingPair, time: DateTime<Utc>) -> Self {
        Self {
            pair,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            mark_price: None,
            updated_at: time,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.size < Decimal::ZERO
    }

    /// Signed notional value at the given price.
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.size * price
    }

    /// Gross (absolute) exposure at the current entry price.
    pub fn gross_exposure(&self) -> Decimal {
        self.size.abs() * self.entry_price
    }

    /// Apply a fill to the position.
    ///
    /// * Same-sign delta (or flat): increase, entry re-averaged.
    /// * Opposite-sign delta up to `|size|`: reduce, realised PnL credited at
    ///   the old entry; entry unchanged (reset when flat).
    /// * Opposite-sign delta beyond `|size|`: reversal - the closed portion
    ///   realises at the old entry and the remainder opens a fresh position
    ///   at the fill price.
    pub fn apply_fill(
        &mut self,
        side: Side,
        fill_quantity: Decimal,
        fill_price: Decimal,
        time: DateTime<Utc>,
    ) -> PositionUpdate {
        let delta = match side {
            Side::Buy => fill_quantity,
            Side::Sell => -fill_quantity,
        };

        let update = if self.size.is_zero() || self.size.signum() == delta.signum() {
            // Increase: re-average entry over the combined quantity.
            self.entry_price = decimal::quantize(
                (self.size.abs() * self.entry_price + delta.abs() * fill_price)
                    / (self.size.abs() + delta.abs()),
            );
            self.size += delta;
            PositionUpdate {
                realized_delta: Decimal::ZERO,
                closed_quantity: Decimal::ZERO,
            }
        } else {
            let closed = self.size.abs().min(delta.abs());
            let realized_delta = decimal::quantize(
                self.size.signum() * closed * (fill_price - self.entry_price),
            );
            self.realized_pnl += realized_delta;

            if delta.abs() > self.size.abs() {
                // Reversal: remainder opens a fresh position at fill price.
                self.size += delta;
                self.entry_price = fill_price;
            } else {
                self.size += delta;
                if self.size.is_zero() {
                    self.entry_price = Decimal::ZERO;
                }
            }

            PositionUpdate {
                realized_delta,
                closed_quantity: closed,
            }
        };

        self.updated_at = time;
        self.refresh_unrealized();
        update
    }

    /// Update the mark price and recompute unrealised PnL.
    pub fn mark_to_market(&mut self, mark_price: Decimal, time: DateTime<Utc>) {
        self.mark_price = Some(mark_price);
        self.updated_at = time;
        self.refresh_unrealized();
    }

    /// Unrealised PnL as a pure function of `(size, entry, mark)`:
    /// `size * (mark - entry)`; the signed size negates it for shorts.
    fn refresh_unrealized(&mut self) {
        self.unrealized_pnl = match (self.is_flat(), self.mark_price) {
            (true, _) | (_, None) => Decimal::ZERO,
            (false, Some(mark)) => decimal::quantize(self.size * (mark - self.entry_price)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::flat(TradingPair::new("ETH", "USDC"), Utc::now())
    }

    #[test]
    fn test_increase_then_reduce_long() {
        // Starting flat: buy 10 @ 2000, buy 5 @ 2100, sell 8 @ 2150.
        let mut position = position();

        let update = position.apply_fill(Side::Buy, dec!(10), dec!(2000), Utc::now());
        assert_eq!(update.realized_delta, Decimal::ZERO);
        assert_eq!(position.size, dec!(10));
        assert_eq!(position.entry_price, dec!(2000));

        position.apply_fill(Side::Buy, dec!(5), dec!(2100), Utc::now());
        assert_eq!(position.size, dec!(15));
        // 30500 / 15 at 9 decimal places
        assert_eq!(position.entry_price, dec!(2033.333333333));
        assert_eq!(position.realized_pnl, Decimal::ZERO);

        let update = position.apply_fill(Side::Sell, dec!(8), dec!(2150), Utc::now());
        // 8 * (2150 - 2033.333333333)
        assert_eq!(update.realized_delta, dec!(933.333333336));
        assert_eq!(update.closed_quantity, dec!(8));
        assert_eq!(position.size, dec!(7));
        assert_eq!(position.entry_price, dec!(2033.333333333));
        assert_eq!(position.realized_pnl, dec!(933.333333336));
    }

    #[test]
    fn test_reversal_credits_closed_portion_and_reopens() {
        // Size +5 @ entry 100; sell 8 @ 110.
        let mut position = position();
        position.apply_fill(Side::Buy, dec!(5), dec!(100), Utc::now());

        let update = position.apply_fill(Side::Sell, dec!(8), dec!(110), Utc::now());
        assert_eq!(update.closed_quantity, dec!(5));
        assert_eq!(update.realized_delta, dec!(50));
        assert_eq!(position.size, dec!(-3));
        assert_eq!(position.entry_price, dec!(110));
        assert_eq!(position.realized_pnl, dec!(50));
    }

    #[test]
    fn test_flat_resets_entry_and_unrealized() {
        let mut position = position();
        position.apply_fill(Side::Buy, dec!(2), dec!(100), Utc::now());
        position.mark_to_market(dec!(110), Utc::now());
        assert_eq!(position.unrealized_pnl, dec!(20));

        position.apply_fill(Side::Sell, dec!(2), dec!(105), Utc::now());
        assert!(position.is_flat());
        assert_eq!(position.entry_price, Decimal::ZERO);
        assert_eq!(position.unrealized_pnl, Decimal::ZERO);
        assert_eq!(position.realized_pnl, dec!(10));
    }

    #[test]
    fn test_short_position_pnl() {
        let mut position = position();
        position.apply_fill(Side::Sell, dec!(4), dec!(100), Utc::now());
        assert_eq!(position.size, dec!(-4));
        assert_eq!(position.entry_price, dec!(100));

        // Shorts profit when the mark drops.
        position.mark_to_market(dec!(90), Utc::now());
        assert_eq!(position.unrealized_pnl, dec!(40));

        position.mark_to_market(dec!(110), Utc::now());
        assert_eq!(position.unrealized_pnl, dec!(-40));

        // Reduce short at a loss.
        let update = position.apply_fill(Side::Buy, dec!(1), dec!(110), Utc::now());
        assert_eq!(update.realized_delta, dec!(-10));
        assert_eq!(position.size, dec!(-3));
    }

    #[test]
    fn test_realized_pnl_accumulates_across_round_trips() {
        let mut position = position();

        position.apply_fill(Side::Buy, dec!(1), dec!(100), Utc::now());
        position.apply_fill(Side::Sell, dec!(1), dec!(120), Utc::now());
        assert!(position.is_flat());
        assert_eq!(position.realized_pnl, dec!(20));

        position.apply_fill(Side::Buy, dec!(2), dec!(200), Utc::now());
        position.apply_fill(Side::Sell, dec!(2), dec!(190), Utc::now());
        assert!(position.is_flat());
        assert_eq!(position.realized_pnl, Decimal::ZERO);
    }
}
