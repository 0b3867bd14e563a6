use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_instrument::decimal;

/// Account-level equity, balance and margin state.
///
/// `equity = balance + total_unrealized_pnl`;
/// `available_balance = balance - margin_used`.
/// `daily_start_equity` is snapshotted at the configured UTC reset time and
/// feeds the daily-loss risk checks.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub balance: Decimal,
    pub equity: Decimal,
    pub available_balance: Decimal,
    pub margin_used: Decimal,
    pub total_realized_pnl: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub daily_start_equity: Decimal,
    /// Open of the UTC day the current daily snapshot belongs to.
    pub daily_reset_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Construct an account with an initial balance; the daily snapshot
    /// starts at that balance.
    pub fn new(balance: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            balance,
            equity: balance,
            available_balance: balance,
            margin_used: Decimal::ZERO,
            total_realized_pnl: Decimal::ZERO,
            total_unrealized_pnl: Decimal::ZERO,
            daily_start_equity: balance,
            daily_reset_at: day_open(time, NaiveTime::MIN),
            updated_at: time,
        }
    }

    /// Fold the realised PnL delta and fee of a fill into the balance.
    pub fn apply_fill_effects(&mut self, realized_delta: Decimal, fee: Decimal, time: DateTime<Utc>) {
        self.total_realized_pnl += realized_delta;
        self.balance += realized_delta - fee;
        self.refresh(time);
    }

    /// Replace the aggregate unrealised PnL (recomputed over all positions).
    pub fn set_total_unrealized(&mut self, total_unrealized: Decimal, time: DateTime<Utc>) {
        self.total_unrealized_pnl = total_unrealized;
        self.refresh(time);
    }

    /// Replace the margin requirement (venue-reported, or the local
    /// `|size| * entry / leverage` fallback summed over positions).
    pub fn set_margin_used(&mut self, margin_used: Decimal, time: DateTime<Utc>) {
        self.margin_used = margin_used;
        self.refresh(time);
    }

    /// Loss accumulated against the daily snapshot (positive = losing day).
    pub fn daily_loss(&self) -> Decimal {
        self.daily_start_equity - self.equity
    }

    /// Snapshot `daily_start_equity = equity` when `time` has crossed the
    /// configured UTC reset boundary. Returns true when a reset occurred.
    pub fn maybe_daily_reset(&mut self, time: DateTime<Utc>, reset_time: NaiveTime) -> bool {
        let boundary = day_open(time, reset_time);
        if boundary > self.daily_reset_at && time >= boundary {
            self.daily_reset_at = boundary;
            self.daily_start_equity = self.equity;
            true
        } else {
            false
        }
    }

    fn refresh(&mut self, time: DateTime<Utc>) {
        self.equity = decimal::quantize(self.balance + self.total_unrealized_pnl);
        self.available_balance = decimal::quantize(self.balance - self.margin_used);
        self.updated_at = time;
    }
}

/// Margin requirement fallback when the venue does not report one:
/// `|size| * entry_price / leverage`.
pub fn margin_requirement(size: Decimal, entry_price: Decimal, leverage: Decimal) -> Decimal {
    if leverage.is_zero() {
        return Decimal::ZERO;
    }
    decimal::quantize(size.abs() * entry_price / leverage)
}

fn day_open(time: DateTime<Utc>, reset_time: NaiveTime) -> DateTime<Utc> {
    let candidate = time.date_naive().and_time(reset_time).and_utc();
    if candidate <= time {
        candidate
    } else {
        (time.date_naive() - chrono::Days::new(1))
            .and_time(reset_time)
            .and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_effects_update_equity() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut account = Account::new(dec!(100000), t0);

        account.apply_fill_effects(dec!(500), dec!(10), t0);
        assert_eq!(account.balance, dec!(100490));
        assert_eq!(account.total_realized_pnl, dec!(500));
        assert_eq!(account.equity, dec!(100490));

        account.set_total_unrealized(dec!(-1000), t0);
        assert_eq!(account.equity, dec!(99490));

        account.set_margin_used(dec!(20000), t0);
        assert_eq!(account.available_balance, dec!(80490));
    }

    #[test]
    fn test_daily_loss_against_snapshot() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut account = Account::new(dec!(100000), t0);

        account.set_total_unrealized(dec!(-6000), t0);
        assert_eq!(account.daily_loss(), dec!(6000));
    }

    #[test]
    fn test_daily_reset_at_midnight_utc() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut account = Account::new(dec!(100000), t0);
        account.apply_fill_effects(dec!(2500), Decimal::ZERO, t0);

        // Still the same UTC day: no reset.
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap();
        assert!(!account.maybe_daily_reset(later, NaiveTime::MIN));
        assert_eq!(account.daily_start_equity, dec!(100000));

        // Crossing midnight snapshots the new equity.
        let next_day = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 1).unwrap();
        assert!(account.maybe_daily_reset(next_day, NaiveTime::MIN));
        assert_eq!(account.daily_start_equity, dec!(102500));
        assert!(!account.maybe_daily_reset(next_day, NaiveTime::MIN));
    }

    #[test]
    fn test_margin_requirement_fallback() {
        assert_eq!(margin_requirement(dec!(-3), dec!(2000), dec!(5)), dec!(1200));
        assert_eq!(margin_requirement(dec!(3), dec!(2000), Decimal::ZERO), Decimal::ZERO);
    }
}
