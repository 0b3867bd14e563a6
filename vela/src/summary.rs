use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

/// Performance summary for one trading session or backtest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradingSummary {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub starting_equity: Decimal,
    pub ending_equity: Decimal,
    pub total_realized_pnl: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Winning trades over decided (non-flat) trades, in `[0, 1]`.
    pub win_rate: f64,
    /// Gross profit over gross loss.
    pub profit_factor: f64,
    /// Annualisation-free Sharpe over per-observation equity returns.
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough equity drawdown, as a fraction of the peak.
    pub max_drawdown: f64,
}

/// Accumulates equity observations and per-trade realised PnL during a run,
/// then generates the [`TradingSummary`].
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder {
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    trade_results: Vec<Decimal>,
    total_realized: Decimal,
    total_unrealized: Decimal,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an equity observation (after each account update).
    pub fn record_equity(&mut self, time: DateTime<Utc>, equity: Decimal) {
        self.equity_curve.push((time, equity));
    }

    /// Record the realised PnL of a closed (portion of a) trade.
    pub fn record_trade(&mut self, realized_delta: Decimal) {
        self.trade_results.push(realized_delta);
    }

    pub fn set_totals(&mut self, realized: Decimal, unrealized: Decimal) {
        self.total_realized = realized;
        self.total_unrealized = unrealized;
    }

    pub fn equity_observations(&self) -> usize {
        self.equity_curve.len()
    }

    pub fn generate(&self) -> TradingSummary {
        let starting_equity = self.equity_curve.first().map(|(_, e)| *e).unwrap_or_default();
        let ending_equity = self.equity_curve.last().map(|(_, e)| *e).unwrap_or_default();

        let winning_trades = self
            .trade_results
            .iter()
            .filter(|pnl| **pnl > Decimal::ZERO)
            .count() as u64;
        let losing_trades = self
            .trade_results
            .iter()
            .filter(|pnl| **pnl < Decimal::ZERO)
            .count() as u64;
        let decided = winning_trades + losing_trades;
        let win_rate = if decided > 0 {
            winning_trades as f64 / decided as f64
        } else {
            0.0
        };

        let gross_profit: f64 = self
            .trade_results
            .iter()
            .filter(|pnl| **pnl > Decimal::ZERO)
            .map(|pnl| pnl.to_f64().unwrap_or(0.0))
            .sum();
        let gross_loss: f64 = self
            .trade_results
            .iter()
            .filter(|pnl| **pnl < Decimal::ZERO)
            .map(|pnl| pnl.to_f64().unwrap_or(0.0).abs())
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        TradingSummary {
            start_time: self.equity_curve.first().map(|(t, _)| *t),
            end_time: self.equity_curve.last().map(|(t, _)| *t),
            starting_equity,
            ending_equity,
            total_realized_pnl: self.total_realized,
            total_unrealized_pnl: self.total_unrealized,
            trades: self.trade_results.len() as u64,
            winning_trades,
            losing_trades,
            win_rate,
            profit_factor,
            sharpe_ratio: sharpe_ratio(&self.equity_curve),
            max_drawdown: max_drawdown(&self.equity_curve),
        }
    }
}

/// Sharpe over per-observation returns: `mean(returns) / std(returns)`.
fn sharpe_ratio(equity_curve: &[(DateTime<Utc>, Decimal)]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter_map(|window| {
            let prev = window[0].1.to_f64()?;
            let next = window[1].1.to_f64()?;
            (prev != 0.0).then(|| (next - prev) / prev)
        })
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (returns.len() - 1) as f64;
    let std = variance.sqrt();

    if std == 0.0 { 0.0 } else { mean / std }
}

/// Largest peak-to-trough drawdown as a fraction of the running peak.
fn max_drawdown(equity_curve: &[(DateTime<Utc>, Decimal)]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0f64;

    for (_, equity) in equity_curve {
        let equity = equity.to_f64().unwrap_or(0.0);
        peak = peak.max(equity);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }
    max_drawdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;

    fn curve(values: &[i64]) -> SummaryBuilder {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut builder = SummaryBuilder::new();
        for (index, value) in values.iter().enumerate() {
            builder.record_equity(
                t0 + TimeDelta::minutes(index as i64),
                Decimal::from(*value),
            );
        }
        builder
    }

    #[test]
    fn test_win_rate_and_profit_factor() {
        let mut builder = curve(&[100_000, 100_500]);
        builder.record_trade(dec!(300));
        builder.record_trade(dec!(300));
        builder.record_trade(dec!(-200));
        builder.record_trade(Decimal::ZERO);
        builder.set_totals(dec!(400), Decimal::ZERO);

        let summary = builder.generate();
        assert_eq!(summary.trades, 4);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 1);
        assert!((summary.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((summary.profit_factor - 3.0).abs() < 1e-12);
        assert_eq!(summary.total_realized_pnl, dec!(400));
    }

    #[test]
    fn test_max_drawdown() {
        // Peak 120, trough 90: drawdown 25%.
        let builder = curve(&[100, 120, 90, 110]);
        let summary = builder.generate();
        assert!((summary.max_drawdown - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_sharpe_zero_for_flat_curve() {
        let builder = curve(&[100, 100, 100]);
        assert_eq!(builder.generate().sharpe_ratio, 0.0);
    }

    #[test]
    fn test_sharpe_positive_for_monotonic_growth() {
        let builder = curve(&[100, 101, 102, 103, 104]);
        assert!(builder.generate().sharpe_ratio > 0.0);
    }

    #[test]
    fn test_empty_builder() {
        let summary = SummaryBuilder::new().generate();
        assert_eq!(summary.trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
        assert_eq!(summary.starting_equity, Decimal::ZERO);
    }
}
