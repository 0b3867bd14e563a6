use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Behaviour of open positions when the kill switch trips.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchPolicy {
    /// Cancel open orders, leave positions untouched.
    #[default]
    CancelOrdersOnly,
    /// Cancel open orders and close every position at market.
    CloseAllPositions,
}

/// Risk limits evaluated by the pre-trade check chain and the automatic
/// kill-switch triggers.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum aggregate gross notional across all symbols.
    pub max_position_size: Decimal,
    /// Maximum projected notional per symbol.
    pub max_position_per_symbol: Decimal,
    /// Maximum after-fill gross exposure / equity.
    pub max_leverage: Decimal,
    /// Maximum absolute loss against the daily equity snapshot.
    pub max_daily_loss: Decimal,
    /// Maximum loss as a fraction of the daily equity snapshot.
    pub max_daily_loss_pct: Decimal,
    /// Maximum submit requests in any trailing 60s window.
    pub max_orders_per_minute: usize,
    /// Daily loss at which the kill switch trips automatically.
    pub kill_switch_threshold: Decimal,
    /// Consecutive losing trades at which the kill switch trips.
    pub max_consecutive_losses: u32,
    /// Equity floor below which the kill switch trips.
    pub min_equity: Decimal,
    /// What happens to open positions when the kill switch trips.
    pub close_positions_on_kill_switch: KillSwitchPolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::from(1_000_000),
            max_position_per_symbol: Decimal::from(250_000),
            max_leverage: Decimal::from(10),
            max_daily_loss: Decimal::from(10_000),
            max_daily_loss_pct: Decimal::new(5, 2),
            max_orders_per_minute: 60,
            kill_switch_threshold: Decimal::from(20_000),
            max_consecutive_losses: 8,
            min_equity: Decimal::from(1_000),
            close_positions_on_kill_switch: KillSwitchPolicy::default(),
        }
    }
}
