use crate::{config::RiskConfig, kill_switch::KillSwitch, rate::OrderRateWindow};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_execution::order::OrderRequest;
use vela_instrument::Side;

/// Machine-readable rejection reason, surfaced to the strategy with a
/// human-readable message via `Display`.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    KillSwitchActive,
    MaxPositionSize { projected: Decimal, limit: Decimal },
    MaxPositionPerSymbol { projected: Decimal, limit: Decimal },
    MaxLeverage { leverage: Decimal, limit: Decimal },
    DailyLossExceeded { loss: Decimal, limit: Decimal },
    OrderRateExceeded { limit: usize },
    InsufficientMargin { required: Decimal, available: Decimal },
}

impl RiskReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RiskReason::KillSwitchActive => "kill_switch_active",
            RiskReason::MaxPositionSize { .. } => "max_position_size",
            RiskReason::MaxPositionPerSymbol { .. } => "max_position_per_symbol",
            RiskReason::MaxLeverage { .. } => "max_leverage",
            RiskReason::DailyLossExceeded { .. } => "daily_loss_exceeded",
            RiskReason::OrderRateExceeded { .. } => "order_rate_exceeded",
            RiskReason::InsufficientMargin { .. } => "insufficient_margin",
        }
    }
}

impl std::fmt::Display for RiskReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskReason::KillSwitchActive => write!(f, "kill switch active"),
            RiskReason::MaxPositionSize { projected, limit } => {
                write!(f, "projected notional {projected} exceeds global limit {limit}")
            }
            RiskReason::MaxPositionPerSymbol { projected, limit } => {
                write!(f, "projected notional {projected} exceeds symbol limit {limit}")
            }
            RiskReason::MaxLeverage { leverage, limit } => {
                write!(f, "projected leverage {leverage} exceeds limit {limit}")
            }
            RiskReason::DailyLossExceeded { loss, limit } => {
                write!(f, "daily loss {loss} exceeds limit {limit}")
            }
            RiskReason::OrderRateExceeded { limit } => {
                write!(f, "order rate exceeds {limit} per minute")
            }
            RiskReason::InsufficientMargin { required, available } => {
                write!(f, "margin required {required} exceeds available {available}")
            }
        }
    }
}

/// Outcome of the check chain.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RiskDecision {
    pub passed: bool,
    pub reason: Option<RiskReason>,
}

impl RiskDecision {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    pub fn reject(reason: RiskReason) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Read-only portfolio snapshot the check chain evaluates against, prepared
/// by the caller on the strategy runtime thread.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PortfolioView {
    /// Signed position size for the order's symbol.
    pub position_size: Decimal,
    /// Aggregate absolute notional across all symbols, at current marks.
    pub gross_exposure: Decimal,
    pub equity: Decimal,
    pub available_balance: Decimal,
    pub daily_start_equity: Decimal,
    /// Mark used to price market orders and exposure projections.
    pub reference_price: Decimal,
    /// Account leverage used for the margin fallback.
    pub leverage: Decimal,
}

/// Evaluate the fixed-order chain, short-circuiting on the first failure:
/// kill switch, notional caps, leverage, daily loss, order rate, margin.
pub(crate) fn run_chain(
    config: &RiskConfig,
    kill_switch: &KillSwitch,
    rate_window: &mut OrderRateWindow,
    request: &OrderRequest,
    view: &PortfolioView,
    now: DateTime<Utc>,
) -> RiskDecision {
    // 1. Kill switch.
    if kill_switch.is_active() {
        return RiskDecision::reject(RiskReason::KillSwitchActive);
    }

    let price = request.price.unwrap_or(view.reference_price);
    let delta = match request.side {
        Side::Buy => request.quantity,
        Side::Sell => -request.quantity,
    };
    let projected_size = view.position_size + delta;
    let projected_symbol_notional = projected_size.abs() * price;

    // 2. Notional caps. The signed combination means reducing/closing orders
    // shrink the projection and are not penalised.
    if projected_symbol_notional > config.max_position_per_symbol {
        return RiskDecision::reject(RiskReason::MaxPositionPerSymbol {
            projected: projected_symbol_notional,
            limit: config.max_position_per_symbol,
        });
    }
    let current_symbol_notional = view.position_size.abs() * price;
    let projected_gross =
        view.gross_exposure - current_symbol_notional + projected_symbol_notional;
    if projected_gross > config.max_position_size {
        return RiskDecision::reject(RiskReason::MaxPositionSize {
            projected: projected_gross,
            limit: config.max_position_size,
        });
    }

    // 3. Leverage cap on after-fill gross exposure.
    if view.equity > Decimal::ZERO {
        let leverage = projected_gross / view.equity;
        if leverage > config.max_leverage {
            return RiskDecision::reject(RiskReason::MaxLeverage {
                leverage,
                limit: config.max_leverage,
            });
        }
    }

    // 4. Daily loss, absolute then relative.
    let daily_loss = view.daily_start_equity - view.equity;
    if daily_loss > config.max_daily_loss {
        return RiskDecision::reject(RiskReason::DailyLossExceeded {
            loss: daily_loss,
            limit: config.max_daily_loss,
        });
    }
    if view.daily_start_equity > Decimal::ZERO {
        let loss_pct = daily_loss / view.daily_start_equity;
        if loss_pct > config.max_daily_loss_pct {
            return RiskDecision::reject(RiskReason::DailyLossExceeded {
                loss: daily_loss,
                limit: config.max_daily_loss_pct * view.daily_start_equity,
            });
        }
    }

    // 5. Order rate.
    if !rate_window.would_admit(now) {
        return RiskDecision::reject(RiskReason::OrderRateExceeded {
            limit: config.max_orders_per_minute,
        });
    }

    // 6. Margin sufficiency for the new order.
    let required_margin = request.quantity * price / view.leverage.max(Decimal::ONE);
    if view.available_balance < required_margin {
        return RiskDecision::reject(RiskReason::InsufficientMargin {
            required: required_margin,
            available: view.available_balance,
        });
    }

    RiskDecision::pass()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RiskEngine;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use vela_execution::order::{
        OrderKind, TimeInForce,
        id::{ClientOrderId, StrategyId},
    };
    use vela_instrument::pair::TradingPair;

    fn request(side: Side, quantity: Decimal, price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            client_id: ClientOrderId::next(),
            strategy: StrategyId::new("test"),
            pair: TradingPair::new("ETH", "USDC"),
            side,
            kind: if price.is_some() {
                OrderKind::Limit
            } else {
                OrderKind::Market
            },
            quantity,
            price,
            time_in_force: TimeInForce::GoodUntilCancelled,
            reduce_only: false,
        }
    }

    fn healthy_view() -> PortfolioView {
        PortfolioView {
            position_size: Decimal::ZERO,
            gross_exposure: Decimal::ZERO,
            equity: dec!(100000),
            available_balance: dec!(100000),
            daily_start_equity: dec!(100000),
            reference_price: dec!(2000),
            leverage: dec!(5),
        }
    }

    fn engine(config: RiskConfig) -> RiskEngine {
        RiskEngine::new(config, Arc::new(KillSwitch::new("token")))
    }

    #[test]
    fn test_pass_through_healthy_state() {
        let mut engine = engine(RiskConfig::default());
        let decision = engine.check_order(
            &request(Side::Buy, dec!(1), Some(dec!(2000))),
            &healthy_view(),
            Utc::now(),
        );
        assert!(decision.passed);
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn test_kill_switch_rejects_first() {
        let mut engine = engine(RiskConfig::default());
        engine.kill_switch().activate(
            crate::kill_switch::KillSwitchReason::Manual("halt".into()),
            Utc::now(),
        );

        // Even an otherwise-failing order reports the kill switch first.
        let mut view = healthy_view();
        view.equity = dec!(1);
        let decision =
            engine.check_order(&request(Side::Buy, dec!(1000), None), &view, Utc::now());
        assert!(!decision.passed);
        assert_eq!(decision.reason, Some(RiskReason::KillSwitchActive));
        assert_eq!(decision.reason.unwrap().code(), "kill_switch_active");
    }

    #[test]
    fn test_symbol_notional_cap_and_closing_not_penalised() {
        let config = RiskConfig {
            max_position_per_symbol: dec!(10000),
            ..Default::default()
        };
        let mut engine = engine(config);

        // 6 ETH * 2000 = 12000 breaches the 10k symbol cap.
        let decision = engine.check_order(
            &request(Side::Buy, dec!(6), Some(dec!(2000))),
            &healthy_view(),
            Utc::now(),
        );
        assert!(matches!(
            decision.reason,
            Some(RiskReason::MaxPositionPerSymbol { .. })
        ));

        // Same quantity sold against an existing long REDUCES the position.
        let mut view = healthy_view();
        view.position_size = dec!(6);
        view.gross_exposure = dec!(12000);
        let decision = engine.check_order(
            &request(Side::Sell, dec!(6), Some(dec!(2000))),
            &view,
            Utc::now(),
        );
        assert!(decision.passed);
    }

    #[test]
    fn test_leverage_cap() {
        let config = RiskConfig {
            max_position_size: dec!(10000000),
            max_position_per_symbol: dec!(10000000),
            max_leverage: dec!(3),
            ..Default::default()
        };
        let mut engine = engine(config);

        // 200 ETH * 2000 = 400000 over 100000 equity = 4x leverage.
        let decision = engine.check_order(
            &request(Side::Buy, dec!(200), Some(dec!(2000))),
            &healthy_view(),
            Utc::now(),
        );
        assert!(matches!(decision.reason, Some(RiskReason::MaxLeverage { .. })));
    }

    #[test]
    fn test_daily_loss_rejection() {
        // max_daily_loss = 5000, pct = 0.05, start equity 100000, now 94000:
        // loss of 6000 breaches the absolute cap.
        let config = RiskConfig {
            max_daily_loss: dec!(5000),
            max_daily_loss_pct: dec!(0.05),
            ..Default::default()
        };
        let mut engine = engine(config);

        let mut view = healthy_view();
        view.equity = dec!(94000);
        view.available_balance = dec!(94000);

        let decision = engine.check_order(
            &request(Side::Buy, dec!(1), Some(dec!(2000))),
            &view,
            Utc::now(),
        );
        assert!(!decision.passed);
        let reason = decision.reason.unwrap();
        assert_eq!(reason.code(), "daily_loss_exceeded");
        assert!(matches!(
            reason,
            RiskReason::DailyLossExceeded { loss, .. } if loss == dec!(6000)
        ));
    }

    #[test]
    fn test_order_rate_cap() {
        let config = RiskConfig {
            max_orders_per_minute: 2,
            ..Default::default()
        };
        let mut engine = engine(config);
        let now = Utc::now();

        for _ in 0..2 {
            let decision = engine.check_order(
                &request(Side::Buy, dec!(0.1), Some(dec!(2000))),
                &healthy_view(),
                now,
            );
            assert!(decision.passed);
        }

        let decision = engine.check_order(
            &request(Side::Buy, dec!(0.1), Some(dec!(2000))),
            &healthy_view(),
            now,
        );
        assert!(matches!(
            decision.reason,
            Some(RiskReason::OrderRateExceeded { limit: 2 })
        ));
    }

    #[test]
    fn test_margin_sufficiency() {
        let mut engine = engine(RiskConfig::default());

        let mut view = healthy_view();
        view.available_balance = dec!(100);

        // 1 ETH * 2000 / 5x leverage = 400 margin required > 100 available.
        let decision = engine.check_order(
            &request(Side::Buy, dec!(1), Some(dec!(2000))),
            &view,
            Utc::now(),
        );
        assert!(matches!(
            decision.reason,
            Some(RiskReason::InsufficientMargin { required, .. }) if required == dec!(400)
        ));
    }

    #[test]
    fn test_failed_checks_do_not_consume_rate_slots() {
        let config = RiskConfig {
            max_orders_per_minute: 1,
            max_position_per_symbol: dec!(1000),
            ..Default::default()
        };
        let mut engine = engine(config);
        let now = Utc::now();

        // Rejected on notional: must not occupy the single rate slot.
        let rejected = engine.check_order(
            &request(Side::Buy, dec!(10), Some(dec!(2000))),
            &healthy_view(),
            now,
        );
        assert!(!rejected.passed);

        let passed = engine.check_order(
            &request(Side::Buy, dec!(0.1), Some(dec!(2000))),
            &healthy_view(),
            now,
        );
        assert!(passed.passed);
    }
}
