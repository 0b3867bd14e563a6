#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Vela-Strategy
//! The strategy capability set, the tick context through which strategies
//! read market state and emit order intents, parameter schemas with range
//! validation, and the hot-reload file watcher.

use crate::params::ParamSet;
use chrono::{DateTime, Utc};
use vela_data::{
    books::OrderBook,
    event::{Candle, PublicTrade, Quote},
};
use vela_execution::{
    account::Account,
    order::{OrderRequest, id::ClientOrderId, id::StrategyId},
    position::Position,
    trade::Fill,
};
use vela_instrument::pair::TradingPair;

/// Parameter sets, schemas and range validation.
pub mod params;

/// Hot-reload file watcher applying validated parameters at tick boundaries.
pub mod reload;

/// All strategy-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("parameter error: {0}")]
    Params(#[from] params::ParamError),

    #[error("strategy initialisation failed: {0}")]
    Init(String),
}

/// Read-only view of the last-known market and portfolio state, implemented
/// by the engine cache.
pub trait MarketView {
    fn quote(&self, pair: &TradingPair) -> Option<Quote>;
    fn book(&self, pair: &TradingPair) -> Option<&OrderBook>;
    fn position(&self, pair: &TradingPair) -> Option<&Position>;
    fn account(&self) -> Option<&Account>;
}

/// Order action emitted by a strategy during a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyCommand {
    Submit(OrderRequest),
    Cancel(ClientOrderId),
}

/// Context handed to every strategy callback.
///
/// Callbacks run serialized on the strategy's dedicated task, so the
/// strategy needs no internal locking. Order intents are collected here and
/// routed through the risk engine after the callback returns.
pub struct StrategyContext<'a> {
    pub time: DateTime<Utc>,
    view: &'a dyn MarketView,
    commands: Vec<StrategyCommand>,
}

impl std::fmt::Debug for StrategyContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContext")
            .field("time", &self.time)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

impl<'a> StrategyContext<'a> {
    pub fn new(time: DateTime<Utc>, view: &'a dyn MarketView) -> Self {
        Self {
            time,
            view,
            commands: Vec::new(),
        }
    }

    pub fn quote(&self, pair: &TradingPair) -> Option<Quote> {
        self.view.quote(pair)
    }

    pub fn book(&self, pair: &TradingPair) -> Option<&'a OrderBook> {
        self.view.book(pair)
    }

    pub fn position(&self, pair: &TradingPair) -> Option<&'a Position> {
        self.view.position(pair)
    }

    pub fn account(&self) -> Option<&'a Account> {
        self.view.account()
    }

    /// Queue an order intent for risk validation and submission.
    pub fn submit_order(&mut self, request: OrderRequest) {
        self.commands.push(StrategyCommand::Submit(request));
    }

    /// Queue a cancel for an open order.
    pub fn cancel_order(&mut self, client_id: ClientOrderId) {
        self.commands.push(StrategyCommand::Cancel(client_id));
    }

    /// Drain the commands collected during the callback.
    pub fn take_commands(&mut self) -> Vec<StrategyCommand> {
        std::mem::take(&mut self.commands)
    }
}

/// Order lifecycle notification delivered to the emitting strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderNotification {
    Accepted { client_id: ClientOrderId },
    Rejected { client_id: ClientOrderId, reason: String },
    Cancelled { client_id: ClientOrderId },
    Expired { client_id: ClientOrderId },
}

/// The user strategy capability set.
///
/// Every callback runs on the strategy's dedicated runtime task; ticks are
/// serialized per strategy. Default implementations are no-ops so a strategy
/// implements only the callbacks it needs.
pub trait Strategy: Send {
    /// Stable identifier for routing fills and metrics.
    fn id(&self) -> StrategyId;

    /// Called once before the first tick with the validated parameters.
    fn init(&mut self, params: &ParamSet) -> Result<(), StrategyError> {
        let _params = params;
        Ok(())
    }

    /// New validated parameters applied at a tick boundary (hot reload).
    fn on_params_update(&mut self, params: &ParamSet) {
        let _params = params;
    }

    /// Market data tick (quote or book advance).
    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) {
        let _ctx = ctx;
    }

    /// A candle closed for a subscribed interval.
    fn on_candle(&mut self, ctx: &mut StrategyContext<'_>, candle: &Candle) {
        let (_ctx, _candle) = (ctx, candle);
    }

    /// Public trade printed on a subscribed symbol.
    fn on_trade(&mut self, ctx: &mut StrategyContext<'_>, trade: &PublicTrade) {
        let (_ctx, _trade) = (ctx, trade);
    }

    /// One of this strategy's orders (partially) filled.
    fn on_fill(&mut self, ctx: &mut StrategyContext<'_>, fill: &Fill) {
        let (_ctx, _fill) = (ctx, fill);
    }

    /// Lifecycle event for one of this strategy's orders, including risk
    /// rejections.
    fn on_order_event(&mut self, ctx: &mut StrategyContext<'_>, event: &OrderNotification) {
        let (_ctx, _event) = (ctx, event);
    }

    /// Called once when the runtime stops or the kill switch halts trading.
    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use vela_execution::order::{OrderKind, TimeInForce};

    struct NullView;

    impl MarketView for NullView {
        fn quote(&self, _: &TradingPair) -> Option<Quote> {
            Some(Quote::new(dec!(2000)))
        }
        fn book(&self, _: &TradingPair) -> Option<&OrderBook> {
            None
        }
        fn position(&self, _: &TradingPair) -> Option<&Position> {
            None
        }
        fn account(&self) -> Option<&Account> {
            None
        }
    }

    #[test]
    fn test_context_collects_commands_in_order() {
        let view = NullView;
        let mut ctx = StrategyContext::new(Utc::now(), &view);

        assert_eq!(ctx.quote(&TradingPair::new("ETH", "USDC")).unwrap().mid, dec!(2000));

        let request = OrderRequest {
            client_id: ClientOrderId::new("c-1"),
            strategy: StrategyId::new("s"),
            pair: TradingPair::new("ETH", "USDC"),
            side: vela_instrument::Side::Buy,
            kind: OrderKind::Limit,
            quantity: Decimal::ONE,
            price: Some(dec!(1999)),
            time_in_force: TimeInForce::GoodUntilCancelled,
            reduce_only: false,
        };
        ctx.submit_order(request.clone());
        ctx.cancel_order(ClientOrderId::new("c-0"));

        let commands = ctx.take_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], StrategyCommand::Submit(request));
        assert_eq!(commands[1], StrategyCommand::Cancel(ClientOrderId::new("c-0")));
        assert!(ctx.take_commands().is_empty());
    }
}
