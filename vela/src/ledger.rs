use crate::event::{AccountUpdate, Event, OrderUpdate, PositionUpdate, Request, Response};
use chrono::{DateTime, NaiveTime, Utc};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vela_data::event::{DataKind, MarketEvent};
use vela_execution::{
    ExecutionEvent,
    account::{Account, margin_requirement},
    error::ExecutionError,
    order::{Order, OrderRequest, OrderStatus, id::ClientOrderId},
    position::{MarkPriceSource, Position},
    trade::Fill,
};
use vela_instrument::pair::TradingPair;
use vela_risk::kill_switch::{KillSwitchReason, KillSwitchTriggers};

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LedgerConfig {
    pub initial_balance: Decimal,
    /// Account leverage used for the local margin fallback.
    pub leverage: Decimal,
    /// Default mark price source for unrealised PnL.
    pub mark_price_source: MarkPriceSource,
    /// Per-symbol overrides of the mark price source.
    #[serde(default)]
    pub mark_price_overrides: FnvHashMap<TradingPair, MarkPriceSource>,
    /// UTC time of day at which `daily_start_equity` re-snapshots.
    pub daily_reset_time: NaiveTime,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(100_000),
            leverage: Decimal::from(5),
            mark_price_source: MarkPriceSource::default(),
            mark_price_overrides: FnvHashMap::default(),
            daily_reset_time: NaiveTime::MIN,
        }
    }
}

/// Order lifecycle, position and PnL engine.
///
/// Sole owner of orders, positions and the account; the rest of the system
/// observes read-only snapshots through the cache and bus events. Orders are
/// evicted from the active map once terminal; positions persist when flat so
/// per-symbol realised PnL keeps accumulating.
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    orders: FnvHashMap<ClientOrderId, Order>,
    positions: FnvHashMap<TradingPair, Position>,
    account: Account,
    triggers: KillSwitchTriggers,
}

impl Ledger {
    pub fn new(config: LedgerConfig, time: DateTime<Utc>) -> Self {
        let account = Account::new(config.initial_balance, time);
        Self {
            config,
            orders: FnvHashMap::default(),
            positions: FnvHashMap::default(),
            account,
            triggers: KillSwitchTriggers::new(),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn position(&self, pair: &TradingPair) -> Option<&Position> {
        self.positions.get(pair)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> + '_ {
        self.positions.values()
    }

    pub fn order(&self, client_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders.values()
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.triggers.consecutive_losses()
    }

    /// Record a risk-approved intent as a pending order.
    pub fn record_intent(&mut self, request: OrderRequest, time: DateTime<Utc>) -> Event {
        let order = Order::from_request(request, time);
        self.orders.insert(order.client_id.clone(), order.clone());
        Event::Order(OrderUpdate { order, time })
    }

    /// Apply one execution event, returning the bus events it produced.
    pub fn on_execution_event(
        &mut self,
        event: &ExecutionEvent,
    ) -> Result<Vec<Event>, ExecutionError> {
        match event {
            ExecutionEvent::Submitted { client_id, time } => {
                self.transition(client_id, OrderStatus::Submitted, *time)
            }
            ExecutionEvent::Accepted { client_id, exchange_id, time } => {
                let order = self
                    .orders
                    .get_mut(client_id)
                    .ok_or_else(|| ExecutionError::UnknownOrder(client_id.clone()))?;
                order.exchange_id = Some(exchange_id.clone());
                self.transition(client_id, OrderStatus::Accepted, *time)
            }
            ExecutionEvent::Rejected { client_id, reason, time } => {
                if let Some(order) = self.orders.get_mut(client_id) {
                    order.reject_reason = Some(reason.clone());
                }
                self.transition(client_id, OrderStatus::Rejected, *time)
            }
            ExecutionEvent::Cancelled { client_id, time } => {
                self.transition(client_id, OrderStatus::Cancelled, *time)
            }
            ExecutionEvent::Expired { client_id, time } => {
                self.transition(client_id, OrderStatus::Expired, *time)
            }
            ExecutionEvent::Fill(fill) => self.apply_fill(fill),
        }
    }

    /// Update marks from market data per the configured source, returning
    /// position/account events when values moved.
    pub fn on_market(&mut self, event: &MarketEvent<DataKind>) -> Vec<Event> {
        let source = self
            .config
            .mark_price_overrides
            .get(&event.pair)
            .copied()
            .unwrap_or(self.config.mark_price_source);

        let mark = match (&event.kind, source) {
            (DataKind::Quote(quote), MarkPriceSource::Mid | MarkPriceSource::MarkFeed) => {
                Some(quote.mid)
            }
            (DataKind::Trade(trade), MarkPriceSource::LastTrade) => Some(trade.price),
            _ => None,
        };

        let mut events = Vec::new();
        if let Some(mark) = mark {
            if let Some(position) = self.positions.get_mut(&event.pair) {
                if !position.is_flat() {
                    position.mark_to_market(mark, event.time_exchange);
                    events.push(Event::Position(PositionUpdate {
                        position: position.clone(),
                        time: event.time_exchange,
                    }));
                    self.refresh_account_aggregates(event.time_exchange);
                    events.push(self.account_event(event.time_exchange));
                }
            }
        }

        if self
            .account
            .maybe_daily_reset(event.time_exchange, self.config.daily_reset_time)
        {
            debug!(equity = %self.account.equity, "daily equity snapshot reset");
            events.push(self.account_event(event.time_exchange));
        }

        events
    }

    /// Automatic kill-switch trigger evaluation against current state.
    pub fn evaluate_kill_triggers(
        &self,
        config: &vela_risk::config::RiskConfig,
    ) -> Option<KillSwitchReason> {
        self.triggers
            .evaluate(config, self.account.equity, self.account.daily_loss())
    }

    /// Serve a read-only bus query.
    pub fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::GetOrder(client_id) => Response::Order(self.orders.get(&client_id).cloned()),
            Request::GetPosition(pair) => Response::Position(self.positions.get(&pair).cloned()),
            Request::GetAccount => Response::Account(Some(self.account.clone())),
        }
    }

    fn transition(
        &mut self,
        client_id: &ClientOrderId,
        next: OrderStatus,
        time: DateTime<Utc>,
    ) -> Result<Vec<Event>, ExecutionError> {
        let order = self
            .orders
            .get_mut(client_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(client_id.clone()))?;
        order.transition(next, time)?;
        let snapshot = order.clone();
        if snapshot.status.is_terminal() {
            self.orders.remove(client_id);
        }
        Ok(vec![Event::Order(OrderUpdate {
            order: snapshot,
            time,
        })])
    }

    fn apply_fill(&mut self, fill: &Fill) -> Result<Vec<Event>, ExecutionError> {
        let mut events = Vec::with_capacity(3);

        let order = self
            .orders
            .get_mut(&fill.client_id)
            .ok_or_else(|| ExecutionError::UnknownOrder(fill.client_id.clone()))?;

        // A fill can outrun the acceptance on the user stream.
        if order.status == OrderStatus::Submitted {
            debug!(client_id = %fill.client_id, "fill observed before acceptance");
            order.transition(OrderStatus::Accepted, fill.time_exchange)?;
        }

        order.apply_fill(fill.price, fill.quantity, fill.fee, fill.time_exchange)?;
        let order_snapshot = order.clone();
        if order_snapshot.status.is_terminal() {
            self.orders.remove(&fill.client_id);
        }
        events.push(Event::Order(OrderUpdate {
            order: order_snapshot,
            time: fill.time_exchange,
        }));

        let position = self
            .positions
            .entry(fill.pair.clone())
            .or_insert_with(|| Position::flat(fill.pair.clone(), fill.time_exchange));
        let update = position.apply_fill(fill.side, fill.quantity, fill.price, fill.time_exchange);
        events.push(Event::Position(PositionUpdate {
            position: position.clone(),
            time: fill.time_exchange,
        }));

        if update.closed_quantity > Decimal::ZERO {
            self.triggers.record_trade(update.realized_delta);
        }

        self.account
            .apply_fill_effects(update.realized_delta, fill.fee, fill.time_exchange);
        self.refresh_account_aggregates(fill.time_exchange);
        events.push(self.account_event(fill.time_exchange));

        Ok(events)
    }

    fn refresh_account_aggregates(&mut self, time: DateTime<Utc>) {
        let total_unrealized = self
            .positions
            .values()
            .map(|position| position.unrealized_pnl)
            .sum();
        self.account.set_total_unrealized(total_unrealized, time);

        let margin_used = self
            .positions
            .values()
            .map(|position| {
                margin_requirement(position.size, position.entry_price, self.config.leverage)
            })
            .sum();
        self.account.set_margin_used(margin_used, time);
    }

    fn account_event(&self, time: DateTime<Utc>) -> Event {
        Event::Account(AccountUpdate {
            account: self.account.clone(),
            time,
        })
    }
}

/// Register the ledger's read-only query endpoint on the bus.
pub fn register_endpoints(
    ledger: std::sync::Arc<parking_lot::Mutex<Ledger>>,
    bus: &mut crate::event::Bus,
) {
    bus.register(crate::event::endpoints::LEDGER, move |request: Request| {
        Ok(ledger.lock().handle_request(request))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vela_execution::order::{OrderKind, TimeInForce, id::OrderId, id::StrategyId};
    use vela_instrument::Side;

    fn pair() -> TradingPair {
        TradingPair::new("ETH", "USDC")
    }

    fn ledger() -> Ledger {
        Ledger::new(LedgerConfig::default(), Utc::now())
    }

    fn request(client: &str, side: Side, quantity: Decimal) -> OrderRequest {
        OrderRequest {
            client_id: ClientOrderId::new(client),
            strategy: StrategyId::new("s"),
            pair: pair(),
            side,
            kind: OrderKind::Market,
            quantity,
            price: None,
            time_in_force: TimeInForce::ImmediateOrCancel,
            reduce_only: false,
        }
    }

    fn fill(client: &str, side: Side, quantity: Decimal, price: Decimal) -> ExecutionEvent {
        ExecutionEvent::Fill(Fill::new(
            ClientOrderId::new(client),
            pair(),
            side,
            price,
            quantity,
            Decimal::ZERO,
            Utc::now(),
        ))
    }

    fn submit_and_accept(ledger: &mut Ledger, client: &str, side: Side, quantity: Decimal) {
        let now = Utc::now();
        ledger.record_intent(request(client, side, quantity), now);
        ledger
            .on_execution_event(&ExecutionEvent::Submitted {
                client_id: ClientOrderId::new(client),
                time: now,
            })
            .unwrap();
        ledger
            .on_execution_event(&ExecutionEvent::Accepted {
                client_id: ClientOrderId::new(client),
                exchange_id: OrderId::new(format!("x-{client}")),
                time: now,
            })
            .unwrap();
    }

    #[test]
    fn test_position_math_through_fills() {
        // Flat on ETH: buy 10 @ 2000, buy 5 @ 2100, sell 8 @ 2150.
        let mut ledger = ledger();

        submit_and_accept(&mut ledger, "a", Side::Buy, dec!(10));
        ledger.on_execution_event(&fill("a", Side::Buy, dec!(10), dec!(2000))).unwrap();

        submit_and_accept(&mut ledger, "b", Side::Buy, dec!(5));
        ledger.on_execution_event(&fill("b", Side::Buy, dec!(5), dec!(2100))).unwrap();

        let position = ledger.position(&pair()).unwrap();
        assert_eq!(position.size, dec!(15));
        assert_eq!(position.entry_price, dec!(2033.333333333));
        assert_eq!(position.realized_pnl, Decimal::ZERO);

        submit_and_accept(&mut ledger, "c", Side::Sell, dec!(8));
        let events = ledger
            .on_execution_event(&fill("c", Side::Sell, dec!(8), dec!(2150)))
            .unwrap();

        let position = ledger.position(&pair()).unwrap();
        assert_eq!(position.size, dec!(7));
        assert_eq!(position.entry_price, dec!(2033.333333333));
        assert_eq!(position.realized_pnl, dec!(933.333333336));
        assert_eq!(ledger.account().total_realized_pnl, dec!(933.333333336));

        // Order, position and account events in that order.
        assert!(matches!(events[0], Event::Order(_)));
        assert!(matches!(events[1], Event::Position(_)));
        assert!(matches!(events[2], Event::Account(_)));
    }

    #[test]
    fn test_terminal_orders_evicted_from_active_map() {
        let mut ledger = ledger();
        submit_and_accept(&mut ledger, "a", Side::Buy, dec!(1));
        assert_eq!(ledger.open_orders().count(), 1);

        ledger.on_execution_event(&fill("a", Side::Buy, dec!(1), dec!(2000))).unwrap();
        assert_eq!(ledger.open_orders().count(), 0);

        // Further events for the evicted order error out.
        let error = ledger
            .on_execution_event(&ExecutionEvent::Cancelled {
                client_id: ClientOrderId::new("a"),
                time: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(error, ExecutionError::UnknownOrder(_)));
    }

    #[test]
    fn test_mark_updates_follow_configured_source() {
        let mut ledger = ledger();
        submit_and_accept(&mut ledger, "a", Side::Buy, dec!(2));
        ledger.on_execution_event(&fill("a", Side::Buy, dec!(2), dec!(2000))).unwrap();

        // Default source is the mid quote.
        let quote_event = MarketEvent::new(
            Utc::now(),
            Utc::now(),
            vela_instrument::exchange::ExchangeId::Simulated,
            pair(),
            DataKind::Quote(vela_data::event::Quote::new(dec!(2010))),
        );
        let events = ledger.on_market(&quote_event);
        assert_eq!(events.len(), 2);

        let position = ledger.position(&pair()).unwrap();
        assert_eq!(position.unrealized_pnl, dec!(20));
        assert_eq!(ledger.account().equity, dec!(100020));

        // Trades are ignored under the Mid source.
        let trade_event = MarketEvent::new(
            Utc::now(),
            Utc::now(),
            vela_instrument::exchange::ExchangeId::Simulated,
            pair(),
            DataKind::Trade(vela_data::event::PublicTrade::new(
                "t".into(),
                dec!(1000),
                dec!(1),
                Side::Sell,
            )),
        );
        assert!(ledger.on_market(&trade_event).is_empty());
        assert_eq!(ledger.position(&pair()).unwrap().unrealized_pnl, dec!(20));
    }

    #[test]
    fn test_realized_pnl_consistency_across_symbols() {
        // Sum of per-symbol realised PnL deltas equals the account total.
        let mut ledger = ledger();

        submit_and_accept(&mut ledger, "a", Side::Buy, dec!(2));
        ledger.on_execution_event(&fill("a", Side::Buy, dec!(2), dec!(100))).unwrap();
        submit_and_accept(&mut ledger, "b", Side::Sell, dec!(2));
        ledger.on_execution_event(&fill("b", Side::Sell, dec!(2), dec!(110))).unwrap();

        let per_symbol: Decimal = ledger.positions().map(|p| p.realized_pnl).sum();
        assert_eq!(per_symbol, dec!(20));
        assert_eq!(ledger.account().total_realized_pnl, per_symbol);

        // Flat position persists for realised accumulation.
        assert!(ledger.position(&pair()).unwrap().is_flat());
    }

    #[test]
    fn test_bus_query_endpoint() {
        let mut ledger_inner = ledger();
        submit_and_accept(&mut ledger_inner, "q", Side::Buy, dec!(1));
        let shared = std::sync::Arc::new(parking_lot::Mutex::new(ledger_inner));

        let mut bus = crate::event::Bus::new();
        register_endpoints(std::sync::Arc::clone(&shared), &mut bus);

        let response = bus
            .request(crate::event::endpoints::LEDGER, Request::GetAccount)
            .unwrap();
        assert!(matches!(response, Response::Account(Some(_))));

        let response = bus
            .request(
                crate::event::endpoints::LEDGER,
                Request::GetOrder(ClientOrderId::new("q")),
            )
            .unwrap();
        let Response::Order(Some(order)) = response else {
            panic!("expected the open order");
        };
        assert_eq!(order.client_id, ClientOrderId::new("q"));

        let response = bus
            .request(
                crate::event::endpoints::LEDGER,
                Request::GetPosition(TradingPair::new("SOL", "USDC")),
            )
            .unwrap();
        assert!(matches!(response, Response::Position(None)));
    }

    #[test]
    fn test_losing_streak_tracked_for_kill_triggers() {
        let mut ledger = ledger();

        for (index, (entry, exit)) in [(dec!(100), dec!(90)), (dec!(100), dec!(95))]
            .into_iter()
            .enumerate()
        {
            let buy = format!("buy-{index}");
            let sell = format!("sell-{index}");
            submit_and_accept(&mut ledger, &buy, Side::Buy, dec!(1));
            ledger.on_execution_event(&fill(&buy, Side::Buy, dec!(1), entry)).unwrap();
            submit_and_accept(&mut ledger, &sell, Side::Sell, dec!(1));
            ledger.on_execution_event(&fill(&sell, Side::Sell, dec!(1), exit)).unwrap();
        }

        assert_eq!(ledger.consecutive_losses(), 2);

        let risk_config = vela_risk::config::RiskConfig {
            max_consecutive_losses: 2,
            ..Default::default()
        };
        assert!(matches!(
            ledger.evaluate_kill_triggers(&risk_config),
            Some(KillSwitchReason::ConsecutiveLosses { count: 2 })
        ));
    }
}
