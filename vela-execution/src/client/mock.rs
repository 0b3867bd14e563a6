use crate::{
    ExecutionEvent,
    account::Account,
    client::{ExecutionClient, OrderAck},
    error::{ExecutionError, VenueRejectKind},
    order::{Order, OrderKind, OrderRequest, OrderStatus, TimeInForce, id::ClientOrderId, id::OrderId},
    position::Position,
    trade::Fill,
};
use async_trait::async_trait;
use rust_decimal::prelude::Signed;
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use vela_instrument::{Side, exchange::ExchangeId, pair::TradingPair};
use vela_integration::channel::{TxDroppable, UnboundedRx, UnboundedTx, mpsc_unbounded};

/// In-memory execution client backing paper trading and tests.
///
/// Market orders fill immediately at the last known mark price; limit orders
/// rest and fill when a subsequent mark crosses their price. Order lifecycle
/// events are emitted on the channel returned by [`MockExecutionClient::new`].
#[derive(Debug)]
pub struct MockExecutionClient {
    state: Arc<Mutex<MockState>>,
    fee_rate: Decimal,
}

#[derive(Debug)]
struct MockState {
    orders: FnvHashMap<ClientOrderId, Order>,
    positions: FnvHashMap<TradingPair, Position>,
    account: Account,
    marks: FnvHashMap<TradingPair, Decimal>,
    events: TxDroppable<UnboundedTx<ExecutionEvent>>,
    next_oid: u64,
}

impl MockExecutionClient {
    /// Construct with an initial quote balance and taker fee rate; the
    /// receiver carries order lifecycle events in emission order.
    pub fn new(initial_balance: Decimal, fee_rate: Decimal) -> (Self, UnboundedRx<ExecutionEvent>) {
        let (tx, rx) = mpsc_unbounded();
        let client = Self {
            state: Arc::new(Mutex::new(MockState {
                orders: FnvHashMap::default(),
                positions: FnvHashMap::default(),
                account: Account::new(initial_balance, Utc::now()),
                marks: FnvHashMap::default(),
                events: TxDroppable::new(tx),
                next_oid: 1,
            })),
            fee_rate,
        };
        (client, rx)
    }

    /// Update the mark for `pair`, filling any resting orders it crosses.
    pub fn set_mark(&self, pair: &TradingPair, mark: Decimal) {
        let mut state = self.state.lock();
        state.marks.insert(pair.clone(), mark);

        let crossed: Vec<ClientOrderId> = state
            .orders
            .values()
            .filter(|order| {
                order.pair == *pair
                    && !order.status.is_terminal()
                    && order.price.is_some_and(|price| is_marketable(order.side, price, mark))
            })
            .map(|order| order.client_id.clone())
            .collect();

        for client_id in crossed {
            let price = state
                .orders
                .get(&client_id)
                .and_then(|order| order.price)
                .unwrap_or(mark);
            fill_order(&mut state, &client_id, price, self.fee_rate);
        }
    }
}

fn is_marketable(side: Side, limit_price: Decimal, mark: Decimal) -> bool {
    match side {
        Side::Buy => mark <= limit_price,
        Side::Sell => mark >= limit_price,
    }
}

/// Fill the full remaining quantity of an order at `price`, updating the
/// order, position and account, and emitting the fill event.
fn fill_order(state: &mut MockState, client_id: &ClientOrderId, price: Decimal, fee_rate: Decimal) {
    let Some(order) = state.orders.get_mut(client_id) else {
        return;
    };
    let quantity = order.remaining_quantity();
    if quantity.is_zero() {
        return;
    }

    let now = Utc::now();
    let fee = price * quantity * fee_rate;
    if order.apply_fill(price, quantity, fee, now).is_err() {
        debug!(%client_id, "mock fill on non-fillable order skipped");
        return;
    }
    let (pair, side) = (order.pair.clone(), order.side);

    let position = state
        .positions
        .entry(pair.clone())
        .or_insert_with(|| Position::flat(pair.clone(), now));
    let update = position.apply_fill(side, quantity, price, now);
    position.mark_to_market(price, now);

    state.account.apply_fill_effects(update.realized_delta, fee, now);
    let total_unrealized = state
        .positions
        .values()
        .map(|position| position.unrealized_pnl)
        .sum();
    state.account.set_total_unrealized(total_unrealized, now);

    state.events.send(ExecutionEvent::Fill(Fill::new(
        client_id.clone(),
        pair,
        side,
        price,
        quantity,
        fee,
        now,
    )));
}

#[async_trait]
impl ExecutionClient for MockExecutionClient {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Simulated
    }

    async fn submit(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError> {
        let mut state = self.state.lock();
        let now = Utc::now();

        // Idempotency: a known client id is acknowledged, never re-executed.
        if let Some(existing) = state.orders.get(&request.client_id) {
            if let Some(exchange_id) = existing.exchange_id.clone() {
                return Ok(OrderAck::new(request.client_id, exchange_id, now));
            }
        }

        let mark = state.marks.get(&request.pair).copied();
        let mut request = request;

        if request.reduce_only {
            let reducible = state
                .positions
                .get(&request.pair)
                .filter(|position| {
                    position.size.signum() != request.signed_direction()
                })
                .map(|position| position.size.abs())
                .unwrap_or(Decimal::ZERO);

            if reducible.is_zero() {
                return Err(ExecutionError::VenueReject {
                    client_id: request.client_id,
                    kind: VenueRejectKind::InvalidOrder,
                    reason: "reduce_only order would increase position".to_string(),
                });
            }
            // The increasing portion is cancelled.
            request.quantity = request.quantity.min(reducible);
        }

        let mut order = Order::from_request(request.clone(), now);
        let exchange_id = OrderId::new(state.next_oid.to_string());
        state.next_oid += 1;
        order.exchange_id = Some(exchange_id.clone());
        order.transition(OrderStatus::Submitted, now)?;
        state.events.send(ExecutionEvent::Submitted {
            client_id: order.client_id.clone(),
            time: now,
        });

        let marketable = match (order.kind, order.price, mark) {
            (OrderKind::Market, _, Some(_)) => true,
            (OrderKind::Market, _, None) => {
                order.transition(OrderStatus::Rejected, now)?;
                let client_id = order.client_id.clone();
                state.orders.insert(client_id.clone(), order);
                state.events.send(ExecutionEvent::Rejected {
                    client_id: client_id.clone(),
                    reason: "no mark price for market order".to_string(),
                    time: now,
                });
                return Err(ExecutionError::VenueReject {
                    client_id,
                    kind: VenueRejectKind::InvalidOrder,
                    reason: "no mark price for market order".to_string(),
                });
            }
            (_, Some(price), Some(mark)) => is_marketable(order.side, price, mark),
            (_, Some(_), None) => false,
            (_, None, _) => false,
        };

        // Post-only cancels rather than taking liquidity.
        if marketable && order.time_in_force == TimeInForce::PostOnly {
            order.transition(OrderStatus::Accepted, now)?;
            order.transition(OrderStatus::Cancelled, now)?;
            let client_id = order.client_id.clone();
            state.orders.insert(client_id.clone(), order);
            state.events.send(ExecutionEvent::Cancelled {
                client_id: client_id.clone(),
                time: now,
            });
            return Ok(OrderAck::new(client_id, exchange_id, now));
        }

        order.transition(OrderStatus::Accepted, now)?;
        let client_id = order.client_id.clone();
        state.events.send(ExecutionEvent::Accepted {
            client_id: client_id.clone(),
            exchange_id: exchange_id.clone(),
            time: now,
        });
        state.orders.insert(client_id.clone(), order);

        if marketable {
            let price = match (request.kind, request.price, mark) {
                (OrderKind::Market, _, Some(mark)) => mark,
                (_, Some(price), _) => price,
                _ => unreachable!("marketable orders carry a price source"),
            };
            fill_order(&mut state, &client_id, price, self.fee_rate);
        } else if matches!(
            request.time_in_force,
            TimeInForce::ImmediateOrCancel | TimeInForce::FillOrKill
        ) {
            if let Some(order) = state.orders.get_mut(&client_id) {
                order.transition(OrderStatus::Cancelled, now)?;
            }
            state.events.send(ExecutionEvent::Cancelled {
                client_id: client_id.clone(),
                time: now,
            });
        }

        Ok(OrderAck::new(client_id, exchange_id, now))
    }

    async fn cancel(&self, client_id: &ClientOrderId) -> Result<bool, ExecutionError> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let Some(order) = state.orders.get_mut(client_id) else {
            return Ok(false);
        };
        if order.status.is_terminal() {
            return Ok(false);
        }

        order.transition(OrderStatus::Cancelled, now)?;
        state.events.send(ExecutionEvent::Cancelled {
            client_id: client_id.clone(),
            time: now,
        });
        Ok(true)
    }

    async fn cancel_all(&self) -> Result<usize, ExecutionError> {
        let open: Vec<ClientOrderId> = {
            let state = self.state.lock();
            state
                .orders
                .values()
                .filter(|order| !order.status.is_terminal())
                .map(|order| order.client_id.clone())
                .collect()
        };

        let mut cancelled = 0;
        for client_id in &open {
            if self.cancel(client_id).await? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn order_status(
        &self,
        client_id: &ClientOrderId,
    ) -> Result<Option<Order>, ExecutionError> {
        Ok(self.state.lock().orders.get(client_id).cloned())
    }

    async fn position(&self, pair: &TradingPair) -> Result<Option<Position>, ExecutionError> {
        Ok(self.state.lock().positions.get(pair).cloned())
    }

    async fn account(&self) -> Result<Account, ExecutionError> {
        Ok(self.state.lock().account.clone())
    }
}

impl OrderRequest {
    /// Sign of the position delta this request applies (+1 buy, -1 sell).
    fn signed_direction(&self) -> Decimal {
        match self.side {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::id::StrategyId;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("ETH", "USDC")
    }

    fn request(kind: OrderKind, side: Side, quantity: Decimal, price: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            client_id: ClientOrderId::next(),
            strategy: StrategyId::new("test"),
            pair: pair(),
            side,
            kind,
            quantity,
            price,
            time_in_force: TimeInForce::GoodUntilCancelled,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn test_market_order_fills_at_mark() {
        let (client, mut events) = MockExecutionClient::new(dec!(100000), dec!(0.0005));
        client.set_mark(&pair(), dec!(2000));

        let ack = client
            .submit(request(OrderKind::Market, Side::Buy, dec!(2), None))
            .await
            .unwrap();

        let order = client.order_status(&ack.client_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, dec!(2000));

        let position = client.position(&pair()).await.unwrap().unwrap();
        assert_eq!(position.size, dec!(2));
        assert_eq!(position.entry_price, dec!(2000));

        // Fee deducted from balance: 2000 * 2 * 0.0005 = 2
        let account = client.account().await.unwrap();
        assert_eq!(account.balance, dec!(99998));

        let emitted = events.drain();
        assert!(matches!(emitted[0], ExecutionEvent::Submitted { .. }));
        assert!(matches!(emitted[1], ExecutionEvent::Accepted { .. }));
        assert!(matches!(emitted[2], ExecutionEvent::Fill(_)));
    }

    #[tokio::test]
    async fn test_limit_order_rests_then_fills_on_cross() {
        let (client, mut events) = MockExecutionClient::new(dec!(100000), Decimal::ZERO);
        client.set_mark(&pair(), dec!(2000));

        let ack = client
            .submit(request(OrderKind::Limit, Side::Buy, dec!(1), Some(dec!(1950))))
            .await
            .unwrap();

        let order = client.order_status(&ack.client_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        events.drain();

        client.set_mark(&pair(), dec!(1940));
        let order = client.order_status(&ack.client_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, dec!(1950));

        let emitted = events.drain();
        assert!(matches!(emitted[0], ExecutionEvent::Fill(_)));
    }

    #[tokio::test]
    async fn test_post_only_cancels_when_marketable() {
        let (client, _events) = MockExecutionClient::new(dec!(100000), Decimal::ZERO);
        client.set_mark(&pair(), dec!(2000));

        let mut req = request(OrderKind::Limit, Side::Buy, dec!(1), Some(dec!(2100)));
        req.time_in_force = TimeInForce::PostOnly;
        let ack = client.submit(req).await.unwrap();

        let order = client.order_status(&ack.client_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_reduce_only_never_increases() {
        let (client, _events) = MockExecutionClient::new(dec!(100000), Decimal::ZERO);
        client.set_mark(&pair(), dec!(2000));

        // No position yet: reduce-only rejected.
        let mut req = request(OrderKind::Market, Side::Sell, dec!(1), None);
        req.reduce_only = true;
        assert!(matches!(
            client.submit(req).await.unwrap_err(),
            ExecutionError::VenueReject {
                kind: VenueRejectKind::InvalidOrder,
                ..
            }
        ));

        // Long 2: reduce-only sell of 5 caps at 2.
        client
            .submit(request(OrderKind::Market, Side::Buy, dec!(2), None))
            .await
            .unwrap();
        let mut req = request(OrderKind::Market, Side::Sell, dec!(5), None);
        req.reduce_only = true;
        client.submit(req).await.unwrap();

        let position = client.position(&pair()).await.unwrap().unwrap();
        assert!(position.is_flat());
    }

    #[tokio::test]
    async fn test_cancel_and_cancel_all() {
        let (client, _events) = MockExecutionClient::new(dec!(100000), Decimal::ZERO);
        client.set_mark(&pair(), dec!(2000));

        let a = client
            .submit(request(OrderKind::Limit, Side::Buy, dec!(1), Some(dec!(1900))))
            .await
            .unwrap();
        client
            .submit(request(OrderKind::Limit, Side::Buy, dec!(1), Some(dec!(1800))))
            .await
            .unwrap();

        assert!(client.cancel(&a.client_id).await.unwrap());
        assert!(!client.cancel(&a.client_id).await.unwrap());
        assert_eq!(client.cancel_all().await.unwrap(), 1);
        assert!(!client.cancel(&ClientOrderId::new("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_submit_acknowledged_once() {
        let (client, mut events) = MockExecutionClient::new(dec!(100000), Decimal::ZERO);
        client.set_mark(&pair(), dec!(2000));

        let req = request(OrderKind::Limit, Side::Buy, dec!(1), Some(dec!(1900)));
        let first = client.submit(req.clone()).await.unwrap();
        events.drain();

        let second = client.submit(req).await.unwrap();
        assert_eq!(first.exchange_id, second.exchange_id);
        assert!(events.drain().is_empty());
    }
}
