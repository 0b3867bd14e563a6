use crate::queue::{FillModel, L3Book};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vela_data::{
    books::OrderBook,
    event::{DataKind, MarketEvent, OrderBookEvent, PublicTrade},
};
use vela_execution::order::{OrderKind, OrderRequest, TimeInForce, id::ClientOrderId};
use vela_instrument::{Side, pair::TradingPair};

/// Simulated venue configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimVenueConfig {
    /// Commission applied to every fill's notional.
    pub commission_rate: Decimal,
    /// Extra cost applied to market orders, in basis points of the mark.
    pub slippage_bps: Decimal,
    /// Queue-position fill model for resting limit orders.
    pub fill_model: FillModel,
}

impl Default for SimVenueConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(35, 5),
            slippage_bps: Decimal::from(1),
            fill_model: FillModel::default(),
        }
    }
}

/// Lifecycle of a simulated order inside the venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    Submitted,
    AtExchange,
    Processed,
    Acknowledged,
}

/// A simulated order tracked from submission to acknowledgement.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub request: OrderRequest,
    pub state: PendingState,
    pub remaining: Decimal,
    l3_id: Option<u64>,
}

/// Fill generated by the simulated venue at exchange time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SimFill {
    pub client_id: ClientOrderId,
    pub pair: TradingPair,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
}

/// Outcome of an order arriving at the simulated venue.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PlaceOutcome {
    /// Executed immediately (market, or marketable limit).
    Filled(SimFill),
    /// Resting in the L3 book with a recorded queue position.
    Resting,
    /// Post-only order that would have executed immediately.
    CancelledPostOnly,
    /// Unmarketable IOC/FOK cancelled on arrival.
    CancelledUnfillable,
    /// The venue could not process the order.
    Rejected { reason: String },
}

/// The simulated venue: consumes the historical feed at exchange time,
/// maintains venue-side book state and the L3 queue positions of my resting
/// orders, and generates fills per the configured fill model.
#[derive(Debug)]
pub struct SimVenue {
    config: SimVenueConfig,
    marks: FnvHashMap<TradingPair, Decimal>,
    books: FnvHashMap<TradingPair, OrderBook>,
    queues: FnvHashMap<TradingPair, L3Book>,
    pending: FnvHashMap<ClientOrderId, PendingOrder>,
}

impl SimVenue {
    pub fn new(config: SimVenueConfig) -> Self {
        Self {
            config,
            marks: FnvHashMap::default(),
            books: FnvHashMap::default(),
            queues: FnvHashMap::default(),
            pending: FnvHashMap::default(),
        }
    }

    pub fn mark(&self, pair: &TradingPair) -> Option<Decimal> {
        self.marks.get(pair).copied()
    }

    pub fn pending_order(&self, client_id: &ClientOrderId) -> Option<&PendingOrder> {
        self.pending.get(client_id)
    }

    pub fn open_order_ids(&self) -> Vec<ClientOrderId> {
        self.pending.keys().cloned().collect()
    }

    /// Record that an order left the strategy (leg one of the round trip).
    pub fn order_submitted(&mut self, request: OrderRequest) {
        self.pending.insert(
            request.client_id.clone(),
            PendingOrder {
                remaining: request.quantity,
                request,
                state: PendingState::Submitted,
                l3_id: None,
            },
        );
    }

    /// Advance a pending order's venue-side state.
    pub fn set_state(&mut self, client_id: &ClientOrderId, state: PendingState) {
        if let Some(pending) = self.pending.get_mut(client_id) {
            pending.state = state;
        }
    }

    /// Apply a historical market event at exchange time. Trades consume the
    /// L3 queues and may fill my resting orders.
    pub fn on_market(
        &mut self,
        event: &MarketEvent<DataKind>,
        rng: &mut impl Rng,
    ) -> Vec<SimFill> {
        match &event.kind {
            DataKind::Quote(quote) => {
                self.marks.insert(event.pair.clone(), quote.mid);
                Vec::new()
            }
            DataKind::Book(OrderBookEvent::Snapshot(snapshot)) => {
                if let Some(mid) = snapshot.mid_price() {
                    self.marks.insert(event.pair.clone(), mid);
                }
                self.books.insert(event.pair.clone(), snapshot.clone());
                Vec::new()
            }
            DataKind::Book(OrderBookEvent::Delta(delta)) => {
                if let Some(book) = self.books.get_mut(&event.pair) {
                    let _outcome = book.apply_delta(delta);
                    if let Some(mid) = book.mid_price() {
                        self.marks.insert(event.pair.clone(), mid);
                    }
                }
                Vec::new()
            }
            DataKind::Trade(trade) => {
                self.marks.insert(event.pair.clone(), trade.price);
                self.on_trade(&event.pair, trade, rng)
            }
            DataKind::Candle(_) => Vec::new(),
        }
    }

    /// Order arrived at the venue (leg one complete).
    pub fn place_order(&mut self, client_id: &ClientOrderId, now: DateTime<Utc>) -> PlaceOutcome {
        let Some(pending) = self.pending.get(client_id) else {
            return PlaceOutcome::Rejected {
                reason: "unknown order".to_string(),
            };
        };
        let request = pending.request.clone();
        self.set_state(client_id, PendingState::AtExchange);

        let mark = self.marks.get(&request.pair).copied();
        match (request.kind, request.price) {
            (OrderKind::Market, _) => {
                let Some(mark) = mark else {
                    self.pending.remove(client_id);
                    return PlaceOutcome::Rejected {
                        reason: "no mark price for market order".to_string(),
                    };
                };
                let price = self.apply_slippage(request.side, mark);
                match self.fill(client_id, price, request.quantity) {
                    Some(fill) => PlaceOutcome::Filled(fill),
                    None => PlaceOutcome::Rejected {
                        reason: "order lost before execution".to_string(),
                    },
                }
            }
            (_, Some(limit_price)) => {
                let marketable =
                    mark.is_some_and(|mark| is_marketable(request.side, limit_price, mark));

                if marketable {
                    if request.time_in_force == TimeInForce::PostOnly {
                        self.pending.remove(client_id);
                        return PlaceOutcome::CancelledPostOnly;
                    }
                    return match self.fill(client_id, limit_price, request.quantity) {
                        Some(fill) => PlaceOutcome::Filled(fill),
                        None => PlaceOutcome::Rejected {
                            reason: "order lost before execution".to_string(),
                        },
                    };
                }

                if matches!(
                    request.time_in_force,
                    TimeInForce::ImmediateOrCancel | TimeInForce::FillOrKill
                ) {
                    self.pending.remove(client_id);
                    return PlaceOutcome::CancelledUnfillable;
                }

                // Rest behind the venue's current depth at this level.
                let ahead = self
                    .books
                    .get(&request.pair)
                    .map(|book| level_quantity(book, request.side, limit_price))
                    .unwrap_or(Decimal::ZERO);
                let queue = self.queues.entry(request.pair.clone()).or_default();
                if ahead > Decimal::ZERO
                    && queue.level_quantity(request.side, limit_price).is_zero()
                {
                    queue.add_order(request.side, limit_price, ahead, false, now);
                }
                let l3_id = queue.add_order(request.side, limit_price, request.quantity, true, now);
                if let Some(pending) = self.pending.get_mut(client_id) {
                    pending.l3_id = Some(l3_id);
                }
                PlaceOutcome::Resting
            }
            (_, None) => {
                self.pending.remove(client_id);
                PlaceOutcome::Rejected {
                    reason: "limit order without a price".to_string(),
                }
            }
        }
    }

    /// Cancel a resting order at the venue.
    pub fn cancel_order(&mut self, client_id: &ClientOrderId) -> bool {
        let Some(pending) = self.pending.remove(client_id) else {
            return false;
        };
        if let (Some(l3_id), Some(queue)) =
            (pending.l3_id, self.queues.get_mut(&pending.request.pair))
        {
            queue.cancel_order(l3_id);
        }
        true
    }

    fn on_trade(
        &mut self,
        pair: &TradingPair,
        trade: &PublicTrade,
        rng: &mut impl Rng,
    ) -> Vec<SimFill> {
        // The aggressor consumes the opposite resting side.
        let resting_side = trade.side.inverse();

        let mine: Vec<(ClientOrderId, u64)> = self
            .pending
            .iter()
            .filter(|(_, pending)| {
                pending.request.pair == *pair
                    && pending.request.side == resting_side
                    && pending.request.price == Some(trade.price)
            })
            .filter_map(|(client_id, pending)| {
                pending.l3_id.map(|l3_id| (client_id.clone(), l3_id))
            })
            .collect();

        // First pass against the queues; fills are settled afterwards so the
        // pending map stays untouched while the queue borrow is live.
        let mut fill_specs: Vec<(ClientOrderId, Decimal, Decimal)> = Vec::new();
        if let Some(queue) = self.queues.get_mut(pair) {
            for (client_id, l3_id) in mine {
                let Some(position) = queue.queue_position(l3_id) else {
                    continue;
                };

                if position.total_quantity_ahead.is_zero() {
                    // Head of the queue fills deterministically, FIFO.
                    for queue_fill in queue.on_trade(resting_side, trade.price, trade.amount) {
                        if queue_fill.order_id == l3_id {
                            fill_specs.push((
                                client_id.clone(),
                                queue_fill.price,
                                queue_fill.quantity,
                            ));
                        }
                    }
                } else if self.config.fill_model.decide(rng, &position) {
                    let quantity = position.order_quantity.min(trade.amount);
                    queue.reduce_order(l3_id, quantity);
                    debug!(%client_id, %quantity, "queue model granted fill");
                    fill_specs.push((client_id, trade.price, quantity));
                } else {
                    // No fill: the trade consumes quantity ahead of us.
                    let consumed = trade.amount.min(position.total_quantity_ahead);
                    queue.on_trade(resting_side, trade.price, consumed);
                }
            }
        }

        fill_specs
            .into_iter()
            .filter_map(|(client_id, price, quantity)| self.fill(&client_id, price, quantity))
            .collect()
    }

    /// Build a fill, applying commission and pending-order bookkeeping.
    fn fill(
        &mut self,
        client_id: &ClientOrderId,
        price: Decimal,
        quantity: Decimal,
    ) -> Option<SimFill> {
        let pending = self.pending.get_mut(client_id)?;
        pending.remaining -= quantity;
        let request = pending.request.clone();
        if pending.remaining.is_zero() {
            self.pending.remove(client_id);
        }

        Some(SimFill {
            client_id: client_id.clone(),
            pair: request.pair,
            side: request.side,
            price,
            quantity,
            fee: price * quantity * self.config.commission_rate,
        })
    }

    fn apply_slippage(&self, side: Side, mark: Decimal) -> Decimal {
        let slip = mark * self.config.slippage_bps / Decimal::from(10_000);
        match side {
            Side::Buy => mark + slip,
            Side::Sell => mark - slip,
        }
    }
}

fn is_marketable(side: Side, limit_price: Decimal, mark: Decimal) -> bool {
    match side {
        Side::Buy => mark <= limit_price,
        Side::Sell => mark >= limit_price,
    }
}

/// Aggregate venue depth at `price` on the side a resting order would join.
fn level_quantity(book: &OrderBook, side: Side, price: Decimal) -> Decimal {
    let levels = match side {
        Side::Buy => book.bids().levels(),
        Side::Sell => book.asks().levels(),
    };
    levels
        .iter()
        .find(|level| level.price == price)
        .map(|level| level.amount)
        .unwrap_or(Decimal::ZERO)
}
