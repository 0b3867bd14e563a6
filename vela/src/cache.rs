use crate::event::{Bus, Event};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use vela_data::{
    books::OrderBook,
    event::{DataKind, OrderBookEvent, Quote},
};
use vela_execution::{account::Account, order::Order, position::Position};
use vela_instrument::pair::TradingPair;
use vela_strategy::MarketView;

/// Default capacity of the recent-event debug ring.
pub const DEFAULT_EVENT_RING_CAPACITY: usize = 1024;

/// Last-known-value store, populated exclusively through bus subscriptions.
///
/// Every getter returns the most recent value observed on the bus, or `None`
/// if none has arrived. External mutation is forbidden: writes happen only
/// in [`Cache::apply`], wired to the bus by [`attach`].
#[derive(Debug)]
pub struct Cache {
    quotes: FnvHashMap<TradingPair, Quote>,
    books: FnvHashMap<TradingPair, OrderBook>,
    positions: FnvHashMap<TradingPair, Position>,
    account: Option<Account>,
    /// Active (non-terminal) orders by client id.
    orders: FnvHashMap<vela_execution::order::id::ClientOrderId, Order>,
    recent: VecDeque<Event>,
    capacity: usize,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_RING_CAPACITY)
    }
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            quotes: FnvHashMap::default(),
            books: FnvHashMap::default(),
            positions: FnvHashMap::default(),
            account: None,
            orders: FnvHashMap::default(),
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Fold one bus event into the last-known state.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Market(market) => match &market.kind {
                DataKind::Quote(quote) => {
                    self.quotes.insert(market.pair.clone(), *quote);
                }
                DataKind::Book(OrderBookEvent::Snapshot(snapshot)) => {
                    self.books.insert(market.pair.clone(), snapshot.clone());
                }
                DataKind::Book(OrderBookEvent::Delta(delta)) => {
                    if let Some(book) = self.books.get_mut(&market.pair) {
                        let _outcome = book.apply_delta(delta);
                    }
                }
                DataKind::Trade(_) | DataKind::Candle(_) => {}
            },
            Event::Order(update) => {
                if update.order.status.is_terminal() {
                    self.orders.remove(&update.order.client_id);
                } else {
                    self.orders
                        .insert(update.order.client_id.clone(), update.order.clone());
                }
            }
            Event::Position(update) => {
                self.positions
                    .insert(update.position.pair.clone(), update.position.clone());
            }
            Event::Account(update) => {
                self.account = Some(update.account.clone());
            }
            Event::Connectivity { pair: Some(pair), connected: false, .. } => {
                // Symbol book reset cycle: state is stale until the fresh
                // snapshot arrives.
                self.books.remove(pair);
            }
            Event::Connectivity { .. }
            | Event::KillSwitchActivated { .. }
            | Event::Degraded { .. }
            | Event::Shutdown { .. } => {}
        }

        if self.capacity > 0 {
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(event.clone());
        }
    }

    pub fn quote(&self, pair: &TradingPair) -> Option<&Quote> {
        self.quotes.get(pair)
    }

    pub fn book(&self, pair: &TradingPair) -> Option<&OrderBook> {
        self.books.get(pair)
    }

    pub fn position(&self, pair: &TradingPair) -> Option<&Position> {
        self.positions.get(pair)
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn order(&self, client_id: &vela_execution::order::id::ClientOrderId) -> Option<&Order> {
        self.orders.get(client_id)
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders.values()
    }

    /// Recent events, oldest first, bounded by the configured capacity.
    pub fn recent_events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.recent.iter()
    }
}

impl MarketView for Cache {
    fn quote(&self, pair: &TradingPair) -> Option<Quote> {
        self.quotes.get(pair).copied()
    }

    fn book(&self, pair: &TradingPair) -> Option<&OrderBook> {
        self.books.get(pair)
    }

    fn position(&self, pair: &TradingPair) -> Option<&Position> {
        self.positions.get(pair)
    }

    fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }
}

/// Shared cache handle usable from the bus thread and strategy runtimes.
pub type SharedCache = Arc<Mutex<Cache>>;

/// Subscribe the cache to every topic so it mirrors all bus traffic.
pub fn attach(cache: SharedCache, bus: &mut Bus) -> vela_bus::SubscriptionId {
    bus.subscribe("*", move |event: &Event| {
        cache.lock().apply(event);
        Ok(())
    })
}
