use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use vela_bus::{BusRx, BusTx, EventBus};
use vela_data::event::{DataKind, MarketEvent, OrderBookEvent};
use vela_execution::{account::Account, order::Order, position::Position};
use vela_instrument::{exchange::ExchangeId, pair::TradingPair};

/// The system event union published on the bus. Every payload carries a
/// source timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    /// Normalised market data (quote, trade, book, candle).
    #[from]
    Market(MarketEvent<DataKind>),
    /// Order lifecycle snapshot after a state change.
    #[from]
    Order(OrderUpdate),
    /// Position snapshot after a fill or mark update.
    #[from]
    Position(PositionUpdate),
    /// Account snapshot after a fill, mark or daily-reset update.
    #[from]
    Account(AccountUpdate),
    /// Venue feed connectivity transition.
    Connectivity {
        exchange: ExchangeId,
        /// `None` for the whole feed, `Some` for a single symbol's book.
        pair: Option<TradingPair>,
        connected: bool,
        time: DateTime<Utc>,
    },
    /// Kill switch tripped; all further submissions refuse until reset.
    KillSwitchActivated { reason: String, time: DateTime<Utc> },
    /// Market data frames were shed under bus back-pressure.
    Degraded { dropped: u64, time: DateTime<Utc> },
    /// Process shutdown initiated.
    Shutdown { time: DateTime<Utc> },
}

/// Order snapshot paired with the lifecycle phase that produced it.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderUpdate {
    pub order: Order,
    pub time: DateTime<Utc>,
}

/// Position snapshot event payload.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PositionUpdate {
    pub position: Position,
    pub time: DateTime<Utc>,
}

/// Account snapshot event payload.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct AccountUpdate {
    pub account: Account,
    pub time: DateTime<Utc>,
}

impl Event {
    /// Bus topic this event publishes on.
    pub fn topic(&self) -> SmolStr {
        match self {
            Event::Market(event) => match &event.kind {
                DataKind::Quote(_) => topics::market_data(&event.pair),
                DataKind::Trade(_) => topics::trade(&event.pair),
                DataKind::Candle(candle) => topics::candle(&event.pair, candle.interval.as_str()),
                DataKind::Book(OrderBookEvent::Snapshot(_)) => {
                    topics::orderbook_snapshot(&event.pair)
                }
                DataKind::Book(OrderBookEvent::Delta(_)) => topics::orderbook_delta(&event.pair),
            },
            Event::Order(update) => topics::order(update.order.status),
            Event::Position(update) => topics::position(&update.position.pair),
            Event::Account(_) => SmolStr::new_static(topics::ACCOUNT),
            Event::Connectivity { connected, .. } => SmolStr::new_static(if *connected {
                topics::SYSTEM_CONNECTED
            } else {
                topics::SYSTEM_DISCONNECTED
            }),
            Event::KillSwitchActivated { .. } => SmolStr::new_static(topics::SYSTEM_KILL_SWITCH),
            Event::Degraded { .. } => SmolStr::new_static(topics::SYSTEM_DEGRADED),
            Event::Shutdown { .. } => SmolStr::new_static(topics::SYSTEM_SHUTDOWN),
        }
    }

    /// Source timestamp carried by the payload.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Event::Market(event) => event.time_exchange,
            Event::Order(update) => update.time,
            Event::Position(update) => update.time,
            Event::Account(update) => update.time,
            Event::Connectivity { time, .. }
            | Event::KillSwitchActivated { time, .. }
            | Event::Degraded { time, .. }
            | Event::Shutdown { time } => *time,
        }
    }
}

/// Topic name scheme: dot-separated, symbol-scoped where applicable.
pub mod topics {
    use smol_str::{SmolStr, format_smolstr};
    use vela_execution::order::OrderStatus;
    use vela_instrument::pair::TradingPair;

    pub const ACCOUNT: &str = "account";
    pub const SYSTEM_CONNECTED: &str = "system.connected";
    pub const SYSTEM_DISCONNECTED: &str = "system.disconnected";
    pub const SYSTEM_KILL_SWITCH: &str = "system.kill_switch_activated";
    pub const SYSTEM_DEGRADED: &str = "system.degraded";
    pub const SYSTEM_SHUTDOWN: &str = "system.shutdown";

    pub fn market_data(pair: &TradingPair) -> SmolStr {
        format_smolstr!("market_data.{pair}")
    }

    pub fn trade(pair: &TradingPair) -> SmolStr {
        format_smolstr!("trade.{pair}")
    }

    pub fn candle(pair: &TradingPair, interval: &str) -> SmolStr {
        format_smolstr!("candle.{pair}.{interval}")
    }

    pub fn orderbook_snapshot(pair: &TradingPair) -> SmolStr {
        format_smolstr!("orderbook.{pair}.snapshot")
    }

    pub fn orderbook_delta(pair: &TradingPair) -> SmolStr {
        format_smolstr!("orderbook.{pair}.delta")
    }

    pub fn order(status: OrderStatus) -> SmolStr {
        format_smolstr!("order.{status}")
    }

    pub fn position(pair: &TradingPair) -> SmolStr {
        format_smolstr!("position.{pair}")
    }
}

/// Request-reply queries served over the bus endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    GetOrder(vela_execution::order::id::ClientOrderId),
    GetPosition(TradingPair),
    GetAccount,
}

/// Replies to [`Request`]s.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Order(Option<Order>),
    Position(Option<Position>),
    Account(Option<Account>),
}

/// Request-reply endpoint names.
pub mod endpoints {
    pub const LEDGER: &str = "ledger.query";
}

/// The concrete bus used across the system.
pub type Bus = EventBus<Event, Request, Response>;

/// Producer half of the cross-thread bus queue.
pub type SystemBusTx = BusTx<Event, Request, Response>;

/// Consumer half of the cross-thread bus queue.
pub type SystemBusRx = BusRx<Event, Request, Response>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use vela_data::event::Quote;

    #[test]
    fn test_topic_scheme() {
        let pair = TradingPair::new("ETH", "USDC");
        let time = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let market = Event::Market(MarketEvent::new(
            time,
            time,
            ExchangeId::Hyperliquid,
            pair.clone(),
            DataKind::Quote(Quote::new(dec!(2000))),
        ));
        assert_eq!(market.topic(), "market_data.ETH/USDC");
        assert_eq!(market.time(), time);

        let disconnected = Event::Connectivity {
            exchange: ExchangeId::Hyperliquid,
            pair: None,
            connected: false,
            time,
        };
        assert_eq!(disconnected.topic(), "system.disconnected");

        assert!(topics::orderbook_delta(&pair).starts_with("orderbook.ETH/USDC"));
    }
}
