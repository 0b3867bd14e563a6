use crate::books::{BookDelta, OrderBook};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_instrument::{Side, exchange::ExchangeId, interval::KlineInterval, pair::TradingPair};

/// Normalised market event produced by a venue data adapter.
///
/// `time_exchange` is the venue-reported source timestamp; `time_received`
/// is stamped on arrival at the adapter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct MarketEvent<Kind = DataKind> {
    pub time_exchange: DateTime<Utc>,
    pub time_received: DateTime<Utc>,
    pub exchange: ExchangeId,
    pub pair: TradingPair,
    pub kind: Kind,
}

impl<Kind> MarketEvent<Kind> {
    /// Map the event payload, keeping the envelope.
    pub fn map_kind<NewKind>(self, op: impl FnOnce(Kind) -> NewKind) -> MarketEvent<NewKind> {
        MarketEvent {
            time_exchange: self.time_exchange,
            time_received: self.time_received,
            exchange: self.exchange,
            pair: self.pair,
            kind: op(self.kind),
        }
    }
}

/// Union of all market data payload kinds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Quote(Quote),
    Trade(PublicTrade),
    Book(OrderBookEvent),
    Candle(Candle),
}

impl DataKind {
    /// Shedding priority of the payload under bus back-pressure: lower
    /// priority frames are dropped first (trades before deltas before
    /// snapshots); quotes shed with trades.
    pub fn shed_priority(&self) -> FramePriority {
        match self {
            DataKind::Trade(_) | DataKind::Quote(_) | DataKind::Candle(_) => FramePriority::Low,
            DataKind::Book(OrderBookEvent::Delta(_)) => FramePriority::Medium,
            DataKind::Book(OrderBookEvent::Snapshot(_)) => FramePriority::High,
        }
    }
}

/// Drop priority of a market data frame under back-pressure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum FramePriority {
    Low,
    Medium,
    High,
}

/// Best-estimate fair price for an instrument (the venue mid).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Constructor)]
pub struct Quote {
    pub mid: Decimal,
}

/// Normalised public trade.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize, Constructor)]
pub struct PublicTrade {
    pub id: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub side: Side,
}

/// L2 order book event: a full snapshot replacing local state, or an
/// incremental delta.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum OrderBookEvent {
    Snapshot(OrderBook),
    Delta(BookDelta),
}

/// Time-aligned OHLCV aggregate for one bar interval.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Candle {
    pub interval: KlineInterval,
    /// Bar open time, aligned by [`KlineInterval::align`].
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
}

/// Item yielded by a venue data adapter: a market event, or a connectivity
/// transition for the venue feed (`pair: None`) or a single symbol's book
/// (`pair: Some(..)`, used for the crossed-book reset cycle).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
pub enum MarketStreamEvent<Kind = DataKind> {
    #[from]
    Item(MarketEvent<Kind>),
    Connected {
        exchange: ExchangeId,
        pair: Option<TradingPair>,
    },
    Disconnected {
        exchange: ExchangeId,
        pair: Option<TradingPair>,
    },
}
