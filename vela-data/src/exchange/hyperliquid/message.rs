use crate::{
    books::{Level, OrderBook},
    error::DataError,
    event::{DataKind, MarketEvent, OrderBookEvent, PublicTrade, Quote},
    exchange::hyperliquid::SymbolMap,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use vela_instrument::{Side, decimal, exchange::ExchangeId};

/// Inbound Hyperliquid WebSocket frame, dispatched on its `channel`
/// discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "channel", content = "data", rename_all = "camelCase")]
pub enum HyperliquidMessage {
    SubscriptionResponse(serde_json::Value),
    AllMids(HyperliquidAllMids),
    L2Book(HyperliquidL2Book),
    Trades(Vec<HyperliquidTrade>),
    Pong,
}

/// `allMids` payload: venue mid-price per coin, as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidAllMids {
    pub mids: BTreeMap<String, String>,
}

/// `l2Book` payload: a full book snapshot for one coin.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidL2Book {
    pub coin: String,
    /// Venue timestamp in milliseconds; also serves as the snapshot sequence.
    pub time: u64,
    /// `[bids, asks]`, each sorted best-first by the venue.
    pub levels: [Vec<HyperliquidLevel>; 2],
}

/// Single venue book level; `n` is the number of resting orders.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidLevel {
    pub px: String,
    pub sz: String,
    pub n: u64,
}

/// `trades` payload entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperliquidTrade {
    pub coin: String,
    pub side: Side,
    pub px: String,
    pub sz: String,
    pub time: u64,
    pub tid: u64,
}

impl HyperliquidMessage {
    /// Normalise a venue frame into market events for subscribed symbols.
    ///
    /// Frames for unsubscribed coins are skipped; control frames normalise
    /// to nothing.
    pub fn into_events(
        self,
        symbols: &SymbolMap,
        exchange: ExchangeId,
        time_received: DateTime<Utc>,
    ) -> Result<Vec<MarketEvent<DataKind>>, DataError> {
        match self {
            HyperliquidMessage::SubscriptionResponse(_) | HyperliquidMessage::Pong => Ok(vec![]),
            HyperliquidMessage::AllMids(all_mids) => all_mids
                .mids
                .into_iter()
                .filter_map(|(coin, mid)| {
                    let pair = symbols.pair(&coin)?.clone();
                    Some(parse_decimal(&mid).map(|mid| MarketEvent {
                        time_exchange: time_received,
                        time_received,
                        exchange,
                        pair,
                        kind: DataKind::Quote(Quote::new(mid)),
                    }))
                })
                .collect(),
            HyperliquidMessage::L2Book(book) => {
                let Some(pair) = symbols.pair(&book.coin).cloned() else {
                    return Err(DataError::UnknownSymbol(book.coin));
                };

                let time_exchange = epoch_millis(book.time);
                let [bids, asks] = book.levels;
                let snapshot = OrderBook::new(
                    book.time,
                    Some(time_exchange),
                    parse_levels(bids)?,
                    parse_levels(asks)?,
                );

                Ok(vec![MarketEvent {
                    time_exchange,
                    time_received,
                    exchange,
                    pair,
                    kind: DataKind::Book(OrderBookEvent::Snapshot(snapshot)),
                }])
            }
            HyperliquidMessage::Trades(trades) => trades
                .into_iter()
                .filter_map(|trade| {
                    let pair = symbols.pair(&trade.coin)?.clone();
                    Some((|| -> Result<MarketEvent<DataKind>, DataError> {
                        let price = parse_decimal(&trade.px)?;
                        let amount = parse_decimal(&trade.sz)?;
                        Ok(MarketEvent {
                            time_exchange: epoch_millis(trade.time),
                            time_received,
                            exchange,
                            pair,
                            kind: DataKind::Trade(PublicTrade::new(
                                trade.tid.to_string(),
                                price,
                                amount,
                                trade.side,
                            )),
                        })
                    })())
                })
                .collect(),
        }
    }
}

fn parse_decimal(input: &str) -> Result<rust_decimal::Decimal, DataError> {
    decimal::parse(input).map_err(|error| DataError::InvalidDecimal(error.to_string()))
}

fn parse_levels(levels: Vec<HyperliquidLevel>) -> Result<Vec<Level>, DataError> {
    levels
        .into_iter()
        .map(|level| {
            Ok(Level {
                price: parse_decimal(&level.px)?,
                amount: parse_decimal(&level.sz)?,
            })
        })
        .collect()
}

fn epoch_millis(millis: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis as i64).unwrap_or_default()
}
