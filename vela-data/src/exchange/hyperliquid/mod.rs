//! Hyperliquid market data adapter.
//!
//! Maintains a persistent WebSocket subscription to the `allMids`, `l2Book`
//! and `trades` channels and translates venue frames into normalised
//! [`MarketEvent`](crate::event::MarketEvent)s. Prices and sizes arrive as
//! decimal strings and are parsed exactly, never through floats.

use fnv::FnvHashMap;
use serde_json::json;
use smol_str::SmolStr;
use vela_instrument::pair::TradingPair;
use vela_integration::websocket::WsMessage;

/// Venue frame types and their normalisation.
pub mod message;

/// Persistent WebSocket subscriber with auto-reconnect.
pub mod stream;

/// Hyperliquid WebSocket mainnet URL.
pub const BASE_URL_HYPERLIQUID: &str = "wss://api.hyperliquid.xyz/ws";

/// Hyperliquid WebSocket testnet URL.
pub const BASE_URL_HYPERLIQUID_TESTNET: &str = "wss://api.hyperliquid-testnet.xyz/ws";

/// Quote asset implied by every Hyperliquid perpetual "coin".
pub const QUOTE_ASSET: &str = "USDC";

/// Channel identifiers understood by the subscription endpoint.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct HyperliquidChannel(pub &'static str);

impl HyperliquidChannel {
    pub const ALL_MIDS: Self = Self("allMids");
    pub const ORDER_BOOK_L2: Self = Self("l2Book");
    pub const TRADES: Self = Self("trades");
}

impl AsRef<str> for HyperliquidChannel {
    fn as_ref(&self) -> &str {
        self.0
    }
}

/// Build the subscribe frame for one `(channel, coin)` subscription.
///
/// `allMids` is account-wide and carries no coin.
pub fn subscribe_frame(channel: HyperliquidChannel, coin: Option<&str>) -> WsMessage {
    let subscription = match coin {
        Some(coin) => json!({ "type": channel.as_ref(), "coin": coin }),
        None => json!({ "type": channel.as_ref() }),
    };

    WsMessage::text(
        json!({ "method": "subscribe", "subscription": subscription }).to_string(),
    )
}

/// Application-level keepalive ping frame.
pub fn ping_frame() -> WsMessage {
    WsMessage::text(json!({ "method": "ping" }).to_string())
}

/// Maps Hyperliquid "coin" identifiers to canonical [`TradingPair`]s for the
/// subscribed universe.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    coins: FnvHashMap<SmolStr, TradingPair>,
}

impl SymbolMap {
    /// Build the map for the subscribed pairs; the Hyperliquid coin is the
    /// pair's base asset.
    pub fn new<'a>(pairs: impl IntoIterator<Item = &'a TradingPair>) -> Self {
        Self {
            coins: pairs
                .into_iter()
                .map(|pair| (SmolStr::new(pair.base()), pair.clone()))
                .collect(),
        }
    }

    /// Canonical pair for a venue coin, if subscribed.
    pub fn pair(&self, coin: &str) -> Option<&TradingPair> {
        self.coins.get(coin)
    }

    /// Subscribed venue coins.
    pub fn coins(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        self.coins.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = subscribe_frame(HyperliquidChannel::ORDER_BOOK_L2, Some("ETH"));
        let text = frame.into_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["method"], "subscribe");
        assert_eq!(value["subscription"]["type"], "l2Book");
        assert_eq!(value["subscription"]["coin"], "ETH");
    }

    #[test]
    fn test_symbol_map() {
        let pairs = vec![
            TradingPair::new("ETH", QUOTE_ASSET),
            TradingPair::new("BTC", QUOTE_ASSET),
        ];
        let map = SymbolMap::new(&pairs);

        assert_eq!(map.pair("ETH"), Some(&pairs[0]));
        assert_eq!(map.pair("DOGE"), None);
        assert_eq!(map.coins().count(), 2);
    }
}
