use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Unique identifier for a trading venue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    /// Hyperliquid perpetual futures mainnet.
    Hyperliquid,
    /// Hyperliquid perpetual futures testnet.
    HyperliquidTestnet,
    /// In-process simulated venue used by paper trading and backtests.
    Simulated,
}

impl ExchangeId {
    /// Venue identifier in `&str` form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Hyperliquid => "hyperliquid",
            ExchangeId::HyperliquidTestnet => "hyperliquid_testnet",
            ExchangeId::Simulated => "simulated",
        }
    }

    /// True if orders routed to this venue reach real markets.
    pub fn is_live(&self) -> bool {
        matches!(self, ExchangeId::Hyperliquid)
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
