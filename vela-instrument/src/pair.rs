use serde::Deserialize;
use smol_str::{SmolStr, StrExt};
use std::fmt::{Display, Formatter};

/// Canonical trading pair of base and quote assets.
///
/// Asset names are normalised to uppercase on construction, so
/// `TradingPair::new("btc", "usdc") == TradingPair::new("BTC", "USDC")`.
/// Serialises as its `"BASE/QUOTE"` symbol, so pairs also work as JSON map
/// keys. Venue-specific symbols (eg/ the Hyperliquid "coin") are mapped to
/// and from canonical pairs by the relevant venue adapter.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TradingPair {
    base: SmolStr,
    quote: SmolStr,
}

impl serde::Serialize for TradingPair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl TradingPair {
    /// Construct a new uppercase-normalised [`TradingPair`].
    pub fn new<B, Q>(base: B, quote: Q) -> Self
    where
        B: AsRef<str>,
        Q: AsRef<str>,
    {
        Self {
            base: normalise(base.as_ref()),
            quote: normalise(quote.as_ref()),
        }
    }

    /// Base asset name (eg/ "BTC").
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote asset name (eg/ "USDC").
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Parse a `"BASE/QUOTE"` string.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let (base, quote) = symbol.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }
}

fn normalise(name: &str) -> SmolStr {
    if name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        SmolStr::new(name)
    } else {
        name.to_uppercase_smolstr()
    }
}

impl Display for TradingPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl<'de> Deserialize<'de> for TradingPair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let symbol = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        TradingPair::from_symbol(&symbol)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid trading pair: {symbol}")))
    }
}
