#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Vela-Instrument
//! Core market primitives shared by every Vela component: trading pairs,
//! trade sides, venue identifiers, kline intervals with bar-boundary
//! alignment, millisecond-resolution time utilities and fixed-precision
//! decimal helpers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed-precision decimal helpers (canonical 9-fractional-digit scale).
pub mod decimal;

/// Venue identifiers.
pub mod exchange;

/// Kline (candle) bar intervals and bar-boundary alignment.
pub mod interval;

/// Canonical `TradingPair` and its venue symbol mapping.
pub mod pair;

/// Millisecond-resolution UTC time utilities and ISO-8601 round-trips.
pub mod time;

/// [`Side`] of a trade, order, or position - Buy or Sell.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b", alias = "B")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s", alias = "A")]
    Sell,
}

impl Side {
    /// Opposite [`Side`].
    pub fn inverse(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Sign of the quantity delta this [`Side`] applies to a position
    /// (+1 for Buy, -1 for Sell).
    pub fn sign(self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}
