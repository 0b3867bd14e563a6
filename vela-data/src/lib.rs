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

//! # Vela-Data
//! Market data pipeline: normalised market events, local L2 order book
//! reconstruction with snapshot+delta sequencing, candle aggregation, and the
//! Hyperliquid WebSocket data adapter with auto-reconnect.

/// Local L2 [`OrderBook`](books::OrderBook) and the snapshot+delta
/// [`BookSequencer`](books::sequencer::BookSequencer).
pub mod books;

/// OHLCV candle aggregation from public trades.
pub mod candle;

/// Venue connection state machine.
pub mod connection;

/// All market data pipeline errors.
pub mod error;

/// Normalised market event types published by venue data adapters.
pub mod event;

/// Venue-specific data adapters.
pub mod exchange;
