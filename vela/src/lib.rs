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
#![allow(clippy::type_complexity)]

//! # Vela
//! Event-driven algorithmic trading system for perpetual futures. A single
//! in-process architecture unifies live market data ingestion, strategy
//! execution, pre-trade risk control, order routing and event-driven
//! backtesting, so a strategy behaves identically in simulated, testnet and
//! live modes.
//!
//! At a high level:
//! * [`event`] - the tagged [`Event`](event::Event) union and its bus topics.
//! * [`cache`] - last-known-value store fed from bus subscriptions.
//! * [`ledger`] - the order lifecycle, position and PnL engine.
//! * [`runtime`] - dedicated-task strategy driver with hot reload.
//! * [`queue`] - L3 book with queue-position fill models.
//! * [`backtest`] - event-scheduled replay with latency simulation.
//! * [`engine`] - runtime/session registries and kill-switch coordination.

use thiserror::Error;

/// Event-scheduled backtesting: market replay, latency models, simulated
/// venue and summary generation.
pub mod backtest;

/// Last-known-value store for quotes, books, positions, account and orders.
pub mod cache;

/// Process configuration structs and environment overrides.
pub mod config;

/// Registries of strategy runtimes and live sessions; kill-switch fan-out.
pub mod engine;

/// The [`Event`](event::Event) union, topic scheme and bus type aliases.
pub mod event;

/// Order lifecycle, position and PnL engine.
pub mod ledger;

/// Live session wiring: venue streams onto the bus with back-pressure.
pub mod live;

/// Config-driven tracing initialisation.
pub mod logging;

/// In-process metrics registry with Prometheus text exposition.
pub mod metrics;

/// Append-only NDJSON artifact writers.
pub mod persist;

/// L3 order book with FIFO queue position tracking and fill models.
pub mod queue;

/// Strategy runtime: dedicated task, serialized ticks, risk-gated orders.
pub mod runtime;

/// Per-session trading summary statistics.
pub mod summary;

/// Top-level error for system assembly and lifecycle operations.
#[derive(Debug, Error)]
pub enum VelaError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("data error: {0}")]
    Data(#[from] vela_data::error::DataError),

    #[error("execution error: {0}")]
    Execution(#[from] vela_execution::error::ExecutionError),

    #[error("bus error: {0}")]
    Bus(#[from] vela_bus::BusError),

    #[error("strategy error: {0}")]
    Strategy(#[from] vela_strategy::StrategyError),

    #[error("persistence error: {0}")]
    Persist(#[from] std::io::Error),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}
