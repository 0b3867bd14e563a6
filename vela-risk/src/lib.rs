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

//! # Vela-Risk
//! Synchronous pre-trade check chain, sliding-window order-rate limiting and
//! the process-wide kill switch. [`RiskEngine::check_order`] is evaluated on
//! the strategy runtime thread before every submission and must stay cheap:
//! it reads a prepared [`PortfolioView`] snapshot and touches no locks beyond
//! the kill-switch atomic.

use crate::{
    check::{PortfolioView, RiskDecision},
    config::RiskConfig,
    kill_switch::KillSwitch,
    rate::OrderRateWindow,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vela_execution::order::OrderRequest;

/// The fixed-order pre-trade check chain.
pub mod check;

/// Risk limit configuration.
pub mod config;

/// Process-wide kill switch flag and automatic trigger evaluation.
pub mod kill_switch;

/// Trailing-window order submission counter.
pub mod rate;

/// Pre-trade risk engine: owns the limits, the order-rate window and a handle
/// to the process-wide kill switch.
#[derive(Debug)]
pub struct RiskEngine {
    config: RiskConfig,
    kill_switch: Arc<KillSwitch>,
    rate_window: OrderRateWindow,
}

impl RiskEngine {
    pub fn new(config: RiskConfig, kill_switch: Arc<KillSwitch>) -> Self {
        let rate_window = OrderRateWindow::per_minute(config.max_orders_per_minute);
        Self {
            config,
            kill_switch,
            rate_window,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill_switch
    }

    /// Evaluate the full check chain for an order intent.
    ///
    /// Side-effect free on caller state; on a pass the submission is recorded
    /// in the trailing order-rate window.
    pub fn check_order(
        &mut self,
        request: &OrderRequest,
        view: &PortfolioView,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        let decision = check::run_chain(
            &self.config,
            &self.kill_switch,
            &mut self.rate_window,
            request,
            view,
            now,
        );

        if decision.passed {
            self.rate_window.record(now);
        }
        decision
    }
}
