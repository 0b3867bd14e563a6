use crate::config::RiskConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, info};

/// Why the kill switch tripped.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchReason {
    Manual(String),
    DailyLossExceeded { loss: Decimal },
    ConsecutiveLosses { count: u32 },
    EquityBelowMinimum { equity: Decimal },
}

impl std::fmt::Display for KillSwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KillSwitchReason::Manual(reason) => write!(f, "manual: {reason}"),
            KillSwitchReason::DailyLossExceeded { loss } => {
                write!(f, "daily loss exceeded: {loss}")
            }
            KillSwitchReason::ConsecutiveLosses { count } => {
                write!(f, "consecutive losing trades: {count}")
            }
            KillSwitchReason::EquityBelowMinimum { equity } => {
                write!(f, "equity below minimum: {equity}")
            }
        }
    }
}

/// Error returned by [`KillSwitch::reset`] with a wrong token.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("kill switch reset token rejected")]
pub struct ResetTokenRejected;

/// Process-wide trading halt flag.
///
/// The flag is the only globally shared risk state: reads use acquire
/// ordering and the set uses release ordering, so activation is observable
/// by concurrent `check_order` callers before their next check returns.
/// Cancelling open orders, optionally closing positions and halting strategy
/// runtimes is coordinated by the engine manager when it observes the trip.
#[derive(Debug)]
pub struct KillSwitch {
    active: AtomicBool,
    reason: Mutex<Option<KillSwitchReason>>,
    reset_token: String,
    tripped_at: Mutex<Option<DateTime<Utc>>>,
}

impl KillSwitch {
    pub fn new(reset_token: impl Into<String>) -> Self {
        Self {
            active: AtomicBool::new(false),
            reason: Mutex::new(None),
            reset_token: reset_token.into(),
            tripped_at: Mutex::new(None),
        }
    }

    /// True while trading is halted.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Trip the switch. Returns false if it was already active (the first
    /// activation wins and keeps its reason).
    pub fn activate(&self, reason: KillSwitchReason, time: DateTime<Utc>) -> bool {
        if self.active.swap(true, Ordering::Release) {
            return false;
        }
        error!(%reason, "kill switch activated - trading halted");
        *self.reason.lock() = Some(reason);
        *self.tripped_at.lock() = Some(time);
        true
    }

    /// Re-enable trading. The operator token must match.
    pub fn reset(&self, token: &str) -> Result<(), ResetTokenRejected> {
        if token != self.reset_token {
            return Err(ResetTokenRejected);
        }
        self.active.store(false, Ordering::Release);
        *self.reason.lock() = None;
        *self.tripped_at.lock() = None;
        info!("kill switch reset - trading re-enabled");
        Ok(())
    }

    /// Reason for the current halt, if active.
    pub fn reason(&self) -> Option<KillSwitchReason> {
        self.reason.lock().clone()
    }

    pub fn tripped_at(&self) -> Option<DateTime<Utc>> {
        *self.tripped_at.lock()
    }
}

/// Automatic trigger evaluation, run after every fill and account update.
#[derive(Debug, Clone, Default)]
pub struct KillSwitchTriggers {
    consecutive_losses: u32,
}

impl KillSwitchTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a completed trade's realised PnL for the losing-streak trigger.
    pub fn record_trade(&mut self, realized_delta: Decimal) {
        if realized_delta < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else if realized_delta > Decimal::ZERO {
            self.consecutive_losses = 0;
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    /// Evaluate the automatic trip conditions against current account state.
    pub fn evaluate(
        &self,
        config: &RiskConfig,
        equity: Decimal,
        daily_loss: Decimal,
    ) -> Option<KillSwitchReason> {
        if daily_loss > config.kill_switch_threshold {
            return Some(KillSwitchReason::DailyLossExceeded { loss: daily_loss });
        }
        if config.max_consecutive_losses > 0
            && self.consecutive_losses >= config.max_consecutive_losses
        {
            return Some(KillSwitchReason::ConsecutiveLosses {
                count: self.consecutive_losses,
            });
        }
        if equity <= config.min_equity {
            return Some(KillSwitchReason::EquityBelowMinimum { equity });
        }
        None
    }
}
