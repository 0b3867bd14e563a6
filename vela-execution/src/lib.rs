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

//! # Vela-Execution
//! Order lifecycle state machine, fills, signed-size positions with
//! weighted-average entry pricing and realised/unrealised PnL, account
//! state, and the venue execution clients (Hyperliquid + mock).

use crate::{order::id::ClientOrderId, trade::Fill};
use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Serialize};

/// Account balances, equity and margin state.
pub mod account;

/// Venue execution clients and the opaque action signer.
pub mod client;

/// All execution errors.
pub mod error;

/// Client to exchange order-id reconciliation map.
pub mod map;

/// Order model, identifiers and the lifecycle state machine.
pub mod order;

/// Signed-size position with weighted-average entry and PnL.
pub mod position;

/// Fill events applied to orders and positions.
pub mod trade;

/// Order lifecycle event observed from a venue user stream (or generated by
/// the simulated venue) and published onto the bus by the execution layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, From)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEvent {
    Submitted {
        client_id: ClientOrderId,
        time: DateTime<Utc>,
    },
    Accepted {
        client_id: ClientOrderId,
        exchange_id: order::id::OrderId,
        time: DateTime<Utc>,
    },
    Rejected {
        client_id: ClientOrderId,
        reason: String,
        time: DateTime<Utc>,
    },
    Cancelled {
        client_id: ClientOrderId,
        time: DateTime<Utc>,
    },
    Expired {
        client_id: ClientOrderId,
        time: DateTime<Utc>,
    },
    #[from]
    Fill(Fill),
}

impl ExecutionEvent {
    /// Client order the event belongs to.
    pub fn client_id(&self) -> &ClientOrderId {
        match self {
            ExecutionEvent::Submitted { client_id, .. }
            | ExecutionEvent::Accepted { client_id, .. }
            | ExecutionEvent::Rejected { client_id, .. }
            | ExecutionEvent::Cancelled { client_id, .. }
            | ExecutionEvent::Expired { client_id, .. } => client_id,
            ExecutionEvent::Fill(fill) => &fill.client_id,
        }
    }

    /// Source timestamp carried by the event.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::Submitted { time, .. }
            | ExecutionEvent::Accepted { time, .. }
            | ExecutionEvent::Rejected { time, .. }
            | ExecutionEvent::Cancelled { time, .. }
            | ExecutionEvent::Expired { time, .. } => *time,
            ExecutionEvent::Fill(fill) => fill.time_exchange,
        }
    }
}
