use crate::order::{OrderStatus, id::ClientOrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vela_integration::error::SocketError;

/// All errors generated by the execution layer.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("order {client_id} transition {from} -> {to} is not allowed")]
    InvalidTransition {
        client_id: ClientOrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {client_id} is terminal in state {status} and admits no further mutation")]
    TerminalOrder {
        client_id: ClientOrderId,
        status: OrderStatus,
    },

    #[error("fill for order {client_id} exceeds remaining quantity")]
    OverFill { client_id: ClientOrderId },

    #[error("unknown order: {0}")]
    UnknownOrder(ClientOrderId),

    #[error("venue rejected order {client_id}: {kind} ({reason})")]
    VenueReject {
        client_id: ClientOrderId,
        kind: VenueRejectKind,
        reason: String,
    },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("signer failed: {0}")]
    Signer(String),
}

/// Machine-readable classification of a venue order rejection, cached on the
/// order record and surfaced to the emitting strategy.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VenueRejectKind {
    InsufficientBalance,
    RateLimited,
    InvalidOrder,
    Other,
}

impl std::fmt::Display for VenueRejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            VenueRejectKind::InsufficientBalance => "insufficient_balance",
            VenueRejectKind::RateLimited => "rate_limited",
            VenueRejectKind::InvalidOrder => "invalid_order",
            VenueRejectKind::Other => "other",
        };
        write!(f, "{kind}")
    }
}

impl VenueRejectKind {
    /// Classify a venue rejection reason string.
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        if reason.contains("insufficient") || reason.contains("margin") {
            VenueRejectKind::InsufficientBalance
        } else if reason.contains("rate") || reason.contains("too many") {
            VenueRejectKind::RateLimited
        } else if reason.contains("invalid") || reason.contains("tick") || reason.contains("size") {
            VenueRejectKind::InvalidOrder
        } else {
            VenueRejectKind::Other
        }
    }
}
