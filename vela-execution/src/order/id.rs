use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Caller-supplied unique order identifier, stable across submission retries.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }

    /// Mint a new process-unique id from the monotonic order counter.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(SmolStr::new(format!("vela-{sequence}")))
    }
}

/// Venue-assigned order identifier, populated once the order is accepted.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }
}

/// Identifier of the strategy that emitted an order intent.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    pub fn new<S: Into<SmolStr>>(id: S) -> Self {
        Self(id.into())
    }

    /// Placeholder strategy for orders issued by operators or system actions.
    pub fn unknown() -> Self {
        Self::new("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_order_id_next_unique() {
        let a = ClientOrderId::next();
        let b = ClientOrderId::next();
        assert_ne!(a, b);
        assert!(a.0.starts_with("vela-"));
    }
}
