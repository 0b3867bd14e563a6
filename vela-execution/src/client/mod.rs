use crate::{
    account::Account,
    error::ExecutionError,
    order::{Order, OrderRequest, id::ClientOrderId, id::OrderId},
    position::Position,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use vela_instrument::{exchange::ExchangeId, pair::TradingPair};

/// Hyperliquid REST/WS execution client.
pub mod hyperliquid;

/// In-memory execution client used by paper trading and tests.
pub mod mock;

/// Acknowledgement returned by a successful submission.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderAck {
    pub client_id: ClientOrderId,
    pub exchange_id: OrderId,
    pub time: DateTime<Utc>,
}

/// Capability set exposed by every venue execution adapter.
///
/// Implementations reconcile venue order ids with client ids and emit order
/// lifecycle events onto the bus for every state change observed on the
/// venue user stream. A cancelled in-flight submission gives no guarantee
/// the venue never saw the order; implementations reconcile via the user
/// stream before reporting a final status.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Venue this client executes on.
    fn exchange(&self) -> ExchangeId;

    /// Submit an order. Idempotent per `client_id`: retries never create a
    /// duplicate venue order.
    async fn submit(&self, request: OrderRequest) -> Result<OrderAck, ExecutionError>;

    /// Cancel one order. Returns false if the order is unknown or already
    /// terminal.
    async fn cancel(&self, client_id: &ClientOrderId) -> Result<bool, ExecutionError>;

    /// Cancel every open order, returning the cancelled count.
    async fn cancel_all(&self) -> Result<usize, ExecutionError>;

    /// Latest known state of one order.
    async fn order_status(&self, client_id: &ClientOrderId)
    -> Result<Option<Order>, ExecutionError>;

    /// Venue-reported position for a symbol.
    async fn position(&self, pair: &TradingPair) -> Result<Option<Position>, ExecutionError>;

    /// Venue-reported account state.
    async fn account(&self) -> Result<Account, ExecutionError>;
}
