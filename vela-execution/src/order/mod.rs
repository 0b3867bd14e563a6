use crate::{
    error::ExecutionError,
    order::id::{ClientOrderId, OrderId, StrategyId},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_instrument::{Side, decimal, pair::TradingPair};

/// Order identifiers.
pub mod id;

/// Execution type of an order.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Limit,
    Market,
    Stop,
    TakeProfit,
}

/// Time in force policy for an order.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Rest until filled or cancelled.
    GoodUntilCancelled,
    /// Fill what is immediately marketable, cancel the rest.
    ImmediateOrCancel,
    /// Fill completely and immediately, or cancel entirely.
    FillOrKill,
    /// Cancel if any part would execute immediately against the book.
    PostOnly,
}

/// Lifecycle state of an order.
///
/// Transition table (all other transitions are errors):
///
/// | from | allowed to |
/// |------|------------|
/// | Pending | Submitted, Rejected |
/// | Submitted | Accepted, Rejected, Cancelled |
/// | Accepted | PartiallyFilled, Filled, Cancelled, Expired |
/// | PartiallyFilled | PartiallyFilled, Filled, Cancelled, Expired |
/// | Filled / Cancelled / Rejected / Expired | terminal |
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
        };
        write!(f, "{status}")
    }
}

impl OrderStatus {
    /// True for states that admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// True if the lifecycle permits `self -> next`.
    pub fn can_transition(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Rejected)
                | (Submitted, Accepted)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (Accepted, PartiallyFilled)
                | (Accepted, Filled)
                | (Accepted, Cancelled)
                | (Accepted, Expired)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
                | (PartiallyFilled, Expired)
        )
    }
}

/// Order intent emitted by a strategy, validated by the risk engine and
/// routed to an execution client.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderRequest {
    pub client_id: ClientOrderId,
    pub strategy: StrategyId,
    pub pair: TradingPair,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    /// Required for limit/stop orders; `None` for pure market orders.
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    /// Forbid any increase of the absolute position size.
    pub reduce_only: bool,
}

impl OrderRequest {
    /// Notional value of the request at `price` (or the provided fallback
    /// mark for market orders).
    pub fn notional(&self, fallback_price: Decimal) -> Decimal {
        self.quantity * self.price.unwrap_or(fallback_price)
    }
}

/// Order owned by the order lifecycle engine, tracked from submission to a
/// terminal state.
///
/// Invariants: `filled_quantity <= quantity`;
/// `filled_quantity == quantity => status == Filled`; terminal states admit
/// no further mutation.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub client_id: ClientOrderId,
    pub exchange_id: Option<OrderId>,
    pub strategy: StrategyId,
    pub pair: TradingPair,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Decimal,
    pub cumulative_fee: Decimal,
    /// Venue rejection reason, cached when the order is rejected.
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Construct a new [`OrderStatus::Pending`] order from a request.
    pub fn from_request(request: OrderRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            client_id: request.client_id,
            exchange_id: None,
            strategy: request.strategy,
            pair: request.pair,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            price: request.price,
            time_in_force: request.time_in_force,
            reduce_only: request.reduce_only,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            average_fill_price: Decimal::ZERO,
            cumulative_fee: Decimal::ZERO,
            reject_reason: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Quantity still open.
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Advance the lifecycle state, enforcing the transition table.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        time: DateTime<Utc>,
    ) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::TerminalOrder {
                client_id: self.client_id.clone(),
                status: self.status,
            });
        }
        if !self.status.can_transition(next) {
            return Err(ExecutionError::InvalidTransition {
                client_id: self.client_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = time;
        Ok(())
    }

    /// Apply a fill: accumulate `filled_quantity`, recompute the
    /// quantity-weighted `average_fill_price`, and transition to
    /// `PartiallyFilled` or `Filled`.
    pub fn apply_fill(
        &mut self,
        fill_price: Decimal,
        fill_quantity: Decimal,
        fee: Decimal,
        time: DateTime<Utc>,
    ) -> Result<OrderStatus, ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::TerminalOrder {
                client_id: self.client_id.clone(),
                status: self.status,
            });
        }
        if fill_quantity > self.remaining_quantity() {
            return Err(ExecutionError::OverFill {
                client_id: self.client_id.clone(),
            });
        }

        let filled_before = self.filled_quantity;
        self.filled_quantity += fill_quantity;
        self.cumulative_fee += fee;
        self.average_fill_price = decimal::quantize(
            (self.average_fill_price * filled_before + fill_price * fill_quantity)
                / self.filled_quantity,
        );

        let next = if self.filled_quantity == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next, time)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            client_id: ClientOrderId::new("order-1"),
            strategy: StrategyId::new("test"),
            pair: TradingPair::new("ETH", "USDC"),
            side: Side::Buy,
            kind: OrderKind::Limit,
            quantity: dec!(10),
            price: Some(dec!(2000)),
            time_in_force: TimeInForce::GoodUntilCancelled,
            reduce_only: false,
        }
    }

    fn accepted_order() -> Order {
        let mut order = Order::from_request(request(), Utc::now());
        order.transition(OrderStatus::Submitted, Utc::now()).unwrap();
        order.transition(OrderStatus::Accepted, Utc::now()).unwrap();
        order
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;

        struct TestCase {
            from: OrderStatus,
            to: OrderStatus,
            expected: bool,
        }

        let cases = vec![
            TestCase { from: Pending, to: Submitted, expected: true },
            TestCase { from: Pending, to: Rejected, expected: true },
            TestCase { from: Pending, to: Accepted, expected: false },
            TestCase { from: Submitted, to: Accepted, expected: true },
            TestCase { from: Submitted, to: Cancelled, expected: true },
            TestCase { from: Submitted, to: Filled, expected: false },
            TestCase { from: Accepted, to: PartiallyFilled, expected: true },
            TestCase { from: Accepted, to: Filled, expected: true },
            TestCase { from: Accepted, to: Expired, expected: true },
            TestCase { from: PartiallyFilled, to: PartiallyFilled, expected: true },
            TestCase { from: PartiallyFilled, to: Filled, expected: true },
            TestCase { from: Filled, to: Cancelled, expected: false },
            TestCase { from: Cancelled, to: Accepted, expected: false },
            TestCase { from: Rejected, to: Submitted, expected: false },
            TestCase { from: Expired, to: PartiallyFilled, expected: false },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(
                test.from.can_transition(test.to),
                test.expected,
                "TC{index} failed: {} -> {}",
                test.from,
                test.to
            );
        }
    }

    #[test]
    fn test_terminal_orders_immutable() {
        let mut order = accepted_order();
        order.transition(OrderStatus::Cancelled, Utc::now()).unwrap();

        let error = order.transition(OrderStatus::Filled, Utc::now()).unwrap_err();
        assert!(matches!(error, ExecutionError::TerminalOrder { .. }));

        let error = order
            .apply_fill(dec!(2000), dec!(1), Decimal::ZERO, Utc::now())
            .unwrap_err();
        assert!(matches!(error, ExecutionError::TerminalOrder { .. }));
    }

    #[test]
    fn test_partial_fills_accumulate_weighted_average() {
        let mut order = accepted_order();

        let status = order
            .apply_fill(dec!(2000), dec!(4), dec!(1), Utc::now())
            .unwrap();
        assert_eq!(status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(4));
        assert_eq!(order.average_fill_price, dec!(2000));

        let status = order
            .apply_fill(dec!(2100), dec!(6), dec!(1.5), Utc::now())
            .unwrap();
        assert_eq!(status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, dec!(10));
        // (2000*4 + 2100*6) / 10
        assert_eq!(order.average_fill_price, dec!(2060));
        assert_eq!(order.cumulative_fee, dec!(2.5));
        assert_eq!(order.remaining_quantity(), Decimal::ZERO);
    }

    #[test]
    fn test_overfill_rejected() {
        let mut order = accepted_order();
        order
            .apply_fill(dec!(2000), dec!(9), Decimal::ZERO, Utc::now())
            .unwrap();

        let error = order
            .apply_fill(dec!(2000), dec!(2), Decimal::ZERO, Utc::now())
            .unwrap_err();
        assert!(matches!(error, ExecutionError::OverFill { .. }));
        assert_eq!(order.filled_quantity, dec!(9));
    }

    #[test]
    fn test_exact_fill_transitions_to_filled() {
        let mut order = accepted_order();
        let status = order
            .apply_fill(dec!(1999.5), dec!(10), Decimal::ZERO, Utc::now())
            .unwrap();
        assert_eq!(status, OrderStatus::Filled);
        assert!(order.status.is_terminal());
    }
}
