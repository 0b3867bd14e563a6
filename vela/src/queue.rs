use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use vela_instrument::Side;

/// Queue standing of one of "my" orders at its price level.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct QueuePosition {
    /// 0 = head of the queue.
    pub position_in_queue: usize,
    /// Remaining quantity of earlier-queued orders at the level.
    pub total_quantity_ahead: Decimal,
    /// Quantity that was ahead when the order joined.
    pub initial_quantity_ahead: Decimal,
    pub order_quantity: Decimal,
    pub queued_at: DateTime<Utc>,
}

impl QueuePosition {
    /// Progress towards the head: `clamp(ahead / max(initial_ahead, eps), 0, 1)`.
    pub fn normalized(&self) -> f64 {
        let ahead = self.total_quantity_ahead.to_f64().unwrap_or(0.0);
        let initial = self.initial_quantity_ahead.to_f64().unwrap_or(0.0);
        (ahead / initial.max(f64::EPSILON)).clamp(0.0, 1.0)
    }
}

/// Fill-probability model applied when a trade prints at the order's level
/// but the order is not yet at the head.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillModel {
    /// Fill only from (effectively) the head of the queue.
    RiskAverse,
    /// Linear: `P = 1 - x`.
    #[default]
    Probability,
    /// Optimistic: `P = 1 - x^2`.
    PowerLaw,
    /// Pessimistic: `P = 1 - log2(1 + x)`.
    Logarithmic,
}

impl FillModel {
    /// Fill probability at normalized queue position `x` in `[0, 1]`.
    pub fn fill_probability(&self, x: f64) -> f64 {
        let p = match self {
            FillModel::RiskAverse => {
                if x < 0.01 {
                    1.0
                } else {
                    0.0
                }
            }
            FillModel::Probability => 1.0 - x,
            FillModel::PowerLaw => 1.0 - x * x,
            FillModel::Logarithmic => 1.0 - (1.0 + x).log2(),
        };
        p.clamp(0.0, 1.0)
    }

    /// Decide a fill for a trade at the order's price. Head-of-queue orders
    /// always fill; otherwise the seeded RNG draws against the model.
    pub fn decide(&self, rng: &mut impl Rng, position: &QueuePosition) -> bool {
        let x = position.normalized();
        if x <= f64::EPSILON {
            return true;
        }
        rng.random::<f64>() < self.fill_probability(x)
    }
}

/// One resting order in an L3 level queue.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct L3Order {
    pub id: u64,
    pub remaining: Decimal,
    pub is_mine: bool,
    pub queued_at: DateTime<Utc>,
}

/// FIFO queue of orders at a single price level.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct L3Level {
    orders: VecDeque<L3Order>,
}

impl L3Level {
    fn push_back(&mut self, order: L3Order) {
        self.orders.push_back(order);
    }

    fn total_remaining(&self) -> Decimal {
        self.orders.iter().map(|order| order.remaining).sum()
    }

    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Fill of one of "my" orders produced by a market trade.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct QueueFill {
    pub order_id: u64,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// L3 order book: per price level, a FIFO queue of orders with `is_mine`
/// tagging and queue-position bookkeeping for my orders.
///
/// Queues preserve insertion order; `position_in_queue == 0` iff
/// `total_quantity_ahead == 0`.
#[derive(Debug, Clone, Default)]
pub struct L3Book {
    bids: BTreeMap<Decimal, L3Level>,
    asks: BTreeMap<Decimal, L3Level>,
    /// `initial_quantity_ahead` recorded when each of my orders joined.
    my_orders: BTreeMap<u64, MyOrder>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct MyOrder {
    side: Side,
    price: Decimal,
    initial_quantity_ahead: Decimal,
}

impl L3Book {
    pub fn new() -> Self {
        Self::default()
    }

    fn levels(&mut self, side: Side) -> &mut BTreeMap<Decimal, L3Level> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Append an order to the tail of its level queue, returning its id.
    /// For my orders the joining queue position is recorded.
    pub fn add_order(
        &mut self,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        is_mine: bool,
        queued_at: DateTime<Utc>,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;

        let level = self.levels(side).entry(price).or_default();
        let quantity_ahead = level.total_remaining();
        level.push_back(L3Order {
            id,
            remaining: quantity,
            is_mine,
            queued_at,
        });

        if is_mine {
            self.my_orders.insert(
                id,
                MyOrder {
                    side,
                    price,
                    initial_quantity_ahead: quantity_ahead,
                },
            );
        }
        id
    }

    /// Remove an order from its level queue.
    pub fn cancel_order(&mut self, id: u64) -> bool {
        let location = self.locate(id);
        let Some((side, price)) = location else {
            return false;
        };

        let levels = self.levels(side);
        let Some(level) = levels.get_mut(&price) else {
            return false;
        };
        let removed = level
            .orders
            .iter()
            .position(|order| order.id == id)
            .map(|index| level.orders.remove(index))
            .is_some();
        if level.is_empty() {
            levels.remove(&price);
        }
        self.my_orders.remove(&id);
        removed
    }

    /// Consume a market trade at `price` against the FIFO queue of the
    /// opposite resting side, returning fills of my orders.
    ///
    /// `resting_side` is the side of the resting orders (a market sell
    /// consumes the bid queues).
    pub fn on_trade(
        &mut self,
        resting_side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Vec<QueueFill> {
        let mut fills = Vec::new();
        let mut remaining = quantity;
        let mut fully_consumed_ids = Vec::new();

        let levels = self.levels(resting_side);
        let Some(level) = levels.get_mut(&price) else {
            return fills;
        };

        while remaining > Decimal::ZERO {
            let Some(front) = level.orders.front_mut() else {
                break;
            };
            let consumed = remaining.min(front.remaining);
            front.remaining -= consumed;
            remaining -= consumed;

            if front.is_mine {
                fills.push(QueueFill {
                    order_id: front.id,
                    quantity: consumed,
                    price,
                });
            }
            if front.remaining.is_zero() {
                if let Some(order) = level.orders.pop_front() {
                    fully_consumed_ids.push(order.id);
                }
            }
        }

        if level.is_empty() {
            levels.remove(&price);
        }
        for id in fully_consumed_ids {
            self.my_orders.remove(&id);
        }
        fills
    }

    /// Current queue standing of one of my orders.
    pub fn queue_position(&self, id: u64) -> Option<QueuePosition> {
        let my_order = self.my_orders.get(&id)?;
        let levels = match my_order.side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        let level = levels.get(&my_order.price)?;

        let mut position_in_queue = 0usize;
        let mut total_quantity_ahead = Decimal::ZERO;
        for order in &level.orders {
            if order.id == id {
                return Some(QueuePosition {
                    position_in_queue,
                    total_quantity_ahead,
                    initial_quantity_ahead: my_order.initial_quantity_ahead,
                    order_quantity: order.remaining,
                    queued_at: order.queued_at,
                });
            }
            position_in_queue += 1;
            total_quantity_ahead += order.remaining;
        }
        None
    }

    /// Reduce one of my orders in place (a model-decided fill), removing it
    /// once empty. Returns false if the order is unknown.
    pub fn reduce_order(&mut self, id: u64, quantity: Decimal) -> bool {
        let Some((side, price)) = self.locate(id) else {
            return false;
        };
        let levels = self.levels(side);
        let Some(level) = levels.get_mut(&price) else {
            return false;
        };
        let Some(index) = level.orders.iter().position(|order| order.id == id) else {
            return false;
        };

        let order = &mut level.orders[index];
        order.remaining = (order.remaining - quantity).max(Decimal::ZERO);
        let emptied = order.remaining.is_zero();
        if emptied {
            level.orders.remove(index);
        }
        if level.is_empty() {
            levels.remove(&price);
        }
        if emptied {
            self.my_orders.remove(&id);
        }
        true
    }

    /// Total resting quantity at a level, zero if absent.
    pub fn level_quantity(&self, side: Side, price: Decimal) -> Decimal {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels
            .get(&price)
            .map(L3Level::total_remaining)
            .unwrap_or(Decimal::ZERO)
    }

    fn locate(&self, id: u64) -> Option<(Side, Decimal)> {
        if let Some(my_order) = self.my_orders.get(&id) {
            return Some((my_order.side, my_order.price));
        }
        for (side, levels) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (price, level) in levels {
                if level.orders.iter().any(|order| order.id == id) {
                    return Some((side, *price));
                }
            }
        }
        None
    }
}
