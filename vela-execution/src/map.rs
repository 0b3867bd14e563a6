use crate::order::id::{ClientOrderId, OrderId};
use fnv::FnvHashMap;

/// Client to exchange order-id reconciliation map.
///
/// A retry with an already-mapped `client_id` must never create a duplicate
/// order at the venue: [`OrderIdMap::check_or_reserve`] short-circuits the
/// resubmission.
#[derive(Debug, Clone, Default)]
pub struct OrderIdMap {
    by_client: FnvHashMap<ClientOrderId, Option<OrderId>>,
    by_exchange: FnvHashMap<OrderId, ClientOrderId>,
}

/// Result of reserving a client id ahead of submission.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reservation {
    /// First sighting; proceed with the venue submission.
    New,
    /// Already submitted and awaiting the venue id; do not resubmit.
    InFlight,
    /// Already acknowledged with this venue id; do not resubmit.
    Known(OrderId),
}

impl OrderIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `client_id` for submission, short-circuiting duplicates.
    pub fn check_or_reserve(&mut self, client_id: &ClientOrderId) -> Reservation {
        match self.by_client.get(client_id) {
            None => {
                self.by_client.insert(client_id.clone(), None);
                Reservation::New
            }
            Some(None) => Reservation::InFlight,
            Some(Some(exchange_id)) => Reservation::Known(exchange_id.clone()),
        }
    }

    /// Record the venue id returned for a reserved client id.
    pub fn confirm(&mut self, client_id: &ClientOrderId, exchange_id: OrderId) {
        self.by_client
            .insert(client_id.clone(), Some(exchange_id.clone()));
        self.by_exchange.insert(exchange_id, client_id.clone());
    }

    /// Drop a reservation after a definitive rejection, allowing a fresh
    /// submission under the same client id.
    pub fn release(&mut self, client_id: &ClientOrderId) {
        if let Some(Some(exchange_id)) = self.by_client.remove(client_id) {
            self.by_exchange.remove(&exchange_id);
        }
    }

    pub fn exchange_id(&self, client_id: &ClientOrderId) -> Option<&OrderId> {
        self.by_client.get(client_id).and_then(|id| id.as_ref())
    }

    pub fn client_id(&self, exchange_id: &OrderId) -> Option<&ClientOrderId> {
        self.by_exchange.get(exchange_id)
    }
}
