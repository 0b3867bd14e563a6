use crate::order::id::ClientOrderId;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_instrument::{Side, pair::TradingPair};

/// Execution of (part of) an order, observed from a venue user stream or
/// generated by the simulated venue.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Fill {
    pub client_id: ClientOrderId,
    pub pair: TradingPair,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Fee charged for this execution, in the quote asset. Negative values
    /// are maker rebates.
    pub fee: Decimal,
    pub time_exchange: DateTime<Utc>,
}

impl Fill {
    /// Signed quantity delta this fill applies to the position
    /// (+quantity for buys, -quantity for sells).
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }

    /// Notional value of the fill.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_quantity() {
        let buy = Fill::new(
            ClientOrderId::new("a"),
            TradingPair::new("ETH", "USDC"),
            Side::Buy,
            dec!(2000),
            dec!(3),
            dec!(0.6),
            Utc::now(),
        );
        assert_eq!(buy.signed_quantity(), dec!(3));
        assert_eq!(buy.notional(), dec!(6000));

        let sell = Fill { side: Side::Sell, ..buy };
        assert_eq!(sell.signed_quantity(), dec!(-3));
    }
}
