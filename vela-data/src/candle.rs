use crate::event::{Candle, PublicTrade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use vela_instrument::interval::KlineInterval;

/// Aggregates public trades into time-aligned OHLCV candles for one
/// `(pair, interval)` stream.
///
/// Bar boundaries come from [`KlineInterval::align`]. A trade landing in a
/// later bar closes the working candle and opens the next one; trades older
/// than the working bar are dropped.
#[derive(Debug, Clone)]
pub struct CandleBuilder {
    interval: KlineInterval,
    working: Option<Candle>,
}

impl CandleBuilder {
    pub fn new(interval: KlineInterval) -> Self {
        Self {
            interval,
            working: None,
        }
    }

    pub fn interval(&self) -> KlineInterval {
        self.interval
    }

    /// The bar currently being built, if any trade has arrived.
    pub fn working(&self) -> Option<&Candle> {
        self.working.as_ref()
    }

    /// Fold a trade into the aggregate. Returns the completed candle when
    /// the trade opens a new bar.
    pub fn update(&mut self, time: DateTime<Utc>, trade: &PublicTrade) -> Option<Candle> {
        let open_time = self.interval.align(time);

        match &mut self.working {
            None => {
                self.working = Some(open_candle(self.interval, open_time, trade));
                None
            }
            Some(candle) if open_time == candle.open_time => {
                candle.high = candle.high.max(trade.price);
                candle.low = candle.low.min(trade.price);
                candle.close = trade.price;
                candle.volume += trade.amount;
                candle.trade_count += 1;
                None
            }
            Some(candle) if open_time > candle.open_time => {
                let closed = candle.clone();
                self.working = Some(open_candle(self.interval, open_time, trade));
                Some(closed)
            }
            Some(candle) => {
                debug!(
                    trade_bar = %open_time,
                    working_bar = %candle.open_time,
                    "dropping trade older than working candle"
                );
                None
            }
        }
    }
}

fn open_candle(interval: KlineInterval, open_time: DateTime<Utc>, trade: &PublicTrade) -> Candle {
    Candle {
        interval,
        open_time,
        open: trade.price,
        high: trade.price,
        low: trade.price,
        close: trade.price,
        volume: trade.amount,
        trade_count: 1,
    }
}

/// Quantity-weighted average price of a candle body, used as a coarse fair
/// value when no book is available.
pub fn typical_price(candle: &Candle) -> Decimal {
    (candle.high + candle.low + candle.close) / Decimal::from(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use vela_instrument::Side;

    fn trade(price: Decimal, amount: Decimal) -> PublicTrade {
        PublicTrade::new("id".into(), price, amount, Side::Buy)
    }

    #[test]
    fn test_aggregation_within_and_across_bars() {
        let mut builder = CandleBuilder::new(KlineInterval::Minute1);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 5).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 40).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 2).unwrap();

        assert!(builder.update(t0, &trade(dec!(100), dec!(1))).is_none());
        assert!(builder.update(t1, &trade(dec!(95), dec!(2))).is_none());

        let working = builder.working().unwrap();
        assert_eq!(working.open, dec!(100));
        assert_eq!(working.low, dec!(95));
        assert_eq!(working.close, dec!(95));
        assert_eq!(working.volume, dec!(3));
        assert_eq!(working.trade_count, 2);

        // Crossing the minute boundary closes the bar.
        let closed = builder.update(t2, &trade(dec!(101), dec!(1))).unwrap();
        assert_eq!(
            closed.open_time,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(closed.close, dec!(95));

        let next = builder.working().unwrap();
        assert_eq!(next.open, dec!(101));
        assert_eq!(next.trade_count, 1);
    }

    #[test]
    fn test_late_trade_dropped() {
        let mut builder = CandleBuilder::new(KlineInterval::Minute1);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 1, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 59).unwrap();

        builder.update(t0, &trade(dec!(100), dec!(1)));
        assert!(builder.update(late, &trade(dec!(50), dec!(1))).is_none());
        assert_eq!(builder.working().unwrap().low, dec!(100));
    }

    #[test]
    fn test_typical_price() {
        let mut builder = CandleBuilder::new(KlineInterval::Minute1);
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        builder.update(t0, &trade(dec!(120), dec!(1)));
        builder.update(t0, &trade(dec!(90), dec!(1)));
        assert_eq!(typical_price(builder.working().unwrap()), dec!(100));
    }
}
