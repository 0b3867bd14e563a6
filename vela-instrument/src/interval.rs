use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Closed set of supported kline (candle) bar intervals.
///
/// Each interval carries a fixed millisecond length used by
/// [`KlineInterval::align`], the canonical bar-boundary operator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;
pub const MILLIS_PER_WEEK: i64 = 7 * MILLIS_PER_DAY;

impl KlineInterval {
    /// All supported intervals, smallest first.
    pub const ALL: [KlineInterval; 8] = [
        KlineInterval::Minute1,
        KlineInterval::Minute5,
        KlineInterval::Minute15,
        KlineInterval::Minute30,
        KlineInterval::Hour1,
        KlineInterval::Hour4,
        KlineInterval::Day1,
        KlineInterval::Week1,
    ];

    /// Interval length in milliseconds.
    pub fn millis(&self) -> i64 {
        match self {
            KlineInterval::Minute1 => MILLIS_PER_MINUTE,
            KlineInterval::Minute5 => 5 * MILLIS_PER_MINUTE,
            KlineInterval::Minute15 => 15 * MILLIS_PER_MINUTE,
            KlineInterval::Minute30 => 30 * MILLIS_PER_MINUTE,
            KlineInterval::Hour1 => MILLIS_PER_HOUR,
            KlineInterval::Hour4 => 4 * MILLIS_PER_HOUR,
            KlineInterval::Day1 => MILLIS_PER_DAY,
            KlineInterval::Week1 => MILLIS_PER_WEEK,
        }
    }

    /// Interval length as a [`TimeDelta`].
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.millis())
    }

    /// Interval identifier in `&str` form (eg/ "5m", "1h").
    pub fn as_str(&self) -> &'static str {
        match self {
            KlineInterval::Minute1 => "1m",
            KlineInterval::Minute5 => "5m",
            KlineInterval::Minute15 => "15m",
            KlineInterval::Minute30 => "30m",
            KlineInterval::Hour1 => "1h",
            KlineInterval::Hour4 => "4h",
            KlineInterval::Day1 => "1d",
            KlineInterval::Week1 => "1w",
        }
    }

    /// Align a timestamp down to the open of the bar containing it:
    /// `floor(ms / interval_ms) * interval_ms`.
    ///
    /// Idempotent, and `0 <= t - align(t) < interval` for all `t`.
    pub fn align(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let interval_ms = self.millis();
        let aligned_ms = time.timestamp_millis().div_euclid(interval_ms) * interval_ms;
        // In-range for any DateTime<Utc> input since aligning only moves
        // the instant towards the epoch.
        DateTime::from_timestamp_millis(aligned_ms).unwrap_or(time)
    }

    /// Open time of the bar after the one containing `time`.
    pub fn next_open(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        self.align(time) + self.duration()
    }
}

impl Display for KlineInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unsupported interval string.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("unsupported kline interval: {0}")]
pub struct ParseKlineIntervalError(pub String);

impl std::str::FromStr for KlineInterval {
    type Err = ParseKlineIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KlineInterval::ALL
            .iter()
            .find(|interval| interval.as_str() == s)
            .copied()
            .ok_or_else(|| ParseKlineIntervalError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_align_to_bar_open() {
        struct TestCase {
            interval: KlineInterval,
            input: DateTime<Utc>,
            expected: DateTime<Utc>,
        }

        let time = |y, mo, d, h, mi, s| Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap();

        let cases = vec![
            // TC0: mid-bar aligns down
            TestCase {
                interval: KlineInterval::Minute5,
                input: time(2024, 6, 1, 12, 7, 31),
                expected: time(2024, 6, 1, 12, 5, 0),
            },
            // TC1: exact boundary unchanged
            TestCase {
                interval: KlineInterval::Hour1,
                input: time(2024, 6, 1, 12, 0, 0),
                expected: time(2024, 6, 1, 12, 0, 0),
            },
            // TC2: daily bars open at midnight UTC
            TestCase {
                interval: KlineInterval::Day1,
                input: time(2024, 6, 1, 23, 59, 59),
                expected: time(2024, 6, 1, 0, 0, 0),
            },
            // TC3: weekly bars are epoch-aligned (1970-01-01 was a Thursday)
            TestCase {
                interval: KlineInterval::Week1,
                input: time(2024, 6, 5, 3, 0, 0),
                expected: time(2024, 5, 30, 0, 0, 0),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(test.interval.align(test.input), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_align_laws() {
        let time = Utc.with_ymd_and_hms(2024, 3, 15, 9, 41, 7).unwrap()
            + TimeDelta::milliseconds(123);

        for interval in KlineInterval::ALL {
            let aligned = interval.align(time);
            // Idempotent
            assert_eq!(interval.align(aligned), aligned, "{interval} not idempotent");
            // 0 <= t - align(t) < interval
            let offset = (time - aligned).num_milliseconds();
            assert!(
                (0..interval.millis()).contains(&offset),
                "{interval} offset {offset} out of range"
            );
        }
    }

    #[test]
    fn test_interval_str_round_trip() {
        for interval in KlineInterval::ALL {
            let parsed: KlineInterval = interval.as_str().parse().unwrap();
            assert_eq!(parsed, interval);
        }
        assert!("3m".parse::<KlineInterval>().is_err());
    }
}
