use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Error returned when parsing an ISO-8601 timestamp.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("invalid ISO-8601 timestamp: {input} ({reason})")]
pub struct ParseTimestampError {
    pub input: String,
    pub reason: String,
}

/// Construct a [`DateTime<Utc>`] from milliseconds since the Unix epoch.
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Construct a [`DateTime<Utc>`] from seconds since the Unix epoch.
pub fn from_epoch_secs(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// Milliseconds are always present, so `parse_iso_millis(format_iso_millis(t)) == t`
/// for every millisecond-resolution `t`.
pub fn format_iso_millis(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp, truncating to millisecond resolution.
pub fn parse_iso_millis(input: &str) -> Result<DateTime<Utc>, ParseTimestampError> {
    let parsed = DateTime::parse_from_rfc3339(input).map_err(|error| ParseTimestampError {
        input: input.to_string(),
        reason: error.to_string(),
    })?;

    let millis = parsed.with_timezone(&Utc).timestamp_millis();
    from_epoch_millis(millis).ok_or_else(|| ParseTimestampError {
        input: input.to_string(),
        reason: "out of representable range".to_string(),
    })
}
