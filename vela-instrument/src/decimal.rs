use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Canonical fractional-digit scale for derived prices and PnL values.
///
/// Raw venue prices/quantities keep their native scale; values produced by
/// division (weighted-average entry prices, normalised ratios) are quantized
/// to this scale so arithmetic downstream is stable and comparable.
pub const CANONICAL_SCALE: u32 = 9;

/// Error returned when parsing a decimal string.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("invalid decimal string: {input}")]
pub struct ParseDecimalError {
    pub input: String,
}

/// Round a [`Decimal`] to the canonical 9-fractional-digit scale,
/// midpoints away from zero.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CANONICAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Checked division quantized to the requested fractional scale.
///
/// Returns `None` when `divisor` is zero.
pub fn checked_div(dividend: Decimal, divisor: Decimal, scale: u32) -> Option<Decimal> {
    dividend
        .checked_div(divisor)
        .map(|quotient| quotient.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
}

/// Parse a decimal string exactly (no float intermediary).
pub fn parse(input: &str) -> Result<Decimal, ParseDecimalError> {
    input.trim().parse::<Decimal>().map_err(|_| ParseDecimalError {
        input: input.to_string(),
    })
}
