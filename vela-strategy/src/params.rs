use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// A single strategy parameter value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(SmolStr),
}

impl ParamValue {
    /// Numeric view used for range validation.
    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ParamValue::Int(value) => Some(Decimal::from(*value)),
            ParamValue::Decimal(value) => Some(*value),
            ParamValue::Bool(_) | ParamValue::Text(_) => None,
        }
    }
}

/// Named parameter values for one strategy instance.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ParamSet {
    values: FnvHashMap<SmolStr, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<SmolStr>, value: ParamValue) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        self.values.get(name).and_then(ParamValue::as_decimal)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ParamValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> + '_ {
        self.values.keys()
    }
}

/// Validation failure for a parameter set.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParamError {
    #[error("missing required parameter: {0}")]
    Missing(SmolStr),

    #[error("parameter {name} = {value} outside range [{min}, {max}]")]
    OutOfRange {
        name: SmolStr,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("parameter {0} has the wrong type")]
    WrongType(SmolStr),

    #[error("unknown parameter: {0}")]
    Unknown(SmolStr),
}

/// Declared range for one numeric parameter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ParamRange {
    pub min: Decimal,
    pub max: Decimal,
    pub required: bool,
}

/// Per-strategy parameter schema: names, numeric ranges and required flags.
///
/// Hot-reloaded parameter sets must validate against the schema before they
/// are staged; a failed validation keeps the previous set active.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ParamSchema {
    ranges: FnvHashMap<SmolStr, ParamRange>,
    /// Reject parameters not declared in the schema.
    pub strict: bool,
}

impl ParamSchema {
    pub fn new(strict: bool) -> Self {
        Self {
            ranges: FnvHashMap::default(),
            strict,
        }
    }

    pub fn range(
        mut self,
        name: impl Into<SmolStr>,
        min: Decimal,
        max: Decimal,
        required: bool,
    ) -> Self {
        self.ranges.insert(name.into(), ParamRange { min, max, required });
        self
    }

    /// Validate a parameter set against the schema.
    pub fn validate(&self, params: &ParamSet) -> Result<(), ParamError> {
        for (name, range) in &self.ranges {
            match params.get(name) {
                None if range.required => return Err(ParamError::Missing(name.clone())),
                None => {}
                Some(value) => {
                    let Some(value) = value.as_decimal() else {
                        return Err(ParamError::WrongType(name.clone()));
                    };
                    if value < range.min || value > range.max {
                        return Err(ParamError::OutOfRange {
                            name: name.clone(),
                            value,
                            min: range.min,
                            max: range.max,
                        });
                    }
                }
            }
        }

        if self.strict {
            for name in params.names() {
                if !self.ranges.contains_key(name) {
                    return Err(ParamError::Unknown(name.clone()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schema() -> ParamSchema {
        ParamSchema::new(true)
            .range("spread_bps", dec!(0.1), dec!(100), true)
            .range("order_size", dec!(0.001), dec!(10), true)
            .range("max_open", dec!(1), dec!(20), false)
    }

    fn valid_params() -> ParamSet {
        let mut params = ParamSet::new();
        params
            .set("spread_bps", ParamValue::Decimal(dec!(5)))
            .set("order_size", ParamValue::Decimal(dec!(0.5)));
        params
    }

    #[test]
    fn test_valid_set_passes() {
        assert_eq!(schema().validate(&valid_params()), Ok(()));
    }

    #[test]
    fn test_validation_failures() {
        struct TestCase {
            mutate: fn(&mut ParamSet),
            expected: fn(&ParamError) -> bool,
        }

        let cases = vec![
            // TC0: missing required parameter
            TestCase {
                mutate: |params| {
                    params.values.remove("order_size");
                },
                expected: |error| matches!(error, ParamError::Missing(name) if name == "order_size"),
            },
            // TC1: out of range
            TestCase {
                mutate: |params| {
                    params.set("spread_bps", ParamValue::Decimal(dec!(1000)));
                },
                expected: |error| matches!(error, ParamError::OutOfRange { .. }),
            },
            // TC2: wrong type for a numeric range
            TestCase {
                mutate: |params| {
                    params.set("spread_bps", ParamValue::Text("wide".into()));
                },
                expected: |error| matches!(error, ParamError::WrongType(_)),
            },
            // TC3: unknown parameter under strict schema
            TestCase {
                mutate: |params| {
                    params.set("mystery", ParamValue::Int(1));
                },
                expected: |error| matches!(error, ParamError::Unknown(_)),
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let mut params = valid_params();
            (test.mutate)(&mut params);
            let error = schema().validate(&params).unwrap_err();
            assert!((test.expected)(&error), "TC{index} failed: {error}");
        }
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"{ "spread_bps": 5, "order_size": 0.5, "enabled": true, "mode": "maker" }"#;
        let params: ParamSet = serde_json::from_str(json).unwrap();

        assert_eq!(params.int("spread_bps"), Some(5));
        assert_eq!(params.decimal("order_size"), Some(dec!(0.5)));
        assert_eq!(params.bool("enabled"), Some(true));
        assert_eq!(params.text("mode"), Some("maker"));
    }
}
