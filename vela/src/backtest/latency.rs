use chrono::TimeDelta;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Latency distribution sampled in whole milliseconds.
///
/// Used for both the market data feed leg and the order legs. Sampling is
/// deterministic given the engine's seeded RNG.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyModel {
    /// Fixed value.
    Constant { millis: i64 },
    /// `clamp(N(mean, std), min, max)` via the Box-Muller transform.
    Normal {
        mean_ms: f64,
        std_ms: f64,
        min_ms: i64,
        max_ms: i64,
    },
    /// Quantile-interpolated draw from an empirical sample array.
    Interpolated { samples_ms: Vec<i64> },
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self::Constant { millis: 0 }
    }
}

impl LatencyModel {
    pub fn constant(millis: i64) -> Self {
        Self::Constant { millis }
    }

    /// Draw one latency sample.
    pub fn sample(&self, rng: &mut impl Rng) -> TimeDelta {
        let millis = match self {
            LatencyModel::Constant { millis } => *millis,
            LatencyModel::Normal {
                mean_ms,
                std_ms,
                min_ms,
                max_ms,
            } => {
                let draw = mean_ms + std_ms * standard_normal(rng);
                (draw.round() as i64).clamp(*min_ms, *max_ms)
            }
            LatencyModel::Interpolated { samples_ms } => match samples_ms.len() {
                0 => 0,
                1 => samples_ms[0],
                len => {
                    // Quantile interpolation over the sorted empirical array.
                    let mut sorted = samples_ms.clone();
                    sorted.sort_unstable();
                    let u = rng.random::<f64>() * (len - 1) as f64;
                    let lower = u.floor() as usize;
                    let upper = (lower + 1).min(len - 1);
                    let frac = u - lower as f64;
                    let interpolated =
                        sorted[lower] as f64 + frac * (sorted[upper] - sorted[lower]) as f64;
                    interpolated.round() as i64
                }
            },
        };

        TimeDelta::milliseconds(millis.max(0))
    }
}

/// Standard normal draw via Box-Muller.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// The three legs of a simulated order round trip. Each leg samples
/// independently.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct OrderLatencyModel {
    /// Strategy to exchange.
    pub entry: LatencyModel,
    /// Exchange-internal processing, optional.
    pub processing: Option<LatencyModel>,
    /// Exchange back to strategy.
    pub response: LatencyModel,
}

impl OrderLatencyModel {
    pub fn constant(entry_ms: i64, response_ms: i64) -> Self {
        Self {
            entry: LatencyModel::constant(entry_ms),
            processing: None,
            response: LatencyModel::constant(response_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_constant_model() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = LatencyModel::constant(2);
        for _ in 0..10 {
            assert_eq!(model.sample(&mut rng), TimeDelta::milliseconds(2));
        }
    }

    #[test]
    fn test_normal_model_clamped() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = LatencyModel::Normal {
            mean_ms: 5.0,
            std_ms: 10.0,
            min_ms: 1,
            max_ms: 20,
        };
        for _ in 0..200 {
            let sample = model.sample(&mut rng).num_milliseconds();
            assert!((1..=20).contains(&sample), "sample {sample} out of clamp");
        }
    }

    #[test]
    fn test_interpolated_model_stays_within_hull() {
        let mut rng = StdRng::seed_from_u64(11);
        let model = LatencyModel::Interpolated {
            samples_ms: vec![10, 2, 6, 4],
        };
        for _ in 0..200 {
            let sample = model.sample(&mut rng).num_milliseconds();
            assert!((2..=10).contains(&sample), "sample {sample} outside hull");
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let model = LatencyModel::Normal {
            mean_ms: 10.0,
            std_ms: 3.0,
            min_ms: 0,
            max_ms: 50,
        };
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50).map(|_| model.sample(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }
}
