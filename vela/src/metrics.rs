use fnv::FnvHashMap;
use indexmap::IndexMap;
use std::fmt::Write as _;

/// Histogram bucket upper bounds, in seconds.
pub const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Label set attached to a series, rendered in insertion order.
pub type Labels = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Default)]
struct Histogram {
    bucket_counts: [u64; LATENCY_BUCKETS.len()],
    count: u64,
    sum: f64,
}

/// In-process metrics registry rendering the Prometheus text exposition
/// format. The HTTP endpoint that serves the output is an external
/// collaborator; components only record into this registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: IndexMap<String, u64>,
    gauges: IndexMap<String, f64>,
    histograms: IndexMap<String, Histogram>,
    help: FnvHashMap<&'static str, &'static str>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        for (name, help) in [
            ("trades_total", "Fills observed per strategy, pair and side"),
            ("orders_total", "Order lifecycle transitions by terminal status"),
            ("api_requests_total", "Venue API requests by method, path and status"),
            ("alerts_total", "Alerts raised by level"),
            ("position_size", "Signed position size per pair"),
            ("position_pnl", "Unrealised PnL per pair"),
            ("win_rate", "Winning trades over decided trades per strategy"),
            ("sharpe_ratio", "Sharpe ratio per strategy"),
            ("max_drawdown", "Largest peak-to-trough equity drawdown"),
            ("memory_bytes", "Resident memory by type"),
            ("uptime_seconds", "Process uptime"),
            ("order_latency_seconds", "Submit-to-acknowledge order latency"),
            ("api_latency_seconds", "Venue API latency by method and path"),
        ] {
            registry.help.insert(name, help);
        }
        registry
    }

    /// Increment a counter series by one.
    pub fn inc_counter(&mut self, name: &'static str, labels: Labels) {
        self.add_counter(name, labels, 1);
    }

    pub fn add_counter(&mut self, name: &'static str, labels: Labels, value: u64) {
        *self.counters.entry(series_key(name, &labels)).or_insert(0) += value;
    }

    /// Set a gauge series.
    pub fn set_gauge(&mut self, name: &'static str, labels: Labels, value: f64) {
        self.gauges.insert(series_key(name, &labels), value);
    }

    /// Observe a histogram sample in seconds.
    pub fn observe_histogram(&mut self, name: &'static str, labels: Labels, seconds: f64) {
        let histogram = self
            .histograms
            .entry(series_key(name, &labels))
            .or_default();
        histogram.count += 1;
        histogram.sum += seconds;
        for (index, bound) in LATENCY_BUCKETS.iter().enumerate() {
            if seconds <= *bound {
                histogram.bucket_counts[index] += 1;
            }
        }
    }

    pub fn counter(&self, name: &'static str, labels: Labels) -> u64 {
        self.counters
            .get(&series_key(name, &labels))
            .copied()
            .unwrap_or(0)
    }

    /// Render every series in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        let mut typed: IndexMap<&str, Vec<(&str, String)>> = IndexMap::new();
        for (key, value) in &self.counters {
            typed
                .entry(metric_name(key))
                .or_default()
                .push(("counter", format!("{key} {value}\n")));
        }
        for (key, value) in &self.gauges {
            typed
                .entry(metric_name(key))
                .or_default()
                .push(("gauge", format!("{key} {value}\n")));
        }

        for (name, series) in typed {
            self.write_header(&mut output, name, series[0].0);
            for (_, line) in series {
                output.push_str(&line);
            }
        }

        for (key, histogram) in &self.histograms {
            let name = metric_name(key);
            self.write_header(&mut output, name, "histogram");
            for (index, bound) in LATENCY_BUCKETS.iter().enumerate() {
                let _write = writeln!(
                    output,
                    "{} {}",
                    bucket_key(key, &format!("{bound}")),
                    histogram.bucket_counts[index]
                );
            }
            let _write = writeln!(output, "{} {}", bucket_key(key, "+Inf"), histogram.count);
            let _write = writeln!(output, "{name}_sum {}", histogram.sum);
            let _write = writeln!(output, "{name}_count {}", histogram.count);
        }

        output
    }

    fn write_header(&self, output: &mut String, name: &str, kind: &str) {
        if let Some(help) = self.help.get(name) {
            let _write = writeln!(output, "# HELP {name} {help}");
        }
        let _write = writeln!(output, "# TYPE {name} {kind}");
    }
}

fn series_key(name: &'static str, labels: &Labels) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{value}\""))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

fn metric_name(series_key: &str) -> &str {
    series_key.split('{').next().unwrap_or(series_key)
}

fn bucket_key(series_key: &str, le: &str) -> String {
    match series_key.split_once('{') {
        Some((name, rest)) => format!("{name}_bucket{{{}le=\"{le}\"}}", {
            let labels = rest.trim_end_matches('}');
            if labels.is_empty() {
                String::new()
            } else {
                format!("{labels},")
            }
        }),
        None => format!("{series_key}_bucket{{le=\"{le}\"}}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_with_labels() {
        let mut registry = MetricsRegistry::new();
        registry.inc_counter(
            "trades_total",
            vec![
                ("strategy", "maker".into()),
                ("pair", "ETH/USDC".into()),
                ("side", "buy".into()),
            ],
        );
        registry.inc_counter(
            "trades_total",
            vec![
                ("strategy", "maker".into()),
                ("pair", "ETH/USDC".into()),
                ("side", "buy".into()),
            ],
        );

        let output = registry.render();
        assert!(output.contains("# TYPE trades_total counter"));
        assert!(output.contains(
            r#"trades_total{strategy="maker",pair="ETH/USDC",side="buy"} 2"#
        ));
    }

    #[test]
    fn test_gauge_overwrite() {
        let mut registry = MetricsRegistry::new();
        registry.set_gauge("position_size", vec![("pair", "ETH/USDC".into())], 3.0);
        registry.set_gauge("position_size", vec![("pair", "ETH/USDC".into())], -1.5);

        let output = registry.render();
        assert!(output.contains(r#"position_size{pair="ETH/USDC"} -1.5"#));
        assert!(!output.contains(r#"position_size{pair="ETH/USDC"} 3"#));
    }

    #[test]
    fn test_histogram_buckets_cumulative() {
        let mut registry = MetricsRegistry::new();
        registry.observe_histogram("order_latency_seconds", vec![], 0.004);
        registry.observe_histogram("order_latency_seconds", vec![], 0.03);
        registry.observe_histogram("order_latency_seconds", vec![], 20.0);

        let output = registry.render();
        assert!(output.contains(r#"order_latency_seconds_bucket{le="0.005"} 1"#));
        assert!(output.contains(r#"order_latency_seconds_bucket{le="0.05"} 2"#));
        assert!(output.contains(r#"order_latency_seconds_bucket{le="10"} 2"#));
        assert!(output.contains(r#"order_latency_seconds_bucket{le="+Inf"} 3"#));
        assert!(output.contains("order_latency_seconds_count 3"));
    }
}
