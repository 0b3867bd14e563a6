use crate::config::LoggingConfig;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise process logging from the [`LoggingConfig`].
///
/// The configured level applies to the vela crates; the WebSocket and HTTP
/// transport internals are pinned to `warn` so a venue reconnect storm does
/// not drown the trading logs. An explicit `RUST_LOG` overrides all of it.
pub fn init_logging(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(filter(&config.level));

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)))
}

/// Default directive set for a configured base level.
fn directives(level: &str) -> String {
    format!(
        "{level},tokio_tungstenite={transport},tungstenite={transport},hyper={transport},reqwest={transport}",
        transport = transport_level(level),
    )
}

/// Transport crates stay at `warn` unless the operator is already digging
/// at `trace`.
fn transport_level(level: &str) -> &'static str {
    if level.eq_ignore_ascii_case("trace") {
        "trace"
    } else {
        "warn"
    }
}
