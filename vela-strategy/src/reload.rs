use crate::params::{ParamSchema, ParamSet};
use std::{path::PathBuf, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Outcome of a detected parameter file change.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadEvent {
    /// Parsed and validated; the runtime applies it at the next tick
    /// boundary (never mid-tick).
    Staged(ParamSet),
    /// Parse or validation failure; the previous parameters stay active and
    /// an alert is raised.
    Invalid { error: String },
}

/// File-stat poller watching a strategy parameter file.
///
/// Polls metadata on a fixed cadence (default 1s); a change in the
/// `(modified, len)` fingerprint triggers a read, parse and schema
/// validation.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    schema: ParamSchema,
    poll_interval: Duration,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, schema: ParamSchema) -> Self {
        Self {
            path: path.into(),
            schema,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll until `shutdown` fires, emitting a [`ReloadEvent`] per detected
    /// change.
    pub async fn run(
        self,
        events: mpsc::UnboundedSender<ReloadEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut fingerprint = self.fingerprint().await;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = poll.tick() => {
                    let current = self.fingerprint().await;
                    if current == fingerprint || current.is_none() {
                        continue;
                    }
                    fingerprint = current;

                    let event = self.load().await;
                    debug!(path = %self.path.display(), ?event, "parameter file changed");
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Read, parse and validate the parameter file once.
    pub async fn load(&self) -> ReloadEvent {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "failed to read parameter file");
                return ReloadEvent::Invalid {
                    error: error.to_string(),
                };
            }
        };

        let params: ParamSet = match serde_json::from_str(&raw) {
            Ok(params) => params,
            Err(error) => {
                return ReloadEvent::Invalid {
                    error: format!("parse error: {error}"),
                };
            }
        };

        match self.schema.validate(&params) {
            Ok(()) => ReloadEvent::Staged(params),
            Err(error) => ReloadEvent::Invalid {
                error: error.to_string(),
            },
        }
    }

    async fn fingerprint(&self) -> Option<(std::time::SystemTime, u64)> {
        let metadata = tokio::fs::metadata(&self.path).await.ok()?;
        Some((metadata.modified().ok()?, metadata.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schema() -> ParamSchema {
        ParamSchema::new(false).range("spread_bps", dec!(0.1), dec!(100), true)
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vela-reload-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn test_load_valid_and_invalid() {
        let path = temp_path("load");
        tokio::fs::write(&path, r#"{ "spread_bps": 5 }"#).await.unwrap();

        let watcher = ConfigWatcher::new(&path, schema());
        let ReloadEvent::Staged(params) = watcher.load().await else {
            panic!("expected staged params");
        };
        assert_eq!(params.int("spread_bps"), Some(5));

        tokio::fs::write(&path, r#"{ "spread_bps": 5000 }"#).await.unwrap();
        assert!(matches!(watcher.load().await, ReloadEvent::Invalid { .. }));

        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(matches!(watcher.load().await, ReloadEvent::Invalid { .. }));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_detects_change() {
        let path = temp_path("poll");
        tokio::fs::write(&path, r#"{ "spread_bps": 1 }"#).await.unwrap();

        let watcher = ConfigWatcher::new(&path, schema())
            .with_poll_interval(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(watcher.run(tx, shutdown_rx));

        // Let the watcher capture the initial fingerprint, then change the
        // file contents (the length change guarantees a new fingerprint).
        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::fs::write(&path, r#"{ "spread_bps": 42.5 }"#).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("watcher did not report the change")
            .unwrap();
        let ReloadEvent::Staged(params) = event else {
            panic!("expected staged params, got {event:?}");
        };
        assert_eq!(params.decimal("spread_bps"), Some(dec!(42.5)));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
