use crate::VelaError;
use std::{
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::warn;
use vela_data::event::{DataKind, MarketEvent};

/// Load a historical event stream from a newline-delimited JSON file, one
/// [`MarketEvent`] per line. Unparseable lines are counted and skipped.
///
/// Events are sorted by exchange time so the replay clock never runs
/// backwards across symbols.
pub fn load_ndjson(path: impl AsRef<Path>) -> Result<Vec<MarketEvent<DataKind>>, VelaError> {
    let file = std::fs::File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    let mut skipped = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MarketEvent<DataKind>>(&line) {
            Ok(event) => events.push(event),
            Err(error) => {
                skipped += 1;
                warn!(%error, "skipping unparseable history line");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, path = %path.as_ref().display(), "history lines skipped");
    }

    Ok(sorted(events))
}

/// Sort an in-memory event stream by exchange time, stable for ties.
pub fn sorted(mut events: Vec<MarketEvent<DataKind>>) -> Vec<MarketEvent<DataKind>> {
    events.sort_by_key(|event| event.time_exchange);
    events
}
