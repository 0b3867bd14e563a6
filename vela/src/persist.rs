use crate::VelaError;
use serde::Serialize;
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use vela_instrument::{interval::KlineInterval, pair::TradingPair};

/// Append one value as a JSON line to the file at `path`, creating it if
/// absent. The artifact files are append-only; compatibility across
/// versions is not guaranteed.
pub fn append_json_line<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), VelaError> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    let line = serde_json::to_string(value)
        .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidData, error))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Artifact path for closed candles of one `(pair, interval)` stream.
pub fn candle_path(dir: impl AsRef<Path>, pair: &TradingPair, interval: KlineInterval) -> PathBuf {
    dir.as_ref().join(format!(
        "candles_{}{}_{}.json",
        pair.base(),
        pair.quote(),
        interval.as_str()
    ))
}

/// Artifact path for backtest summaries.
pub fn backtest_results_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join("backtest_results.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Artifact {
        run: u32,
        pnl: String,
    }

    #[test]
    fn test_append_only_lines() {
        let dir = std::env::temp_dir().join(format!("vela-persist-{}", std::process::id()));
        let path = backtest_results_path(&dir);

        append_json_line(&path, &Artifact { run: 1, pnl: "10.5".into() }).unwrap();
        append_json_line(&path, &Artifact { run: 2, pnl: "-3".into() }).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Artifact> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], Artifact { run: 2, pnl: "-3".into() });

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_candle_path_shape() {
        let path = candle_path(
            "/tmp/artifacts",
            &TradingPair::new("ETH", "USDC"),
            KlineInterval::Minute5,
        );
        assert_eq!(
            path,
            PathBuf::from("/tmp/artifacts/candles_ETHUSDC_5m.json")
        );
    }
}
