//! CSV ingestion for the runner.
//!
//! The underlying series comes from a single CSV; premium series come from
//! one CSV per contract in a directory, with the contract encoded in the
//! file name: `<STRIKE><CE|PE>_<YYYY-MM-DD>.csv` (strike, option type,
//! expiry). Rows are `timestamp,open,high,low,close,volume` with
//! `YYYY-MM-DD HH:MM:SS` timestamps.

use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use channellab_core::domain::{Candle, OptionType, Timeframe};

use crate::data::{ContractKey, MarketData};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("unrecognized premium file name '{0}' (expected <STRIKE><CE|PE>_<YYYY-MM-DD>.csv)")]
    BadFileName(String),

    #[error("{path}: candles are not chronologically sorted")]
    Unsorted { path: String },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(deserialize_with = "de_timestamp")]
    timestamp: chrono::NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Accepts both `2024-05-27 09:15:00` and `2024-05-27T09:15:00`.
fn de_timestamp<'de, D>(deserializer: D) -> Result<chrono::NaiveDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(serde::de::Error::custom)
}

/// Load the underlying series plus every premium CSV under `premium_dir`.
pub fn load_market_data(
    underlying_csv: &Path,
    premium_dir: &Path,
    base_timeframe: Timeframe,
) -> Result<MarketData, LoadError> {
    let mut data = MarketData {
        underlying: load_series(underlying_csv, base_timeframe)?,
        ..MarketData::default()
    };

    let entries = std::fs::read_dir(premium_dir).map_err(|source| LoadError::Io {
        path: premium_dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| LoadError::Io {
            path: premium_dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let key = parse_contract_file_name(&path)?;
        let series = load_series(&path, base_timeframe)?;
        data.premiums.insert(key, series);
    }
    Ok(data)
}

/// Load one OHLCV CSV into chronologically sorted candles, dropping rows
/// that fail the OHLC sanity check.
pub fn load_series(path: &Path, timeframe: Timeframe) -> Result<Vec<Candle>, LoadError> {
    let display = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|source| LoadError::Csv {
        path: display.clone(),
        source,
    })?;

    let mut out = Vec::new();
    for row in reader.deserialize() {
        let row: CsvRow = row.map_err(|source| LoadError::Csv {
            path: display.clone(),
            source,
        })?;
        let candle = Candle {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            timeframe,
        };
        // Feed glitches (NaN fields, high < low, non-positive prices) are
        // dropped here so nothing downstream sees them.
        if !candle.is_sane() {
            continue;
        }
        out.push(candle);
    }
    if out.windows(2).any(|w| w[0].timestamp >= w[1].timestamp) {
        return Err(LoadError::Unsorted { path: display });
    }
    Ok(out)
}

/// `23500CE_2024-05-30.csv` -> strike 23500, Call, expiry 2024-05-30.
fn parse_contract_file_name(path: &Path) -> Result<ContractKey, LoadError> {
    let bad = || LoadError::BadFileName(path.display().to_string());
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(bad)?;
    let (contract, expiry) = stem.split_once('_').ok_or_else(bad)?;
    let expiry = NaiveDate::parse_from_str(expiry, "%Y-%m-%d").map_err(|_| bad())?;

    let (strike, option_type) = if let Some(s) = contract.strip_suffix("CE") {
        (s, OptionType::Call)
    } else if let Some(s) = contract.strip_suffix("PE") {
        (s, OptionType::Put)
    } else {
        return Err(bad());
    };
    let strike: u32 = strike.parse().map_err(|_| bad())?;

    Ok(ContractKey {
        strike,
        option_type,
        expiry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_contract_file_names() {
        let key = parse_contract_file_name(Path::new("/data/23500CE_2024-05-30.csv")).unwrap();
        assert_eq!(key.strike, 23_500);
        assert_eq!(key.option_type, OptionType::Call);
        assert_eq!(key.expiry, NaiveDate::from_ymd_opt(2024, 5, 30).unwrap());

        let key = parse_contract_file_name(Path::new("22000PE_2024-01-04.csv")).unwrap();
        assert_eq!(key.option_type, OptionType::Put);
    }

    #[test]
    fn rejects_malformed_file_names() {
        for name in ["readme.csv", "23500XX_2024-05-30.csv", "23500CE.csv", "CE_2024-05-30.csv"] {
            assert!(parse_contract_file_name(Path::new(name)).is_err(), "{name}");
        }
    }

    #[test]
    fn loads_a_series_and_rejects_unsorted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-05-27 09:15:00,100.0,101.0,99.0,100.5,1200").unwrap();
        writeln!(f, "2024-05-27 09:35:00,100.5,102.0,100.0,101.0,900").unwrap();
        drop(f);

        let series = load_series(&path, Timeframe::MIN_20).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].close, 100.5);
        assert_eq!(series[1].volume, 900);

        let path = dir.path().join("bad.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-05-27 09:35:00,100.5,102.0,100.0,101.0,900").unwrap();
        writeln!(f, "2024-05-27 09:15:00,100.0,101.0,99.0,100.5,1200").unwrap();
        drop(f);
        assert!(matches!(
            load_series(&path, Timeframe::MIN_20),
            Err(LoadError::Unsorted { .. })
        ));
    }

    #[test]
    fn drops_insane_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glitchy.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-05-27 09:15:00,100.0,101.0,99.0,100.5,1200").unwrap();
        // NaN close, then inverted high/low.
        writeln!(f, "2024-05-27 09:20:00,100.5,102.0,100.0,NaN,900").unwrap();
        writeln!(f, "2024-05-27 09:25:00,100.5,99.0,102.0,100.0,800").unwrap();
        writeln!(f, "2024-05-27 09:30:00,100.5,102.0,100.0,101.0,700").unwrap();
        drop(f);

        let series = load_series(&path, Timeframe::MIN_20).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].volume, 1200);
        assert_eq!(series[1].volume, 700);
        assert!(series.iter().all(|c| c.is_sane()));
    }

    #[test]
    fn loads_premiums_keyed_by_contract() {
        let dir = tempfile::tempdir().unwrap();
        let underlying = dir.path().join("underlying.csv");
        let mut f = std::fs::File::create(&underlying).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-05-27 09:15:00,23460,23470,23450,23465,5000").unwrap();
        drop(f);

        let premiums = dir.path().join("premiums");
        std::fs::create_dir(&premiums).unwrap();
        let mut f = std::fs::File::create(premiums.join("23500CE_2024-05-30.csv")).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-05-27 09:15:00,100.0,101.0,99.0,100.5,1200").unwrap();
        drop(f);
        // Non-CSV files are skipped.
        std::fs::File::create(premiums.join("notes.txt")).unwrap();

        let data = load_market_data(&underlying, &premiums, Timeframe::MIN_20).unwrap();
        assert_eq!(data.underlying.len(), 1);
        assert_eq!(data.premiums.len(), 1);
        let key = ContractKey {
            strike: 23_500,
            option_type: OptionType::Call,
            expiry: NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        };
        assert!(data.premium_series(&key).is_some());
    }
}
