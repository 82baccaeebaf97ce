//! Serializable backtest configuration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use channellab_core::channel::ChannelParams;
use channellab_core::lifecycle::TradeParams;
use channellab_core::momentum::KstParams;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serializable configuration for a single backtest run.
///
/// Captures everything needed to reproduce a run: date range, capital,
/// strike selection, timeframes, and the detector/oscillator/sizing
/// parameter blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    /// Underlying symbol the premium series belong to.
    pub underlying: String,

    /// Backtest start date (inclusive)
    pub start_date: NaiveDate,

    /// Backtest end date (inclusive)
    pub end_date: NaiveDate,

    /// Starting account balance in rupees.
    pub starting_balance: f64,

    /// Strike ladder spacing (e.g. 100 for NIFTY).
    pub strike_step: u32,

    /// Strikes offset from the rounded at-the-money level, in steps.
    #[serde(default)]
    pub strike_offset: i32,

    /// Short (breakout) timeframe, minutes.
    pub short_timeframe_minutes: u32,

    /// Long (momentum) timeframe, minutes.
    pub long_timeframe_minutes: u32,

    /// Confirmation window after channel formation end, hours.
    pub overlap_window_hours: i64,

    pub channel: ChannelParams,
    pub momentum: KstParams,
    pub trade: TradeParams,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            underlying: "NIFTY".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            starting_balance: 10_000.0,
            strike_step: 100,
            strike_offset: 0,
            short_timeframe_minutes: 20,
            long_timeframe_minutes: 120,
            overlap_window_hours: 24,
            channel: ChannelParams::default(),
            momentum: KstParams::default(),
            trade: TradeParams::default(),
        }
    }
}

impl BacktestConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    /// Validation failures here are the only fatal error class; every
    /// later failure is absorbed at cycle granularity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.underlying.is_empty() {
            return Err(ConfigError::Invalid("underlying symbol is empty".into()));
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.starting_balance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "starting_balance {} must be positive",
                self.starting_balance
            )));
        }
        if self.strike_step == 0 {
            return Err(ConfigError::Invalid("strike_step must be positive".into()));
        }
        if self.short_timeframe_minutes == 0 || self.long_timeframe_minutes == 0 {
            return Err(ConfigError::Invalid("timeframes must be positive".into()));
        }
        if self.short_timeframe_minutes >= self.long_timeframe_minutes {
            return Err(ConfigError::Invalid(format!(
                "short timeframe {}m must be below long timeframe {}m",
                self.short_timeframe_minutes, self.long_timeframe_minutes
            )));
        }
        if self.overlap_window_hours <= 0 {
            return Err(ConfigError::Invalid(
                "overlap_window_hours must be positive".into(),
            ));
        }
        self.channel
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.momentum
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.trade
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Computes a deterministic hash ID for this configuration.
    ///
    /// Two runs with identical configs get the same RunId, so results can
    /// be matched up across invocations.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("BacktestConfig serialization failed");
        let hash = blake3::hash(json.as_bytes());
        format!("{}", hash.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn run_id_deterministic() {
        let config = BacktestConfig::default();
        let id1 = config.run_id();
        let id2 = config.run_id();
        assert_eq!(id1, id2, "RunId should be deterministic");
        assert!(!id1.is_empty());
    }

    #[test]
    fn run_id_changes_with_params() {
        let config1 = BacktestConfig::default();
        let mut config2 = config1.clone();
        config2.trade.profit_threshold_pct = 30.0;
        assert_ne!(
            config1.run_id(),
            config2.run_id(),
            "Different configs should have different RunIds"
        );
    }

    #[test]
    fn rejects_inverted_date_range() {
        let mut config = BacktestConfig::default();
        config.start_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        config.end_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_nested_blocks() {
        let mut config = BacktestConfig::default();
        config.trade.near_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = BacktestConfig::default();
        config.channel.min_touches = 0;
        assert!(config.validate().is_err());

        let mut config = BacktestConfig::default();
        config.momentum.signal_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_timeframes() {
        let mut config = BacktestConfig::default();
        config.short_timeframe_minutes = 120;
        config.long_timeframe_minutes = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = BacktestConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: BacktestConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
