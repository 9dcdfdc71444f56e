//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! initial_cash = 1000000.0
//! commission_rate = 0.0003
//! lot_size = 100
//! start = "2024-01-01"
//! end = "2024-06-30"
//!
//! [data]
//! source = "csv"
//! dir = "data"
//! symbols = ["000001", "600000"]
//!
//! [strategy]
//! type = "ma_breakout"
//! window = 20
//! buy_fraction = 0.5
//!
//! [output]
//! dir = "runs"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use replaylab_core::broker::{BrokerConfig, DEFAULT_LOT_SIZE};
use replaylab_core::data::{DataSource, UnsupportedSource};
use replaylab_core::strategies::{BuyAndHold, MaBreakout};
use replaylab_core::{DateWindow, Strategy, StrategyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variables consulted by [`BacktestConfig::apply_env_overrides`].
pub const ENV_INITIAL_CASH: &str = "REPLAYLAB_INITIAL_CASH";
pub const ENV_COMMISSION_RATE: &str = "REPLAYLAB_COMMISSION_RATE";
pub const ENV_DATA_SOURCE: &str = "REPLAYLAB_DATA_SOURCE";
pub const ENV_DATA_DIR: &str = "REPLAYLAB_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field} date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    UnsupportedSource(#[from] UnsupportedSource),

    #[error("data source '{0}' requires [data] dir")]
    MissingDataDir(DataSource),

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub backtest: BacktestSection,
    pub data: DataSection,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_cash: f64,
    pub commission_rate: f64,
    pub lot_size: u64,
    /// Inclusive start date, `YYYY-MM-DD`.
    pub start: Option<String>,
    /// Inclusive end date, `YYYY-MM-DD`.
    pub end: Option<String>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let broker = BrokerConfig::default();
        Self {
            initial_cash: broker.initial_cash,
            commission_rate: broker.commission_rate,
            lot_size: DEFAULT_LOT_SIZE,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSection {
    /// One of `csv`, `parquet`, `synthetic`, `memory`. No default.
    pub source: String,
    pub dir: Option<PathBuf>,
    pub symbols: Vec<String>,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_adjust")]
    pub adjust: String,
    /// Store vendor subdirectory for the parquet layout.
    #[serde(default = "default_vendor")]
    pub vendor: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Seed for the synthetic source.
    #[serde(default)]
    pub seed: u64,
    /// Number of business days the synthetic source generates.
    #[serde(default = "default_synthetic_days")]
    pub synthetic_days: usize,
}

fn default_period() -> String {
    "1d".into()
}

fn default_adjust() -> String {
    "qfq".into()
}

fn default_vendor() -> String {
    "akshare".into()
}

fn default_pool_size() -> usize {
    10
}

fn default_synthetic_days() -> usize {
    250
}

/// Built-in strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    BuyAndHold {
        #[serde(default = "default_hold_fraction")]
        fraction: f64,
    },
    MaBreakout {
        #[serde(default = "default_ma_window")]
        window: usize,
        #[serde(default = "default_buy_fraction")]
        buy_fraction: f64,
    },
}

fn default_hold_fraction() -> f64 {
    BuyAndHold::DEFAULT_FRACTION
}

fn default_ma_window() -> usize {
    20
}

fn default_buy_fraction() -> f64 {
    0.5
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::BuyAndHold {
            fraction: default_hold_fraction(),
        }
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuyAndHold { .. } => "buy_and_hold",
            Self::MaBreakout { .. } => "ma_breakout",
        }
    }

    /// Instantiate the strategy, rejecting out-of-range parameters.
    pub fn build(&self) -> Result<Box<dyn Strategy>, ConfigError> {
        let invalid = |e: StrategyError| ConfigError::Invalid(e.to_string());
        Ok(match *self {
            Self::BuyAndHold { fraction } => Box::new(BuyAndHold::new(fraction).map_err(invalid)?),
            Self::MaBreakout {
                window,
                buy_fraction,
            } => Box::new(MaBreakout::new(window, buy_fraction).map_err(invalid)?),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.build().map(drop)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("runs"),
        }
    }
}

impl BacktestConfig {
    /// Minimal config with default `[backtest]`, `[strategy]` and `[output]`.
    pub fn new(source: DataSource, symbols: Vec<String>) -> Self {
        Self {
            backtest: BacktestSection::default(),
            data: DataSection {
                source: source.to_string(),
                dir: None,
                symbols,
                period: default_period(),
                adjust: default_adjust(),
                vendor: default_vendor(),
                pool_size: default_pool_size(),
                seed: 0,
                synthetic_days: default_synthetic_days(),
            },
            strategy: StrategyConfig::default(),
            output: OutputSection::default(),
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` maps a variable name to its value; pass `|k| std::env::var(k).ok()`
    /// for the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_INITIAL_CASH) {
            self.backtest.initial_cash = parse_env(ENV_INITIAL_CASH, &value)?;
        }
        if let Some(value) = lookup(ENV_COMMISSION_RATE) {
            self.backtest.commission_rate = parse_env(ENV_COMMISSION_RATE, &value)?;
        }
        if let Some(value) = lookup(ENV_DATA_SOURCE) {
            self.data.source = value;
        }
        if let Some(value) = lookup(ENV_DATA_DIR) {
            self.data.dir = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Check everything that can be checked before touching any data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        if !(b.initial_cash.is_finite() && b.initial_cash > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_cash must be positive, got {}",
                b.initial_cash
            )));
        }
        if !(b.commission_rate.is_finite() && b.commission_rate >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "commission_rate must be non-negative, got {}",
                b.commission_rate
            )));
        }
        if b.lot_size == 0 {
            return Err(ConfigError::Invalid("lot_size must be at least 1".into()));
        }
        self.date_window()?;

        let source = self.data_source()?;
        if matches!(source, DataSource::Csv | DataSource::Parquet) && self.data.dir.is_none() {
            return Err(ConfigError::MissingDataDir(source));
        }
        if self.data.symbols.is_empty() {
            return Err(ConfigError::Invalid("[data] symbols must not be empty".into()));
        }
        if self.data.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        self.strategy.validate()
    }

    pub fn data_source(&self) -> Result<DataSource, ConfigError> {
        Ok(self.data.source.parse::<DataSource>()?)
    }

    pub fn start_date(&self) -> Result<Option<NaiveDate>, ConfigError> {
        parse_date("start", self.backtest.start.as_deref())
    }

    pub fn end_date(&self) -> Result<Option<NaiveDate>, ConfigError> {
        parse_date("end", self.backtest.end.as_deref())
    }

    pub fn date_window(&self) -> Result<DateWindow, ConfigError> {
        let start = self.start_date()?;
        let end = self.end_date()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ConfigError::InvalidDateRange { start, end });
            }
        }
        DateWindow::new(start, end).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            initial_cash: self.backtest.initial_cash,
            commission_rate: self.backtest.commission_rate,
            lot_size: self.backtest.lot_size,
        }
    }
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, ConfigError> {
    raw.map(|value| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
            field,
            value: value.to_string(),
        })
    })
    .transpose()
}

fn parse_env(var: &'static str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
