//! Backtest runner: wires together data loading, the simulation loop, and metrics.
//!
//! Two entry points:
//! - `run_from_config()`: builds the configured provider, loads every symbol
//!   through the worker pool, then runs. Used by the CLI.
//! - `run_with_data()`: takes pre-loaded data and an injected strategy. No I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use replaylab_core::data::{
    load_market_data, CsvProvider, DataError, DataProvider, DataSource, MarketData, ParquetStore,
    StoreLayout, SyntheticProvider,
};
use replaylab_core::{
    run_backtest, BacktestError, BrokerConfig, DateWindow, EventSink, RunResult, Strategy,
};

use crate::config::{BacktestConfig, ConfigError};
use crate::fingerprint::{dataset_hash, run_fingerprint};
use crate::metrics::PerformanceReport;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestError),
    #[error("data source '{0}' has nothing to load; pass data to run_with_data")]
    NoProvider(DataSource),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy: String,
    pub symbols: Vec<String>,
    pub start_date: String,
    pub end_date: String,
    pub dataset_hash: String,
    /// Hash of the ledger and equity curve; equal across identical runs.
    pub fingerprint: String,
    pub strategy_failures: usize,
    pub report: PerformanceReport,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Account parameters and date window for one run.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub broker: BrokerConfig,
    pub window: DateWindow,
}

impl RunSettings {
    pub fn from_config(config: &BacktestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            broker: config.broker_config(),
            window: config.date_window()?,
        })
    }
}

/// Run a backtest with pre-loaded data, no I/O.
pub fn run_with_data(
    settings: &RunSettings,
    data: &MarketData,
    strategy: &mut dyn Strategy,
    sink: &dyn EventSink,
) -> Result<BacktestResult, RunError> {
    let run = run_backtest(
        data,
        settings.window,
        settings.broker.clone(),
        strategy,
        sink,
    )?;
    Ok(summarize(data, &run))
}

/// Run a backtest described entirely by `config`.
pub fn run_from_config(
    config: &BacktestConfig,
    sink: &dyn EventSink,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let settings = RunSettings::from_config(config)?;
    let data = load_data(config)?;
    let mut strategy = config.strategy.build()?;
    run_with_data(&settings, &data, strategy.as_mut(), sink)
}

/// Build the provider for the configured source.
pub fn build_provider(config: &BacktestConfig) -> Result<Box<dyn DataProvider>, RunError> {
    let source = config.data_source()?;
    let dir = config.data.dir.clone();
    match source {
        DataSource::Csv => {
            let dir = dir.ok_or(ConfigError::MissingDataDir(source))?;
            Ok(Box::new(CsvProvider::new(dir)))
        }
        DataSource::Parquet => {
            let dir = dir.ok_or(ConfigError::MissingDataDir(source))?;
            let layout = StoreLayout {
                source: config.data.vendor.clone(),
                period: config.data.period.clone(),
                adjust: config.data.adjust.clone(),
            };
            Ok(Box::new(ParquetStore::new(dir, layout)))
        }
        DataSource::Synthetic => {
            let start = config
                .start_date()?
                .unwrap_or_else(|| NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default());
            Ok(Box::new(SyntheticProvider::new(
                config.data.seed,
                start,
                config.data.synthetic_days,
            )))
        }
        DataSource::Memory => Err(RunError::NoProvider(source)),
    }
}

/// Load every configured symbol through the bounded worker pool.
pub fn load_data(config: &BacktestConfig) -> Result<MarketData, RunError> {
    let provider = build_provider(config)?;
    Ok(load_market_data(
        provider.as_ref(),
        &config.data.symbols,
        config.data.pool_size,
    )?)
}

fn summarize(data: &MarketData, run: &RunResult) -> BacktestResult {
    let report = PerformanceReport::from_run(run);
    let fingerprint = run_fingerprint(run.trades(), &run.snapshots);
    let date = |t: Option<chrono::NaiveDateTime>| t.map(|t| t.date().to_string()).unwrap_or_default();

    info!(
        strategy = %run.strategy,
        total_return = report.total_return,
        max_drawdown = report.max_drawdown,
        trades = report.total_trades,
        fingerprint = %fingerprint,
        "run summarized"
    );

    BacktestResult {
        schema_version: SCHEMA_VERSION,
        strategy: run.strategy.clone(),
        symbols: data.keys().cloned().collect(),
        start_date: date(run.calendar.first()),
        end_date: date(run.calendar.last()),
        dataset_hash: dataset_hash(data),
        fingerprint,
        strategy_failures: run.strategy_failures,
        report,
    }
}
