//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over data sources (CSV files, the Parquet
//! store, synthetic series, in-memory fixtures) so runs can swap sources and
//! tests can inject data directly.

use super::series::{BarSeries, MarketData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed row {row} in {path}: {reason}")]
    MalformedRow {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("failed to fetch '{symbol}': {reason}")]
    FetchFailed { symbol: String, reason: String },

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

/// Where bar data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Csv,
    Parquet,
    Synthetic,
    Memory,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataSource::Csv => "csv",
            DataSource::Parquet => "parquet",
            DataSource::Synthetic => "synthetic",
            DataSource::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported data source '{0}' (expected one of: csv, parquet, synthetic, memory)")]
pub struct UnsupportedSource(pub String);

impl FromStr for DataSource {
    type Err = UnsupportedSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(DataSource::Csv),
            "parquet" => Ok(DataSource::Parquet),
            "synthetic" => Ok(DataSource::Synthetic),
            "memory" => Ok(DataSource::Memory),
            _ => Err(UnsupportedSource(s.to_string())),
        }
    }
}

/// Trait for data providers.
///
/// Contract: a symbol with no history yields `Ok` with an empty series, never
/// an error. Errors are reserved for sources that cannot be read at all.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Full available history for `symbol`.
    fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError>;
}

/// Provider backed by series held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, BarSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: impl Into<String>, series: BarSeries) -> Self {
        self.insert(symbol, series);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, series: BarSeries) {
        self.series.insert(symbol.into(), series);
    }
}

impl From<MarketData> for InMemoryProvider {
    fn from(data: MarketData) -> Self {
        Self {
            series: data.into_iter().collect(),
        }
    }
}

impl DataProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError> {
        Ok(self.series.get(symbol).cloned().unwrap_or_default())
    }
}

/// Fetch every symbol through a bounded worker pool.
///
/// Symbols are fetched in parallel on at most `pool_size` threads. The first
/// failing symbol (in input order) aborts the load. The returned map is the
/// immutable snapshot the replay runs against.
pub fn load_market_data(
    provider: &dyn DataProvider,
    symbols: &[String],
    pool_size: usize,
) -> Result<MarketData, DataError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size.max(1))
        .build()
        .map_err(|e| DataError::WorkerPool(e.to_string()))?;

    info!(
        provider = provider.name(),
        symbols = symbols.len(),
        pool_size,
        "loading market data"
    );

    let fetched: Vec<(&String, Result<BarSeries, DataError>)> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| (symbol, provider.fetch(symbol)))
            .collect()
    });

    let mut data = MarketData::new();
    for (symbol, result) in fetched {
        let series = result?;
        debug!(symbol = %symbol, bars = series.len(), "fetched series");
        data.insert(symbol.clone(), series);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> BarSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        BarSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar {
                    timestamp: (start + chrono::Duration::days(i as i64))
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                    open: c,
                    high: c,
                    low: c,
                    close: c,
                    volume: 100.0,
                    amount: None,
                })
                .collect(),
        )
    }

    struct FailingProvider;

    impl DataProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError> {
            Err(DataError::FetchFailed {
                symbol: symbol.to_string(),
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn unknown_symbol_yields_empty_series() {
        let provider = InMemoryProvider::new().with_series("A", series(&[1.0]));
        assert!(provider.fetch("ZZZ").unwrap().is_empty());
    }

    #[test]
    fn load_market_data_keeps_every_symbol() {
        let provider = InMemoryProvider::new()
            .with_series("A", series(&[1.0, 2.0]))
            .with_series("B", series(&[3.0]));
        let symbols = vec!["B".to_string(), "A".to_string(), "C".to_string()];

        let data = load_market_data(&provider, &symbols, 2).unwrap();
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(data["A"].len(), 2);
        assert!(data["C"].is_empty());
    }

    #[test]
    fn load_market_data_propagates_fetch_errors() {
        let symbols = vec!["A".to_string()];
        let err = load_market_data(&FailingProvider, &symbols, 4).unwrap_err();
        assert!(matches!(err, DataError::FetchFailed { .. }));
    }

    #[test]
    fn data_source_parses_case_insensitively() {
        assert_eq!("CSV".parse::<DataSource>(), Ok(DataSource::Csv));
        assert_eq!(" parquet ".parse::<DataSource>(), Ok(DataSource::Parquet));
        assert_eq!(
            "qmt".parse::<DataSource>(),
            Err(UnsupportedSource("qmt".into()))
        );
    }
}
