//! Parquet bar store.
//!
//! Layout: `{root}/{source}/{period}/{adjust}/{symbol}.parquet`, one file per
//! symbol. A downloader fills the store ahead of time; the backtester only
//! reads it. Writes are atomic (write to .tmp, rename into place).

use super::provider::{DataError, DataProvider};
use super::series::BarSeries;
use crate::domain::{Bar, Timestamp};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Partition keys of the store below the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub source: String,
    pub period: String,
    pub adjust: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            source: "akshare".into(),
            period: "1d".into(),
            adjust: "qfq".into(),
        }
    }
}

pub struct ParquetStore {
    root: PathBuf,
    layout: StoreLayout,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>, layout: StoreLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    /// Directory holding every symbol file for this layout.
    pub fn target_dir(&self) -> PathBuf {
        self.root
            .join(&self.layout.source)
            .join(&self.layout.period)
            .join(&self.layout.adjust)
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.target_dir().join(format!("{symbol}.parquet"))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbol_path(symbol).exists()
    }

    /// Write a symbol's series, replacing any previous file.
    pub fn write(&self, symbol: &str, series: &BarSeries) -> Result<(), DataError> {
        if series.is_empty() {
            return Err(DataError::ValidationError(format!(
                "refusing to store empty series for '{symbol}'"
            )));
        }

        let dir = self.target_dir();
        fs::create_dir_all(&dir).map_err(|e| DataError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut df = series_to_dataframe(series)?;
        let path = self.symbol_path(symbol);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::ParquetError(format!("atomic rename failed: {e}"))
        })?;
        Ok(())
    }

    /// Load a symbol's series; a missing file yields an empty series.
    pub fn load(&self, symbol: &str) -> Result<BarSeries, DataError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            debug!(symbol, path = %path.display(), "no parquet file; empty series");
            return Ok(BarSeries::empty());
        }
        let file =
            fs::File::open(&path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))?;
        dataframe_to_series(&df)
    }
}

impl DataProvider for ParquetStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError> {
        self.load(symbol)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn series_to_dataframe(series: &BarSeries) -> Result<DataFrame, DataError> {
    let bars = series.bars();
    let millis: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let amounts: Vec<Option<f64>> = bars.iter().map(|b| b.amount).collect();

    DataFrame::new(vec![
        Column::new("date".into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("amount".into(), amounts),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Convert a date/datetime column to epoch milliseconds.
fn timestamp_millis(column: &Column) -> Result<Vec<Option<i64>>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("date column: {e}"));
    match column.dtype() {
        DataType::Date => {
            let days = column.cast(&DataType::Int32).map_err(map_err)?;
            let ca = days.i32().map_err(map_err)?;
            Ok(ca
                .into_iter()
                .map(|d| d.map(|d| i64::from(d) * 86_400_000))
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            let raw = column.cast(&DataType::Int64).map_err(map_err)?;
            let ca = raw.i64().map_err(map_err)?;
            Ok(ca.into_iter().map(|v| v.map(|v| v / divisor)).collect())
        }
        other => Err(DataError::ValidationError(format!(
            "date column has unsupported type {other:?}"
        ))),
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("{name} column: {e}"));
    let column = df
        .column(name)
        .map_err(|_| DataError::ValidationError(format!("missing column '{name}'")))?
        .cast(&DataType::Float64)
        .map_err(map_err)?;
    let ca = column.f64().map_err(map_err)?;
    Ok(ca.into_iter().collect())
}

fn dataframe_to_series(df: &DataFrame) -> Result<BarSeries, DataError> {
    let dates = df
        .column("date")
        .map_err(|_| DataError::ValidationError("missing column 'date'".into()))?;
    let millis = timestamp_millis(dates)?;
    let opens = float_column(df, "open")?;
    let highs = float_column(df, "high")?;
    let lows = float_column(df, "low")?;
    let closes = float_column(df, "close")?;
    let volumes = float_column(df, "volume")?;
    let amounts = if df.column("amount").is_ok() {
        float_column(df, "amount")?
    } else {
        vec![None; df.height()]
    };

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ms = millis[i]
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let timestamp: Timestamp = chrono::DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| DataError::ParquetError(format!("date out of range at row {i}")))?
            .naive_utc();
        let bar = Bar {
            timestamp,
            open: opens[i].unwrap_or(f64::NAN),
            high: highs[i].unwrap_or(f64::NAN),
            low: lows[i].unwrap_or(f64::NAN),
            close: closes[i].unwrap_or(f64::NAN),
            volume: volumes[i].unwrap_or(0.0),
            amount: amounts[i],
        };
        if !bar.is_void() {
            bars.push(bar);
        }
    }
    Ok(BarSeries::new(bars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_series() -> BarSeries {
        let day = |d| {
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        BarSeries::new(vec![
            Bar {
                timestamp: day(2),
                open: 10.0,
                high: 10.2,
                low: 9.9,
                close: 10.1,
                volume: 1000.0,
                amount: Some(10_100.0),
            },
            Bar {
                timestamp: day(3),
                open: 10.1,
                high: 10.3,
                low: 10.0,
                close: 10.2,
                volume: 1100.0,
                amount: None,
            },
        ])
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path(), StoreLayout::default());

        store.write("000001", &sample_series()).unwrap();
        assert!(store
            .target_dir()
            .ends_with(Path::new("akshare").join("1d").join("qfq")));
        assert!(store.contains("000001"));

        let loaded = store.fetch("000001").unwrap();
        assert_eq!(loaded, sample_series());
    }

    #[test]
    fn missing_symbol_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path(), StoreLayout::default());
        assert!(store.fetch("NOPE").unwrap().is_empty());
    }

    #[test]
    fn empty_series_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path(), StoreLayout::default());
        assert!(store.write("X", &BarSeries::empty()).is_err());
    }
}
