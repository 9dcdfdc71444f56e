//! CSV-backed provider: one `{dir}/{symbol}.csv` file per symbol.
//!
//! Header: `date,open,high,low,close,volume[,amount]`. The date column may
//! also be named `timestamp` or `time`.

use super::provider::{DataError, DataProvider};
use super::series::{parse_timestamp, BarSeries};
use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Serialize)]
struct CsvRow {
    #[serde(alias = "timestamp", alias = "time")]
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    amount: Option<f64>,
}

pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    /// Write a series to `{dir}/{symbol}.csv`, creating the directory if needed.
    pub fn write(&self, symbol: &str, series: &BarSeries) -> Result<PathBuf, DataError> {
        let path = self.path_for(symbol);
        let io_err = |e: &dyn std::fmt::Display| DataError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        fs::create_dir_all(&self.dir).map_err(|e| io_err(&e))?;
        let mut writer = csv::Writer::from_path(&path).map_err(|e| io_err(&e))?;
        for bar in series.bars() {
            writer
                .serialize(CsvRow {
                    date: bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                    amount: bar.amount,
                })
                .map_err(|e| io_err(&e))?;
        }
        writer.flush().map_err(|e| io_err(&e))?;
        Ok(path)
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            debug!(symbol, path = %path.display(), "no csv file; empty series");
            return Ok(BarSeries::empty());
        }
        read_csv(&path)
    }
}

fn read_csv(path: &Path) -> Result<BarSeries, DataError> {
    let path_str = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::Io {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

    let mut bars = Vec::new();
    let mut void_rows = 0usize;
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = row.map_err(|e| DataError::MalformedRow {
            path: path_str.clone(),
            row: line,
            reason: e.to_string(),
        })?;
        let timestamp = parse_timestamp(&row.date).ok_or_else(|| DataError::MalformedRow {
            path: path_str.clone(),
            row: line,
            reason: format!("unparsable timestamp '{}'", row.date),
        })?;
        let bar = Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            amount: row.amount,
        };
        if bar.is_void() {
            void_rows += 1;
            continue;
        }
        bars.push(bar);
    }

    if void_rows > 0 {
        warn!(path = %path_str, void_rows, "skipped rows with missing prices");
    }
    Ok(BarSeries::new(bars))
}
