//! Content hashes identifying a run's inputs and outputs.
//!
//! - `dataset_hash`: every bar of every symbol, in symbol order.
//! - `run_fingerprint`: the trade ledger plus the equity curve. Two runs with
//!   the same fingerprint made identical decisions and saw identical equity.

use replaylab_core::data::MarketData;
use replaylab_core::domain::{EquitySnapshot, Trade};

/// BLAKE3 hash of the market data snapshot, hex encoded.
///
/// Covers symbols, timestamps and all OHLCV fields. `MarketData` is ordered
/// by symbol so the hash does not depend on load order.
pub fn dataset_hash(data: &MarketData) -> String {
    let mut hasher = blake3::Hasher::new();

    for (symbol, series) in data {
        hasher.update(symbol.as_bytes());
        hasher.update(&(series.len() as u64).to_le_bytes());
        for bar in series.bars() {
            hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
            hasher.update(&bar.amount.unwrap_or(f64::NAN).to_le_bytes());
        }
    }

    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 hash of the trade ledger and equity curve, hex encoded.
pub fn run_fingerprint(trades: &[Trade], snapshots: &[EquitySnapshot]) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&(trades.len() as u64).to_le_bytes());
    for t in trades {
        hasher.update(&t.timestamp.and_utc().timestamp().to_le_bytes());
        hasher.update(t.symbol.as_bytes());
        hasher.update(t.side.to_string().as_bytes());
        hasher.update(&t.quantity.to_le_bytes());
        hasher.update(&t.price.to_le_bytes());
        hasher.update(&t.commission.to_le_bytes());
    }

    hasher.update(&(snapshots.len() as u64).to_le_bytes());
    for s in snapshots {
        hasher.update(&s.timestamp.and_utc().timestamp().to_le_bytes());
        hasher.update(&s.cash.to_le_bytes());
        hasher.update(&s.total_value.to_le_bytes());
    }

    hasher.finalize().to_hex().to_string()
}
