//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Export formats for backtest results:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade ledger and equity curve for external analysis tools
//! - **Markdown**: human-readable single-run summary
//!
//! All persisted results include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use replaylab_core::domain::{EquitySnapshot, Trade};
use serde::Serialize;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

pub const REPORT_FILE: &str = "report.json";
pub const EQUITY_FILE: &str = "equity.csv";
pub const TRADES_FILE: &str = "trades.csv";
pub const POSITIONS_FILE: &str = "positions.json";
pub const SUMMARY_FILE: &str = "report.md";

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade ledger as CSV.
///
/// Columns: timestamp, symbol, side, quantity, price, amount, commission
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    if trades.is_empty() {
        wtr.write_record([
            "timestamp",
            "symbol",
            "side",
            "quantity",
            "price",
            "amount",
            "commission",
        ])?;
    }
    for trade in trades {
        wtr.serialize(trade)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[derive(Serialize)]
struct EquityRow {
    timestamp: String,
    cash: String,
    market_value: String,
    total_value: String,
}

/// Export the equity curve as CSV.
///
/// Columns: timestamp, cash, market_value, total_value
pub fn export_equity_csv(snapshots: &[EquitySnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    if snapshots.is_empty() {
        wtr.write_record(["timestamp", "cash", "market_value", "total_value"])?;
    }
    for s in snapshots {
        wtr.serialize(EquityRow {
            timestamp: s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            cash: format!("{:.2}", s.cash),
            market_value: format!("{:.2}", s.market_value),
            total_value: format!("{:.2}", s.total_value),
        })?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run into `dir`.
///
/// Writes:
/// - `report.json`: the full `BacktestResult`
/// - `equity.csv`: one row per trading timestamp
/// - `trades.csv`: the trade ledger
/// - `positions.json`: positions held at the end of the run
/// - `report.md`: human-readable summary
///
/// Returns `dir`.
pub fn save_artifacts(result: &BacktestResult, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    let write = |name: &str, contents: &str| -> Result<()> {
        let path = dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))
    };

    write(REPORT_FILE, &export_json(result)?)?;
    write(EQUITY_FILE, &export_equity_csv(&result.report.equity_curve)?)?;
    write(TRADES_FILE, &export_trades_csv(&result.report.trades)?)?;
    let positions = serde_json::to_string_pretty(&result.report.final_positions)
        .context("failed to serialize final positions")?;
    write(POSITIONS_FILE, &positions)?;
    write(SUMMARY_FILE, &generate_report(result))?;

    Ok(dir.to_path_buf())
}

/// Load a `BacktestResult` from a `report.json` file or an artifact directory.
///
/// Rejects unknown schema versions.
pub fn load_report(path: &Path) -> Result<BacktestResult> {
    let file = if path.is_dir() {
        path.join(REPORT_FILE)
    } else {
        path.to_path_buf()
    };
    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let r = &result.report;
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Strategy | {} |\n", result.strategy));
    md.push_str(&format!("| Symbols | {} |\n", result.symbols.join(", ")));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.start_date, result.end_date
    ));
    md.push_str(&format!("| Trading Days | {} |\n", r.trading_days));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    md.push_str(&format!("| Fingerprint | {} |\n", result.fingerprint));
    if result.strategy_failures > 0 {
        md.push_str(&format!(
            "| Strategy Failures | **{}** |\n",
            result.strategy_failures
        ));
    }
    md.push('\n');

    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Initial Capital | {:.2} |\n", r.initial_capital));
    md.push_str(&format!("| Final Value | {:.2} |\n", r.final_value));
    md.push_str(&format!("| Total Return | {:.2}% |\n", r.total_return * 100.0));
    md.push_str(&format!(
        "| Annual Return | {:.2}% |\n",
        r.annual_return * 100.0
    ));
    md.push_str(&format!("| Volatility | {:.2}% |\n", r.volatility * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", r.sharpe_ratio));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", r.max_drawdown * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", r.win_rate * 100.0));
    md.push_str(&format!("| Trades | {} |\n", r.total_trades));
    md.push_str(&format!("| Commission | {:.2} |\n", r.total_commission));
    md.push('\n');

    if !r.final_positions.is_empty() {
        md.push_str("## Final Positions\n\n");
        md.push_str("| Symbol | Quantity | Avg Cost |\n");
        md.push_str("| --- | --- | --- |\n");
        for pos in r.final_positions.values() {
            md.push_str(&format!(
                "| {} | {} | {:.4} |\n",
                pos.symbol, pos.quantity, pos.avg_cost
            ));
        }
        md.push('\n');
    }

    md
}
