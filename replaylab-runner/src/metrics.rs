//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade ledger in,
//! scalar out. `PerformanceReport::compute` assembles them into the report
//! for a finished run.

use std::collections::BTreeMap;

use replaylab_core::domain::{EquitySnapshot, Position, Trade};
use replaylab_core::RunResult;
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Final report for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub total_commission: f64,
    pub win_rate: f64,
    pub trading_days: usize,
    pub equity_curve: Vec<EquitySnapshot>,
    pub trades: Vec<Trade>,
    pub final_positions: BTreeMap<String, Position>,
}

impl PerformanceReport {
    /// Compute the report from the snapshot sequence and trade ledger.
    pub fn compute(
        snapshots: &[EquitySnapshot],
        trades: &[Trade],
        initial_capital: f64,
        final_positions: BTreeMap<String, Position>,
    ) -> Self {
        let equity: Vec<f64> = snapshots.iter().map(|s| s.total_value).collect();
        let final_value = equity.last().copied().unwrap_or(initial_capital);
        let annual = annual_return(initial_capital, final_value, equity.len());
        let vol = volatility(&equity);

        Self {
            initial_capital,
            final_value,
            total_return: total_return(initial_capital, final_value),
            annual_return: annual,
            volatility: vol,
            sharpe_ratio: sharpe_ratio(annual, vol),
            max_drawdown: max_drawdown(&equity),
            total_trades: trades.len(),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            win_rate: win_rate(trades),
            trading_days: equity.len(),
            equity_curve: snapshots.to_vec(),
            trades: trades.to_vec(),
            final_positions,
        }
    }

    pub fn from_run(run: &RunResult) -> Self {
        Self::compute(
            &run.snapshots,
            run.trades(),
            run.initial_cash(),
            run.broker.positions().clone(),
        )
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(initial: f64, final_value: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_value - initial) / initial
}

/// Annualized return: `(final / initial)^(252 / n) - 1`; 0 with no snapshots.
pub fn annual_return(initial: f64, final_value: f64, trading_days: usize) -> f64 {
    if trading_days == 0 || initial <= 0.0 {
        return 0.0;
    }
    (final_value / initial).powf(TRADING_DAYS_PER_YEAR / trading_days as f64) - 1.0
}

/// Annualized volatility: sample stdev of daily returns × √252.
///
/// Returns 0.0 with fewer than two daily returns.
pub fn volatility(equity_curve: &[f64]) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annual return over volatility; 0.0 when volatility is zero.
pub fn sharpe_ratio(annual_return: f64, volatility: f64) -> f64 {
    if volatility > 0.0 {
        annual_return / volatility
    } else {
        0.0
    }
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Measured against the running peak of the curve itself. Returns 0.0 if
/// equity never falls below a previous peak.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Share of sells that closed at a profit.
///
/// Each sell is matched with the most recent buy of the same symbol (in ledger
/// order) stamped no later than the sell. Profit is
/// `(sell - buy) × sell_qty - (sell_commission + buy_commission)`. A sell with
/// no matching buy counts as unprofitable. 0.0 when there are no sells.
pub fn win_rate(trades: &[Trade]) -> f64 {
    let buys: Vec<&Trade> = trades.iter().filter(|t| t.is_buy()).collect();
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.is_sell()).collect();
    if sells.is_empty() {
        return 0.0;
    }

    let profitable = sells
        .iter()
        .filter(|sell| {
            buys.iter()
                .rev()
                .find(|buy| buy.symbol == sell.symbol && buy.timestamp <= sell.timestamp)
                .is_some_and(|buy| round_trip_profit(buy, sell) > 0.0)
        })
        .count();
    profitable as f64 / sells.len() as f64
}

fn round_trip_profit(buy: &Trade, sell: &Trade) -> f64 {
    (sell.price - buy.price) * sell.quantity as f64 - (sell.commission + buy.commission)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Percentage change between consecutive equity values.
pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
