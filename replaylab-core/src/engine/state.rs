//! Run lifecycle state, errors and the result of a finished replay.

use crate::broker::{Broker, BrokerConfig};
use crate::calendar::{CalendarError, TradingCalendar};
use crate::domain::{EquitySnapshot, Trade};
use thiserror::Error;

/// Lifecycle of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Calendar built, `on_start` not yet called.
    Init,
    /// Between `on_start` and `on_end`.
    Running,
    /// `on_end` has returned.
    Finished,
}

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),
}

impl BacktestError {
    pub(crate) fn check_config(config: &BrokerConfig) -> Result<(), Self> {
        if !(config.initial_cash.is_finite() && config.initial_cash > 0.0) {
            return Err(Self::InvalidConfig(format!(
                "initial_cash must be positive, got {}",
                config.initial_cash
            )));
        }
        if !(config.commission_rate.is_finite() && config.commission_rate >= 0.0) {
            return Err(Self::InvalidConfig(format!(
                "commission_rate must be non-negative, got {}",
                config.commission_rate
            )));
        }
        if config.lot_size == 0 {
            return Err(Self::InvalidConfig("lot_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub strategy: String,
    pub calendar: TradingCalendar,
    /// One snapshot per calendar timestamp, ascending.
    pub snapshots: Vec<EquitySnapshot>,
    /// Final account state: cash, remaining positions, the full ledger.
    pub broker: Broker,
    /// Number of `on_bar` calls that returned an error.
    pub strategy_failures: usize,
}

impl RunResult {
    pub fn trades(&self) -> &[Trade] {
        self.broker.trades()
    }

    pub fn initial_cash(&self) -> f64 {
        self.broker.initial_cash()
    }

    /// Equity at the last snapshot, or the initial cash for an empty curve.
    pub fn final_value(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.broker.initial_cash(), |s| s.total_value)
    }

    pub fn equity_curve(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.total_value).collect()
    }
}
