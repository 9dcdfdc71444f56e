//! ReplayLab Runner: configuration, orchestration, metrics and export.
//!
//! This crate builds on `replaylab-core` to provide:
//! - TOML configuration with explicit environment overrides
//! - Provider construction and parallel data loading
//! - Single-run orchestration with run fingerprinting
//! - Performance analysis (returns, volatility, Sharpe, drawdown, win rate)
//! - JSON / CSV / Markdown artifact export

pub mod config;
pub mod export;
pub mod fingerprint;
pub mod metrics;
pub mod runner;

pub use config::{BacktestConfig, ConfigError, StrategyConfig};
pub use export::{load_report, save_artifacts};
pub use fingerprint::{dataset_hash, run_fingerprint};
pub use metrics::PerformanceReport;
pub use runner::{
    build_provider, load_data, run_from_config, run_with_data, BacktestResult, RunError,
    RunSettings, SCHEMA_VERSION,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn performance_report_is_send_sync() {
        assert_send::<PerformanceReport>();
        assert_sync::<PerformanceReport>();
    }

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
        assert_send::<RunSettings>();
        assert_sync::<RunSettings>();
    }

    #[test]
    fn run_error_is_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
