//! ReplayLab Core: domain types, broker, calendar, simulation loop, data providers.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, positions, trades, equity snapshots)
//! - Broker with lot rounding, commission and a trade ledger
//! - Trading calendar and the no-look-ahead market view
//! - Strategy trait and the sequential simulation loop
//! - Data providers (CSV, Parquet, synthetic, in-memory) and a parallel loader

pub mod broker;
pub mod calendar;
pub mod data;
pub mod domain;
pub mod engine;
pub mod events;
pub mod strategies;
pub mod strategy;
pub mod view;

pub use broker::{Broker, BrokerConfig, BrokerError};
pub use calendar::{CalendarError, DateWindow, TradingCalendar};
pub use engine::{run_backtest, BacktestError, RunResult, RunState, SimulationLoop};
pub use events::{BacktestEvent, EventSink, NullSink, RecordingSink, TracingSink};
pub use strategy::{Strategy, StrategyError};
pub use view::MarketView;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: data handed across the loader's worker threads and
    /// the run results handed back to callers are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::EquitySnapshot>();
        require_sync::<domain::EquitySnapshot>();

        // Data
        require_send::<data::BarSeries>();
        require_sync::<data::BarSeries>();
        require_send::<data::MarketData>();
        require_sync::<data::MarketData>();
        require_send::<data::CsvProvider>();
        require_sync::<data::CsvProvider>();
        require_send::<data::ParquetStore>();
        require_sync::<data::ParquetStore>();
        require_send::<data::SyntheticProvider>();
        require_sync::<data::SyntheticProvider>();

        // Engine
        require_send::<Broker>();
        require_sync::<Broker>();
        require_send::<RunResult>();
        require_sync::<RunResult>();
        require_send::<RecordingSink>();
        require_sync::<RecordingSink>();
    }

    /// Architecture contract: strategies see the market only through the
    /// as-of view, never the full `MarketData`.
    #[test]
    fn strategy_reads_market_through_view_only() {
        fn _check_trait_object_builds(
            strategy: &mut dyn Strategy,
            view: &MarketView<'_>,
            broker: &mut Broker,
            t: domain::Timestamp,
        ) -> Result<(), StrategyError> {
            strategy.on_bar(view, broker, t)
        }
    }
}
