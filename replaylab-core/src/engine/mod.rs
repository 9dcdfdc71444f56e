//! Simulation loop and its run state.
//!
//! The loop walks the trading calendar strictly in order. At each timestamp
//! it builds the as-of view, hands it to the strategy, then records exactly
//! one equity snapshot:
//!
//! 1. Stamp the broker clock with `t`
//! 2. `strategy.on_bar(view, broker, t)`; failures are logged and skipped
//! 3. Value the account at the closes stamped `t` and append a snapshot

pub mod loop_runner;
pub mod state;

pub use loop_runner::{run_backtest, SimulationLoop};
pub use state::{BacktestError, RunResult, RunState};
