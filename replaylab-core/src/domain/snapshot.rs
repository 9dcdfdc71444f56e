//! EquitySnapshot: one point on the equity curve.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account state recorded after the strategy callback for one timestamp.
///
/// The accounting identity `total_value == cash + market_value` holds for
/// every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub market_value: f64,
    pub total_value: f64,
    /// Share count per held symbol at snapshot time.
    pub positions: BTreeMap<String, u64>,
    /// Closing prices used to value the positions.
    pub prices: BTreeMap<String, f64>,
}
