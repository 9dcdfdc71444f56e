//! Domain types for replaylab

pub mod bar;
pub mod position;
pub mod snapshot;
pub mod trade;

pub use bar::Bar;
pub use position::Position;
pub use snapshot::EquitySnapshot;
pub use trade::{Side, Trade};

use std::collections::BTreeMap;

/// Symbol type alias
pub type Symbol = String;

/// Bar timestamps. Daily data uses midnight.
pub type Timestamp = chrono::NaiveDateTime;

/// Latest price per symbol, ordered so iteration is deterministic.
pub type PriceMap = BTreeMap<Symbol, f64>;
