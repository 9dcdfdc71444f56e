//! Trade: one executed buy or sell in the broker ledger.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Immutable ledger entry for an executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub price: f64,
    /// Gross notional: `quantity * price`.
    pub amount: f64,
    pub commission: f64,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }

    /// Signed cash effect of the trade (negative for buys).
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.amount + self.commission),
            Side::Sell => self.amount - self.commission,
        }
    }
}
