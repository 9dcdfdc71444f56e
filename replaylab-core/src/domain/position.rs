use serde::{Deserialize, Serialize};

/// Long-only holding in a single symbol.
///
/// `quantity` is always a positive share count while the position exists;
/// the broker removes the entry as soon as it reaches zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    /// Quantity-weighted average purchase price (gross, commission excluded).
    pub avg_cost: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: u64, avg_cost: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_cost,
        }
    }

    /// Fold a purchase into the position, updating the weighted average cost.
    pub fn add(&mut self, quantity: u64, gross_amount: f64) {
        let new_qty = self.quantity + quantity;
        self.avg_cost = (self.quantity as f64 * self.avg_cost + gross_amount) / new_qty as f64;
        self.quantity = new_qty;
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.avg_cost)
    }
}
