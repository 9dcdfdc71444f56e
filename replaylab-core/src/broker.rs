//! Broker: cash, positions and the trade ledger for one backtest run.
//!
//! Orders execute immediately at the caller-supplied price. Quantities are
//! rounded down to whole lots; commission is a flat rate on gross notional.
//! Business-rule rejections (not enough cash, nothing to sell, less than one
//! lot) return `Ok(false)` and leave the account untouched. Invalid arguments
//! are caller bugs and return [`BrokerError`].

use crate::domain::{Position, PriceMap, Side, Symbol, Timestamp, Trade};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Default board lot for A-share equities.
pub const DEFAULT_LOT_SIZE: u64 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum BrokerError {
    #[error("order amount must be a finite non-negative number, got {0}")]
    InvalidAmount(f64),

    #[error("order price must be a finite positive number, got {0}")]
    InvalidPrice(f64),
}

/// Static account parameters fixed at broker construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub initial_cash: f64,
    /// Fraction of gross notional charged on every fill (0.0003 = 3 bps).
    pub commission_rate: f64,
    pub lot_size: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_cash: 1_000_000.0,
            commission_rate: 0.0003,
            lot_size: DEFAULT_LOT_SIZE,
        }
    }
}

/// Simulated brokerage account.
#[derive(Debug, Clone)]
pub struct Broker {
    config: BrokerConfig,
    cash: f64,
    positions: BTreeMap<Symbol, Position>,
    trades: Vec<Trade>,
    total_commission: f64,
    clock: Timestamp,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            cash: config.initial_cash,
            config,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            total_commission: 0.0,
            clock: Timestamp::default(),
        }
    }

    /// Broker with default commission and lot size.
    pub fn with_cash(initial_cash: f64) -> Self {
        Self::new(BrokerConfig {
            initial_cash,
            ..BrokerConfig::default()
        })
    }

    /// Set the timestamp stamped on subsequent trades.
    pub fn set_clock(&mut self, timestamp: Timestamp) {
        self.clock = timestamp;
    }

    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn initial_cash(&self) -> f64 {
        self.config.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Shares held in `symbol` (0 when flat).
    pub fn position(&self, symbol: &str) -> u64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn avg_cost(&self, symbol: &str) -> Option<f64> {
        self.positions.get(symbol).map(|p| p.avg_cost)
    }

    pub fn positions(&self) -> &BTreeMap<Symbol, Position> {
        &self.positions
    }

    /// Share count per held symbol.
    pub fn position_map(&self) -> BTreeMap<Symbol, u64> {
        self.positions
            .iter()
            .map(|(sym, pos)| (sym.clone(), pos.quantity))
            .collect()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Buy `symbol` at `price`.
    ///
    /// `amount < 1` is a fraction of current cash to spend; otherwise it is a
    /// share count. Either way the quantity is rounded down to whole lots.
    pub fn buy(&mut self, symbol: &str, amount: f64, price: f64) -> Result<bool, BrokerError> {
        validate_amount(amount)?;
        validate_price(price)?;

        let lot = self.config.lot_size;
        let shares = if amount < 1.0 {
            floor_to_lot(self.cash * amount / price, lot)
        } else {
            floor_to_lot(amount, lot)
        };

        if shares < lot {
            trace!(symbol, amount, price, "buy rejected: below one lot");
            return Ok(false);
        }

        let gross = shares as f64 * price;
        let commission = gross * self.config.commission_rate;
        let required = gross + commission;
        if required > self.cash {
            trace!(symbol, shares, required, cash = self.cash, "buy rejected: insufficient cash");
            return Ok(false);
        }

        self.cash -= required;
        match self.positions.get_mut(symbol) {
            Some(pos) => pos.add(shares, gross),
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::new(symbol, shares, price));
            }
        }
        self.record(symbol, Side::Buy, shares, price, gross, commission);
        Ok(true)
    }

    /// Sell `symbol` at `price`.
    ///
    /// `amount <= 1` is a fraction of the current holding (`1.0` liquidates
    /// it); otherwise it is a share count rounded down to whole lots and
    /// capped at the holding.
    pub fn sell(&mut self, symbol: &str, amount: f64, price: f64) -> Result<bool, BrokerError> {
        validate_amount(amount)?;
        validate_price(price)?;

        let held = self.position(symbol);
        if held == 0 {
            trace!(symbol, "sell rejected: no position");
            return Ok(false);
        }

        let shares = if amount <= 1.0 {
            (held as f64 * amount).floor() as u64
        } else {
            floor_to_lot(amount, self.config.lot_size).min(held)
        };
        if shares == 0 {
            trace!(symbol, amount, held, "sell rejected: zero quantity");
            return Ok(false);
        }

        let gross = shares as f64 * price;
        let commission = gross * self.config.commission_rate;
        self.cash += gross - commission;

        let remaining = held - shares;
        if remaining == 0 {
            self.positions.remove(symbol);
        } else if let Some(pos) = self.positions.get_mut(symbol) {
            pos.quantity = remaining;
        }
        self.record(symbol, Side::Sell, shares, price, gross, commission);
        Ok(true)
    }

    /// Cash plus the market value of every position.
    ///
    /// A held symbol missing from `prices` contributes zero.
    pub fn get_total_value(&self, prices: &PriceMap) -> f64 {
        self.cash + self.market_value(prices)
    }

    /// Market value of all positions at `prices` (missing price → 0).
    pub fn market_value(&self, prices: &PriceMap) -> f64 {
        self.positions
            .iter()
            .map(|(sym, pos)| pos.market_value(prices.get(sym).copied().unwrap_or(0.0)))
            .sum()
    }

    fn record(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: u64,
        price: f64,
        amount: f64,
        commission: f64,
    ) {
        self.total_commission += commission;
        debug!(
            timestamp = %self.clock,
            symbol,
            %side,
            quantity,
            price,
            commission,
            cash = self.cash,
            "trade executed"
        );
        self.trades.push(Trade {
            timestamp: self.clock,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            amount,
            commission,
        });
    }
}

/// Round a share count down to a whole number of lots.
pub fn floor_to_lot(shares: f64, lot_size: u64) -> u64 {
    if !(shares.is_finite() && shares > 0.0) || lot_size == 0 {
        return 0;
    }
    // `as` saturates; cap so the product stays in range
    let lots = ((shares / lot_size as f64).floor() as u64).min(u64::MAX / lot_size);
    lots * lot_size
}

fn validate_amount(amount: f64) -> Result<(), BrokerError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(BrokerError::InvalidAmount(amount))
    }
}

fn validate_price(price: f64) -> Result<(), BrokerError> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(BrokerError::InvalidPrice(price))
    }
}
