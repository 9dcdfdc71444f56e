//! As-of market view handed to strategies.
//!
//! At timestamp `t` a strategy sees, per symbol, only bars stamped `<= t`.
//! The slices borrow straight from the run's `MarketData`; nothing is copied.

use crate::data::MarketData;
use crate::domain::{Bar, PriceMap, Symbol, Timestamp};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct MarketView<'a> {
    timestamp: Timestamp,
    visible: BTreeMap<&'a str, &'a [Bar]>,
}

impl<'a> MarketView<'a> {
    /// Build the view at `t`. Symbols with no visible bars are left out.
    pub fn as_of(data: &'a MarketData, t: Timestamp) -> Self {
        let visible = data
            .iter()
            .filter_map(|(symbol, series)| {
                let bars = series.as_of(t);
                (!bars.is_empty()).then_some((symbol.as_str(), bars))
            })
            .collect();
        Self {
            timestamp: t,
            visible,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Visible history for `symbol`, oldest first.
    pub fn get(&self, symbol: &str) -> Option<&'a [Bar]> {
        self.visible.get(symbol).copied()
    }

    pub fn latest(&self, symbol: &str) -> Option<&'a Bar> {
        self.get(symbol).and_then(|bars| bars.last())
    }

    pub fn closes(&self, symbol: &str) -> Vec<f64> {
        self.get(symbol)
            .map(|bars| bars.iter().map(|b| b.close).collect())
            .unwrap_or_default()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.visible.keys().copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.visible.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Close at exactly the view timestamp; `None` if the symbol did not trade.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.latest(symbol)
            .filter(|b| b.timestamp == self.timestamp)
            .map(|b| b.close)
    }

    /// Prices of every symbol that traded at the view timestamp.
    pub fn price_map(&self) -> PriceMap {
        self.visible
            .iter()
            .filter_map(|(symbol, bars)| {
                bars.last()
                    .filter(|b| b.timestamp == self.timestamp)
                    .map(|b| (Symbol::from(*symbol), b.close))
            })
            .collect()
    }
}
