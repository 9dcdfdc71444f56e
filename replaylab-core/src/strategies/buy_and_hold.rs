//! Buy each symbol once on its first tradable bar, then hold.

use crate::broker::Broker;
use crate::domain::Timestamp;
use crate::strategy::{Strategy, StrategyError};
use crate::view::MarketView;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    /// Fraction of current cash spent on each symbol's entry, in (0, 1).
    fraction: f64,
    entered: BTreeSet<String>,
}

impl BuyAndHold {
    pub const DEFAULT_FRACTION: f64 = 0.95;

    /// `fraction` must lie in (0, 1); a fraction of 1 would read as one share.
    pub fn new(fraction: f64) -> Result<Self, StrategyError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(StrategyError::InvalidParameter(format!(
                "buy_and_hold fraction must be in (0, 1), got {fraction}"
            )));
        }
        Ok(Self {
            fraction,
            entered: BTreeSet::new(),
        })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl Default for BuyAndHold {
    fn default() -> Self {
        Self {
            fraction: Self::DEFAULT_FRACTION,
            entered: BTreeSet::new(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_bar(
        &mut self,
        view: &MarketView<'_>,
        broker: &mut Broker,
        _timestamp: Timestamp,
    ) -> Result<(), StrategyError> {
        let pending: Vec<&str> = view
            .symbols()
            .filter(|s| !self.entered.contains(*s))
            .collect();
        for symbol in pending {
            let Some(price) = view.price(symbol) else {
                continue;
            };
            let filled = broker.buy(symbol, self.fraction, price)?;
            debug!(symbol, price, filled, "buy-and-hold entry");
            self.entered.insert(symbol.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BarSeries, MarketData};
    use crate::domain::Bar;
    use chrono::NaiveDate;

    fn ts(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            amount: None,
        }
    }

    #[test]
    fn enters_each_symbol_once() {
        let mut data = MarketData::new();
        data.insert("A".into(), BarSeries::new(vec![bar(2, 10.0), bar(3, 11.0)]));
        data.insert("B".into(), BarSeries::new(vec![bar(3, 20.0)]));

        let mut strategy = BuyAndHold::new(0.5).unwrap();
        let mut broker = Broker::with_cash(100_000.0);
        for day in [2, 3] {
            let view = MarketView::as_of(&data, ts(day));
            strategy.on_bar(&view, &mut broker, ts(day)).unwrap();
        }

        let sides: Vec<&str> = broker.trades().iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(sides, vec!["A", "B"]);
        assert!(broker.position("A") > 0);
        assert!(broker.position("B") > 0);
    }

    #[test]
    fn rejects_fraction_outside_unit_interval() {
        for bad in [0.0, 1.0, -0.5, f64::NAN] {
            let err = BuyAndHold::new(bad).unwrap_err();
            assert!(matches!(err, StrategyError::InvalidParameter(_)), "{bad}");
        }
        assert_eq!(BuyAndHold::default().fraction(), BuyAndHold::DEFAULT_FRACTION);
    }
}
