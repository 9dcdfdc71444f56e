//! Moving-average breakout.
//!
//! Flat and close above its `window`-bar simple moving average: buy
//! `buy_fraction` of cash. Holding and close below the average: sell out.

use crate::broker::Broker;
use crate::domain::{Bar, Timestamp};
use crate::strategy::{Strategy, StrategyError};
use crate::view::MarketView;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct MaBreakout {
    window: usize,
    buy_fraction: f64,
}

impl MaBreakout {
    pub fn new(window: usize, buy_fraction: f64) -> Result<Self, StrategyError> {
        if window == 0 {
            return Err(StrategyError::InvalidParameter(
                "ma_breakout window must be >= 1".into(),
            ));
        }
        if !(buy_fraction > 0.0 && buy_fraction < 1.0) {
            return Err(StrategyError::InvalidParameter(format!(
                "ma_breakout buy_fraction must be in (0, 1), got {buy_fraction}"
            )));
        }
        Ok(Self {
            window,
            buy_fraction,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn buy_fraction(&self) -> f64 {
        self.buy_fraction
    }
}

impl Default for MaBreakout {
    fn default() -> Self {
        Self {
            window: 20,
            buy_fraction: 0.5,
        }
    }
}

/// Mean close of the last `window` bars, `None` until enough history exists.
pub fn trailing_sma(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    Some(tail.iter().map(|b| b.close).sum::<f64>() / window as f64)
}

impl Strategy for MaBreakout {
    fn name(&self) -> &str {
        "ma_breakout"
    }

    fn on_bar(
        &mut self,
        view: &MarketView<'_>,
        broker: &mut Broker,
        _timestamp: Timestamp,
    ) -> Result<(), StrategyError> {
        let symbols: Vec<&str> = view.symbols().collect();
        for symbol in symbols {
            // only act on symbols that traded at this timestamp
            let Some(price) = view.price(symbol) else {
                continue;
            };
            let bars = view.get(symbol).ok_or_else(|| StrategyError::MissingData {
                symbol: symbol.to_string(),
            })?;
            let Some(ma) = trailing_sma(bars, self.window) else {
                continue;
            };

            let held = broker.position(symbol);
            trace!(symbol, price, ma, held, "ma breakout check");
            if held == 0 && price > ma {
                broker.buy(symbol, self.buy_fraction, price)?;
            } else if held > 0 && price < ma {
                broker.sell(symbol, 1.0, price)?;
            }
        }
        Ok(())
    }
}
