//! Deterministic synthetic bar series.
//!
//! Each symbol gets its own sub-seed derived from the master seed via BLAKE3,
//! so a symbol's series does not depend on which other symbols are generated
//! or in what order (the parallel loader relies on this).

use super::provider::{DataError, DataProvider};
use super::series::BarSeries;
use crate::domain::{Bar, Timestamp};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded geometric random walk over business days.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    start: NaiveDate,
    days: usize,
    start_price: f64,
    daily_vol: f64,
    drift: f64,
}

impl SyntheticProvider {
    pub fn new(seed: u64, start: NaiveDate, days: usize) -> Self {
        Self {
            seed,
            start,
            days,
            start_price: 10.0,
            daily_vol: 0.02,
            drift: 0.0003,
        }
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_volatility(mut self, daily_vol: f64) -> Self {
        self.daily_vol = daily_vol;
        self
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Sub-seed for `symbol`, independent of generation order.
    pub fn symbol_seed(&self, symbol: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn generate(&self, symbol: &str) -> BarSeries {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let mut bars = Vec::with_capacity(self.days);
        let mut close = self.start_price;

        for date in business_days(self.start).take(self.days) {
            let open = close;
            let ret = self.drift + self.daily_vol * standard_normal(&mut rng);
            close = (open * ret.exp()).max(0.01);

            let spread = self.daily_vol * rng.gen::<f64>();
            let high = open.max(close) * (1.0 + spread);
            let low = open.min(close) * (1.0 - spread);
            let volume = (rng.gen_range(50_000..500_000) / 100 * 100) as f64;

            let bar = Bar {
                timestamp: midnight(date),
                open: round2(open),
                high: round2(high),
                low: round2(low).max(0.01),
                close: round2(close),
                volume,
                amount: None,
            };
            bars.push(Bar {
                amount: Some(round2(bar.close * volume)),
                ..bar
            });
        }
        BarSeries::new(bars)
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str) -> Result<BarSeries, DataError> {
        Ok(self.generate(symbol))
    }
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn midnight(date: NaiveDate) -> Timestamp {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Weekdays starting at `start` (inclusive).
pub fn business_days(start: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(start), |d| d.checked_add_signed(Duration::days(1)))
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}
