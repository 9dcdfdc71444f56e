//! Per-symbol bar series and the multi-symbol market data snapshot.

use crate::domain::{Bar, Symbol, Timestamp};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Immutable market data for a run: one series per symbol, ordered by symbol.
pub type MarketData = BTreeMap<Symbol, BarSeries>;

/// Bars for one symbol, sorted ascending by timestamp with unique timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series from bars in any order.
    ///
    /// Bars are sorted by timestamp; when two bars share a timestamp the one
    /// appearing later in the input wins.
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.bars.iter().map(|b| b.timestamp)
    }

    /// Bars with `timestamp <= t`: everything a strategy may see at `t`.
    pub fn as_of(&self, t: Timestamp) -> &[Bar] {
        let end = self.bars.partition_point(|b| b.timestamp <= t);
        &self.bars[..end]
    }

    /// The bar stamped exactly `t`, if the symbol traded then.
    pub fn at(&self, t: Timestamp) -> Option<&Bar> {
        self.bars
            .binary_search_by_key(&t, |b| b.timestamp)
            .ok()
            .map(|i| &self.bars[i])
    }

    /// Bars whose calendar date falls in `[start, end]` (either bound optional).
    pub fn window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> &[Bar] {
        let lo = match start {
            Some(d) => self.bars.partition_point(|b| b.timestamp.date() < d),
            None => 0,
        };
        let hi = match end {
            Some(d) => self.bars.partition_point(|b| b.timestamp.date() <= d),
            None => self.bars.len(),
        };
        if lo >= hi {
            &[]
        } else {
            &self.bars[lo..hi]
        }
    }
}

impl From<Vec<Bar>> for BarSeries {
    fn from(bars: Vec<Bar>) -> Self {
        Self::new(bars)
    }
}

/// Parse a bar timestamp: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or
/// `YYYY-MM-DDTHH:MM:SS`. Dates map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

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
            volume: 1000.0,
            amount: None,
        }
    }

    #[test]
    fn new_sorts_and_dedups_last_wins() {
        let series = BarSeries::new(vec![bar(3, 3.0), bar(1, 1.0), bar(3, 33.0), bar(2, 2.0)]);
        let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 33.0]);
    }

    #[test]
    fn as_of_excludes_future_bars() {
        let series = BarSeries::new(vec![bar(2, 2.0), bar(4, 4.0), bar(6, 6.0)]);
        assert!(series.as_of(ts(1)).is_empty());
        assert_eq!(series.as_of(ts(4)).len(), 2);
        assert_eq!(series.as_of(ts(5)).len(), 2);
        assert_eq!(series.as_of(ts(9)).len(), 3);
    }

    #[test]
    fn at_finds_exact_timestamp_only() {
        let series = BarSeries::new(vec![bar(2, 2.0), bar(4, 4.0)]);
        assert_eq!(series.at(ts(4)).map(|b| b.close), Some(4.0));
        assert!(series.at(ts(3)).is_none());
    }

    #[test]
    fn window_is_inclusive() {
        let series = BarSeries::new((1..=10).map(|d| bar(d, d as f64)).collect());
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        assert_eq!(series.window(Some(d(3)), Some(d(5))).len(), 3);
        assert_eq!(series.window(None, Some(d(2))).len(), 2);
        assert_eq!(series.window(Some(d(9)), None).len(), 2);
        assert!(series.window(Some(d(6)), Some(d(5))).is_empty());
    }

    #[test]
    fn parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-02"), Some(ts(2)));
        assert_eq!(
            parse_timestamp("2024-01-02 09:31:00"),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 31, 0)
        );
        assert!(parse_timestamp("02/01/2024").is_none());
    }
}
