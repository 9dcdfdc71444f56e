//! Trading calendar: the sorted union of bar timestamps across symbols.

use crate::data::{BarSeries, MarketData};
use crate::domain::Timestamp;
use chrono::NaiveDate;
use std::borrow::Cow;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("invalid date window: start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("no trading days in the requested window")]
    NoTradingDays,
}

/// Inclusive date window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, CalendarError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(CalendarError::InvalidWindow { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Window with no bounds: every timestamp is included.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        let d = t.date();
        self.start.map_or(true, |s| d >= s) && self.end.map_or(true, |e| d <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Cut every series down to the bars inside the window, so history
    /// before `start` is never visible. Borrows when unbounded.
    pub fn clip<'a>(&self, data: &'a MarketData) -> Cow<'a, MarketData> {
        if self.is_unbounded() {
            return Cow::Borrowed(data);
        }
        Cow::Owned(
            data.iter()
                .map(|(symbol, series)| {
                    let bars = series.window(self.start, self.end).to_vec();
                    (symbol.clone(), BarSeries::new(bars))
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<Timestamp>,
}

impl TradingCalendar {
    /// Union of every symbol's timestamps inside `window`, ascending.
    pub fn build(data: &MarketData, window: DateWindow) -> Result<Self, CalendarError> {
        let mut days = BTreeSet::new();
        for series in data.values() {
            days.extend(
                series
                    .window(window.start, window.end)
                    .iter()
                    .map(|b| b.timestamp),
            );
        }
        if days.is_empty() {
            return Err(CalendarError::NoTradingDays);
        }
        Ok(Self {
            days: days.into_iter().collect(),
        })
    }

    pub fn days(&self) -> &[Timestamp] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first(&self) -> Option<Timestamp> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<Timestamp> {
        self.days.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.days.iter().copied()
    }
}
