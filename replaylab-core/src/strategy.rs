//! Strategy trait: the user-supplied decision logic driven by the loop.

use crate::broker::{Broker, BrokerError};
use crate::domain::Timestamp;
use crate::view::MarketView;
use thiserror::Error;

/// Failure raised from `on_bar` or a strategy constructor. The loop logs an
/// `on_bar` failure and moves to the next bar.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("no data for symbol '{symbol}'")]
    MissingData { symbol: String },

    #[error("invalid strategy parameter: {0}")]
    InvalidParameter(String),

    /// `on_bar` panicked; the loop caught it and carried on.
    #[error("strategy panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Custom(String),
}

impl StrategyError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Decision logic replayed over the trading calendar.
///
/// `on_bar` sees only the as-of view for its timestamp and trades through the
/// broker it is handed. An `Err` or a panic from `on_bar` is counted as a
/// failed bar and the run continues; trades already filled on that bar stand.
/// `on_start` runs once before the first bar and `on_end` once after the
/// last; both default to no-ops, and a panic in either aborts the run.
pub trait Strategy {
    /// Short name used in logs, events and reports.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn on_start(&mut self, _broker: &mut Broker) {}

    fn on_bar(
        &mut self,
        view: &MarketView<'_>,
        broker: &mut Broker,
        timestamp: Timestamp,
    ) -> Result<(), StrategyError>;

    fn on_end(&mut self, _broker: &mut Broker) {}
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_start(&mut self, broker: &mut Broker) {
        (**self).on_start(broker)
    }

    fn on_bar(
        &mut self,
        view: &MarketView<'_>,
        broker: &mut Broker,
        timestamp: Timestamp,
    ) -> Result<(), StrategyError> {
        (**self).on_bar(view, broker, timestamp)
    }

    fn on_end(&mut self, broker: &mut Broker) {
        (**self).on_end(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl Strategy for Idle {
        fn on_bar(
            &mut self,
            _view: &MarketView<'_>,
            _broker: &mut Broker,
            _timestamp: Timestamp,
        ) -> Result<(), StrategyError> {
            Ok(())
        }
    }

    #[test]
    fn default_name_is_type_name() {
        assert_eq!(Idle.name(), "Idle");
        let boxed: Box<dyn Strategy> = Box::new(Idle);
        assert_eq!(boxed.name(), "Idle");
    }

    #[test]
    fn broker_errors_convert() {
        let err: StrategyError = BrokerError::InvalidPrice(0.0).into();
        assert!(matches!(err, StrategyError::Broker(_)));
    }
}
