//! Run events and the optional sink they are pushed to.
//!
//! The loop calls the sink synchronously at run start, after every executed
//! trade, on each strategy failure and at run end. Sinks never influence the
//! replay.

use crate::domain::{Timestamp, Trade};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BacktestEvent {
    RunStarted {
        strategy: String,
        trading_days: usize,
        initial_cash: f64,
    },
    TradeExecuted(Trade),
    StrategyFailed {
        timestamp: Timestamp,
        message: String,
    },
    RunFinished {
        final_value: f64,
        trades: usize,
    },
}

pub trait EventSink {
    fn emit(&self, event: &BacktestEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &BacktestEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &BacktestEvent) {
        match event {
            BacktestEvent::RunStarted {
                strategy,
                trading_days,
                initial_cash,
            } => info!(strategy = %strategy, trading_days, initial_cash, "run started"),
            BacktestEvent::TradeExecuted(trade) => info!(
                timestamp = %trade.timestamp,
                symbol = %trade.symbol,
                side = %trade.side,
                quantity = trade.quantity,
                price = trade.price,
                "trade"
            ),
            BacktestEvent::StrategyFailed { timestamp, message } => {
                warn!(timestamp = %timestamp, error = %message, "strategy failed")
            }
            BacktestEvent::RunFinished {
                final_value,
                trades,
            } => info!(final_value, trades, "run finished"),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BacktestEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BacktestEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &BacktestEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: &BacktestEvent) {
        (**self).emit(event)
    }
}
