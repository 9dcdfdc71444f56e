//! The simulation loop: deterministic, single-threaded replay of a strategy
//! over the trading calendar.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};

use crate::broker::{Broker, BrokerConfig};
use crate::calendar::{DateWindow, TradingCalendar};
use crate::data::MarketData;
use crate::domain::{EquitySnapshot, Timestamp};
use crate::events::{BacktestEvent, EventSink, NullSink};
use crate::strategy::{Strategy, StrategyError};
use crate::view::MarketView;

use super::state::{BacktestError, RunResult, RunState};

use tracing::{debug, info, warn};

/// One replay of one strategy over one immutable data snapshot.
///
/// The loop owns the broker for the duration of the run; the strategy only
/// borrows it inside its callbacks.
pub struct SimulationLoop<'a> {
    data: Cow<'a, MarketData>,
    calendar: TradingCalendar,
    broker: Broker,
    sink: &'a dyn EventSink,
    state: RunState,
    snapshots: Vec<EquitySnapshot>,
    strategy_failures: usize,
}

impl<'a> SimulationLoop<'a> {
    /// Clip the data to the window, build the calendar and a fresh broker.
    /// Fails before any strategy code runs if the configuration is invalid or
    /// the window has no bars.
    pub fn new(
        data: &'a MarketData,
        window: DateWindow,
        config: BrokerConfig,
    ) -> Result<Self, BacktestError> {
        BacktestError::check_config(&config)?;
        let data = window.clip(data);
        let calendar = TradingCalendar::build(&data, window)?;
        Ok(Self {
            data,
            snapshots: Vec::with_capacity(calendar.len()),
            calendar,
            broker: Broker::new(config),
            sink: &NullSink,
            state: RunState::Init,
            strategy_failures: 0,
        })
    }

    pub fn with_sink(mut self, sink: &'a dyn EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Drive `strategy` through `Init → Running → Finished`.
    pub fn run<S: Strategy + ?Sized>(mut self, strategy: &mut S) -> RunResult {
        let name = strategy.name().to_string();
        info!(
            strategy = %name,
            trading_days = self.calendar.len(),
            symbols = self.data.len(),
            initial_cash = self.broker.initial_cash(),
            "backtest started"
        );
        self.sink.emit(&BacktestEvent::RunStarted {
            strategy: name.clone(),
            trading_days: self.calendar.len(),
            initial_cash: self.broker.initial_cash(),
        });

        if let Some(first) = self.calendar.first() {
            self.broker.set_clock(first);
        }
        let seen = self.broker.trades().len();
        strategy.on_start(&mut self.broker);
        self.emit_trades_since(seen);
        self.state = RunState::Running;

        let days = self.calendar.days().to_vec();
        for t in days {
            self.step(strategy, &name, t);
        }

        let seen = self.broker.trades().len();
        strategy.on_end(&mut self.broker);
        self.emit_trades_since(seen);
        self.state = RunState::Finished;

        let result = RunResult {
            strategy: name,
            calendar: self.calendar,
            snapshots: self.snapshots,
            broker: self.broker,
            strategy_failures: self.strategy_failures,
        };
        info!(
            final_value = result.final_value(),
            trades = result.trades().len(),
            strategy_failures = result.strategy_failures,
            "backtest finished"
        );
        self.sink.emit(&BacktestEvent::RunFinished {
            final_value: result.final_value(),
            trades: result.trades().len(),
        });
        result
    }

    fn step<S: Strategy + ?Sized>(&mut self, strategy: &mut S, name: &str, t: Timestamp) {
        let view = MarketView::as_of(&self.data, t);
        let prices = view.price_map();

        self.broker.set_clock(t);
        let seen = self.broker.trades().len();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            strategy.on_bar(&view, &mut self.broker, t)
        }))
        .unwrap_or_else(|payload| Err(StrategyError::Panicked(panic_message(payload.as_ref()))));
        self.emit_trades_since(seen);
        if let Err(err) = outcome {
            self.strategy_failures += 1;
            warn!(timestamp = %t, strategy = %name, error = %err, "strategy failed on bar");
            self.sink.emit(&BacktestEvent::StrategyFailed {
                timestamp: t,
                message: err.to_string(),
            });
        }

        let market_value = self.broker.market_value(&prices);
        let cash = self.broker.cash();
        debug!(timestamp = %t, cash, market_value, "equity snapshot");
        self.snapshots.push(EquitySnapshot {
            timestamp: t,
            cash,
            market_value,
            total_value: cash + market_value,
            positions: self.broker.position_map(),
            prices,
        });
    }

    fn emit_trades_since(&self, seen: usize) {
        for trade in &self.broker.trades()[seen..] {
            self.sink.emit(&BacktestEvent::TradeExecuted(trade.clone()));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Replay `strategy` over `data` in one call.
pub fn run_backtest<S: Strategy + ?Sized>(
    data: &MarketData,
    window: DateWindow,
    config: BrokerConfig,
    strategy: &mut S,
    sink: &dyn EventSink,
) -> Result<RunResult, BacktestError> {
    Ok(SimulationLoop::new(data, window, config)?
        .with_sink(sink)
        .run(strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BarSeries;
    use crate::domain::Bar;
    use crate::events::RecordingSink;
    use chrono::NaiveDate;

    fn ts(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn series(points: &[(u32, f64)]) -> BarSeries {
        BarSeries::new(
            points
                .iter()
                .map(|&(day, close)| Bar {
                    timestamp: ts(day),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1_000.0,
                    amount: None,
                })
                .collect(),
        )
    }

    fn frictionless() -> BrokerConfig {
        BrokerConfig {
            initial_cash: 100_000.0,
            commission_rate: 0.0,
            lot_size: 100,
        }
    }

    /// Records the hook sequence and what each bar could see.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        visible_max: Vec<Option<Timestamp>>,
    }

    impl Strategy for Recorder {
        fn on_start(&mut self, _broker: &mut Broker) {
            self.calls.push("start".into());
        }

        fn on_bar(
            &mut self,
            view: &MarketView<'_>,
            _broker: &mut Broker,
            timestamp: Timestamp,
        ) -> Result<(), StrategyError> {
            self.calls.push(format!("bar:{}", timestamp.date()));
            let newest = view
                .symbols()
                .filter_map(|s| view.latest(s).map(|b| b.timestamp))
                .max();
            self.visible_max.push(newest);
            Ok(())
        }

        fn on_end(&mut self, _broker: &mut Broker) {
            self.calls.push("end".into());
        }
    }

    #[test]
    fn hooks_run_in_lifecycle_order() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0), (3, 11.0)]));

        let sim = SimulationLoop::new(&data, DateWindow::unbounded(), frictionless()).unwrap();
        assert_eq!(sim.state(), RunState::Init);

        let mut recorder = Recorder::default();
        let result = sim.run(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec!["start", "bar:2024-01-02", "bar:2024-01-03", "end"]
        );
        assert_eq!(result.snapshots.len(), 2);
    }

    #[test]
    fn view_never_shows_future_bars() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0), (4, 12.0)]));
        data.insert("B".into(), series(&[(3, 20.0), (5, 21.0)]));

        let mut recorder = Recorder::default();
        let result = run_backtest(
            &data,
            DateWindow::unbounded(),
            frictionless(),
            &mut recorder,
            &NullSink,
        )
        .unwrap();

        for (snapshot, newest) in result.snapshots.iter().zip(&recorder.visible_max) {
            assert_eq!(*newest, Some(snapshot.timestamp));
        }
    }

    #[test]
    fn windowed_run_sees_only_in_window_history() {
        let mut data = MarketData::new();
        data.insert(
            "A".into(),
            series(&[(1, 10.0), (2, 10.0), (3, 10.0), (4, 10.0), (5, 10.0)]),
        );
        let window = DateWindow::new(Some(ts(3).date()), None).unwrap();

        struct VisibleLen(Vec<usize>);
        impl Strategy for VisibleLen {
            fn on_bar(
                &mut self,
                view: &MarketView<'_>,
                _broker: &mut Broker,
                _timestamp: Timestamp,
            ) -> Result<(), StrategyError> {
                self.0.push(view.get("A").map_or(0, |bars| bars.len()));
                Ok(())
            }
        }

        let mut seen = VisibleLen(Vec::new());
        run_backtest(&data, window, frictionless(), &mut seen, &NullSink).unwrap();
        assert_eq!(seen.0, vec![1, 2, 3]);
    }

    struct BuyThenFail;

    impl Strategy for BuyThenFail {
        fn on_bar(
            &mut self,
            _view: &MarketView<'_>,
            broker: &mut Broker,
            timestamp: Timestamp,
        ) -> Result<(), StrategyError> {
            if timestamp == ts(2) {
                broker.buy("A", 100.0, 10.0)?;
                return Err(StrategyError::custom("boom"));
            }
            Ok(())
        }
    }

    #[test]
    fn strategy_failure_is_logged_and_skipped() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0), (3, 12.0)]));
        let sink = RecordingSink::new();

        let result = run_backtest(
            &data,
            DateWindow::unbounded(),
            frictionless(),
            &mut BuyThenFail,
            &sink,
        )
        .unwrap();

        assert_eq!(result.strategy_failures, 1);
        assert_eq!(result.snapshots.len(), 2);
        // the trade made before the error stands
        assert_eq!(result.trades().len(), 1);
        assert_eq!(result.trades()[0].timestamp, ts(2));
        assert_eq!(result.snapshots[1].total_value, 100_000.0 - 1_000.0 + 1_200.0);

        let events = sink.events();
        assert!(matches!(events[0], BacktestEvent::RunStarted { trading_days: 2, .. }));
        assert!(matches!(events[1], BacktestEvent::TradeExecuted(_)));
        assert!(matches!(events[2], BacktestEvent::StrategyFailed { .. }));
        assert!(matches!(events[3], BacktestEvent::RunFinished { trades: 1, .. }));
    }

    struct PanicOnSecondBar;

    impl Strategy for PanicOnSecondBar {
        fn on_bar(
            &mut self,
            _view: &MarketView<'_>,
            broker: &mut Broker,
            timestamp: Timestamp,
        ) -> Result<(), StrategyError> {
            if timestamp == ts(3) {
                broker.buy("A", 100.0, 12.0)?;
                panic!("index out of range");
            }
            Ok(())
        }
    }

    #[test]
    fn strategy_panic_counts_as_failed_bar() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0), (3, 12.0), (4, 13.0)]));
        let sink = RecordingSink::new();

        let result = run_backtest(
            &data,
            DateWindow::unbounded(),
            frictionless(),
            &mut PanicOnSecondBar,
            &sink,
        )
        .unwrap();

        assert_eq!(result.strategy_failures, 1);
        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(result.trades().len(), 1);
        assert_eq!(result.snapshots[2].total_value, 100_000.0 - 1_200.0 + 1_300.0);

        let failed: Vec<String> = sink
            .events()
            .iter()
            .filter_map(|e| match e {
                BacktestEvent::StrategyFailed { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["strategy panicked: index out of range".to_string()]);
    }

    #[test]
    fn empty_window_fails_before_start() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0)]));
        let window = DateWindow::new(Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()), None)
            .unwrap();
        let mut recorder = Recorder::default();
        let err = run_backtest(&data, window, frictionless(), &mut recorder, &NullSink).unwrap_err();
        assert!(matches!(err, BacktestError::Calendar(_)));
        assert!(recorder.calls.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut data = MarketData::new();
        data.insert("A".into(), series(&[(2, 10.0)]));
        let config = BrokerConfig {
            lot_size: 0,
            ..frictionless()
        };
        assert!(matches!(
            SimulationLoop::new(&data, DateWindow::unbounded(), config),
            Err(BacktestError::InvalidConfig(_))
        ));
    }
}
