use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use replaylab_core::data::{business_days, CsvProvider, DataSource, SyntheticProvider};
use replaylab_core::{NullSink, RecordingSink};
use replaylab_runner::config::ConfigError;
use replaylab_runner::{load_report, run_from_config, save_artifacts, BacktestConfig, RunError};

const SYMBOLS: [&str; 2] = ["000001", "600000"];

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

fn write_fixture(dir: &Path, days: usize) {
    let provider = SyntheticProvider::new(11, start(), days);
    let csv = CsvProvider::new(dir);
    for symbol in SYMBOLS {
        csv.write(symbol, &provider.generate(symbol)).unwrap();
    }
}

fn csv_config(dir: &Path, extra_backtest: &str, strategy: &str) -> BacktestConfig {
    let toml = format!(
        r#"
[backtest]
initial_cash = 1000000.0
commission_rate = 0.0003
{extra_backtest}

[data]
source = "csv"
dir = "{}"
symbols = ["000001", "600000"]

[strategy]
{strategy}
"#,
        dir.display().to_string().replace('\\', "/")
    );
    BacktestConfig::from_toml(&toml).unwrap()
}

#[test]
fn csv_directory_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 80);
    let config = csv_config(dir.path(), "", r#"type = "buy_and_hold""#);

    let sink = RecordingSink::new();
    let result = run_from_config(&config, &sink).unwrap();

    assert_eq!(result.strategy, "buy_and_hold");
    assert_eq!(result.symbols, SYMBOLS);
    assert_eq!(result.report.trading_days, 80);
    assert_eq!(result.report.total_trades, 2);
    assert_eq!(result.start_date, "2024-01-02");
    assert_eq!(result.strategy_failures, 0);
    // RunStarted + 2 trades + RunFinished
    assert_eq!(sink.len(), 4);
    for pos in result.report.final_positions.values() {
        assert_eq!(pos.quantity % 100, 0);
    }
}

#[test]
fn date_window_limits_trading_days() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 120);
    let config = csv_config(
        dir.path(),
        "start = \"2024-03-01\"\nend = \"2024-04-30\"",
        r#"type = "buy_and_hold""#,
    );

    let lo = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let hi = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
    let expected = business_days(start())
        .take(120)
        .filter(|d| *d >= lo && *d <= hi)
        .count();

    let result = run_from_config(&config, &NullSink).unwrap();
    assert_eq!(result.report.trading_days, expected);
    assert_eq!(result.start_date, "2024-03-01");
    assert_eq!(result.end_date, "2024-04-30");
}

#[test]
fn identical_runs_share_a_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 150);
    let config = csv_config(
        dir.path(),
        "",
        "type = \"ma_breakout\"\nwindow = 10\nbuy_fraction = 0.3",
    );

    let a = run_from_config(&config, &NullSink).unwrap();
    let b = run_from_config(&config, &NullSink).unwrap();
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.dataset_hash, b.dataset_hash);
    assert_eq!(a, b);
}

#[test]
fn every_snapshot_balances() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), 150);
    let config = csv_config(
        dir.path(),
        "",
        "type = \"ma_breakout\"\nwindow = 5\nbuy_fraction = 0.5",
    );

    let result = run_from_config(&config, &NullSink).unwrap();
    assert!(result.report.total_trades > 0);
    for snap in &result.report.equity_curve {
        assert!(snap.cash >= 0.0);
        assert!((snap.total_value - (snap.cash + snap.market_value)).abs() < 1e-6);
    }
}

#[test]
fn artifacts_round_trip_through_disk() {
    let data_dir = tempfile::tempdir().unwrap();
    write_fixture(data_dir.path(), 60);
    let config = csv_config(data_dir.path(), "", r#"type = "buy_and_hold""#);
    let result = run_from_config(&config, &NullSink).unwrap();

    let out = tempfile::tempdir().unwrap();
    let run_dir = save_artifacts(&result, &out.path().join("run-1")).unwrap();

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    // header + one row per trading day
    assert_eq!(equity.lines().count(), 61);
    let trades = std::fs::read_to_string(run_dir.join("trades.csv")).unwrap();
    assert_eq!(trades.lines().count(), 3);

    assert_eq!(load_report(&run_dir).unwrap(), result);
}

#[test]
fn env_overrides_replace_source_and_cash() {
    let mut config = BacktestConfig::new(DataSource::Csv, vec!["A".into()]);
    let env: HashMap<&str, &str> = HashMap::from([
        ("REPLAYLAB_DATA_SOURCE", "synthetic"),
        ("REPLAYLAB_INITIAL_CASH", "500000"),
    ]);
    config
        .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
        .unwrap();
    config.data.synthetic_days = 30;

    let result = run_from_config(&config, &NullSink).unwrap();
    assert_eq!(result.report.initial_capital, 500_000.0);
    assert_eq!(result.report.trading_days, 30);
}

#[test]
fn csv_source_without_dir_is_rejected() {
    let config = BacktestConfig::new(DataSource::Csv, vec!["A".into()]);
    let err = run_from_config(&config, &NullSink).unwrap_err();
    assert!(matches!(
        err,
        RunError::Config(ConfigError::MissingDataDir(DataSource::Csv))
    ));
}

#[test]
fn missing_symbols_yield_no_trading_days() {
    let dir = tempfile::tempdir().unwrap();
    let config = csv_config(dir.path(), "", r#"type = "buy_and_hold""#);
    let err = run_from_config(&config, &NullSink).unwrap_err();
    assert!(matches!(err, RunError::Backtest(_)));
}
