//! ReplayLab CLI: run, synth, and inspect commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file and/or flags
//! - `synth`: write seeded synthetic daily bars as CSV files
//! - `inspect`: print the summary of a saved report
//!
//! Logging goes to stderr through `tracing`; `REPLAYLAB_LOG` takes precedence
//! over `--log-level`.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

use replaylab_core::data::{CsvProvider, DataSource, SyntheticProvider};
use replaylab_core::strategies::{BuyAndHold, MaBreakout};
use replaylab_core::TracingSink;
use replaylab_runner::{
    load_report, run_from_config, save_artifacts, BacktestConfig, BacktestResult,
    StrategyConfig,
};

const LOG_ENV: &str = "REPLAYLAB_LOG";

#[derive(Parser)]
#[command(
    name = "replaylab",
    about = "ReplayLab CLI: event-driven daily-bar backtesting"
)]
struct Cli {
    /// Log filter used when REPLAYLAB_LOG is unset (e.g. info, debug, replaylab_core=trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyKind {
    BuyAndHold,
    MaBreakout,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest. Flags override values from --config.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbols to trade (comma separated or repeated).
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Data source: csv, parquet, synthetic.
        #[arg(long)]
        source: Option<String>,

        /// Data directory for csv/parquet sources.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Inclusive start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Built-in strategy.
        #[arg(long, value_enum)]
        strategy: Option<StrategyKind>,

        /// Moving-average window for ma-breakout.
        #[arg(long, default_value_t = 20)]
        window: usize,

        /// Fraction of cash committed per buy.
        #[arg(long)]
        fraction: Option<f64>,

        /// Starting cash.
        #[arg(long)]
        cash: Option<f64>,

        /// Commission rate applied to traded notional.
        #[arg(long)]
        commission: Option<f64>,

        /// Directory receiving the run artifacts.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the summary only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Write synthetic daily bars as `{out_dir}/{symbol}.csv`.
    Synth {
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,

        /// Number of business days per symbol.
        #[arg(long, default_value_t = 250)]
        days: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// First business day (YYYY-MM-DD).
        #[arg(long, default_value = "2020-01-02")]
        start: String,

        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Print the summary of a saved report (`report.json` or its run directory).
    Inspect {
        path: PathBuf,

        /// Dump the full report as JSON instead of the summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run {
            config,
            symbols,
            source,
            data_dir,
            start,
            end,
            strategy,
            window,
            fraction,
            cash,
            commission,
            output_dir,
            no_save,
        } => {
            let overrides = RunOverrides {
                symbols,
                source,
                data_dir,
                start,
                end,
                strategy,
                window,
                fraction,
                cash,
                commission,
                output_dir,
            };
            run_backtest_cmd(config.as_deref(), overrides, no_save)
        }
        Commands::Synth {
            symbols,
            days,
            seed,
            start,
            out_dir,
        } => run_synth(&symbols, days, seed, &start, &out_dir),
        Commands::Inspect { path, json } => run_inspect(&path, json),
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    let filter = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .with_context(|| format!("invalid log filter '{filter}'"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
    Ok(())
}

struct RunOverrides {
    symbols: Vec<String>,
    source: Option<String>,
    data_dir: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    strategy: Option<StrategyKind>,
    window: usize,
    fraction: Option<f64>,
    cash: Option<f64>,
    commission: Option<f64>,
    output_dir: Option<PathBuf>,
}

impl RunOverrides {
    fn apply(self, config: &mut BacktestConfig) {
        if !self.symbols.is_empty() {
            config.data.symbols = self.symbols;
        }
        if let Some(source) = self.source {
            config.data.source = source;
        }
        if self.data_dir.is_some() {
            config.data.dir = self.data_dir;
        }
        if self.start.is_some() {
            config.backtest.start = self.start;
        }
        if self.end.is_some() {
            config.backtest.end = self.end;
        }
        if let Some(cash) = self.cash {
            config.backtest.initial_cash = cash;
        }
        if let Some(rate) = self.commission {
            config.backtest.commission_rate = rate;
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        match self.strategy {
            Some(StrategyKind::BuyAndHold) => {
                config.strategy = StrategyConfig::BuyAndHold {
                    fraction: self.fraction.unwrap_or(BuyAndHold::DEFAULT_FRACTION),
                };
            }
            Some(StrategyKind::MaBreakout) => {
                config.strategy = StrategyConfig::MaBreakout {
                    window: self.window,
                    buy_fraction: self
                        .fraction
                        .unwrap_or_else(|| MaBreakout::default().buy_fraction()),
                };
            }
            None => {
                if let Some(f) = self.fraction {
                    match &mut config.strategy {
                        StrategyConfig::BuyAndHold { fraction } => *fraction = f,
                        StrategyConfig::MaBreakout { buy_fraction, .. } => *buy_fraction = f,
                    }
                }
            }
        }
    }
}

fn run_backtest_cmd(
    config_path: Option<&Path>,
    overrides: RunOverrides,
    no_save: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => BacktestConfig::from_file(path)?,
        None => {
            let Some(source) = overrides.source.as_deref() else {
                bail!("one of --config or --source is required");
            };
            let source: DataSource = source.parse()?;
            BacktestConfig::new(source, Vec::new())
        }
    };

    // file < environment < flags
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    overrides.apply(&mut config);
    config.validate()?;

    info!(
        source = %config.data.source,
        symbols = config.data.symbols.len(),
        strategy = config.strategy.name(),
        "starting backtest"
    );

    let result = run_from_config(&config, &TracingSink)?;
    print_summary(&result);

    if !no_save {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let run_dir = config
            .output
            .dir
            .join(format!("{}_{stamp}", result.strategy));
        let run_dir = save_artifacts(&result, &run_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

fn run_synth(symbols: &[String], days: usize, seed: u64, start: &str, out_dir: &Path) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{start}' (expected YYYY-MM-DD)"))?;
    if days == 0 {
        bail!("--days must be at least 1");
    }

    let provider = SyntheticProvider::new(seed, start, days);
    let store = CsvProvider::new(out_dir);
    for symbol in symbols {
        let series = provider.generate(symbol);
        let path = store.write(symbol, &series)?;
        println!("{symbol}: {} bars -> {}", series.len(), path.display());
    }
    Ok(())
}

fn run_inspect(path: &Path, json: bool) -> Result<()> {
    let result = load_report(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let r = &result.report;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Symbols:        {}", result.symbols.join(", "));
    println!(
        "Period:         {} to {}",
        result.start_date, result.end_date
    );
    println!("Trading Days:   {}", r.trading_days);
    println!("Trades:         {}", r.total_trades);
    println!();
    println!("--- Performance ---");
    println!("Initial:        {:.2}", r.initial_capital);
    println!("Final:          {:.2}", r.final_value);
    println!("Total Return:   {:.2}%", r.total_return * 100.0);
    println!("Annual Return:  {:.2}%", r.annual_return * 100.0);
    println!("Volatility:     {:.2}%", r.volatility * 100.0);
    println!("Sharpe:         {:.3}", r.sharpe_ratio);
    println!("Max Drawdown:   {:.2}%", r.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", r.win_rate * 100.0);
    println!("Commission:     {:.2}", r.total_commission);
    if result.strategy_failures > 0 {
        println!();
        println!(
            "WARNING: strategy failed on {} bar(s); see log",
            result.strategy_failures
        );
    }
    println!("Fingerprint:    {}", result.fingerprint);
    println!();
}
