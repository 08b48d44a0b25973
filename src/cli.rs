//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::adapters::clock::{FixedClock, SystemClock};
use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::gregorian_calendar::GregorianCalendar;
use crate::adapters::projected_gradient::ProjectedGradientOptimizer;
use crate::domain::context::UniverseContext;
use crate::domain::error::RebalancerError;
use crate::domain::metrics::SequenceMetrics;
use crate::domain::timeline::{build_timeline, RebalancePeriod, TimelineRequest};
use crate::domain::universe::{UniverseSpec, UNIVERSE_SECTION};
use crate::ports::clock_port::ClockPort;
use crate::ports::optimizer_port::Objective;
use crate::ports::price_port::PricePort;

#[derive(Parser, Debug)]
#[command(
    name = "rebalancer",
    about = "Rolling mean-variance portfolio rebalancing backtester"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the rebalancing backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV, overriding [universe] data_source
        #[arg(long)]
        data: Option<PathBuf>,
        /// Treat this date as "now" (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Print the rebalance timeline without solving
    Timeline {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Validate a universe configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the assets and date range of a price file
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

impl Cli {
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("warning: tracing subscriber already set");
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    cli.init_logging();

    match cli.command {
        Command::Backtest {
            config,
            data,
            as_of,
        } => run_backtest(&config, data.as_deref(), as_of),
        Command::Timeline { config, as_of } => run_timeline(&config, as_of),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, data } => run_info(config.as_deref(), data.as_deref()),
    }
}

fn fail(err: RebalancerError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RebalancerError> {
    FileConfigAdapter::from_file(path)
}

pub fn load_universe(path: &Path) -> Result<UniverseSpec, RebalancerError> {
    let adapter = load_config(path)?;
    UniverseSpec::from_config(&adapter)
}

/// Price file from the override, else `[universe] data_source` resolved
/// relative to the config file's directory.
pub fn resolve_data_path(
    config_path: &Path,
    spec: &UniverseSpec,
    data_override: Option<&Path>,
) -> Result<PathBuf, RebalancerError> {
    if let Some(path) = data_override {
        return Ok(path.to_path_buf());
    }
    let source = spec
        .universe
        .data_source
        .as_ref()
        .ok_or_else(|| RebalancerError::config_missing(UNIVERSE_SECTION, "data_source"))?;
    if source.is_absolute() {
        return Ok(source.clone());
    }
    Ok(config_path
        .parent()
        .map(|dir| dir.join(source))
        .unwrap_or_else(|| source.clone()))
}

fn clock_for(as_of: Option<NaiveDate>) -> Box<dyn ClockPort> {
    match as_of {
        Some(date) => Box::new(FixedClock(date)),
        None => Box::new(SystemClock),
    }
}

pub fn build_context(
    config_path: &Path,
    data_override: Option<&Path>,
    as_of: Option<NaiveDate>,
) -> Result<UniverseContext, RebalancerError> {
    let spec = load_universe(config_path)?;
    let data_path = resolve_data_path(config_path, &spec, data_override)?;
    eprintln!("Loading prices from {}", data_path.display());
    let prices = CsvPriceAdapter::new(data_path);
    let clock = clock_for(as_of);

    UniverseContext::new(
        spec,
        &prices,
        Arc::new(GregorianCalendar::new()),
        Arc::new(ProjectedGradientOptimizer::new()),
        clock.as_ref(),
    )
}

fn run_backtest(config_path: &Path, data: Option<&Path>, as_of: Option<NaiveDate>) -> ExitCode {
    eprintln!("Loading universe from {}", config_path.display());
    let ctx = match build_context(config_path, data, as_of) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Some(name) = ctx.initial_spec().name() {
        eprintln!("Universe: {}", name);
    }

    let params = ctx.parameters();
    eprintln!(
        "Running {} assets from {} ({} rebalance, {} lookback, as of {})",
        ctx.assets().len(),
        params.strategy_start,
        params.cadence,
        params.lookback,
        ctx.as_of(),
    );

    let sequence = match ctx.portfolios() {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    for portfolio in sequence {
        let marker = if portfolio.is_in_progress(ctx.as_of()) {
            " (in progress)"
        } else {
            ""
        };
        println!("{}{}", portfolio, marker);
    }
    for skipped in sequence.skipped() {
        eprintln!("skipped {}: {}", skipped.period.id(), skipped.reason);
    }

    let risk_free_rate = match params.objective {
        Objective::MaxSharpe { risk_free_rate } => risk_free_rate,
        _ => 0.0,
    };
    let metrics = SequenceMetrics::compute(sequence, params.interval, risk_free_rate);

    eprintln!("\n=== Results ===");
    eprintln!("Rebalances:       {}", metrics.rebalances);
    eprintln!("Skipped periods:  {}", metrics.skipped_periods);
    eprintln!("Not converged:    {}", metrics.non_converged);
    eprintln!("Observations:     {}", metrics.observations);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Max DD Duration:  {}", metrics.max_drawdown_duration);

    ExitCode::SUCCESS
}

/// Timeline for a universe without loading prices.
pub fn universe_timeline(
    spec: &UniverseSpec,
    as_of: NaiveDate,
) -> Result<Vec<RebalancePeriod>, RebalancerError> {
    let c = &spec.commands;
    let request = TimelineRequest {
        strategy_start: c.strategy_start,
        cadence: c.cadence,
        lookback: c.lookback,
        rebalance: c.rebalance,
        as_of: as_of.min(spec.universe.end_date),
    };
    build_timeline(&GregorianCalendar::new(), &request)
}

fn run_timeline(config_path: &Path, as_of: Option<NaiveDate>) -> ExitCode {
    let spec = match load_universe(config_path) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let as_of = clock_for(as_of).today();

    let periods = match universe_timeline(&spec, as_of) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    for period in &periods {
        let marker = if period.is_in_progress(as_of) {
            " (in progress)"
        } else {
            ""
        };
        println!("{}{}", period, marker);
    }
    eprintln!("{} periods as of {}", periods.len(), as_of);
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating universe: {}", config_path.display());
    let spec = match load_universe(config_path) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let u = &spec.universe;
    let c = &spec.commands;
    eprintln!("\nUniverse:");
    eprintln!("  assets:   {}", u.assets.join(", "));
    eprintln!("  window:   {} to {}", u.start_date, u.end_date);
    eprintln!("  interval: {} (dropna {})", u.interval, u.missing_data);
    eprintln!("\nCommands:");
    eprintln!("  strategy start: {}", c.strategy_start);
    eprintln!("  lookback:       {}", c.lookback);
    if c.rebalance {
        eprintln!("  rebalance:      {}", c.cadence);
    } else {
        eprintln!("  rebalance:      disabled (buy and hold)");
    }
    eprintln!("  objective:      {}", c.objective);
    eprintln!(
        "  weights:        [{}, {}]{}",
        c.bounds.floor(),
        c.bounds.long_ceiling,
        if c.bounds.shorting { " shorting" } else { "" }
    );
    for (key, value) in &spec.description {
        eprintln!("  {}: {}", key, value);
    }

    eprintln!("\nUniverse configuration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: Option<&Path>, data: Option<&Path>) -> ExitCode {
    let data_path = match (config_path, data) {
        (_, Some(path)) => path.to_path_buf(),
        (Some(config_path), None) => {
            match load_universe(config_path).and_then(|spec| resolve_data_path(config_path, &spec, None)) {
                Ok(p) => p,
                Err(e) => return fail(e),
            }
        }
        (None, None) => {
            eprintln!("error: --config or --data is required for info");
            return ExitCode::from(1);
        }
    };

    let adapter = CsvPriceAdapter::new(data_path);
    let assets = match adapter.list_assets() {
        Ok(a) => a,
        Err(e) => return fail(e),
    };
    match adapter.data_range() {
        Ok(Some((first, last, rows))) => {
            println!("{} assets, {} rows, {} to {}", assets.len(), rows, first, last);
            for asset in &assets {
                println!("  {}", asset);
            }
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("no data found");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
