mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::deal::DealArgs;
use commands::debt::DebtScheduleArgs;
use commands::irr::IrrArgs;
use commands::scenarios::SensitivityArgs;

/// Real-estate syndication deal underwriting
#[derive(Parser)]
#[command(
    name = "synd",
    version,
    about = "Real-estate syndication deal underwriting",
    long_about = "Projects a syndication deal month by month, runs the LP/GP \
                  waterfall and reports returns with decimal precision. Deal \
                  assumptions are read from a JSON or YAML file (--input) or \
                  JSON piped on stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log engine stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full deal analysis
    Analyze(DealArgs),
    /// Resolve sources & uses
    SourcesUses(DealArgs),
    /// Monthly pro forma cash flows
    CashFlows(DealArgs),
    /// Period-by-period LP/GP waterfall
    Waterfall(DealArgs),
    /// Deal-level metrics and waterfall summary
    Metrics(DealArgs),
    /// Check deal assumptions without running the engine
    Validate(DealArgs),
    /// Standalone month-by-month loan schedule
    DebtSchedule(DebtScheduleArgs),
    /// Solve the IRR of a cash-flow series
    Irr(IrrArgs),
    /// One- or two-way sensitivity sweep
    Sensitivity(SensitivityArgs),
    /// Print a default deal document
    Template,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::deal::run_analyze(args),
        Commands::SourcesUses(args) => commands::deal::run_sources_uses(args),
        Commands::CashFlows(args) => commands::deal::run_cash_flows(args),
        Commands::Waterfall(args) => commands::deal::run_waterfall(args),
        Commands::Metrics(args) => commands::deal::run_metrics(args),
        Commands::Validate(args) => commands::deal::run_validate(args),
        Commands::DebtSchedule(args) => commands::debt::run_debt_schedule(args),
        Commands::Irr(args) => commands::irr::run_irr(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::Template => commands::deal::run_template(),
        Commands::Version => {
            println!("synd {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
