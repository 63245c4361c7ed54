use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use syndication_core::syndication::engine::{self, DealAnalysis};
use syndication_core::syndication::inputs::DealInputs;
use syndication_core::syndication::sources_uses;
use syndication_core::syndication::validation;
use syndication_core::ComputationOutput;

use crate::input;

/// Arguments shared by every command that runs a deal
#[derive(Args)]
pub struct DealArgs {
    /// Path to a JSON or YAML deal file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Deal name when building from flags
    #[arg(long)]
    pub name: Option<String>,

    /// Purchase price; other assumptions take their defaults
    #[arg(long)]
    pub purchase_price: Option<Decimal>,

    /// Hold period in months
    #[arg(long)]
    pub hold_months: Option<u32>,
}

fn load_deal(args: &DealArgs) -> Result<DealInputs, Box<dyn std::error::Error>> {
    let mut deal: DealInputs = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else if args.purchase_price.is_some() || args.hold_months.is_some() {
        DealInputs::default()
    } else {
        return Err(
            "--input <deal.json|deal.yaml>, stdin or --purchase-price/--hold-months required"
                .into(),
        );
    };

    if let Some(ref name) = args.name {
        deal.name = name.clone();
    }
    if let Some(price) = args.purchase_price {
        deal.acquisition.purchase_price = price;
    }
    if let Some(hold) = args.hold_months {
        deal.hold_months = hold;
    }
    Ok(deal)
}

/// Re-wrap one section of a full analysis in its own envelope.
fn section<T: Serialize>(
    output: ComputationOutput<DealAnalysis>,
    pick: impl FnOnce(DealAnalysis) -> T,
) -> Result<Value, Box<dyn std::error::Error>> {
    let sectioned = ComputationOutput {
        result: pick(output.result),
        methodology: output.methodology,
        assumptions: output.assumptions,
        warnings: output.warnings,
        metadata: output.metadata,
    };
    Ok(serde_json::to_value(sectioned)?)
}

#[derive(Serialize)]
struct WaterfallView {
    periods: Vec<syndication_core::syndication::waterfall::WaterfallPeriodAllocation>,
    summary: syndication_core::syndication::waterfall::WaterfallSummary,
}

#[derive(Serialize)]
struct MetricsView {
    metrics: syndication_core::syndication::metrics::DealMetrics,
    waterfall_summary: syndication_core::syndication::waterfall::WaterfallSummary,
    annual: Vec<syndication_core::syndication::annual::AnnualSummary>,
    findings: Vec<syndication_core::Finding>,
}

pub fn run_analyze(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let result = engine::analyze_deal(&deal)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sources_uses(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let result = sources_uses::build_sources_uses(&deal)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_cash_flows(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let result = engine::analyze_deal(&deal)?;
    section(result, |analysis| analysis.cash_flows)
}

pub fn run_waterfall(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let result = engine::analyze_deal(&deal)?;
    section(result, |analysis| WaterfallView {
        periods: analysis.waterfall,
        summary: analysis.waterfall_summary,
    })
}

pub fn run_metrics(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let result = engine::analyze_deal(&deal)?;
    section(result, |analysis| MetricsView {
        metrics: analysis.metrics,
        waterfall_summary: analysis.waterfall_summary,
        annual: analysis.annual,
        findings: analysis.findings,
    })
}

pub fn run_validate(args: DealArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let deal = load_deal(&args)?;
    let report = validation::validate_deal(&deal);
    if report.is_blocking() {
        tracing::warn!(errors = report.errors.len(), "deal failed validation");
    }
    Ok(serde_json::to_value(report)?)
}

pub fn run_template() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(DealInputs::default())?)
}
