use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use syndication_core::time_value::{self, IrrSolution};
use syndication_core::{with_metadata, Money};

use crate::input;

/// Arguments for IRR on an arbitrary cash-flow series
#[derive(Args)]
pub struct IrrArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cash flows in period order (comma-separated, e.g. "-100,30,30,130")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Periods per year (12 for monthly flows)
    #[arg(long, default_value = "1")]
    pub periods_per_year: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct IrrInput {
    cash_flows: Vec<Money>,
    #[serde(default = "annual")]
    periods_per_year: u32,
}

fn annual() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct IrrOutput {
    irr: Decimal,
    solution: IrrSolution,
    /// NPV at the solved rate; near zero unless the heuristic was used
    npv_at_irr: Money,
}

pub fn run_irr(args: IrrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let irr_input: IrrInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        IrrInput {
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            periods_per_year: args.periods_per_year,
        }
    };

    if irr_input.cash_flows.is_empty() {
        return Err("At least one cash flow is required".into());
    }

    let start = Instant::now();
    let solution = time_value::solve_irr(&irr_input.cash_flows, irr_input.periods_per_year);
    let npv_at_irr = time_value::npv(
        solution.rate,
        &irr_input.cash_flows,
        irr_input.periods_per_year,
    );

    let mut warnings = Vec::new();
    match solution.method {
        time_value::SolveMethod::Degenerate => {
            warnings.push("Cash flows have no sign change; IRR reported as zero".to_string())
        }
        time_value::SolveMethod::Heuristic => {
            warnings.push("No IRR root bracketed; rate is a heuristic estimate".to_string())
        }
        _ => {}
    }

    let output = with_metadata(
        "Internal Rate of Return (Newton-Raphson, bisection fallback)",
        &irr_input,
        warnings,
        start.elapsed().as_micros() as u64,
        IrrOutput {
            irr: solution.rate,
            solution,
            npv_at_irr: npv_at_irr.round_dp(6),
        },
    );
    Ok(serde_json::to_value(output)?)
}
