use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use syndication_core::syndication::debt_schedule::{self, DebtScheduleInput};
use syndication_core::syndication::inputs::FinancingMode;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FinancingArg {
    Amortizing,
    InterestOnly,
    IoThenAmortizing,
}

/// Arguments for a standalone loan schedule
#[derive(Args)]
pub struct DebtScheduleArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Loan principal
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Annual interest rate (e.g. 0.065)
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Amortization period in months
    #[arg(long, default_value = "360")]
    pub amortization_months: u32,

    /// Repayment profile
    #[arg(long, value_enum, default_value = "amortizing")]
    pub financing: FinancingArg,

    /// Interest-only months before amortization starts
    #[arg(long, default_value = "0")]
    pub io_months: u32,

    /// Months to project
    #[arg(long)]
    pub term_months: Option<u32>,
}

pub fn run_debt_schedule(args: DebtScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let schedule_input: DebtScheduleInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let principal = args
            .principal
            .ok_or("--principal is required (or provide --input)")?;
        let rate = args.rate.ok_or("--rate is required (or provide --input)")?;

        let financing = match args.financing {
            FinancingArg::Amortizing => FinancingMode::Amortizing,
            FinancingArg::InterestOnly => FinancingMode::InterestOnly,
            FinancingArg::IoThenAmortizing => FinancingMode::InterestOnlyThenAmortizing {
                io_months: args.io_months,
            },
        };

        DebtScheduleInput {
            principal,
            annual_rate: rate,
            amortization_months: args.amortization_months,
            financing,
            term_months: args.term_months.unwrap_or(args.amortization_months),
        }
    };

    let result = debt_schedule::build_debt_schedule(&schedule_input)?;
    Ok(serde_json::to_value(result)?)
}
