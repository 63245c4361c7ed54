use clap::Args;
use serde_json::Value;

use syndication_core::scenarios::sensitivity::{self, DealSensitivityInput, SweepMetric};
use syndication_core::syndication::inputs::DealInputs;
use syndication_core::SensitivityVariable;

use crate::input;

/// Arguments for a deal sensitivity sweep
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to a JSON or YAML sweep document (base, variable_1, variable_2, metric).
    /// Overrides --var1/--var2/--base-inputs.
    #[arg(long)]
    pub input: Option<String>,

    /// First sweep variable in format name:min:max:step
    /// (e.g. "exit_cap_rate:0.05:0.07:0.005")
    #[arg(long)]
    pub var1: Option<String>,

    /// Second sweep variable (optional, creates a 2D grid)
    #[arg(long)]
    pub var2: Option<String>,

    /// Path to JSON or YAML file with the base deal (defaults when omitted)
    #[arg(long)]
    pub base_inputs: Option<String>,

    /// Metric to report: levered_irr or equity_multiple
    #[arg(long, default_value = "levered_irr")]
    pub metric: String,
}

fn parse_sens_var(spec: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Sensitivity variable must be name:min:max:step, got '{}'",
            spec
        )
        .into());
    }
    Ok(SensitivityVariable {
        name: parts[0].to_string(),
        min: parts[1].parse()?,
        max: parts[2].parse()?,
        step: parts[3].parse()?,
    })
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sweep: DealSensitivityInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let var1 = args
            .var1
            .as_deref()
            .ok_or("--var1 is required (or provide --input)")?;
        let base: DealInputs = match args.base_inputs {
            Some(ref path) => input::file::read_json(path)?,
            None => DealInputs::default(),
        };
        let metric: SweepMetric = args.metric.parse()?;

        DealSensitivityInput {
            base,
            variable_1: parse_sens_var(var1)?,
            variable_2: args.var2.as_deref().map(parse_sens_var).transpose()?,
            metric,
        }
    };

    let result = sensitivity::run_sensitivity(&sweep)?;
    Ok(serde_json::to_value(result)?)
}
