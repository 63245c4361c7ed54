use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use super::quick::{quick_metrics, QuickMetrics};
use crate::error::SyndicationError;
use crate::syndication::inputs::{DealInputs, ExitValuation, Growth, LoanSizing};
use crate::types::*;
use crate::SyndicationResult;

/// Largest grid a sweep may evaluate.
pub const MAX_GRID_CELLS: usize = 10_000;

// ---------------------------------------------------------------------------
// Sweep targets
// ---------------------------------------------------------------------------

/// Deal assumption a sweep can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepVariable {
    ExitCapRate,
    PurchasePrice,
    RentGrowth,
    ExpenseGrowth,
    InterestRate,
    VacancyRate,
    Ltv,
}

impl SweepVariable {
    pub const ALL: [SweepVariable; 7] = [
        SweepVariable::ExitCapRate,
        SweepVariable::PurchasePrice,
        SweepVariable::RentGrowth,
        SweepVariable::ExpenseGrowth,
        SweepVariable::InterestRate,
        SweepVariable::VacancyRate,
        SweepVariable::Ltv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SweepVariable::ExitCapRate => "exit_cap_rate",
            SweepVariable::PurchasePrice => "purchase_price",
            SweepVariable::RentGrowth => "rent_growth",
            SweepVariable::ExpenseGrowth => "expense_growth",
            SweepVariable::InterestRate => "interest_rate",
            SweepVariable::VacancyRate => "vacancy_rate",
            SweepVariable::Ltv => "ltv",
        }
    }

    /// Copy of `base` with this assumption set to `value`.
    pub fn apply(&self, base: &DealInputs, value: Decimal) -> DealInputs {
        let mut inputs = base.clone();
        match self {
            SweepVariable::ExitCapRate => inputs.exit.valuation = ExitValuation::CapRate(value),
            SweepVariable::PurchasePrice => inputs.acquisition.purchase_price = value,
            SweepVariable::RentGrowth => inputs.pro_forma.rent_growth = Growth::Annual(value),
            SweepVariable::ExpenseGrowth => inputs.pro_forma.expense_growth = Growth::Annual(value),
            SweepVariable::InterestRate => inputs.debt.annual_rate = value,
            SweepVariable::VacancyRate => inputs.pro_forma.vacancy_rate = value,
            SweepVariable::Ltv => inputs.debt.sizing = LoanSizing::Ltv(value),
        }
        inputs
    }

    /// The assumption's value in `inputs`, where it is expressed directly.
    pub fn current(&self, inputs: &DealInputs) -> Option<Decimal> {
        match self {
            SweepVariable::ExitCapRate => match inputs.exit.valuation {
                ExitValuation::CapRate(rate) => Some(rate),
                ExitValuation::Price(_) => None,
            },
            SweepVariable::PurchasePrice => Some(inputs.acquisition.purchase_price),
            SweepVariable::RentGrowth => match inputs.pro_forma.rent_growth {
                Growth::Annual(rate) => Some(rate),
                Growth::Monthly(_) => None,
            },
            SweepVariable::ExpenseGrowth => match inputs.pro_forma.expense_growth {
                Growth::Annual(rate) => Some(rate),
                Growth::Monthly(_) => None,
            },
            SweepVariable::InterestRate => Some(inputs.debt.annual_rate),
            SweepVariable::VacancyRate => Some(inputs.pro_forma.vacancy_rate),
            SweepVariable::Ltv => match inputs.debt.sizing {
                LoanSizing::Ltv(pct) => Some(pct),
                _ => None,
            },
        }
    }
}

impl fmt::Display for SweepVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SweepVariable {
    type Err = SyndicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SweepVariable::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| SyndicationError::InvalidInput {
                field: "variable".into(),
                reason: format!(
                    "Unknown sweep variable '{s}'; expected one of: {}",
                    SweepVariable::ALL.map(|v| v.name()).join(", ")
                ),
            })
    }
}

/// Output metric reported in each cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMetric {
    #[default]
    LeveredIrr,
    EquityMultiple,
}

impl SweepMetric {
    pub fn pick(&self, metrics: &QuickMetrics) -> Decimal {
        match self {
            SweepMetric::LeveredIrr => metrics.levered_irr,
            SweepMetric::EquityMultiple => metrics.equity_multiple,
        }
    }
}

impl FromStr for SweepMetric {
    type Err = SyndicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "levered_irr" | "irr" => Ok(SweepMetric::LeveredIrr),
            "equity_multiple" | "multiple" => Ok(SweepMetric::EquityMultiple),
            other => Err(SyndicationError::InvalidInput {
                field: "metric".into(),
                reason: format!(
                    "Unknown metric '{other}'; expected levered_irr or equity_multiple"
                ),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// One- or two-way sweep over deal assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealSensitivityInput {
    pub base: DealInputs,
    pub variable_1: SensitivityVariable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_2: Option<SensitivityVariable>,
    #[serde(default)]
    pub metric: SweepMetric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealSensitivityOutput {
    pub variable_1_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_2_name: Option<String>,
    pub variable_1_values: Vec<Decimal>,
    /// Empty for a one-way sweep
    pub variable_2_values: Vec<Decimal>,
    pub metric: SweepMetric,
    /// matrix[i][j]: metric at variable_1_values[i], variable_2_values[j]
    /// (a single column for a one-way sweep)
    pub matrix: Vec<Vec<Decimal>>,
    /// Metric for the unmodified base inputs
    pub base_case_value: Decimal,
    /// Grid cell closest to the base inputs
    pub base_case_position: (usize, usize),
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Inclusive min..max in `step` increments, with `max` appended when the step
/// does not land on it.
fn generate_sweep_values(var: &SensitivityVariable) -> SyndicationResult<Vec<Decimal>> {
    if var.step <= Decimal::ZERO {
        return Err(SyndicationError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Step must be positive".into(),
        });
    }
    if var.min > var.max {
        return Err(SyndicationError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Min must be <= max".into(),
        });
    }
    let steps = ((var.max - var.min) / var.step).floor();
    if steps >= Decimal::from(MAX_GRID_CELLS as u64) {
        return Err(SyndicationError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: format!("Sweep exceeds {MAX_GRID_CELLS} values"),
        });
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }
    if values.is_empty() {
        values.push(var.min);
    }
    Ok(values)
}

fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn base_index(
    variable: SweepVariable,
    spec: &SensitivityVariable,
    values: &[Decimal],
    base: &DealInputs,
) -> usize {
    let target = variable
        .current(base)
        .unwrap_or((spec.min + spec.max) / Decimal::TWO);
    closest_index(values, target)
}

/// Evaluate the metric over a one- or two-way grid using the quick path.
pub fn run_sensitivity(
    input: &DealSensitivityInput,
) -> SyndicationResult<ComputationOutput<DealSensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let var_1: SweepVariable = input.variable_1.name.parse()?;
    let var_2: Option<SweepVariable> = input
        .variable_2
        .as_ref()
        .map(|v| v.name.parse())
        .transpose()?;

    let v1_values = generate_sweep_values(&input.variable_1)?;
    let v2_values = match &input.variable_2 {
        Some(spec) => generate_sweep_values(spec)?,
        None => Vec::new(),
    };

    let cells = v1_values.len() * v2_values.len().max(1);
    if cells > MAX_GRID_CELLS {
        return Err(SyndicationError::InvalidInput {
            field: "grid".into(),
            reason: format!("Sweep grid of {cells} cells exceeds the {MAX_GRID_CELLS}-cell limit"),
        });
    }

    let base_case_value = input.metric.pick(&quick_metrics(&input.base)?);

    let mut evaluate = |inputs: DealInputs, label: String| -> Decimal {
        match quick_metrics(&inputs) {
            Ok(metrics) => input.metric.pick(&metrics),
            Err(e) => {
                warnings.push(format!("Evaluation failed at ({label}): {e}"));
                Decimal::ZERO
            }
        }
    };

    let mut matrix = Vec::with_capacity(v1_values.len());
    for v1 in &v1_values {
        let row_inputs = var_1.apply(&input.base, *v1);
        let row = match var_2 {
            None => vec![evaluate(row_inputs, v1.to_string())],
            Some(var_2) => v2_values
                .iter()
                .map(|v2| evaluate(var_2.apply(&row_inputs, *v2), format!("{v1}, {v2}")))
                .collect(),
        };
        matrix.push(row);
    }

    let base_row = base_index(var_1, &input.variable_1, &v1_values, &input.base);
    let base_col = match (var_2, &input.variable_2) {
        (Some(var_2), Some(spec)) => base_index(var_2, spec, &v2_values, &input.base),
        _ => 0,
    };

    tracing::debug!(cells, variable_1 = %var_1, "sensitivity grid evaluated");

    let output = DealSensitivityOutput {
        variable_1_name: var_1.name().to_string(),
        variable_2_name: var_2.map(|v| v.name().to_string()),
        variable_1_values: v1_values,
        variable_2_values: v2_values,
        metric: input.metric,
        matrix,
        base_case_value,
        base_case_position: (base_row, base_col),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deal Sensitivity Sweep (quick recompute)",
        &serde_json::json!({
            "deal": input.base.name,
            "variable_1": input.variable_1.name,
            "variable_2": input.variable_2.as_ref().map(|v| v.name.clone()),
            "metric": input.metric,
        }),
        warnings,
        elapsed,
        output,
    ))
}
