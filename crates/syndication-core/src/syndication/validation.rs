use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::cash_flow::refinance_in_hold;
use super::inputs::{
    AcquisitionFee, DealInputs, EquitySplit, ExitValuation, FinancingMode, LoanSizing,
    TierHurdle,
};
use crate::types::Finding;

const MAX_HOLD_MONTHS: u32 = 1200;
const SPLIT_TOLERANCE: Decimal = dec!(0.01);

/// Outcome of a pre-flight check. Errors block a run; warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_blocking(&self) -> bool {
        !self.errors.is_empty()
    }

    fn error(&mut self, code: &str, message: impl Into<String>) {
        self.errors.push(Finding::error(code, message));
    }

    fn warn(&mut self, code: &str, message: impl Into<String>) {
        self.warnings.push(Finding::warning(code, message));
    }
}

fn in_unit_range(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

/// Check a deal's assumptions before running it. Pure; the engine never
/// calls this itself.
pub fn validate_deal(inputs: &DealInputs) -> ValidationReport {
    let mut report = ValidationReport::default();
    let hold = inputs.hold_months;

    if hold == 0 || hold > MAX_HOLD_MONTHS {
        report.error(
            "hold_months",
            format!("Hold must be between 1 and {MAX_HOLD_MONTHS} months, got {hold}"),
        );
    }

    // --- Acquisition ---
    let acq = &inputs.acquisition;
    if acq.purchase_price <= Decimal::ZERO {
        report.error("purchase_price", "Purchase price must be positive");
    }
    if acq.upfront_capex < Decimal::ZERO || acq.initial_reserves < Decimal::ZERO {
        report.error("acquisition_amounts", "Capex and reserves cannot be negative");
    }
    if let AcquisitionFee::PercentOfEquity(pct) = acq.acquisition_fee {
        if pct >= Decimal::ONE {
            report.warn(
                "acquisition_fee_degenerate",
                format!("Acquisition fee of {pct} of equity is at least 100%; it will be zeroed"),
            );
        }
    }

    // --- Debt ---
    let debt = &inputs.debt;
    if debt.financing != FinancingMode::None {
        if debt.annual_rate < Decimal::ZERO {
            report.error("debt_rate", "Loan interest rate cannot be negative");
        }
        let amortizes = matches!(
            debt.financing,
            FinancingMode::Amortizing | FinancingMode::InterestOnlyThenAmortizing { .. }
        );
        if amortizes && debt.amortization_months == 0 {
            report.error(
                "amortization_months",
                "Amortizing loans need a positive amortization term",
            );
        }
        if let FinancingMode::InterestOnlyThenAmortizing { io_months } = debt.financing {
            if io_months >= debt.amortization_months {
                report.warn(
                    "io_exceeds_amortization",
                    format!("IO period of {io_months} months uses up the amortization term"),
                );
            }
        }
        match debt.sizing {
            LoanSizing::Ltv(pct) if pct > dec!(0.80) => report.warn(
                "high_leverage",
                format!("LTV of {pct} is above 80%"),
            ),
            LoanSizing::Ltc(pct) if pct > dec!(0.85) => report.warn(
                "high_leverage",
                format!("LTC of {pct} is above 85%"),
            ),
            LoanSizing::Flat(amount) if amount < Decimal::ZERO => {
                report.error("loan_amount", "Flat loan amount cannot be negative")
            }
            _ => {}
        }
        if !(debt.lender_points >= Decimal::ZERO && debt.lender_points < Decimal::ONE) {
            report.error("lender_points", "Lender points must be in [0, 1)");
        }
    }

    // --- Equity ---
    match inputs.equity.split {
        EquitySplit::Proportional { gp_pct } if !in_unit_range(gp_pct) => {
            report.error("gp_pct", "GP equity share must be between 0 and 1");
        }
        EquitySplit::Explicit { lp_amount, gp_amount }
            if lp_amount < Decimal::ZERO || gp_amount < Decimal::ZERO =>
        {
            report.error("equity_split", "Explicit equity amounts cannot be negative");
        }
        _ => {}
    }
    for call in &inputs.equity.capital_calls {
        if call.month == 0 || call.month > hold {
            report.warn(
                "capital_call_outside_hold",
                format!(
                    "Capital call in month {} falls outside the hold and is ignored",
                    call.month
                ),
            );
        }
    }

    // --- Pro forma ---
    let pf = &inputs.pro_forma;
    let losses = pf.vacancy_rate + pf.bad_debt_rate + pf.concessions_rate;
    if !in_unit_range(pf.vacancy_rate)
        || !in_unit_range(pf.bad_debt_rate)
        || !in_unit_range(pf.concessions_rate)
        || losses > Decimal::ONE
    {
        report.error("income_losses", "Vacancy, bad debt and concessions must stay within 0-100%");
    }
    if pf.gross_potential_rent <= Decimal::ZERO {
        report.warn("no_rent", "Gross potential rent is zero");
    }
    for draw in &pf.capex_schedule {
        if draw.month == 0 || draw.month > hold {
            report.warn(
                "capex_outside_hold",
                format!("Capex draw in month {} falls outside the hold and is ignored", draw.month),
            );
        }
    }

    // --- Exit ---
    let exit = &inputs.exit;
    match exit.valuation {
        ExitValuation::CapRate(cap) if cap <= Decimal::ZERO => {
            report.error("exit_cap_rate", "Exit cap rate must be positive");
        }
        ExitValuation::Price(price) if price < Decimal::ZERO => {
            report.error("exit_price", "Exit price cannot be negative");
        }
        _ => {}
    }
    if !in_unit_range(exit.sale_costs_pct) || !in_unit_range(exit.disposition_fee_pct) {
        report.error("sale_costs", "Sale costs and disposition fee must be between 0 and 1");
    }

    // --- Refinance ---
    if let Some(refi) = &inputs.refinance {
        if refi.cap_rate <= Decimal::ZERO {
            report.error("refinance_cap_rate", "Refinance cap rate must be positive");
        }
        if !in_unit_range(refi.ltv) {
            report.error("refinance_ltv", "Refinance LTV must be between 0 and 1");
        }
        if refi.annual_rate < Decimal::ZERO {
            report.error("refinance_rate", "Refinance interest rate cannot be negative");
        }
        if !refinance_in_hold(refi, hold) {
            report.warn(
                "refinance_outside_hold",
                format!(
                    "Refinance in month {} is not inside the {hold}-month hold; ignored",
                    refi.month
                ),
            );
        }
    }

    // --- Waterfall ---
    let wf = &inputs.waterfall;
    if wf.pref_rate_annual < Decimal::ZERO {
        report.error("pref_rate", "Preferred return cannot be negative");
    } else if wf.pref_rate_annual > dec!(0.20) {
        report.warn(
            "pref_rate_high",
            format!("Preferred return of {} is unusually high", wf.pref_rate_annual),
        );
    }
    if let Some(catch_up) = wf.catch_up {
        if !in_unit_range(catch_up.gp_target_share) {
            report.error("catch_up", "Catch-up target share must be between 0 and 1");
        }
    }
    if wf.tiers.is_empty() {
        report.warn("no_tiers", "No promote tiers: cash beyond pref is left unallocated");
    }

    let mut last_multiple: Option<Decimal> = None;
    for (index, tier) in wf.tiers.iter().enumerate() {
        let label = format!("tier {} ({})", index + 1, tier.name);
        if !in_unit_range(tier.lp_split) || !in_unit_range(tier.gp_split) {
            report.error("tier_split_range", format!("{label}: splits must be between 0 and 1"));
        }
        if (tier.lp_split + tier.gp_split - Decimal::ONE).abs() > SPLIT_TOLERANCE {
            report.error(
                "tier_split_sum",
                format!(
                    "{label}: LP {} + GP {} must sum to 1",
                    tier.lp_split, tier.gp_split
                ),
            );
        }
        match tier.hurdle {
            TierHurdle::EquityMultiple(m) => {
                if m <= Decimal::ONE {
                    report.warn(
                        "tier_multiple_low",
                        format!("{label}: multiple hurdle {m}x is at or below 1.0x"),
                    );
                }
                if let Some(prev) = last_multiple {
                    if m <= prev {
                        report.warn(
                            "tier_hurdles_not_increasing",
                            format!("{label}: hurdle {m}x does not exceed the previous {prev}x"),
                        );
                    }
                }
                last_multiple = Some(m);
            }
            TierHurdle::Irr(rate) => {
                report.warn(
                    "irr_hurdle_approximation",
                    format!(
                        "{label}: IRR hurdle {rate} is tested with multiple^(1/years) - 1, \
                         which ignores interim distribution timing"
                    ),
                );
            }
            TierHurdle::Simple => {}
        }
    }
    if let Some(last) = wf.tiers.last() {
        if last.hurdle != TierHurdle::Simple {
            report.warn(
                "last_tier_capped",
                format!("Last tier '{}' has a hurdle; it is treated as uncapped", last.name),
            );
        }
    }

    report
}
