use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::inputs::{AcquisitionFee, DealInputs, EquitySplit, FinancingMode, LoanSizing};
use crate::types::*;
use crate::SyndicationResult;

/// Dollar tolerance for sources/uses balance and explicit equity targets.
pub const BALANCE_TOLERANCE: Money = dec!(1);

/// Resolved acquisition capital stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesAndUses {
    // --- Uses ---
    pub purchase_price: Money,
    pub closing_costs: Money,
    pub upfront_capex: Money,
    pub initial_reserves: Money,
    /// Points on the loan plus flat lender fees
    pub lender_fees: Money,
    pub acquisition_fee: Money,
    // --- Sources ---
    pub loan_amount: Money,
    pub lp_equity: Money,
    pub gp_equity: Money,
    pub total_equity: Money,
    /// Labelled use lines (non-zero only)
    pub uses: Vec<(String, Money)>,
    /// Labelled source lines (non-zero only)
    pub sources: Vec<(String, Money)>,
    pub total_uses: Money,
    pub total_sources: Money,
    /// Whether sources equal uses within $1
    pub balanced: bool,
    /// Explicit LP/GP targets were rescaled to the resolved equity
    pub equity_rescaled: bool,
}

impl SourcesAndUses {
    /// LP share of initial equity (1 when there is no equity at all).
    pub fn lp_share(&self) -> Rate {
        if self.total_equity.is_zero() {
            Decimal::ONE
        } else {
            self.lp_equity / self.total_equity
        }
    }
}

/// Resolve sources & uses for a deal.
///
/// Pure: warnings about capped loans, degenerate fee percentages or rescaled
/// equity targets are pushed onto `warnings` instead of failing.
pub fn resolve_sources_uses(inputs: &DealInputs, warnings: &mut Vec<String>) -> SourcesAndUses {
    let acq = &inputs.acquisition;
    let debt = &inputs.debt;

    let purchase_price = acq.purchase_price.max(Decimal::ZERO);
    let closing_costs = acq.closing_costs.resolve(purchase_price).max(Decimal::ZERO);
    let upfront_capex = acq.upfront_capex.max(Decimal::ZERO);
    let initial_reserves = acq.initial_reserves.max(Decimal::ZERO);
    let flat_lender_fees = debt.lender_fees.max(Decimal::ZERO);

    // Fees that depend on neither the loan nor the equity
    let fixed_acquisition_fee = match acq.acquisition_fee {
        AcquisitionFee::Flat(amount) => amount.max(Decimal::ZERO),
        AcquisitionFee::PercentOfPrice(pct) => (purchase_price * pct).max(Decimal::ZERO),
        AcquisitionFee::None | AcquisitionFee::PercentOfEquity(_) => Decimal::ZERO,
    };

    let base_costs = purchase_price
        + closing_costs
        + upfront_capex
        + initial_reserves
        + flat_lender_fees
        + fixed_acquisition_fee;

    // --- Loan sizing ---
    let points = if debt.lender_points >= Decimal::ZERO && debt.lender_points < Decimal::ONE {
        debt.lender_points
    } else {
        warnings.push(format!(
            "Lender points {} outside [0, 1); treated as zero",
            debt.lender_points
        ));
        Decimal::ZERO
    };

    let sized_loan = if debt.financing == FinancingMode::None {
        Decimal::ZERO
    } else {
        let ltc_basis = purchase_price + closing_costs + upfront_capex;
        match debt.sizing {
            LoanSizing::Flat(amount) => amount,
            LoanSizing::Ltv(pct) => purchase_price * pct,
            LoanSizing::Ltc(pct) => ltc_basis * pct,
        }
        .max(Decimal::ZERO)
    };

    // A loan covering every cost including its own points: L = base / (1 - points)
    let max_loan = base_costs / (Decimal::ONE - points);
    let loan_amount = if sized_loan > max_loan {
        warnings.push(format!(
            "Sized loan {} exceeds total project cost; capped at {}",
            sized_loan.round_dp(2),
            max_loan.round_dp(2)
        ));
        max_loan
    } else {
        sized_loan
    };

    let lender_fees = loan_amount * points + flat_lender_fees;
    let uses_before_equity_fee = base_costs + loan_amount * points;
    let equity_before_fee = (uses_before_equity_fee - loan_amount).max(Decimal::ZERO);

    // --- Acquisition fee on equity (closed form of the circular definition) ---
    let equity_fee = match acq.acquisition_fee {
        AcquisitionFee::PercentOfEquity(pct) => {
            if pct >= Decimal::ONE {
                warnings.push(format!(
                    "Acquisition fee of {pct} of equity is degenerate (>= 100%); fee set to zero"
                ));
                Decimal::ZERO
            } else if pct <= Decimal::ZERO {
                Decimal::ZERO
            } else {
                let equity_with_fee = equity_before_fee / (Decimal::ONE - pct);
                equity_with_fee - equity_before_fee
            }
        }
        _ => Decimal::ZERO,
    };

    let acquisition_fee = fixed_acquisition_fee + equity_fee;
    let total_equity = equity_before_fee + equity_fee;
    let total_uses = uses_before_equity_fee + equity_fee;

    // --- LP / GP split ---
    let (lp_equity, gp_equity, equity_rescaled) = split_equity(
        &inputs.equity.split,
        total_equity,
        warnings,
    );

    let total_sources = loan_amount + lp_equity + gp_equity;
    let balanced = (total_sources - total_uses).abs() <= BALANCE_TOLERANCE;

    let uses: Vec<(String, Money)> = [
        ("Purchase Price", purchase_price),
        ("Closing Costs", closing_costs),
        ("Upfront Capex", upfront_capex),
        ("Initial Reserves", initial_reserves),
        ("Lender Fees", lender_fees),
        ("Acquisition Fee", acquisition_fee),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_zero())
    .map(|(n, v)| (n.to_string(), v))
    .collect();

    let sources: Vec<(String, Money)> = [
        ("Senior Loan", loan_amount),
        ("LP Equity", lp_equity),
        ("GP Equity", gp_equity),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_zero())
    .map(|(n, v)| (n.to_string(), v))
    .collect();

    SourcesAndUses {
        purchase_price,
        closing_costs,
        upfront_capex,
        initial_reserves,
        lender_fees,
        acquisition_fee,
        loan_amount,
        lp_equity,
        gp_equity,
        total_equity,
        uses,
        sources,
        total_uses,
        total_sources,
        balanced,
        equity_rescaled,
    }
}

fn split_equity(
    split: &EquitySplit,
    total_equity: Money,
    warnings: &mut Vec<String>,
) -> (Money, Money, bool) {
    match *split {
        EquitySplit::Proportional { gp_pct } => {
            let gp_pct = gp_pct.max(Decimal::ZERO).min(Decimal::ONE);
            let gp = total_equity * gp_pct;
            (total_equity - gp, gp, false)
        }
        EquitySplit::Explicit {
            lp_amount,
            gp_amount,
        } => {
            let lp_amount = lp_amount.max(Decimal::ZERO);
            let gp_amount = gp_amount.max(Decimal::ZERO);
            let requested = lp_amount + gp_amount;
            if (requested - total_equity).abs() <= BALANCE_TOLERANCE {
                return (lp_amount, gp_amount, false);
            }
            warnings.push(format!(
                "Explicit LP/GP equity {} differs from required equity {}; rescaled proportionally",
                requested.round_dp(2),
                total_equity.round_dp(2)
            ));
            if requested.is_zero() {
                (total_equity, Decimal::ZERO, true)
            } else {
                let lp = total_equity * lp_amount / requested;
                (lp, total_equity - lp, true)
            }
        }
    }
}

/// Build the sources & uses table for a deal, wrapped in the standard envelope.
pub fn build_sources_uses(
    inputs: &DealInputs,
) -> SyndicationResult<ComputationOutput<SourcesAndUses>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = resolve_sources_uses(inputs, &mut warnings);
    if !output.balanced {
        warnings.push(format!(
            "Sources {} and uses {} differ by more than $1",
            output.total_sources.round_dp(2),
            output.total_uses.round_dp(2)
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Syndication Sources & Uses",
        &serde_json::json!({
            "purchase_price": inputs.acquisition.purchase_price.to_string(),
            "loan_sizing": inputs.debt.sizing,
            "equity_split": inputs.equity.split,
        }),
        warnings,
        elapsed,
        output,
    ))
}
