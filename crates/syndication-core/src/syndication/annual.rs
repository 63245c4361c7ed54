use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cash_flow::PeriodCashFlow;
use super::waterfall::WaterfallPeriodAllocation;
use crate::types::*;

/// One hold year rolled up from its monthly records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    pub year: u32,
    pub first_period: u32,
    pub last_period: u32,
    pub gross_potential_rent: Money,
    pub effective_gross_income: Money,
    pub net_operating_income: Money,
    pub debt_service: Money,
    pub ncf_after_debt: Money,
    /// Zero when no debt was serviced
    pub dscr: Decimal,
    pub cash_available_for_distribution: Money,
    pub lp_distributions: Money,
    pub gp_distributions: Money,
    /// LP distributions over LP capital outstanding at the start of the year
    pub lp_cash_on_cash: ReturnRatio,
}

/// Fold monthly records into twelve-month summaries. A trailing partial
/// year is kept as-is.
pub fn summarize_years(
    flows: &[PeriodCashFlow],
    allocations: &[WaterfallPeriodAllocation],
) -> Vec<AnnualSummary> {
    let operating_flows = flows.get(1..).unwrap_or_default();
    let operating_allocs = allocations.get(1..).unwrap_or_default();

    let mut opening_lp_capital = allocations
        .first()
        .map(|a| a.balances.lp_unreturned_capital)
        .unwrap_or(Decimal::ZERO);

    operating_flows
        .chunks(12)
        .zip(operating_allocs.chunks(12))
        .enumerate()
        .map(|(index, (months, allocs))| {
            let sum = |f: fn(&PeriodCashFlow) -> Money| -> Money { months.iter().map(f).sum() };

            let net_operating_income = sum(|p| p.net_operating_income);
            let debt_service = sum(|p| p.debt_service);
            let lp_distributions: Money = allocs.iter().map(|a| a.lp_total).sum();
            let gp_distributions: Money = allocs.iter().map(|a| a.gp_total).sum();

            let dscr = if debt_service > Decimal::ZERO {
                net_operating_income / debt_service
            } else {
                Decimal::ZERO
            };
            let lp_cash_on_cash = ReturnRatio::of(lp_distributions, opening_lp_capital);

            if let Some(last) = allocs.last() {
                opening_lp_capital = last.balances.lp_unreturned_capital;
            }

            AnnualSummary {
                year: index as u32 + 1,
                first_period: months.first().map(|p| p.period).unwrap_or_default(),
                last_period: months.last().map(|p| p.period).unwrap_or_default(),
                gross_potential_rent: sum(|p| p.gross_potential_rent),
                effective_gross_income: sum(|p| p.effective_gross_income),
                net_operating_income,
                debt_service,
                ncf_after_debt: sum(|p| p.ncf_after_debt),
                dscr,
                cash_available_for_distribution: sum(|p| p.cash_available_for_distribution),
                lp_distributions,
                gp_distributions,
                lp_cash_on_cash,
            }
        })
        .collect()
}
