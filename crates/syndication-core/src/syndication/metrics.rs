use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::cash_flow::PeriodCashFlow;
use super::sources_uses::SourcesAndUses;
use super::waterfall::WaterfallSummary;
use crate::time_value::irr;
use crate::types::*;

/// Fees paid to the sponsor and third parties over the hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeTotals {
    pub acquisition_fee: Money,
    pub asset_management_fees: Money,
    pub disposition_fee: Money,
    /// Acquisition + asset management + disposition
    pub total_sponsor_fees: Money,
    pub lender_fees: Money,
    pub refinance_costs: Money,
    pub sale_costs: Money,
}

/// Deal-level return and credit metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealMetrics {
    /// First twelve months of NOI (annualised for shorter holds)
    pub year_one_noi: Money,
    pub purchase_cap_rate: Rate,
    pub min_dscr: Decimal,
    pub avg_dscr: Decimal,
    /// Year-one NOI / acquisition loan
    pub debt_yield: Rate,
    pub ltv_at_purchase: Rate,
    /// Loan payoff / gross sale price
    pub ltv_at_exit: Rate,
    /// (avg operating expenses + avg debt service) / avg GPR
    pub break_even_occupancy: Rate,
    pub exit_price: Money,
    pub unlevered_irr: Rate,
    pub levered_irr: Rate,
    pub lp_irr: Rate,
    pub gp_irr: Rate,
    pub equity_multiple: Multiple,
    pub lp_equity_multiple: Multiple,
    pub gp_equity_multiple: Multiple,
    /// Closing equity plus capital calls
    pub total_equity_invested: Money,
    pub total_distributions: Money,
    pub net_profit: Money,
    pub fees: FeeTotals,
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

fn average(values: impl Iterator<Item = Decimal>) -> Decimal {
    let (sum, count) = values.fold((Decimal::ZERO, 0u64), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

/// Annualised NOI of the first twelve operating months.
pub fn year_one_noi(flows: &[PeriodCashFlow]) -> Money {
    let first_year: Vec<Money> = flows
        .iter()
        .filter(|p| p.period >= 1 && p.period <= 12)
        .map(|p| p.net_operating_income)
        .collect();
    if first_year.is_empty() {
        return Decimal::ZERO;
    }
    let total: Money = first_year.iter().sum();
    total / Decimal::from(first_year.len() as u64) * dec!(12)
}

/// Equity flows for the deal as a whole: contributions out, CAD in.
pub fn levered_flows(flows: &[PeriodCashFlow]) -> Vec<Money> {
    flows
        .iter()
        .map(|p| p.cash_available_for_distribution - p.total_contribution())
        .collect()
}

/// Property-level flows: debt service added back, sale without loan payoff.
///
/// The reserve account is left out entirely (funding at close, capital calls
/// deposited into it, and its release at sale). Its draws also cover debt
/// service, so it belongs to the financed position, not the property.
pub fn unlevered_flows(su: &SourcesAndUses, flows: &[PeriodCashFlow]) -> Vec<Money> {
    flows
        .iter()
        .map(|p| {
            if p.period == 0 {
                return -(su.total_uses - su.lender_fees - su.initial_reserves);
            }
            let sale = p
                .sale
                .map(|s| s.gross_price - s.sale_costs - s.disposition_fee)
                .unwrap_or(Decimal::ZERO);
            p.ncf_before_debt + sale
        })
        .collect()
}

/// Derive deal KPIs from the resolved stages.
pub fn calculate_metrics(
    su: &SourcesAndUses,
    flows: &[PeriodCashFlow],
    summary: &WaterfallSummary,
) -> DealMetrics {
    let operating: Vec<&PeriodCashFlow> = flows.iter().filter(|p| p.period >= 1).collect();
    let sale = flows.iter().find_map(|p| p.sale);

    let noi_one = year_one_noi(flows);

    // DSCR only where debt is actually serviced
    let dscrs: Vec<Decimal> = operating
        .iter()
        .filter(|p| p.debt_service > Decimal::ZERO)
        .map(|p| p.net_operating_income / p.debt_service)
        .collect();
    let min_dscr = dscrs.iter().copied().min().unwrap_or(Decimal::ZERO);
    let avg_dscr = average(dscrs.iter().copied());

    let avg_opex = average(operating.iter().map(|p| p.operating_expenses));
    let avg_debt_service = average(operating.iter().map(|p| p.debt_service));
    let avg_gpr = average(operating.iter().map(|p| p.gross_potential_rent));

    let total_equity_invested: Money = flows.iter().map(|p| p.total_contribution()).sum();
    let total_distributions: Money = flows
        .iter()
        .map(|p| p.cash_available_for_distribution)
        .sum();

    let (exit_price, ltv_at_exit) = match sale {
        Some(s) => (s.gross_price, ratio(s.loan_payoff, s.gross_price)),
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    let asset_management_fees: Money = operating.iter().map(|p| p.asset_management_fee).sum();
    let disposition_fee = sale.map(|s| s.disposition_fee).unwrap_or(Decimal::ZERO);
    let refinance_costs: Money = flows
        .iter()
        .filter_map(|p| p.refinance)
        .map(|r| r.closing_costs + r.exit_fee)
        .sum();
    let fees = FeeTotals {
        acquisition_fee: su.acquisition_fee,
        asset_management_fees,
        disposition_fee,
        total_sponsor_fees: su.acquisition_fee + asset_management_fees + disposition_fee,
        lender_fees: su.lender_fees,
        refinance_costs,
        sale_costs: sale.map(|s| s.sale_costs).unwrap_or(Decimal::ZERO),
    };

    DealMetrics {
        year_one_noi: noi_one,
        purchase_cap_rate: ratio(noi_one, su.purchase_price),
        min_dscr,
        avg_dscr,
        debt_yield: ratio(noi_one, su.loan_amount),
        ltv_at_purchase: ratio(su.loan_amount, su.purchase_price),
        ltv_at_exit,
        break_even_occupancy: ratio(avg_opex + avg_debt_service, avg_gpr),
        exit_price,
        unlevered_irr: irr(&unlevered_flows(su, flows), 12),
        levered_irr: irr(&levered_flows(flows), 12),
        lp_irr: summary.lp_irr,
        gp_irr: summary.gp_irr,
        equity_multiple: ratio(total_distributions, total_equity_invested),
        lp_equity_multiple: summary.lp_equity_multiple,
        gp_equity_multiple: summary.gp_equity_multiple,
        total_equity_invested,
        total_distributions,
        net_profit: total_distributions - total_equity_invested,
        fees,
    }
}
