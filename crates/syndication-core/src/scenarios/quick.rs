use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SyndicationError;
use crate::syndication::cash_flow::{
    apply_reserves, capital_call_amount, event_annual_noi, price_refinance, price_sale,
    refinance_in_hold, OperatingDrivers,
};
use crate::syndication::debt_schedule::LoanState;
use crate::syndication::inputs::DealInputs;
use crate::syndication::sources_uses::resolve_sources_uses;
use crate::time_value::irr;
use crate::types::*;
use crate::SyndicationResult;

const MAX_HOLD_MONTHS: u32 = 1200;

/// Headline deal returns without period records or a waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickMetrics {
    pub levered_irr: Rate,
    pub equity_multiple: Multiple,
    pub total_equity_invested: Money,
    pub total_distributions: Money,
    pub exit_price: Money,
}

/// Recompute deal-level levered IRR and equity multiple.
///
/// Walks the same monthly sequence as `build_cash_flows` using the same
/// helpers, but keeps only the equity flows. The loop body mirrors the
/// builder's: any change to event ordering there must be made here too (the
/// property tests compare the two).
pub fn quick_metrics(inputs: &DealInputs) -> SyndicationResult<QuickMetrics> {
    let hold = inputs.hold_months;
    if hold == 0 || hold > MAX_HOLD_MONTHS {
        return Err(SyndicationError::InvalidInput {
            field: "hold_months".into(),
            reason: format!("Hold must be between 1 and {MAX_HOLD_MONTHS} months"),
        });
    }

    let mut warnings = Vec::new();
    let su = resolve_sources_uses(inputs, &mut warnings);
    let pro_forma = &inputs.pro_forma;

    let initial_equity = su.lp_equity + su.gp_equity;
    let mut equity_flows: Vec<Money> = Vec::with_capacity(hold as usize + 1);
    equity_flows.push(-initial_equity);
    let mut total_invested = initial_equity;
    let mut total_distributions = Decimal::ZERO;
    let mut exit_price = Decimal::ZERO;

    let mut loan = LoanState::originate(
        su.loan_amount,
        inputs.debt.annual_rate,
        inputs.debt.amortization_months,
        inputs.debt.financing,
    );
    let mut exit_fee_pct = inputs.debt.exit_fee_pct;
    let mut reserve = su.initial_reserves;
    let mut drivers = OperatingDrivers::new(pro_forma);
    let mut noi_history: Vec<Money> = Vec::with_capacity(hold as usize);

    for t in 1..=hold {
        if t > 1 {
            drivers = drivers.advance();
        }
        let op = drivers.operate(pro_forma, su.total_equity, t);
        noi_history.push(op.net_operating_income);

        let (debt, next_loan) = loan.step();
        loan = next_loan;
        let movement = apply_reserves(
            reserve,
            op.ncf_before_debt - debt.payment,
            op.replacement_reserves,
        );
        reserve = movement.balance;

        let call = capital_call_amount(&inputs.equity.capital_calls, t);
        reserve += call;
        let mut cad = movement.operating_cash;

        if let Some(refi) = &inputs.refinance {
            if t == refi.month && refinance_in_hold(refi, hold) {
                let annual_noi = event_annual_noi(
                    inputs.exit.noi_basis,
                    &noi_history,
                    &drivers,
                    pro_forma,
                    su.total_equity,
                );
                let event = price_refinance(refi, annual_noi, loan.balance, exit_fee_pct, reserve);
                reserve -= event.reserve_draw;
                cad += event.distributable;
                loan = LoanState::originate(
                    event.new_loan,
                    refi.annual_rate,
                    refi.amortization_months,
                    refi.financing,
                );
                exit_fee_pct = refi.exit_fee_pct;
            }
        }

        if t == hold {
            let annual_noi = event_annual_noi(
                inputs.exit.noi_basis,
                &noi_history,
                &drivers,
                pro_forma,
                su.total_equity,
            );
            let event = price_sale(&inputs.exit, annual_noi, loan.balance, exit_fee_pct, reserve);
            exit_price = event.gross_price;
            cad += event.net_proceeds;
        }

        total_invested += call;
        total_distributions += cad;
        equity_flows.push(cad - call);
    }

    let equity_multiple = if total_invested.is_zero() {
        Decimal::ZERO
    } else {
        total_distributions / total_invested
    };

    Ok(QuickMetrics {
        levered_irr: irr(&equity_flows, 12),
        equity_multiple,
        total_equity_invested: total_invested,
        total_distributions,
        exit_price,
    })
}
