use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::debt_schedule::LoanState;
use super::inputs::{
    AssetManagementFee, CapexDraw, CapitalCall, DealInputs, ExitInputs, ExitValuation,
    ManagementFee, NoiBasis, ProFormaInputs, RefinanceInputs,
};
use super::sources_uses::SourcesAndUses;
use crate::types::*;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Mid-hold refinance detail.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RefinanceEvent {
    /// Annualised NOI capitalised for the valuation
    pub annual_noi: Money,
    pub property_value: Money,
    pub new_loan: Money,
    /// Balance of the prior loan repaid
    pub payoff: Money,
    /// Exit fee on the prior loan
    pub exit_fee: Money,
    pub closing_costs: Money,
    /// New loan less payoff, exit fee and closing costs (may be negative)
    pub net_proceeds: Money,
    /// Reserve cash used to close a negative-proceeds refinance
    pub reserve_draw: Money,
    /// Cash-in requirement the reserve could not cover
    pub unfunded: Money,
    /// Proceeds paid out this period (zero when negative)
    pub distributable: Money,
    pub through_waterfall: bool,
}

/// Sale detail for the final period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SaleEvent {
    /// Annualised NOI capitalised (zero for a fixed price)
    pub annual_noi: Money,
    pub gross_price: Money,
    pub sale_costs: Money,
    pub disposition_fee: Money,
    pub loan_payoff: Money,
    pub exit_fee: Money,
    pub reserve_release: Money,
    /// Distributable sale proceeds, floored at zero
    pub net_proceeds: Money,
    /// Amount by which costs and payoff exceeded the price
    pub shortfall: Money,
}

/// One month of the pro forma. Period 0 is closing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodCashFlow {
    pub period: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    // --- Income ---
    pub gross_potential_rent: Money,
    pub vacancy_loss: Money,
    pub bad_debt_loss: Money,
    pub concessions: Money,
    pub other_income: Money,
    pub effective_gross_income: Money,
    // --- Expenses ---
    pub operating_expenses: Money,
    pub management_fee: Money,
    pub net_operating_income: Money,
    pub asset_management_fee: Money,
    pub replacement_reserves: Money,
    pub capex: Money,
    pub ncf_before_debt: Money,
    // --- Debt ---
    pub beginning_loan_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub debt_service: Money,
    pub ending_loan_balance: Money,
    pub interest_only: bool,
    pub ncf_after_debt: Money,
    // --- Reserves ---
    pub reserve_draw: Money,
    pub reserve_deposit: Money,
    pub reserve_balance: Money,
    pub uncovered_shortfall: Money,
    // --- Equity ---
    pub lp_contribution: Money,
    pub gp_contribution: Money,
    // --- Events ---
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinance: Option<RefinanceEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale: Option<SaleEvent>,
    // --- Distributable cash ---
    pub cash_available_for_distribution: Money,
    /// Portion of CAD routed through the tiered waterfall
    pub waterfall_cash: Money,
    /// Refinance proceeds paid outside the waterfall
    pub direct_distribution: Money,
}

impl PeriodCashFlow {
    pub fn total_contribution(&self) -> Money {
        self.lp_contribution + self.gp_contribution
    }
}

// ---------------------------------------------------------------------------
// Operating drivers
// ---------------------------------------------------------------------------

/// Income and expense lines for one month.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OperatingMonth {
    pub gross_potential_rent: Money,
    pub vacancy_loss: Money,
    pub bad_debt_loss: Money,
    pub concessions: Money,
    pub other_income: Money,
    pub effective_gross_income: Money,
    pub operating_expenses: Money,
    pub management_fee: Money,
    pub net_operating_income: Money,
    pub asset_management_fee: Money,
    pub replacement_reserves: Money,
    pub capex: Money,
    pub ncf_before_debt: Money,
}

/// Grown base figures for a month. Month one carries the inputs unchanged;
/// `advance` applies one month of growth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingDrivers {
    pub gross_potential_rent: Money,
    pub other_income: Money,
    pub operating_expenses: Money,
    rent_factor: Decimal,
    other_income_factor: Decimal,
    expense_factor: Decimal,
}

impl OperatingDrivers {
    pub fn new(pro_forma: &ProFormaInputs) -> Self {
        OperatingDrivers {
            gross_potential_rent: pro_forma.gross_potential_rent.max(Decimal::ZERO),
            other_income: pro_forma.other_income.max(Decimal::ZERO),
            operating_expenses: pro_forma.operating_expenses.max(Decimal::ZERO),
            rent_factor: Decimal::ONE + pro_forma.rent_growth.monthly_rate(),
            other_income_factor: Decimal::ONE + pro_forma.other_income_growth.monthly_rate(),
            expense_factor: Decimal::ONE + pro_forma.expense_growth.monthly_rate(),
        }
    }

    pub fn advance(&self) -> Self {
        OperatingDrivers {
            gross_potential_rent: self.gross_potential_rent * self.rent_factor,
            other_income: self.other_income * self.other_income_factor,
            operating_expenses: self.operating_expenses * self.expense_factor,
            ..*self
        }
    }

    /// Run the income statement for `month`.
    pub fn operate(
        &self,
        pro_forma: &ProFormaInputs,
        total_equity: Money,
        month: u32,
    ) -> OperatingMonth {
        let gpr = self.gross_potential_rent;
        let vacancy_loss = gpr * pro_forma.vacancy_rate;
        let bad_debt_loss = gpr * pro_forma.bad_debt_rate;
        let concessions = gpr * pro_forma.concessions_rate;
        let egi = gpr - vacancy_loss - bad_debt_loss - concessions + self.other_income;

        let management_fee = match pro_forma.management_fee {
            ManagementFee::Flat(amount) => amount,
            ManagementFee::PercentOfEgi(pct) => egi.max(Decimal::ZERO) * pct,
        };
        let noi = egi - self.operating_expenses - management_fee;

        let asset_management_fee = match pro_forma.asset_management_fee {
            AssetManagementFee::None => Decimal::ZERO,
            AssetManagementFee::Flat(amount) => amount,
            AssetManagementFee::PercentOfEgi(pct) => egi.max(Decimal::ZERO) * pct,
            AssetManagementFee::PercentOfEquity(pct) => total_equity * pct / dec!(12),
        };
        let replacement_reserves = pro_forma.replacement_reserves.max(Decimal::ZERO);
        let capex = capex_amount(&pro_forma.capex_schedule, month);

        OperatingMonth {
            gross_potential_rent: gpr,
            vacancy_loss,
            bad_debt_loss,
            concessions,
            other_income: self.other_income,
            effective_gross_income: egi,
            operating_expenses: self.operating_expenses,
            management_fee,
            net_operating_income: noi,
            asset_management_fee,
            replacement_reserves,
            capex,
            ncf_before_debt: noi - asset_management_fee - replacement_reserves - capex,
        }
    }

    /// NOI of the twelve months after this one.
    pub fn forward_noi(&self, pro_forma: &ProFormaInputs, total_equity: Money) -> Money {
        let mut drivers = *self;
        let mut total = Decimal::ZERO;
        for _ in 0..12 {
            drivers = drivers.advance();
            total += drivers.operate(pro_forma, total_equity, 0).net_operating_income;
        }
        total
    }
}

// ---------------------------------------------------------------------------
// Shared helpers (also used by the quick recompute path)
// ---------------------------------------------------------------------------

pub fn capex_amount(schedule: &[CapexDraw], month: u32) -> Money {
    schedule
        .iter()
        .filter(|draw| draw.month == month)
        .map(|draw| draw.amount.max(Decimal::ZERO))
        .sum()
}

pub fn capital_call_amount(calls: &[CapitalCall], month: u32) -> Money {
    calls
        .iter()
        .filter(|call| call.month == month)
        .map(|call| call.amount.max(Decimal::ZERO))
        .sum()
}

/// Average of the last (up to) twelve monthly NOIs, times twelve.
pub fn trailing_annual_noi(noi_history: &[Money]) -> Money {
    let window = noi_history.len().min(12);
    if window == 0 {
        return Decimal::ZERO;
    }
    let recent: Money = noi_history[noi_history.len() - window..].iter().sum();
    recent / Decimal::from(window as u64) * dec!(12)
}

/// Annual NOI capitalised at an event, per the configured basis.
pub fn event_annual_noi(
    basis: NoiBasis,
    noi_history: &[Money],
    drivers: &OperatingDrivers,
    pro_forma: &ProFormaInputs,
    total_equity: Money,
) -> Money {
    match basis {
        NoiBasis::Trailing => trailing_annual_noi(noi_history),
        NoiBasis::Forward => drivers.forward_noi(pro_forma, total_equity),
    }
}

fn capitalize(annual_noi: Money, cap_rate: Rate) -> Money {
    if cap_rate <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (annual_noi / cap_rate).max(Decimal::ZERO)
    }
}

/// Reserve movement for one month of operations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReserveMovement {
    pub draw: Money,
    pub deposit: Money,
    pub shortfall: Money,
    pub balance: Money,
    /// Operating cash left for distribution
    pub operating_cash: Money,
}

/// Negative NCF draws on the reserve up to its balance; positive NCF accrues
/// the month's replacement reserve to it.
pub fn apply_reserves(
    balance: Money,
    ncf_after_debt: Money,
    replacement: Money,
) -> ReserveMovement {
    let balance = balance.max(Decimal::ZERO);
    if ncf_after_debt < Decimal::ZERO {
        let need = -ncf_after_debt;
        let draw = need.min(balance);
        ReserveMovement {
            draw,
            deposit: Decimal::ZERO,
            shortfall: need - draw,
            balance: balance - draw,
            operating_cash: Decimal::ZERO,
        }
    } else {
        let deposit = replacement.max(Decimal::ZERO);
        ReserveMovement {
            draw: Decimal::ZERO,
            deposit,
            shortfall: Decimal::ZERO,
            balance: balance + deposit,
            operating_cash: ncf_after_debt,
        }
    }
}

/// Size a refinance and net it against the outstanding loan.
pub fn price_refinance(
    refi: &RefinanceInputs,
    annual_noi: Money,
    payoff: Money,
    exit_fee_pct: Rate,
    reserve_balance: Money,
) -> RefinanceEvent {
    let property_value = capitalize(annual_noi, refi.cap_rate);
    let new_loan = (property_value * refi.ltv).max(Decimal::ZERO);
    let exit_fee = payoff * exit_fee_pct.max(Decimal::ZERO);
    let closing_costs = new_loan * refi.closing_costs_pct.max(Decimal::ZERO);
    let net_proceeds = new_loan - payoff - exit_fee - closing_costs;

    let (reserve_draw, unfunded) = if net_proceeds < Decimal::ZERO {
        let need = -net_proceeds;
        let draw = need.min(reserve_balance.max(Decimal::ZERO));
        (draw, need - draw)
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    RefinanceEvent {
        annual_noi,
        property_value,
        new_loan,
        payoff,
        exit_fee,
        closing_costs,
        net_proceeds,
        reserve_draw,
        unfunded,
        distributable: net_proceeds.max(Decimal::ZERO),
        through_waterfall: refi.through_waterfall,
    }
}

/// Price the exit and settle the loan and reserve against it.
pub fn price_sale(
    exit: &ExitInputs,
    annual_noi: Money,
    payoff: Money,
    exit_fee_pct: Rate,
    reserve_balance: Money,
) -> SaleEvent {
    let (annual_noi, gross_price) = match exit.valuation {
        ExitValuation::CapRate(cap_rate) => (annual_noi, capitalize(annual_noi, cap_rate)),
        ExitValuation::Price(price) => (Decimal::ZERO, price.max(Decimal::ZERO)),
    };
    let sale_costs = gross_price * exit.sale_costs_pct.max(Decimal::ZERO);
    let disposition_fee = gross_price * exit.disposition_fee_pct.max(Decimal::ZERO);
    let exit_fee = payoff * exit_fee_pct.max(Decimal::ZERO);
    let reserve_release = reserve_balance.max(Decimal::ZERO);

    let raw = gross_price - sale_costs - disposition_fee - payoff - exit_fee + reserve_release;

    SaleEvent {
        annual_noi,
        gross_price,
        sale_costs,
        disposition_fee,
        loan_payoff: payoff,
        exit_fee,
        reserve_release,
        net_proceeds: raw.max(Decimal::ZERO),
        shortfall: (-raw).max(Decimal::ZERO),
    }
}

/// Last day of the month `offset` months after `start`.
pub fn month_end(start: NaiveDate, offset: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(start.year(), start.month(), 1)?
        .checked_add_months(Months::new(offset + 1))?
        .pred_opt()
}

/// Whether a configured refinance falls strictly inside the hold.
pub fn refinance_in_hold(refi: &RefinanceInputs, hold_months: u32) -> bool {
    refi.month >= 1 && refi.month < hold_months
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the month-by-month pro forma, periods `0..=hold_months`.
pub fn build_cash_flows(inputs: &DealInputs, su: &SourcesAndUses) -> Vec<PeriodCashFlow> {
    let pro_forma = &inputs.pro_forma;
    let hold = inputs.hold_months;
    let lp_share = su.lp_share();
    let date_for = |period: u32| inputs.start_date.and_then(|start| month_end(start, period));

    let mut records = Vec::with_capacity(hold as usize + 1);
    records.push(PeriodCashFlow {
        period: 0,
        date: date_for(0),
        beginning_loan_balance: su.loan_amount,
        ending_loan_balance: su.loan_amount,
        reserve_balance: su.initial_reserves,
        reserve_deposit: su.initial_reserves,
        lp_contribution: su.lp_equity,
        gp_contribution: su.gp_equity,
        ..PeriodCashFlow::default()
    });

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
        let ncf_after_debt = op.ncf_before_debt - debt.payment;

        let movement = apply_reserves(reserve, ncf_after_debt, op.replacement_reserves);
        reserve = movement.balance;
        let mut reserve_draw = movement.draw;
        let mut reserve_deposit = movement.deposit;

        let call = capital_call_amount(&inputs.equity.capital_calls, t);
        reserve += call;
        reserve_deposit += call;

        let mut cad = movement.operating_cash;
        let mut direct = Decimal::ZERO;

        let refinance = match &inputs.refinance {
            Some(refi) if t == refi.month && refinance_in_hold(refi, hold) => {
                let annual_noi = event_annual_noi(
                    inputs.exit.noi_basis,
                    &noi_history,
                    &drivers,
                    pro_forma,
                    su.total_equity,
                );
                let event = price_refinance(refi, annual_noi, loan.balance, exit_fee_pct, reserve);
                reserve -= event.reserve_draw;
                reserve_draw += event.reserve_draw;
                if event.through_waterfall {
                    cad += event.distributable;
                } else {
                    direct = event.distributable;
                    cad += direct;
                }
                loan = LoanState::originate(
                    event.new_loan,
                    refi.annual_rate,
                    refi.amortization_months,
                    refi.financing,
                );
                exit_fee_pct = refi.exit_fee_pct;
                tracing::debug!(
                    month = t,
                    new_loan = %event.new_loan.round_dp(2),
                    net = %event.net_proceeds.round_dp(2),
                    "refinance priced"
                );
                Some(event)
            }
            _ => None,
        };

        let sale = if t == hold {
            let annual_noi = event_annual_noi(
                inputs.exit.noi_basis,
                &noi_history,
                &drivers,
                pro_forma,
                su.total_equity,
            );
            let event = price_sale(&inputs.exit, annual_noi, loan.balance, exit_fee_pct, reserve);
            reserve = Decimal::ZERO;
            loan = LoanState::paid_off();
            cad += event.net_proceeds;
            Some(event)
        } else {
            None
        };

        records.push(PeriodCashFlow {
            period: t,
            date: date_for(t),
            gross_potential_rent: op.gross_potential_rent,
            vacancy_loss: op.vacancy_loss,
            bad_debt_loss: op.bad_debt_loss,
            concessions: op.concessions,
            other_income: op.other_income,
            effective_gross_income: op.effective_gross_income,
            operating_expenses: op.operating_expenses,
            management_fee: op.management_fee,
            net_operating_income: op.net_operating_income,
            asset_management_fee: op.asset_management_fee,
            replacement_reserves: op.replacement_reserves,
            capex: op.capex,
            ncf_before_debt: op.ncf_before_debt,
            beginning_loan_balance: debt.beginning_balance,
            interest: debt.interest,
            principal: debt.principal,
            debt_service: debt.payment,
            ending_loan_balance: debt.ending_balance,
            interest_only: debt.interest_only,
            ncf_after_debt,
            reserve_draw,
            reserve_deposit,
            reserve_balance: reserve,
            uncovered_shortfall: movement.shortfall,
            lp_contribution: call * lp_share,
            gp_contribution: call - call * lp_share,
            refinance,
            sale,
            cash_available_for_distribution: cad,
            waterfall_cash: cad - direct,
            direct_distribution: direct,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syndication::inputs::*;
    use crate::syndication::sources_uses::resolve_sources_uses;
    use rust_decimal_macros::dec;

    fn build(inputs: &DealInputs) -> (SourcesAndUses, Vec<PeriodCashFlow>) {
        let mut warnings = Vec::new();
        let su = resolve_sources_uses(inputs, &mut warnings);
        let flows = build_cash_flows(inputs, &su);
        (su, flows)
    }

    #[test]
    fn test_one_month_hold_has_two_records() {
        let inputs = DealInputs::new("Short", dec!(1000000), 1);
        let (_, flows) = build(&inputs);
        assert_eq!(flows.len(), 2);
        assert!(flows[0].sale.is_none());
        assert!(flows[1].sale.is_some());
        assert_eq!(flows[1].ending_loan_balance, flows[1].sale.unwrap().loan_payoff);
    }

    #[test]
    fn test_period_zero_records_contributions() {
        let inputs = DealInputs::new("Close", dec!(1000000), 12);
        let (su, flows) = build(&inputs);
        let p0 = &flows[0];
        assert_eq!(p0.lp_contribution, su.lp_equity);
        assert_eq!(p0.gp_contribution, su.gp_equity);
        assert_eq!(p0.ending_loan_balance, su.loan_amount);
        assert_eq!(p0.reserve_balance, su.initial_reserves);
        assert_eq!(p0.cash_available_for_distribution, Decimal::ZERO);
    }

    #[test]
    fn test_first_period_carries_base_figures() {
        let inputs = DealInputs::new("Growth", dec!(1000000), 24);
        let (_, flows) = build(&inputs);
        assert_eq!(flows[1].gross_potential_rent, dec!(100000));
        assert!(flows[2].gross_potential_rent > flows[1].gross_potential_rent);
        // Twelve months of 3% annual growth compound back to 3%
        let ratio = flows[13].gross_potential_rent / flows[1].gross_potential_rent;
        assert!((ratio - dec!(1.03)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_income_statement_chain() {
        let inputs = DealInputs::new("Chain", dec!(1000000), 12);
        let (su, flows) = build(&inputs);
        let p = &flows[1];
        assert_eq!(p.vacancy_loss, dec!(5000));
        assert_eq!(p.bad_debt_loss, dec!(1000));
        assert_eq!(p.concessions, dec!(500));
        assert_eq!(p.effective_gross_income, dec!(98500));
        assert_eq!(p.management_fee, dec!(2955));
        assert_eq!(p.net_operating_income, dec!(98500) - dec!(35000) - dec!(2955));
        assert_eq!(p.asset_management_fee, su.total_equity * dec!(0.01) / dec!(12));
        assert_eq!(
            p.ncf_before_debt,
            p.net_operating_income - p.asset_management_fee - p.replacement_reserves - p.capex
        );
        assert_eq!(p.ncf_after_debt, p.ncf_before_debt - p.debt_service);
    }

    #[test]
    fn test_no_debt_has_no_debt_service() {
        let inputs = DealInputs::new("Cash", dec!(1000000), 24).with_debt(DebtInputs::none());
        let (_, flows) = build(&inputs);
        for p in &flows {
            assert_eq!(p.debt_service, Decimal::ZERO);
            assert_eq!(p.interest, Decimal::ZERO);
            assert_eq!(p.principal, Decimal::ZERO);
        }
    }

    #[test]
    fn test_negative_ncf_draws_reserves_then_records_shortfall() {
        let pro_forma = ProFormaInputs {
            gross_potential_rent: dec!(10000),
            operating_expenses: dec!(40000),
            ..ProFormaInputs::default()
        };
        let inputs = DealInputs::new("Distressed", dec!(1000000), 12)
            .with_debt(DebtInputs::none())
            .with_pro_forma(pro_forma);
        let (_, flows) = build(&inputs);

        let first = &flows[1];
        assert!(first.ncf_after_debt < Decimal::ZERO);
        assert!(first.reserve_draw > Decimal::ZERO);
        assert_eq!(first.cash_available_for_distribution, Decimal::ZERO);

        let exhausted = flows.iter().find(|p| p.uncovered_shortfall > Decimal::ZERO);
        assert!(exhausted.is_some());
        for p in &flows {
            assert!(p.reserve_balance >= Decimal::ZERO);
            assert!(p.cash_available_for_distribution >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_capital_call_recorded_and_deposited() {
        let equity = EquityInputs {
            split: EquitySplit::Proportional { gp_pct: dec!(0.10) },
            capital_calls: vec![CapitalCall { month: 6, amount: dec!(50000) }],
        };
        let inputs = DealInputs::new("Call", dec!(1000000), 12).with_equity(equity);
        let (_, flows) = build(&inputs);
        let p = &flows[6];
        assert_eq!(p.total_contribution(), dec!(50000));
        assert!((p.gp_contribution - dec!(5000)).abs() < dec!(0.01));
        assert!(p.reserve_balance - flows[5].reserve_balance >= dec!(50000));
    }

    #[test]
    fn test_refinance_through_and_around_waterfall() {
        let refi = RefinanceInputs { month: 12, ..RefinanceInputs::default() };
        let through = DealInputs::new("Refi", dec!(10000000), 36).with_refinance(refi.clone());
        let (_, flows) = build(&through);
        let event = flows[12].refinance.expect("refinance event");
        assert!(event.new_loan > Decimal::ZERO);
        assert_eq!(event.payoff, flows[12].ending_loan_balance);
        assert_eq!(flows[12].direct_distribution, Decimal::ZERO);
        assert_eq!(
            flows[12].waterfall_cash,
            flows[12].cash_available_for_distribution
        );
        assert_eq!(flows[13].beginning_loan_balance, event.new_loan);

        let around = DealInputs::new("Refi", dec!(10000000), 36).with_refinance(RefinanceInputs {
            through_waterfall: false,
            ..refi
        });
        let (_, flows) = build(&around);
        let event = flows[12].refinance.expect("refinance event");
        assert_eq!(flows[12].direct_distribution, event.distributable);
        assert_eq!(
            flows[12].waterfall_cash + flows[12].direct_distribution,
            flows[12].cash_available_for_distribution
        );
    }

    #[test]
    fn test_refinance_at_sale_month_ignored() {
        let refi = RefinanceInputs { month: 24, ..RefinanceInputs::default() };
        let inputs = DealInputs::new("Late", dec!(10000000), 24).with_refinance(refi);
        let (_, flows) = build(&inputs);
        assert!(flows.iter().all(|p| p.refinance.is_none()));
    }

    #[test]
    fn test_sale_shortfall_floored() {
        let exit = ExitInputs {
            valuation: ExitValuation::Price(dec!(100000)),
            ..ExitInputs::default()
        };
        let inputs = DealInputs::new("Underwater", dec!(10000000), 12).with_exit(exit);
        let (_, flows) = build(&inputs);
        let sale = flows[12].sale.expect("sale event");
        assert_eq!(sale.net_proceeds, Decimal::ZERO);
        assert!(sale.shortfall > Decimal::ZERO);
        assert_eq!(flows[12].reserve_balance, Decimal::ZERO);
    }

    #[test]
    fn test_trailing_noi_annualises_short_history() {
        assert_eq!(trailing_annual_noi(&[dec!(100), dec!(200)]), dec!(1800));
        let year: Vec<Money> = (1..=14).map(Decimal::from).collect();
        // Last twelve: 3..=14, average 8.5
        assert_eq!(trailing_annual_noi(&year), dec!(102));
        assert_eq!(trailing_annual_noi(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_forward_noi_exceeds_trailing_with_growth() {
        let exit = ExitInputs { noi_basis: NoiBasis::Forward, ..ExitInputs::default() };
        let fwd = DealInputs::new("Fwd", dec!(10000000), 24).with_exit(exit);
        let trl = DealInputs::new("Trl", dec!(10000000), 24);
        let (_, f) = build(&fwd);
        let (_, t) = build(&trl);
        assert!(f[24].sale.unwrap().gross_price > t[24].sale.unwrap().gross_price);
    }

    #[test]
    fn test_month_end_dates() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(month_end(start, 0), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(month_end(start, 1), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(month_end(start, 12), NaiveDate::from_ymd_opt(2025, 1, 31));

        let mut inputs = DealInputs::new("Dated", dec!(1000000), 3);
        inputs.start_date = Some(start);
        let (_, flows) = build(&inputs);
        assert_eq!(flows[3].date, NaiveDate::from_ymd_opt(2024, 4, 30));
    }

    #[test]
    fn test_apply_reserves_edges() {
        let m = apply_reserves(dec!(100), dec!(-150), dec!(10));
        assert_eq!(m.draw, dec!(100));
        assert_eq!(m.shortfall, dec!(50));
        assert_eq!(m.balance, Decimal::ZERO);

        let m = apply_reserves(dec!(100), dec!(40), dec!(10));
        assert_eq!(m.deposit, dec!(10));
        assert_eq!(m.balance, dec!(110));
        assert_eq!(m.operating_cash, dec!(40));
    }
}
