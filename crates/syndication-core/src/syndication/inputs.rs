use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::time_value::monthly_rate_from_annual;
use crate::types::{Money, Multiple, Rate};

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete assumption set for one syndication deal.
///
/// Every section is filled field-by-field from its `Default` when a document
/// omits it, so a partial JSON/YAML file never aliases nested defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DealInputs {
    /// Deal / property identifier
    pub name: String,
    /// Closing date; when present, period records carry month-end dates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Hold period in months (sale occurs in the final month)
    pub hold_months: u32,
    pub acquisition: AcquisitionInputs,
    pub debt: DebtInputs,
    pub equity: EquityInputs,
    pub pro_forma: ProFormaInputs,
    pub exit: ExitInputs,
    /// Optional mid-hold refinance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinance: Option<RefinanceInputs>,
    pub waterfall: WaterfallPolicy,
}

impl Default for DealInputs {
    fn default() -> Self {
        DealInputs {
            name: "Untitled Deal".into(),
            start_date: None,
            hold_months: 60,
            acquisition: AcquisitionInputs::default(),
            debt: DebtInputs::default(),
            equity: EquityInputs::default(),
            pro_forma: ProFormaInputs::default(),
            exit: ExitInputs::default(),
            refinance: None,
            waterfall: WaterfallPolicy::default(),
        }
    }
}

impl DealInputs {
    /// Default assumptions for a named deal at a given price and hold.
    pub fn new(name: &str, purchase_price: Money, hold_months: u32) -> Self {
        DealInputs {
            name: name.into(),
            hold_months,
            acquisition: AcquisitionInputs {
                purchase_price,
                ..AcquisitionInputs::default()
            },
            ..DealInputs::default()
        }
    }

    pub fn with_debt(mut self, debt: DebtInputs) -> Self {
        self.debt = debt;
        self
    }

    pub fn with_equity(mut self, equity: EquityInputs) -> Self {
        self.equity = equity;
        self
    }

    pub fn with_pro_forma(mut self, pro_forma: ProFormaInputs) -> Self {
        self.pro_forma = pro_forma;
        self
    }

    pub fn with_exit(mut self, exit: ExitInputs) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_refinance(mut self, refinance: RefinanceInputs) -> Self {
        self.refinance = Some(refinance);
        self
    }

    pub fn with_waterfall(mut self, waterfall: WaterfallPolicy) -> Self {
        self.waterfall = waterfall;
        self
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

/// Flat dollar amount or percentage of purchase price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CostBasis {
    Flat(Money),
    PercentOfPrice(Rate),
}

impl CostBasis {
    pub fn resolve(&self, purchase_price: Money) -> Money {
        match self {
            CostBasis::Flat(amount) => *amount,
            CostBasis::PercentOfPrice(pct) => purchase_price * *pct,
        }
    }
}

/// Sponsor acquisition fee definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionFee {
    None,
    Flat(Money),
    PercentOfPrice(Rate),
    /// Percentage of total equity raised, which itself includes the fee
    PercentOfEquity(Rate),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionInputs {
    pub purchase_price: Money,
    pub closing_costs: CostBasis,
    /// Renovation budget funded at closing
    pub upfront_capex: Money,
    /// Operating reserve funded at closing
    pub initial_reserves: Money,
    pub acquisition_fee: AcquisitionFee,
}

impl Default for AcquisitionInputs {
    fn default() -> Self {
        AcquisitionInputs {
            purchase_price: dec!(10000000),
            closing_costs: CostBasis::PercentOfPrice(dec!(0.02)),
            upfront_capex: Decimal::ZERO,
            initial_reserves: dec!(100000),
            acquisition_fee: AcquisitionFee::PercentOfPrice(dec!(0.02)),
        }
    }
}

// ---------------------------------------------------------------------------
// Debt
// ---------------------------------------------------------------------------

/// Repayment profile of a loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinancingMode {
    /// All-cash deal
    None,
    /// Level payment from month one
    Amortizing,
    /// Interest-only for `io_months`, then amortizing over the remaining term
    InterestOnlyThenAmortizing { io_months: u32 },
    /// Interest-only for the life of the loan (bridge debt)
    InterestOnly,
}

/// How the acquisition loan is sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LoanSizing {
    Flat(Money),
    /// Loan-to-value on purchase price
    Ltv(Rate),
    /// Loan-to-cost on price + closing costs + upfront capex
    Ltc(Rate),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtInputs {
    pub financing: FinancingMode,
    pub sizing: LoanSizing,
    pub annual_rate: Rate,
    pub amortization_months: u32,
    /// Origination points charged on the loan amount
    pub lender_points: Rate,
    /// Flat lender / legal fees
    pub lender_fees: Money,
    /// Exit / prepayment fee charged on the balance repaid
    pub exit_fee_pct: Rate,
}

impl Default for DebtInputs {
    fn default() -> Self {
        DebtInputs {
            financing: FinancingMode::InterestOnlyThenAmortizing { io_months: 24 },
            sizing: LoanSizing::Ltv(dec!(0.65)),
            annual_rate: dec!(0.065),
            amortization_months: 360,
            lender_points: dec!(0.01),
            lender_fees: Decimal::ZERO,
            exit_fee_pct: Decimal::ZERO,
        }
    }
}

impl DebtInputs {
    pub fn none() -> Self {
        DebtInputs {
            financing: FinancingMode::None,
            sizing: LoanSizing::Flat(Decimal::ZERO),
            lender_points: Decimal::ZERO,
            ..DebtInputs::default()
        }
    }

    pub fn amortizing(ltv: Rate, annual_rate: Rate, amortization_months: u32) -> Self {
        DebtInputs {
            financing: FinancingMode::Amortizing,
            sizing: LoanSizing::Ltv(ltv),
            annual_rate,
            amortization_months,
            ..DebtInputs::default()
        }
    }

    pub fn interest_only_then_amortizing(
        ltv: Rate,
        annual_rate: Rate,
        io_months: u32,
        amortization_months: u32,
    ) -> Self {
        DebtInputs {
            financing: FinancingMode::InterestOnlyThenAmortizing { io_months },
            sizing: LoanSizing::Ltv(ltv),
            annual_rate,
            amortization_months,
            ..DebtInputs::default()
        }
    }

    pub fn bridge(ltc: Rate, annual_rate: Rate) -> Self {
        DebtInputs {
            financing: FinancingMode::InterestOnly,
            sizing: LoanSizing::Ltc(ltc),
            annual_rate,
            ..DebtInputs::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Equity
// ---------------------------------------------------------------------------

/// How total equity is divided between the capital classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EquitySplit {
    /// GP funds `gp_pct` of total equity, LP the rest
    Proportional { gp_pct: Rate },
    /// Dollar targets, rescaled if they miss the resolved total by > $1
    Explicit { lp_amount: Money, gp_amount: Money },
}

/// Additional equity called mid-hold, split by ownership share.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalCall {
    pub month: u32,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EquityInputs {
    pub split: EquitySplit,
    pub capital_calls: Vec<CapitalCall>,
}

impl Default for EquityInputs {
    fn default() -> Self {
        EquityInputs {
            split: EquitySplit::Proportional { gp_pct: dec!(0.10) },
            capital_calls: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pro forma
// ---------------------------------------------------------------------------

/// Growth assumption, annual (compounded to a monthly equivalent) or monthly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Growth {
    Annual(Rate),
    Monthly(Rate),
}

impl Growth {
    pub fn monthly_rate(&self) -> Rate {
        match self {
            Growth::Annual(rate) => monthly_rate_from_annual(*rate),
            Growth::Monthly(rate) => *rate,
        }
    }
}

/// Property-management fee, charged inside NOI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ManagementFee {
    /// Flat monthly amount
    Flat(Money),
    PercentOfEgi(Rate),
}

/// Sponsor asset-management fee, charged below NOI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AssetManagementFee {
    None,
    /// Flat monthly amount
    Flat(Money),
    PercentOfEgi(Rate),
    /// Annual percentage of total equity at closing, charged monthly
    PercentOfEquity(Rate),
}

/// Scheduled capital expenditure paid from operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapexDraw {
    pub month: u32,
    pub amount: Money,
}

/// Operating assumptions. Dollar amounts are month-one figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProFormaInputs {
    pub gross_potential_rent: Money,
    pub rent_growth: Growth,
    pub vacancy_rate: Rate,
    pub bad_debt_rate: Rate,
    pub concessions_rate: Rate,
    pub other_income: Money,
    pub other_income_growth: Growth,
    pub operating_expenses: Money,
    pub expense_growth: Growth,
    pub management_fee: ManagementFee,
    pub asset_management_fee: AssetManagementFee,
    pub replacement_reserves: Money,
    pub capex_schedule: Vec<CapexDraw>,
}

impl Default for ProFormaInputs {
    fn default() -> Self {
        ProFormaInputs {
            gross_potential_rent: dec!(100000),
            rent_growth: Growth::Annual(dec!(0.03)),
            vacancy_rate: dec!(0.05),
            bad_debt_rate: dec!(0.01),
            concessions_rate: dec!(0.005),
            other_income: dec!(5000),
            other_income_growth: Growth::Annual(dec!(0.02)),
            operating_expenses: dec!(35000),
            expense_growth: Growth::Annual(dec!(0.03)),
            management_fee: ManagementFee::PercentOfEgi(dec!(0.03)),
            asset_management_fee: AssetManagementFee::PercentOfEquity(dec!(0.01)),
            replacement_reserves: dec!(2500),
            capex_schedule: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Exit & refinance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExitValuation {
    /// Value = annualised NOI / cap rate
    CapRate(Rate),
    /// Fixed gross sale price
    Price(Money),
}

/// Which twelve months of NOI a cap-rate valuation capitalises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoiBasis {
    /// Twelve months ending with the event month (annualised if fewer)
    Trailing,
    /// Twelve months following the event month
    Forward,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitInputs {
    pub valuation: ExitValuation,
    pub noi_basis: NoiBasis,
    pub sale_costs_pct: Rate,
    /// Sponsor disposition fee on gross sale price
    pub disposition_fee_pct: Rate,
}

impl Default for ExitInputs {
    fn default() -> Self {
        ExitInputs {
            valuation: ExitValuation::CapRate(dec!(0.065)),
            noi_basis: NoiBasis::Trailing,
            sale_costs_pct: dec!(0.02),
            disposition_fee_pct: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinanceInputs {
    pub month: u32,
    /// Cap rate used to value the property for sizing
    pub cap_rate: Rate,
    pub ltv: Rate,
    pub annual_rate: Rate,
    pub amortization_months: u32,
    pub financing: FinancingMode,
    /// Closing costs as a percentage of the new loan
    pub closing_costs_pct: Rate,
    /// Exit fee of the new loan, charged at sale
    pub exit_fee_pct: Rate,
    /// Distribute net proceeds through the tiered waterfall (true) or pay
    /// them pro-rata to contributed capital outside it (false)
    pub through_waterfall: bool,
}

impl Default for RefinanceInputs {
    fn default() -> Self {
        RefinanceInputs {
            month: 36,
            cap_rate: dec!(0.06),
            ltv: dec!(0.70),
            annual_rate: dec!(0.06),
            amortization_months: 360,
            financing: FinancingMode::Amortizing,
            closing_costs_pct: dec!(0.01),
            exit_fee_pct: Decimal::ZERO,
            through_waterfall: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Waterfall policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapitalReturn {
    /// LP fully repaid before GP receives any return of capital
    LpFirst,
    /// Split by unreturned capital balances
    ProRata,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CatchUp {
    /// GP share of cumulative profit the catch-up restores (e.g. 0.20)
    pub gp_target_share: Rate,
}

/// Activation test for a promote tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TierHurdle {
    /// Always applies
    Simple,
    /// LP equity multiple hurdle
    EquityMultiple(Multiple),
    /// LP IRR hurdle (approximated from the running multiple)
    Irr(Rate),
}

impl TierHurdle {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            TierHurdle::Simple => None,
            TierHurdle::EquityMultiple(m) => Some(*m),
            TierHurdle::Irr(r) => Some(*r),
        }
    }

    pub fn same_kind(&self, other: &TierHurdle) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoteTier {
    pub name: String,
    pub hurdle: TierHurdle,
    pub lp_split: Rate,
    pub gp_split: Rate,
}

impl PromoteTier {
    pub fn simple(name: &str, lp_split: Rate) -> Self {
        PromoteTier {
            name: name.into(),
            hurdle: TierHurdle::Simple,
            lp_split,
            gp_split: Decimal::ONE - lp_split,
        }
    }

    pub fn equity_multiple(name: &str, hurdle: Multiple, lp_split: Rate) -> Self {
        PromoteTier {
            name: name.into(),
            hurdle: TierHurdle::EquityMultiple(hurdle),
            lp_split,
            gp_split: Decimal::ONE - lp_split,
        }
    }

    pub fn irr(name: &str, hurdle: Rate, lp_split: Rate) -> Self {
        PromoteTier {
            name: name.into(),
            hurdle: TierHurdle::Irr(hurdle),
            lp_split,
            gp_split: Decimal::ONE - lp_split,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterfallPolicy {
    pub pref_rate_annual: Rate,
    pub gp_participates_in_pref: bool,
    pub return_of_capital: CapitalReturn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_up: Option<CatchUp>,
    pub tiers: Vec<PromoteTier>,
}

impl Default for WaterfallPolicy {
    fn default() -> Self {
        WaterfallPolicy {
            pref_rate_annual: dec!(0.08),
            gp_participates_in_pref: true,
            return_of_capital: CapitalReturn::LpFirst,
            catch_up: None,
            tiers: vec![
                PromoteTier::equity_multiple("Up to 2.0x", dec!(2.0), dec!(0.80)),
                PromoteTier::simple("Above 2.0x", dec!(0.70)),
            ],
        }
    }
}
