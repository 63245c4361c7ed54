use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::cash_flow::PeriodCashFlow;
use super::inputs::{CapitalReturn, PromoteTier, TierHurdle, WaterfallPolicy};
use crate::time_value::{irr, irr_to_multiple};
use crate::types::*;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Running LP/GP balances carried from one period to the next.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WaterfallBalances {
    pub lp_unreturned_capital: Money,
    pub gp_unreturned_capital: Money,
    /// Accrued, unpaid preferred return
    pub lp_pref_balance: Money,
    pub gp_pref_balance: Money,
    pub lp_contributed: Money,
    pub gp_contributed: Money,
    /// Every dollar paid to the class, direct distributions included
    pub lp_distributed: Money,
    pub gp_distributed: Money,
    /// Pref, catch-up and tier distributions
    pub lp_profit: Money,
    pub gp_profit: Money,
}

impl WaterfallBalances {
    /// LP distributions over LP contributions (zero before any capital).
    pub fn lp_multiple(&self) -> Multiple {
        if self.lp_contributed.is_zero() {
            Decimal::ZERO
        } else {
            self.lp_distributed / self.lp_contributed
        }
    }

    fn lp_contribution_share(&self) -> Rate {
        let total = self.lp_contributed + self.gp_contributed;
        if total.is_zero() {
            Decimal::ONE
        } else {
            self.lp_contributed / total
        }
    }
}

/// Cash a promote tier consumed in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAllocation {
    pub tier_index: usize,
    pub name: String,
    pub lp_amount: Money,
    pub gp_amount: Money,
}

/// Distribution of one period's cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallPeriodAllocation {
    pub period: u32,
    /// CAD, direct distributions included
    pub cash_available: Money,
    pub lp_contribution: Money,
    pub gp_contribution: Money,
    pub lp_pref_accrued: Money,
    pub gp_pref_accrued: Money,
    pub lp_return_of_capital: Money,
    pub gp_return_of_capital: Money,
    pub lp_pref_paid: Money,
    pub gp_pref_paid: Money,
    pub gp_catch_up: Money,
    /// Tiers that received cash this period
    pub tiers: Vec<TierAllocation>,
    pub lp_direct: Money,
    pub gp_direct: Money,
    pub lp_total: Money,
    pub gp_total: Money,
    /// Cash no stage could absorb (only possible with no tiers configured)
    pub unallocated: Money,
    /// Closing balances
    pub balances: WaterfallBalances,
    /// Highest tier reached this period
    pub active_tier: Option<usize>,
    pub rationale: String,
}

impl WaterfallPeriodAllocation {
    pub fn total_distributed(&self) -> Money {
        self.lp_total + self.gp_total
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// LP multiple a hurdle requires in `period`.
///
/// IRR hurdles use the closed-form approximation `IRR ~ multiple^(1/years) - 1`
/// with `years = period / 12`, which ignores the timing of interim
/// distributions. The equivalent multiple target is `(1 + h)^years`.
fn hurdle_multiple(hurdle: &TierHurdle, period: u32) -> Option<Multiple> {
    match hurdle {
        TierHurdle::Simple => None,
        TierHurdle::EquityMultiple(m) => Some(*m),
        TierHurdle::Irr(rate) => {
            let years = Decimal::from(period) / dec!(12);
            Some(irr_to_multiple(*rate, years))
        }
    }
}

fn stage(label: &str, lp: Money, gp: Money) -> Option<String> {
    if lp.is_zero() && gp.is_zero() {
        None
    } else {
        Some(format!(
            "{label}: LP {} / GP {}",
            lp.round_dp(2),
            gp.round_dp(2)
        ))
    }
}

/// Distribute one period's cash over the balances carried in from `prev`.
///
/// Order: contributions, pref accrual, return of capital, pref payment,
/// catch-up, promote tiers. The last tier is never capped.
pub fn allocate_period(
    prev: &WaterfallBalances,
    flow: &PeriodCashFlow,
    policy: &WaterfallPolicy,
) -> WaterfallPeriodAllocation {
    let mut b = *prev;
    let mut notes: Vec<String> = Vec::new();

    // 1. Contributions
    let lp_contribution = flow.lp_contribution.max(Decimal::ZERO);
    let gp_contribution = flow.gp_contribution.max(Decimal::ZERO);
    b.lp_contributed += lp_contribution;
    b.gp_contributed += gp_contribution;
    b.lp_unreturned_capital += lp_contribution;
    b.gp_unreturned_capital += gp_contribution;

    // 2. Pref accrual on unreturned capital, this period's calls included
    let monthly_pref = policy.pref_rate_annual.max(Decimal::ZERO) / dec!(12);
    let (lp_pref_accrued, gp_pref_accrued) = if flow.period == 0 {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let lp = b.lp_unreturned_capital * monthly_pref;
        let gp = if policy.gp_participates_in_pref {
            b.gp_unreturned_capital * monthly_pref
        } else {
            Decimal::ZERO
        };
        (lp, gp)
    };
    b.lp_pref_balance += lp_pref_accrued;
    b.gp_pref_balance += gp_pref_accrued;

    // Direct distributions bypass every stage
    let direct = flow.direct_distribution.max(Decimal::ZERO);
    let lp_direct = direct * b.lp_contribution_share();
    let gp_direct = direct - lp_direct;
    b.lp_distributed += lp_direct;
    b.gp_distributed += gp_direct;
    if let Some(note) = stage("Direct", lp_direct, gp_direct) {
        notes.push(note);
    }

    let mut cash = flow.waterfall_cash.max(Decimal::ZERO);

    // 3. Return of capital
    let (lp_roc, gp_roc) = match policy.return_of_capital {
        CapitalReturn::LpFirst => {
            let lp = cash.min(b.lp_unreturned_capital);
            let gp = (cash - lp).min(b.gp_unreturned_capital);
            (lp, gp)
        }
        CapitalReturn::ProRata => {
            let outstanding = b.lp_unreturned_capital + b.gp_unreturned_capital;
            if outstanding.is_zero() {
                (Decimal::ZERO, Decimal::ZERO)
            } else {
                let paid = cash.min(outstanding);
                let lp = (paid * b.lp_unreturned_capital / outstanding)
                    .min(b.lp_unreturned_capital);
                let gp = (paid - lp).min(b.gp_unreturned_capital);
                (lp, gp)
            }
        }
    };
    cash -= lp_roc + gp_roc;
    b.lp_unreturned_capital -= lp_roc;
    b.gp_unreturned_capital -= gp_roc;
    b.lp_distributed += lp_roc;
    b.gp_distributed += gp_roc;
    if let Some(note) = stage("Return of capital", lp_roc, gp_roc) {
        notes.push(note);
    }

    // 4. Preferred return, LP first
    let lp_pref_paid = cash.min(b.lp_pref_balance);
    cash -= lp_pref_paid;
    let gp_pref_paid = if policy.gp_participates_in_pref {
        cash.min(b.gp_pref_balance)
    } else {
        Decimal::ZERO
    };
    cash -= gp_pref_paid;
    b.lp_pref_balance -= lp_pref_paid;
    b.gp_pref_balance -= gp_pref_paid;
    b.lp_distributed += lp_pref_paid;
    b.gp_distributed += gp_pref_paid;
    b.lp_profit += lp_pref_paid;
    b.gp_profit += gp_pref_paid;
    if let Some(note) = stage("Preferred return", lp_pref_paid, gp_pref_paid) {
        notes.push(note);
    }

    // 5. GP catch-up
    let gp_catch_up = match policy.catch_up {
        Some(catch_up) if cash > Decimal::ZERO && catch_up.gp_target_share > Decimal::ZERO => {
            let target = catch_up.gp_target_share;
            let total_profit = b.lp_profit + b.gp_profit;
            let shortfall = target * total_profit - b.gp_profit;
            if shortfall <= Decimal::ZERO {
                Decimal::ZERO
            } else if target >= Decimal::ONE {
                cash
            } else {
                (shortfall / (Decimal::ONE - target)).min(cash)
            }
        }
        _ => Decimal::ZERO,
    };
    cash -= gp_catch_up;
    b.gp_distributed += gp_catch_up;
    b.gp_profit += gp_catch_up;
    if let Some(note) = stage("Catch-up", Decimal::ZERO, gp_catch_up) {
        notes.push(note);
    }

    // 6. Promote tiers
    let mut tiers: Vec<TierAllocation> = Vec::new();
    let mut active_tier = None;
    let last = policy.tiers.len().checked_sub(1);

    for (index, tier) in policy.tiers.iter().enumerate() {
        if cash <= Decimal::ZERO {
            break;
        }
        let is_last = Some(index) == last;

        // Activation: LP multiple at or above the previous same-kind hurdle
        if index > 0 {
            let previous: &PromoteTier = &policy.tiers[index - 1];
            if previous.hurdle.same_kind(&tier.hurdle) && !b.lp_contributed.is_zero() {
                if let Some(floor) = hurdle_multiple(&previous.hurdle, flow.period) {
                    if b.lp_multiple() < floor - dec!(0.000001) {
                        break;
                    }
                }
            }
        }

        let capacity = if is_last {
            cash
        } else {
            match hurdle_multiple(&tier.hurdle, flow.period) {
                None => cash,
                // No LP capital to measure against: the hurdle is moot
                Some(_) if b.lp_contributed.is_zero() => Decimal::ZERO,
                Some(target) => {
                    let lp_needed =
                        (target * b.lp_contributed - b.lp_distributed).max(Decimal::ZERO);
                    if tier.lp_split <= Decimal::ZERO {
                        cash
                    } else {
                        (lp_needed / tier.lp_split).min(cash)
                    }
                }
            }
        };

        if capacity <= Decimal::ZERO {
            continue;
        }

        let lp_amount = capacity * tier.lp_split;
        let gp_amount = capacity - lp_amount;
        cash -= capacity;
        b.lp_distributed += lp_amount;
        b.gp_distributed += gp_amount;
        b.lp_profit += lp_amount;
        b.gp_profit += gp_amount;
        active_tier = Some(index);
        let label = format!("Tier {} ({})", index + 1, tier.name);
        if let Some(note) = stage(&label, lp_amount, gp_amount) {
            notes.push(note);
        }
        tiers.push(TierAllocation {
            tier_index: index,
            name: tier.name.clone(),
            lp_amount,
            gp_amount,
        });
    }

    let unallocated = cash.max(Decimal::ZERO);
    if !unallocated.is_zero() {
        notes.push(format!("Unallocated: {}", unallocated.round_dp(2)));
    }

    let tier_lp: Money = tiers.iter().map(|t| t.lp_amount).sum();
    let tier_gp: Money = tiers.iter().map(|t| t.gp_amount).sum();
    let lp_total = lp_direct + lp_roc + lp_pref_paid + tier_lp;
    let gp_total = gp_direct + gp_roc + gp_pref_paid + gp_catch_up + tier_gp;

    let rationale = if notes.is_empty() {
        "No distributable cash".to_string()
    } else {
        notes.join("; ")
    };

    WaterfallPeriodAllocation {
        period: flow.period,
        cash_available: flow.cash_available_for_distribution,
        lp_contribution,
        gp_contribution,
        lp_pref_accrued,
        gp_pref_accrued,
        lp_return_of_capital: lp_roc,
        gp_return_of_capital: gp_roc,
        lp_pref_paid,
        gp_pref_paid,
        gp_catch_up,
        tiers,
        lp_direct,
        gp_direct,
        lp_total,
        gp_total,
        unallocated,
        balances: b,
        active_tier,
        rationale,
    }
}

/// Fold the allocator over the whole cash-flow sequence.
pub fn run_waterfall(
    flows: &[PeriodCashFlow],
    policy: &WaterfallPolicy,
) -> Vec<WaterfallPeriodAllocation> {
    flows
        .iter()
        .scan(WaterfallBalances::default(), |balances, flow| {
            let allocation = allocate_period(balances, flow, policy);
            *balances = allocation.balances;
            Some(allocation)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTotal {
    pub name: String,
    pub lp_amount: Money,
    pub gp_amount: Money,
}

/// Whole-hold waterfall aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallSummary {
    pub lp_contributed: Money,
    pub gp_contributed: Money,
    pub lp_distributed: Money,
    pub gp_distributed: Money,
    pub lp_return_of_capital: Money,
    pub gp_return_of_capital: Money,
    pub lp_pref_paid: Money,
    pub gp_pref_paid: Money,
    pub gp_catch_up: Money,
    pub lp_direct: Money,
    pub gp_direct: Money,
    pub tier_totals: Vec<TierTotal>,
    pub unallocated: Money,
    /// Accrued pref never paid
    pub lp_unpaid_pref: Money,
    pub gp_unpaid_pref: Money,
    pub lp_equity_multiple: Multiple,
    pub gp_equity_multiple: Multiple,
    /// Annualised from monthly flows
    pub lp_irr: Rate,
    pub gp_irr: Rate,
    /// GP share of all profit distributed
    pub gp_profit_share: Rate,
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

pub fn summarize_waterfall(
    allocations: &[WaterfallPeriodAllocation],
    policy: &WaterfallPolicy,
) -> WaterfallSummary {
    let closing = allocations
        .last()
        .map(|a| a.balances)
        .unwrap_or_default();

    let sum = |f: fn(&WaterfallPeriodAllocation) -> Money| -> Money {
        allocations.iter().map(f).sum()
    };

    let tier_totals: Vec<TierTotal> = policy
        .tiers
        .iter()
        .enumerate()
        .map(|(index, tier)| {
            let (lp_amount, gp_amount) = allocations
                .iter()
                .flat_map(|a| a.tiers.iter())
                .filter(|t| t.tier_index == index)
                .fold((Decimal::ZERO, Decimal::ZERO), |(lp, gp), t| {
                    (lp + t.lp_amount, gp + t.gp_amount)
                });
            TierTotal {
                name: tier.name.clone(),
                lp_amount,
                gp_amount,
            }
        })
        .collect();

    let lp_flows: Vec<Money> = allocations
        .iter()
        .map(|a| a.lp_total - a.lp_contribution)
        .collect();
    let gp_flows: Vec<Money> = allocations
        .iter()
        .map(|a| a.gp_total - a.gp_contribution)
        .collect();

    let total_profit = closing.lp_profit + closing.gp_profit;

    WaterfallSummary {
        lp_contributed: closing.lp_contributed,
        gp_contributed: closing.gp_contributed,
        lp_distributed: closing.lp_distributed,
        gp_distributed: closing.gp_distributed,
        lp_return_of_capital: sum(|a| a.lp_return_of_capital),
        gp_return_of_capital: sum(|a| a.gp_return_of_capital),
        lp_pref_paid: sum(|a| a.lp_pref_paid),
        gp_pref_paid: sum(|a| a.gp_pref_paid),
        gp_catch_up: sum(|a| a.gp_catch_up),
        lp_direct: sum(|a| a.lp_direct),
        gp_direct: sum(|a| a.gp_direct),
        tier_totals,
        unallocated: sum(|a| a.unallocated),
        lp_unpaid_pref: closing.lp_pref_balance,
        gp_unpaid_pref: closing.gp_pref_balance,
        lp_equity_multiple: ratio(closing.lp_distributed, closing.lp_contributed),
        gp_equity_multiple: ratio(closing.gp_distributed, closing.gp_contributed),
        lp_irr: irr(&lp_flows, 12),
        gp_irr: irr(&gp_flows, 12),
        gp_profit_share: ratio(closing.gp_profit, total_profit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syndication::inputs::CatchUp;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn flow(period: u32, lp_in: Money, gp_in: Money, cash: Money) -> PeriodCashFlow {
        PeriodCashFlow {
            period,
            lp_contribution: lp_in,
            gp_contribution: gp_in,
            cash_available_for_distribution: cash,
            waterfall_cash: cash,
            ..PeriodCashFlow::default()
        }
    }

    fn simple_policy() -> WaterfallPolicy {
        WaterfallPolicy {
            pref_rate_annual: dec!(0.12),
            gp_participates_in_pref: true,
            return_of_capital: CapitalReturn::LpFirst,
            catch_up: None,
            tiers: vec![PromoteTier::simple("Residual", dec!(0.80))],
        }
    }

    #[test]
    fn test_period_zero_only_records_capital() {
        let alloc = allocate_period(
            &WaterfallBalances::default(),
            &flow(0, dec!(900), dec!(100), Decimal::ZERO),
            &simple_policy(),
        );
        assert_eq!(alloc.lp_pref_accrued, Decimal::ZERO);
        assert_eq!(alloc.balances.lp_unreturned_capital, dec!(900));
        assert_eq!(alloc.balances.gp_unreturned_capital, dec!(100));
        assert_eq!(alloc.total_distributed(), Decimal::ZERO);
        assert_eq!(alloc.rationale, "No distributable cash");
        assert_eq!(alloc.active_tier, None);
    }

    #[test]
    fn test_pref_accrues_monthly_and_pays_before_tiers() {
        let policy = simple_policy();
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            flow(2, Decimal::ZERO, Decimal::ZERO, dec!(5)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        // 1% a month on 900 / 100
        assert_eq!(allocs[1].lp_pref_accrued, dec!(9));
        assert_eq!(allocs[1].gp_pref_accrued, dec!(1));
        // LP first ROC absorbs the 5 before any pref is paid
        assert_eq!(allocs[2].lp_return_of_capital, dec!(5));
        assert_eq!(allocs[2].lp_pref_paid, Decimal::ZERO);
        assert_eq!(allocs[2].balances.lp_pref_balance, dec!(18));
    }

    #[test]
    fn test_roc_capped_and_residual_split() {
        let policy = simple_policy();
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(2000)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        let a = &allocs[1];
        assert_eq!(a.lp_return_of_capital, dec!(900));
        assert_eq!(a.gp_return_of_capital, dec!(100));
        assert_eq!(a.lp_pref_paid, dec!(9));
        assert_eq!(a.gp_pref_paid, dec!(1));
        // 2000 - 1000 - 10 = 990 residual
        assert_eq!(a.tiers[0].lp_amount, dec!(792));
        assert_eq!(a.tiers[0].gp_amount, dec!(198));
        assert_eq!(a.total_distributed(), dec!(2000));
        assert_eq!(a.unallocated, Decimal::ZERO);
        assert_eq!(a.active_tier, Some(0));
    }

    #[test]
    fn test_pro_rata_return_of_capital() {
        let policy = WaterfallPolicy {
            return_of_capital: CapitalReturn::ProRata,
            ..simple_policy()
        };
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(500)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        assert_eq!(allocs[1].lp_return_of_capital, dec!(450));
        assert_eq!(allocs[1].gp_return_of_capital, dec!(50));
    }

    #[test]
    fn test_gp_excluded_from_pref() {
        let policy = WaterfallPolicy {
            gp_participates_in_pref: false,
            ..simple_policy()
        };
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(1100)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        assert_eq!(allocs[1].gp_pref_accrued, Decimal::ZERO);
        assert_eq!(allocs[1].gp_pref_paid, Decimal::ZERO);
        assert_eq!(allocs[1].lp_pref_paid, dec!(9));
    }

    #[test]
    fn test_catch_up_restores_target_share() {
        let policy = WaterfallPolicy {
            gp_participates_in_pref: false,
            catch_up: Some(CatchUp { gp_target_share: dec!(0.20) }),
            ..simple_policy()
        };
        let flows = vec![
            flow(0, dec!(1000), Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(1100)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        let a = &allocs[1];
        assert_eq!(a.lp_pref_paid, dec!(10));
        // x = (0.2 * 10 - 0) / 0.8
        assert_eq!(a.gp_catch_up, dec!(2.5));
        let profit = a.balances.lp_profit + a.balances.gp_profit;
        assert_eq!(a.balances.gp_profit / profit, dec!(0.2));
    }

    #[test]
    fn test_catch_up_capped_by_cash() {
        let policy = WaterfallPolicy {
            gp_participates_in_pref: false,
            catch_up: Some(CatchUp { gp_target_share: dec!(0.50) }),
            ..simple_policy()
        };
        let flows = vec![
            flow(0, dec!(1000), Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(1011)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        assert_eq!(allocs[1].gp_catch_up, dec!(1));
    }

    #[test]
    fn test_equity_multiple_tier_caps_at_hurdle() {
        let policy = WaterfallPolicy {
            pref_rate_annual: Decimal::ZERO,
            gp_participates_in_pref: false,
            return_of_capital: CapitalReturn::LpFirst,
            catch_up: None,
            tiers: vec![
                PromoteTier::equity_multiple("To 1.5x", dec!(1.5), dec!(0.80)),
                PromoteTier::simple("Above", dec!(0.50)),
            ],
        };
        let flows = vec![
            flow(0, dec!(1000), Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(2000)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        let a = &allocs[1];
        // ROC 1000, then 500 LP needed at 80% -> 625 through tier 1
        assert_eq!(a.tiers[0].lp_amount, dec!(500));
        assert_eq!(a.tiers[0].gp_amount, dec!(125));
        assert_eq!(a.tiers[1].lp_amount, dec!(187.5));
        assert_eq!(a.tiers[1].gp_amount, dec!(187.5));
        assert_eq!(a.active_tier, Some(1));
        assert_eq!(a.total_distributed(), dec!(2000));
    }

    #[test]
    fn test_irr_hurdle_uses_multiple_approximation() {
        let policy = WaterfallPolicy {
            pref_rate_annual: Decimal::ZERO,
            gp_participates_in_pref: false,
            return_of_capital: CapitalReturn::LpFirst,
            catch_up: None,
            tiers: vec![
                PromoteTier::irr("To 10% IRR", dec!(0.10), Decimal::ONE),
                PromoteTier::simple("Above", dec!(0.50)),
            ],
        };
        // Twelve months: the 10% hurdle needs a 1.10x multiple
        let mut flows = vec![flow(0, dec!(1000), Decimal::ZERO, Decimal::ZERO)];
        flows.extend((1..12).map(|p| flow(p, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)));
        flows.push(flow(12, Decimal::ZERO, Decimal::ZERO, dec!(1200)));
        let allocs = run_waterfall(&flows, &policy);
        let a = &allocs[12];
        assert!((a.tiers[0].lp_amount - dec!(100)).abs() < dec!(0.01));
        assert!((a.tiers[1].lp_amount - dec!(50)).abs() < dec!(0.01));
    }

    #[test]
    fn test_direct_distribution_bypasses_stages() {
        let policy = simple_policy();
        let mut refi = flow(1, Decimal::ZERO, Decimal::ZERO, dec!(500));
        refi.waterfall_cash = Decimal::ZERO;
        refi.direct_distribution = dec!(500);
        let flows = vec![flow(0, dec!(900), dec!(100), Decimal::ZERO), refi];
        let allocs = run_waterfall(&flows, &policy);
        let a = &allocs[1];
        assert_eq!(a.lp_direct, dec!(450));
        assert_eq!(a.gp_direct, dec!(50));
        assert_eq!(a.lp_return_of_capital, Decimal::ZERO);
        assert_eq!(a.balances.lp_unreturned_capital, dec!(900));
        assert_eq!(a.balances.lp_distributed, dec!(450));
    }

    #[test]
    fn test_no_tiers_leaves_cash_unallocated() {
        let policy = WaterfallPolicy {
            tiers: Vec::new(),
            ..simple_policy()
        };
        let flows = vec![
            flow(0, dec!(100), Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(200)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        assert_eq!(allocs[1].unallocated, dec!(99));
        assert!(allocs[1].rationale.contains("Unallocated"));
    }

    #[test]
    fn test_zero_capital_and_zero_cash() {
        let flows = vec![
            flow(0, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(100)),
        ];
        let allocs = run_waterfall(&flows, &WaterfallPolicy::default());
        // Last tier takes everything when there is no capital to return
        assert_eq!(allocs[1].total_distributed(), dec!(100));
        let summary = summarize_waterfall(&allocs, &WaterfallPolicy::default());
        assert_eq!(summary.lp_equity_multiple, Decimal::ZERO);
    }

    #[test]
    fn test_summary_aggregates() {
        let policy = simple_policy();
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(100)),
            flow(2, Decimal::ZERO, Decimal::ZERO, dec!(1500)),
        ];
        let allocs = run_waterfall(&flows, &policy);
        let summary = summarize_waterfall(&allocs, &policy);
        assert_eq!(summary.lp_contributed, dec!(900));
        assert_eq!(
            summary.lp_distributed + summary.gp_distributed,
            dec!(1600)
        );
        assert_eq!(summary.tier_totals.len(), 1);
        assert!(summary.lp_equity_multiple > Decimal::ONE);
        assert!(summary.lp_irr > Decimal::ZERO);
        assert_eq!(summary.unallocated, Decimal::ZERO);
    }

    #[test]
    fn test_called_capital_accrues_pref_in_call_month() {
        let policy = simple_policy();
        let flows = vec![
            flow(0, dec!(900), dec!(100), Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            flow(2, dec!(450), dec!(50), Decimal::ZERO),
        ];
        let allocs = run_waterfall(&flows, &policy);
        // 1% a month on 900 + 450 and 100 + 50
        assert_eq!(allocs[2].lp_pref_accrued, dec!(13.5));
        assert_eq!(allocs[2].gp_pref_accrued, dec!(1.5));
        assert_eq!(allocs[2].balances.lp_unreturned_capital, dec!(1350));
        assert_eq!(allocs[2].balances.lp_pref_balance, dec!(22.5));
    }

    #[test]
    fn test_stacked_multiple_tiers_roll_and_cap() {
        let policy = WaterfallPolicy {
            pref_rate_annual: Decimal::ZERO,
            gp_participates_in_pref: false,
            return_of_capital: CapitalReturn::LpFirst,
            catch_up: None,
            tiers: vec![
                PromoteTier::equity_multiple("To 1.5x", dec!(1.5), dec!(0.80)),
                PromoteTier::equity_multiple("To 2.0x", dec!(2.0), dec!(0.75)),
                PromoteTier::simple("Above 2.0x", dec!(0.50)),
            ],
        };
        let flows = vec![
            flow(0, dec!(1000), Decimal::ZERO, Decimal::ZERO),
            flow(1, Decimal::ZERO, Decimal::ZERO, dec!(1200)),
            flow(2, Decimal::ZERO, Decimal::ZERO, dec!(1000)),
            flow(3, Decimal::ZERO, Decimal::ZERO, dec!(400)),
        ];
        let allocs = run_waterfall(&flows, &policy);

        // Period 1: LP reaches only 1.16x, so the 2.0x tier stays closed
        let p1 = &allocs[1];
        assert_eq!(p1.lp_return_of_capital, dec!(1000));
        assert_eq!(p1.tiers.len(), 1);
        assert_eq!(p1.tiers[0].lp_amount, dec!(160));
        assert_eq!(p1.active_tier, Some(0));
        assert!(p1.balances.lp_multiple() < dec!(1.5));

        // Period 2: 425 tops tier 1 up to 1.5x, the rest rolls into tier 2
        let p2 = &allocs[2];
        assert_eq!(p2.tiers.len(), 2);
        assert_eq!(p2.tiers[0].lp_amount, dec!(340));
        assert_eq!(p2.tiers[0].gp_amount, dec!(85));
        assert_eq!(p2.tiers[1].lp_amount, dec!(431.25));
        assert_eq!(p2.tiers[1].gp_amount, dec!(143.75));
        assert_eq!(p2.active_tier, Some(1));
        assert_eq!(p2.total_distributed(), dec!(1000));

        // Period 3: tier 2 stops at exactly 2.0x, the residual goes to tier 3
        let p3 = &allocs[3];
        let tier_2 = p3.tiers.iter().find(|t| t.tier_index == 1).unwrap();
        assert!((tier_2.lp_amount - dec!(68.75)).abs() < dec!(0.000001));
        let through_tier_2 = dec!(1931.25) + tier_2.lp_amount;
        assert!((through_tier_2 / dec!(1000) - dec!(2.0)).abs() < dec!(0.000001));
        assert_eq!(p3.active_tier, Some(2));
        assert!(p3.tiers.iter().all(|t| t.tier_index != 0));
        assert!((p3.total_distributed() - dec!(400)).abs() < dec!(0.000001));
        assert!(p3.unallocated.is_zero());
    }
}
