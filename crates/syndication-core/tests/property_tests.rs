use proptest::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use syndication_core::scenarios::quick::quick_metrics;
use syndication_core::syndication::analyze_deal;
use syndication_core::syndication::inputs::*;

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(6)
}

fn financing_strategy() -> impl Strategy<Value = FinancingMode> {
    prop_oneof![
        Just(FinancingMode::None),
        Just(FinancingMode::Amortizing),
        Just(FinancingMode::InterestOnly),
        (1u32..48).prop_map(|io_months| FinancingMode::InterestOnlyThenAmortizing { io_months }),
    ]
}

/// Capital-structure and policy features layered onto a generated deal.
#[derive(Debug, Clone)]
struct DealExtras {
    capital_call: Option<(u32, f64)>,
    capex_draw: Option<(u32, f64)>,
    explicit_lp_share: Option<f64>,
    asset_management_fee: AssetManagementFee,
    three_tier: bool,
}

fn asset_fee_strategy() -> impl Strategy<Value = AssetManagementFee> {
    prop_oneof![
        Just(AssetManagementFee::None),
        (0.0f64..0.03).prop_map(|pct| AssetManagementFee::PercentOfEgi(decimal(pct))),
        (0.0f64..0.02).prop_map(|pct| AssetManagementFee::PercentOfEquity(decimal(pct))),
    ]
}

prop_compose! {
    fn extras_strategy()(
        capital_call in prop::option::of((1u32..120, 0.0f64..0.10)),
        capex_draw in prop::option::of((1u32..120, 0.0f64..0.05)),
        explicit_lp_share in prop::option::of(0.5f64..0.95),
        asset_management_fee in asset_fee_strategy(),
        three_tier in any::<bool>(),
    ) -> DealExtras {
        DealExtras {
            capital_call,
            capex_draw,
            explicit_lp_share,
            asset_management_fee,
            three_tier,
        }
    }
}

fn three_tier_policy(base: &WaterfallPolicy) -> WaterfallPolicy {
    WaterfallPolicy {
        tiers: vec![
            PromoteTier::irr("To 10% IRR", dec!(0.10), dec!(0.90)),
            PromoteTier::equity_multiple("To 2.0x", dec!(2.0), dec!(0.75)),
            PromoteTier::simple("Above 2.0x", dec!(0.60)),
        ],
        ..base.clone()
    }
}

prop_compose! {
    fn deal_strategy()(
        price in 500_000.0f64..50_000_000.0,
        hold in 1u32..120,
        ltv in 0.0f64..0.85,
        rate in 0.0f64..0.12,
        financing in financing_strategy(),
        rent_yield in 0.004f64..0.012,
        expense_ratio in 0.2f64..0.7,
        exit_cap in 0.04f64..0.10,
        (gp_pct, pref) in (0.0f64..0.3, 0.0f64..0.12),
        catch_up in prop::option::of(0.05f64..0.4),
        refi_month in prop::option::of(1u32..120),
        (pro_rata, refi_through, extras) in (any::<bool>(), any::<bool>(), extras_strategy()),
    ) -> DealInputs {
        let price = decimal(price);
        let monthly_rent = price * decimal(rent_yield);
        let mut inputs = DealInputs::new("Generated", price, hold)
            .with_debt(DebtInputs {
                financing,
                sizing: LoanSizing::Ltv(decimal(ltv)),
                annual_rate: decimal(rate),
                ..DebtInputs::default()
            })
            .with_pro_forma(ProFormaInputs {
                gross_potential_rent: monthly_rent,
                other_income: Decimal::ZERO,
                operating_expenses: monthly_rent * decimal(expense_ratio),
                asset_management_fee: extras.asset_management_fee,
                capex_schedule: extras
                    .capex_draw
                    .map(|(month, share)| CapexDraw { month, amount: price * decimal(share) })
                    .into_iter()
                    .collect(),
                ..ProFormaInputs::default()
            })
            .with_exit(ExitInputs {
                valuation: ExitValuation::CapRate(decimal(exit_cap)),
                ..ExitInputs::default()
            })
            .with_equity(EquityInputs {
                split: match extras.explicit_lp_share {
                    // Dollar targets sized off price; resolution rescales them
                    Some(lp_share) => EquitySplit::Explicit {
                        lp_amount: price * dec!(0.4) * decimal(lp_share),
                        gp_amount: price * dec!(0.4) * (Decimal::ONE - decimal(lp_share)),
                    },
                    None => EquitySplit::Proportional { gp_pct: decimal(gp_pct) },
                },
                capital_calls: extras
                    .capital_call
                    .map(|(month, share)| CapitalCall { month, amount: price * decimal(share) })
                    .into_iter()
                    .collect(),
            });
        if extras.three_tier {
            inputs.waterfall = three_tier_policy(&inputs.waterfall);
        }
        inputs.waterfall.pref_rate_annual = decimal(pref);
        if pro_rata {
            inputs.waterfall.return_of_capital = CapitalReturn::ProRata;
        }
        inputs.waterfall.catch_up =
            catch_up.map(|share| CatchUp { gp_target_share: decimal(share) });
        if let Some(month) = refi_month {
            inputs.refinance = Some(RefinanceInputs {
                month,
                through_waterfall: refi_through,
                ..RefinanceInputs::default()
            });
        }
        inputs
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sources_and_uses_always_balance(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        let su = &analysis.sources_uses;
        prop_assert!((su.total_sources - su.total_uses).abs() <= dec!(1));
        prop_assert!(!analysis.findings.iter().any(|f| f.code == "sources_uses_imbalance"));
    }

    #[test]
    fn record_count_matches_hold(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        prop_assert_eq!(analysis.cash_flows.len(), inputs.hold_months as usize + 1);
        prop_assert_eq!(analysis.waterfall.len(), analysis.cash_flows.len());
    }

    #[test]
    fn distributed_cash_is_conserved(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        let total_cad: Decimal = analysis
            .cash_flows
            .iter()
            .map(|p| p.cash_available_for_distribution)
            .sum();
        let total_paid: Decimal = analysis.waterfall.iter().map(|a| a.total_distributed()).sum();
        prop_assert!((total_cad - total_paid).abs() < dec!(0.01));
        for alloc in &analysis.waterfall {
            prop_assert!(alloc.total_distributed() <= alloc.cash_available + dec!(0.01));
            prop_assert!(alloc.unallocated.is_zero());
        }
    }

    #[test]
    fn return_of_capital_never_exceeds_outstanding(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        let mut lp_open = Decimal::ZERO;
        let mut gp_open = Decimal::ZERO;
        for alloc in &analysis.waterfall {
            let lp_cap = lp_open + alloc.lp_contribution + dec!(0.01);
            let gp_cap = gp_open + alloc.gp_contribution + dec!(0.01);
            prop_assert!(alloc.lp_return_of_capital <= lp_cap);
            prop_assert!(alloc.gp_return_of_capital <= gp_cap);
            prop_assert!(alloc.balances.lp_unreturned_capital >= Decimal::ZERO);
            lp_open = alloc.balances.lp_unreturned_capital;
            gp_open = alloc.balances.gp_unreturned_capital;
        }
    }

    #[test]
    fn balances_and_cash_never_negative(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        for p in &analysis.cash_flows {
            prop_assert!(p.ending_loan_balance >= Decimal::ZERO);
            prop_assert!(p.reserve_balance >= Decimal::ZERO);
            prop_assert!(p.cash_available_for_distribution >= Decimal::ZERO);
        }
    }

    #[test]
    fn pref_accrues_on_capital_including_current_calls(inputs in deal_strategy()) {
        let analysis = analyze_deal(&inputs).unwrap().result;
        let monthly = inputs.waterfall.pref_rate_annual / dec!(12);
        for pair in analysis.waterfall.windows(2) {
            let (prev, alloc) = (&pair[0], &pair[1]);
            let expected = (prev.balances.lp_unreturned_capital + alloc.lp_contribution) * monthly;
            prop_assert!((alloc.lp_pref_accrued - expected).abs() < dec!(0.01));
        }
    }

    #[test]
    fn capital_calls_do_not_move_unlevered_irr(inputs in deal_strategy()) {
        let mut uncalled = inputs.clone();
        uncalled.equity.capital_calls.clear();
        let with_calls = analyze_deal(&inputs).unwrap().result.metrics;
        let without = analyze_deal(&uncalled).unwrap().result.metrics;
        prop_assert_eq!(with_calls.unlevered_irr, without.unlevered_irr);
    }

    #[test]
    fn quick_path_agrees_with_full_pipeline(inputs in deal_strategy()) {
        let quick = quick_metrics(&inputs).unwrap();
        let full = analyze_deal(&inputs).unwrap().result.metrics;
        prop_assert!((quick.levered_irr - full.levered_irr).abs() < dec!(0.000001));
        prop_assert!((quick.equity_multiple - full.equity_multiple).abs() < dec!(0.000001));
    }
}
