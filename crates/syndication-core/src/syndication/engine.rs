use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::annual::{summarize_years, AnnualSummary};
use super::cash_flow::{build_cash_flows, refinance_in_hold, PeriodCashFlow};
use super::inputs::DealInputs;
use super::metrics::{calculate_metrics, DealMetrics};
use super::sources_uses::{resolve_sources_uses, SourcesAndUses};
use super::waterfall::{
    run_waterfall, summarize_waterfall, WaterfallPeriodAllocation, WaterfallSummary,
};
use crate::error::SyndicationError;
use crate::types::*;
use crate::SyndicationResult;

const MAX_HOLD_MONTHS: u32 = 1200;
const DSCR_FLOOR: Decimal = dec!(1.0);
const DSCR_TARGET: Decimal = dec!(1.20);

/// Complete result of a deal run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAnalysis {
    pub sources_uses: SourcesAndUses,
    pub cash_flows: Vec<PeriodCashFlow>,
    pub waterfall: Vec<WaterfallPeriodAllocation>,
    pub waterfall_summary: WaterfallSummary,
    pub metrics: DealMetrics,
    pub annual: Vec<AnnualSummary>,
    /// Non-fatal observations; errors here flag the deal, they never abort it
    pub findings: Vec<Finding>,
}

impl DealAnalysis {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }
}

fn collect_findings(
    inputs: &DealInputs,
    su: &SourcesAndUses,
    flows: &[PeriodCashFlow],
    summary: &WaterfallSummary,
    metrics: &DealMetrics,
    su_warnings: &[String],
) -> Vec<Finding> {
    let mut findings: Vec<Finding> = su_warnings
        .iter()
        .map(|w| Finding::warning("sources_uses", w.clone()))
        .collect();

    if !su.balanced {
        findings.push(Finding::error(
            "sources_uses_imbalance",
            format!(
                "Sources {} and uses {} differ by more than $1",
                su.total_sources.round_dp(2),
                su.total_uses.round_dp(2)
            ),
        ));
    }

    let serviced = flows.iter().any(|p| p.debt_service > Decimal::ZERO);
    if serviced {
        if metrics.min_dscr < DSCR_FLOOR {
            findings.push(Finding::error(
                "dscr_below_1_00",
                format!(
                    "Minimum DSCR of {}x does not cover debt service",
                    metrics.min_dscr.round_dp(2)
                ),
            ));
        } else if metrics.min_dscr < DSCR_TARGET {
            findings.push(Finding::warning(
                "dscr_below_1_20",
                format!(
                    "Minimum DSCR of {}x is below the 1.20x lending threshold",
                    metrics.min_dscr.round_dp(2)
                ),
            ));
        }
    }

    let uncovered: Money = flows.iter().map(|p| p.uncovered_shortfall).sum();
    if uncovered > Decimal::ZERO {
        let first = flows
            .iter()
            .find(|p| p.uncovered_shortfall > Decimal::ZERO)
            .map(|p| p.period)
            .unwrap_or_default();
        findings.push(Finding::warning(
            "reserve_shortfall",
            format!(
                "Reserves exhausted from month {first}; {} of negative cash flow is uncovered",
                uncovered.round_dp(2)
            ),
        ));
    }

    if let Some(refi) = &inputs.refinance {
        if !refinance_in_hold(refi, inputs.hold_months) {
            findings.push(Finding::warning(
                "refinance_outside_hold",
                format!("Refinance in month {} was not executed", refi.month),
            ));
        }
    }
    for event in flows.iter().filter_map(|p| p.refinance) {
        if event.unfunded > Decimal::ZERO {
            findings.push(Finding::warning(
                "refinance_unfunded",
                format!(
                    "Refinance needed {} of cash the reserve could not cover",
                    event.unfunded.round_dp(2)
                ),
            ));
        }
    }

    if let Some(sale) = flows.iter().find_map(|p| p.sale) {
        if sale.shortfall > Decimal::ZERO {
            findings.push(Finding::warning(
                "sale_shortfall",
                format!(
                    "Sale proceeds fall {} short of costs and loan payoff",
                    sale.shortfall.round_dp(2)
                ),
            ));
        }
    }

    if summary.unallocated > Decimal::ZERO {
        findings.push(Finding::warning(
            "unallocated_cash",
            format!(
                "{} of distributable cash was not allocated by any tier",
                summary.unallocated.round_dp(2)
            ),
        ));
    }
    if summary.lp_unpaid_pref > dec!(0.01) {
        findings.push(Finding::warning(
            "pref_unpaid",
            format!(
                "LP preferred return of {} remains unpaid at exit",
                summary.lp_unpaid_pref.round_dp(2)
            ),
        ));
    }

    findings
}

/// Run a deal end to end: sources & uses, cash flows, waterfall, metrics.
///
/// Only a structurally impossible hold is rejected; everything else degrades
/// into findings on a complete result.
#[tracing::instrument(skip_all, fields(deal = %inputs.name, hold_months = inputs.hold_months))]
pub fn analyze_deal(inputs: &DealInputs) -> SyndicationResult<ComputationOutput<DealAnalysis>> {
    let start = Instant::now();

    if inputs.hold_months == 0 || inputs.hold_months > MAX_HOLD_MONTHS {
        return Err(SyndicationError::InvalidInput {
            field: "hold_months".into(),
            reason: format!("Hold must be between 1 and {MAX_HOLD_MONTHS} months"),
        });
    }

    let mut su_warnings: Vec<String> = Vec::new();
    let sources_uses = resolve_sources_uses(inputs, &mut su_warnings);
    tracing::debug!(
        loan = %sources_uses.loan_amount.round_dp(2),
        equity = %sources_uses.total_equity.round_dp(2),
        "sources and uses resolved"
    );

    let cash_flows = build_cash_flows(inputs, &sources_uses);
    tracing::debug!(periods = cash_flows.len(), "cash flows built");

    let waterfall = run_waterfall(&cash_flows, &inputs.waterfall);
    let waterfall_summary = summarize_waterfall(&waterfall, &inputs.waterfall);
    let metrics = calculate_metrics(&sources_uses, &cash_flows, &waterfall_summary);
    let annual = summarize_years(&cash_flows, &waterfall);
    tracing::debug!(
        levered_irr = %metrics.levered_irr,
        equity_multiple = %metrics.equity_multiple.round_dp(4),
        "metrics calculated"
    );

    let findings = collect_findings(
        inputs,
        &sources_uses,
        &cash_flows,
        &waterfall_summary,
        &metrics,
        &su_warnings,
    );
    for finding in findings.iter().filter(|f| f.is_error()) {
        tracing::warn!(code = %finding.code, "{}", finding.message);
    }

    let warnings: Vec<String> = findings
        .iter()
        .map(|f| format!("[{}] {}", f.code, f.message))
        .collect();

    let analysis = DealAnalysis {
        sources_uses,
        cash_flows,
        waterfall,
        waterfall_summary,
        metrics,
        annual,
        findings,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Syndication Deal Analysis (monthly pro forma, tiered LP/GP waterfall)",
        inputs,
        warnings,
        elapsed,
        analysis,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syndication::inputs::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejects_bad_hold() {
        for hold in [0, 1201] {
            let inputs = DealInputs::new("Bad", dec!(1000000), hold);
            match analyze_deal(&inputs).unwrap_err() {
                SyndicationError::InvalidInput { field, .. } => assert_eq!(field, "hold_months"),
                other => panic!("Expected InvalidInput, got: {other:?}"),
            }
        }
    }

    #[test]
    fn test_default_deal_runs_clean() {
        let out = analyze_deal(&DealInputs::default()).unwrap();
        let analysis = &out.result;
        assert_eq!(analysis.cash_flows.len(), 61);
        assert_eq!(analysis.waterfall.len(), 61);
        assert_eq!(analysis.annual.len(), 5);
        assert!(!analysis.has_errors(), "{:?}", analysis.findings);
        assert!(out.methodology.contains("Waterfall") || out.methodology.contains("waterfall"));
    }

    #[test]
    fn test_thin_coverage_flags_dscr() {
        let pro_forma = ProFormaInputs {
            gross_potential_rent: dec!(75000),
            ..ProFormaInputs::default()
        };
        let inputs = DealInputs::default()
            .with_pro_forma(pro_forma)
            .with_debt(DebtInputs::amortizing(dec!(0.80), dec!(0.08), 300));
        let out = analyze_deal(&inputs).unwrap();
        let codes: Vec<&str> = out.result.findings.iter().map(|f| f.code.as_str()).collect();
        assert!(codes.contains(&"dscr_below_1_00") || codes.contains(&"dscr_below_1_20"));
    }

    #[test]
    fn test_no_tiers_reports_unallocated_cash() {
        let mut inputs = DealInputs::default();
        inputs.waterfall.tiers.clear();
        let out = analyze_deal(&inputs).unwrap();
        assert!(out
            .result
            .findings
            .iter()
            .any(|f| f.code == "unallocated_cash"));
        assert!(out.warnings.iter().any(|w| w.starts_with("[unallocated_cash]")));
    }
}
