//! Discounting and IRR.
//!
//! Amounts stay `Decimal` at every public boundary. The root finder itself
//! iterates in `f64`: a deal produces up to 1,200 monthly flows, each needing a
//! fractional power per NPV evaluation, and `Decimal::powd` over that many
//! terms is both slow and prone to overflow at extreme trial rates. Results are
//! converted back through `sanitize`, which maps non-finite values to zero.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Multiple, Rate};

/// Newton-Raphson starting points, tried in order.
const SEED_RATES: [f64; 6] = [0.01, 0.05, 0.1, 0.2, 0.5, -0.05];
const RATE_FLOOR: f64 = -0.99;
const RATE_CEILING: f64 = 10.0;
const BISECTION_CEILING: f64 = 5.0;
const MAX_NEWTON_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;
/// Convergence threshold relative to the gross size of the cash flows
const RELATIVE_NPV_TOLERANCE: f64 = 1e-10;
const RATE_TOLERANCE: f64 = 1e-12;

/// Which strategy produced an IRR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SolveMethod {
    /// Flows lack a sign change; IRR is undefined and reported as zero
    Degenerate,
    /// Newton-Raphson converged from the given seed
    NewtonRaphson { seed: Rate },
    /// Bisection over [-0.99, 5]
    Bisection,
    /// No root bracketed; estimate from the undiscounted totals
    Heuristic,
}

/// IRR together with how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrSolution {
    pub rate: Rate,
    pub method: SolveMethod,
    pub iterations: u32,
}

/// Net present value where flow `t` is discounted by `(1+r)^(t/periods_per_year)`.
///
/// A zero rate sums the flows exactly. Non-finite intermediate results
/// (rates at or below -100%) collapse to zero.
pub fn npv(rate: Rate, cash_flows: &[Money], periods_per_year: u32) -> Money {
    if rate.is_zero() {
        return cash_flows.iter().sum();
    }
    let flows = to_f64_flows(cash_flows);
    sanitize(npv_f64(to_f64(rate), &flows, ppy(periods_per_year)))
}

/// Internal rate of return, annualised by `periods_per_year`.
///
/// Convenience wrapper over [`solve_irr`] returning only the rate.
pub fn irr(cash_flows: &[Money], periods_per_year: u32) -> Rate {
    solve_irr(cash_flows, periods_per_year).rate
}

/// Solve `sum CF_t / (1+r)^(t/periods_per_year) = 0` for `r`.
///
/// Newton-Raphson is tried from several seeds with every iterate clamped to
/// [-0.99, 10]; the first seed that converges inside (-1, 10) wins. Failing
/// that, bisection over [-0.99, 5]. If the NPV does not change sign across
/// that bracket a heuristic estimate is returned instead of an error, since
/// deal flows with large terminal proceeds or mid-hold refinances are not
/// guaranteed a well-behaved root near the usual guesses.
pub fn solve_irr(cash_flows: &[Money], periods_per_year: u32) -> IrrSolution {
    let has_positive = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_negative = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    if !(has_positive && has_negative) {
        return IrrSolution {
            rate: Decimal::ZERO,
            method: SolveMethod::Degenerate,
            iterations: 0,
        };
    }

    let flows = to_f64_flows(cash_flows);
    let ppy = ppy(periods_per_year);
    let scale: f64 = flows.iter().map(|cf| cf.abs()).sum();
    let tolerance = RELATIVE_NPV_TOLERANCE * scale.max(1.0);

    let mut total_iterations = 0;
    for seed in SEED_RATES {
        let (outcome, iterations) = newton_raphson(&flows, ppy, seed, tolerance);
        total_iterations += iterations;
        if let Some(rate) = outcome {
            return IrrSolution {
                rate: sanitize(rate),
                method: SolveMethod::NewtonRaphson {
                    seed: sanitize(seed),
                },
                iterations: total_iterations,
            };
        }
    }

    tracing::debug!(
        flows = flows.len(),
        "IRR Newton-Raphson failed from every seed; falling back to bisection"
    );

    match bisection(&flows, ppy, tolerance) {
        Some((rate, iterations)) => IrrSolution {
            rate: sanitize(rate),
            method: SolveMethod::Bisection,
            iterations: total_iterations + iterations,
        },
        None => {
            tracing::debug!("IRR root not bracketed; using heuristic estimate");
            IrrSolution {
                rate: sanitize(heuristic_estimate(&flows, ppy)),
                method: SolveMethod::Heuristic,
                iterations: total_iterations,
            }
        }
    }
}

/// Monthly-equivalent compounding rate: `(1 + annual)^(1/12) - 1`.
pub fn monthly_rate_from_annual(annual: Rate) -> Rate {
    if annual.is_zero() {
        return Decimal::ZERO;
    }
    let base = Decimal::ONE + annual;
    if base <= Decimal::ZERO {
        return annual / dec!(12);
    }
    base.checked_powd(Decimal::ONE / dec!(12))
        .map(|f| f - Decimal::ONE)
        .unwrap_or(annual / dec!(12))
}

/// Annualised rate implied by earning `multiple` over `years`:
/// `multiple^(1/years) - 1`. Zero when no time has elapsed.
pub fn multiple_to_irr(multiple: Multiple, years: Decimal) -> Rate {
    let y = to_f64(years);
    if y <= 0.0 {
        return Decimal::ZERO;
    }
    let m = to_f64(multiple).max(0.0);
    sanitize(m.powf(1.0 / y) - 1.0)
}

/// Multiple reached by compounding `rate` over `years`: `(1+rate)^years`.
pub fn irr_to_multiple(rate: Rate, years: Decimal) -> Multiple {
    let y = to_f64(years);
    if y <= 0.0 {
        return Decimal::ONE;
    }
    sanitize((1.0 + to_f64(rate)).max(0.0).powf(y))
}

// ---------------------------------------------------------------------------
// f64 kernels
// ---------------------------------------------------------------------------

fn newton_raphson(flows: &[f64], ppy: f64, seed: f64, tolerance: f64) -> (Option<f64>, u32) {
    let mut rate = seed;

    for i in 0..MAX_NEWTON_ITERATIONS {
        let value = npv_f64(rate, flows, ppy);
        if value.is_nan() || value.is_infinite() {
            return (None, i);
        }
        if value.abs() <= tolerance {
            let accepted = rate > -1.0 && rate < RATE_CEILING;
            return (accepted.then_some(rate), i);
        }

        let slope = npv_derivative(rate, flows, ppy);
        if slope == 0.0 || !slope.is_finite() {
            return (None, i);
        }

        let next = (rate - value / slope).clamp(RATE_FLOOR, RATE_CEILING);
        if (next - rate).abs() < RATE_TOLERANCE {
            // Stalled on a clamp boundary without reaching the root
            return (None, i);
        }
        rate = next;
    }

    (None, MAX_NEWTON_ITERATIONS)
}

fn bisection(flows: &[f64], ppy: f64, tolerance: f64) -> Option<(f64, u32)> {
    let mut lo = RATE_FLOOR;
    let mut hi = BISECTION_CEILING;
    let f_lo = npv_f64(lo, flows, ppy);
    let f_hi = npv_f64(hi, flows, ppy);

    if f_lo.is_nan() || f_hi.is_nan() || f_lo.signum() == f_hi.signum() {
        return None;
    }

    let lo_sign = f_lo.signum();
    for i in 0..MAX_BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = npv_f64(mid, flows, ppy);
        if f_mid.is_nan() {
            return None;
        }
        if f_mid.abs() <= tolerance || (hi - lo) < RATE_TOLERANCE {
            return Some((mid, i + 1));
        }
        if f_mid.signum() == lo_sign {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Some((0.5 * (lo + hi), MAX_BISECTION_ITERATIONS))
}

/// Multiple-based estimate pushed to the side of zero indicated by the
/// undiscounted total.
fn heuristic_estimate(flows: &[f64], ppy: f64) -> f64 {
    let inflows: f64 = flows.iter().filter(|cf| **cf > 0.0).sum();
    let outflows: f64 = flows.iter().filter(|cf| **cf < 0.0).map(|cf| -cf).sum();
    if outflows == 0.0 {
        return 0.0;
    }
    let years = ((flows.len().saturating_sub(1)) as f64 / ppy).max(1.0 / ppy);
    let simple = (inflows / outflows).powf(1.0 / years) - 1.0;
    if inflows >= outflows {
        simple.clamp(0.0, BISECTION_CEILING)
    } else {
        simple.clamp(RATE_FLOOR, 0.0)
    }
}

fn npv_f64(rate: f64, flows: &[f64], ppy: f64) -> f64 {
    let base = 1.0 + rate;
    flows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / base.powf(t as f64 / ppy))
        .sum()
}

/// d(NPV)/dr = sum -(t/ppy) * CF_t / (1+r)^(t/ppy + 1)
fn npv_derivative(rate: f64, flows: &[f64], ppy: f64) -> f64 {
    let base = 1.0 + rate;
    flows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(t, cf)| {
            let exponent = t as f64 / ppy;
            -exponent * cf / base.powf(exponent + 1.0)
        })
        .sum()
}

fn ppy(periods_per_year: u32) -> f64 {
    f64::from(periods_per_year.max(1))
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn to_f64_flows(cash_flows: &[Money]) -> Vec<f64> {
    cash_flows.iter().map(|cf| to_f64(*cf)).collect()
}

/// NaN / infinity become zero at the Decimal boundary.
fn sanitize(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(10))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_at_ten_percent() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = npv(dec!(0.10), &cfs, 1);
        // -1000 + 400/1.1 + 400/1.21 + 400/1.331 = -5.26
        assert!((result - dec!(-5.26)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate_is_exact_sum() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        assert_eq!(npv(Decimal::ZERO, &cfs, 12), dec!(50));
    }

    #[test]
    fn test_irr_basic_annual() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let solution = solve_irr(&cfs, 1);
        assert!((solution.rate - dec!(0.0970)).abs() < dec!(0.001));
        assert!(matches!(solution.method, SolveMethod::NewtonRaphson { .. }));
        // NPV at the solved rate is ~0
        assert!(npv(solution.rate, &cfs, 1).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_monthly_flows_are_annualised() {
        // -100 at close, +110 twelve months later => 10% annual
        let mut cfs = vec![Decimal::ZERO; 13];
        cfs[0] = dec!(-100);
        cfs[12] = dec!(110);
        let rate = irr(&cfs, 12);
        assert!((rate - dec!(0.10)).abs() < dec!(0.0001), "got {rate}");
    }

    #[test]
    fn test_irr_degenerate_without_sign_change() {
        let all_negative = vec![dec!(-100), dec!(-50)];
        let solution = solve_irr(&all_negative, 1);
        assert_eq!(solution.rate, Decimal::ZERO);
        assert_eq!(solution.method, SolveMethod::Degenerate);

        let single = vec![dec!(-100)];
        assert_eq!(irr(&single, 1), Decimal::ZERO);
    }

    #[test]
    fn test_irr_heuristic_when_root_outside_bracket() {
        // True IRR is 999,999x; nothing converges inside (-1, 10)
        let cfs = vec![dec!(-1), dec!(1000000)];
        let solution = solve_irr(&cfs, 1);
        assert_eq!(solution.method, SolveMethod::Heuristic);
        assert_eq!(solution.rate, dec!(5));
    }

    #[test]
    fn test_irr_negative_return() {
        let cfs = vec![dec!(-1000), dec!(100), dec!(100), dec!(500)];
        let rate = irr(&cfs, 1);
        assert!(rate < Decimal::ZERO);
        assert!(rate > dec!(-0.99));
    }

    #[test]
    fn test_monthly_rate_from_annual() {
        let m = monthly_rate_from_annual(dec!(0.12));
        // (1.12)^(1/12) - 1 = 0.0094888
        assert!((m - dec!(0.0094888)).abs() < dec!(0.000001));
        assert_eq!(monthly_rate_from_annual(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_multiple_irr_conversions() {
        assert!((multiple_to_irr(dec!(2), dec!(1)) - dec!(1)).abs() < dec!(0.000001));
        assert!((irr_to_multiple(dec!(0.10), dec!(2)) - dec!(1.21)).abs() < dec!(0.000001));
        assert_eq!(multiple_to_irr(dec!(2), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(irr_to_multiple(dec!(0.10), Decimal::ZERO), Decimal::ONE);
    }
}
