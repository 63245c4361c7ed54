use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::inputs::FinancingMode;
use crate::error::SyndicationError;
use crate::types::*;
use crate::SyndicationResult;

const MAX_SCHEDULE_MONTHS: u32 = 1200;

// ---------------------------------------------------------------------------
// Payment formulas
// ---------------------------------------------------------------------------

/// Level monthly payment: P * r(1+r)^n / ((1+r)^n - 1), with r = annual / 12.
///
/// Zero rate falls back to straight-line `P / n`; zero months means the whole
/// principal is due.
pub fn amortizing_payment(principal: Money, annual_rate: Rate, amort_months: u32) -> Money {
    if principal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if amort_months == 0 {
        return principal;
    }
    let monthly_rate = annual_rate / dec!(12);
    if monthly_rate.is_zero() {
        return principal / Decimal::from(amort_months);
    }

    match (Decimal::ONE + monthly_rate).checked_powu(u64::from(amort_months)) {
        Some(compound) if compound != Decimal::ONE => {
            principal * monthly_rate * compound / (compound - Decimal::ONE)
        }
        // Compounding overflowed: the payment converges to interest-only
        _ => principal * monthly_rate,
    }
}

/// Interest for one month on `balance`.
pub fn interest_only_payment(balance: Money, annual_rate: Rate) -> Money {
    balance.max(Decimal::ZERO) * annual_rate / dec!(12)
}

// ---------------------------------------------------------------------------
// Loan state
// ---------------------------------------------------------------------------

/// One month of debt service.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DebtServiceEntry {
    pub beginning_balance: Money,
    pub interest: Money,
    pub principal: Money,
    /// Interest + principal
    pub payment: Money,
    pub ending_balance: Money,
    pub interest_only: bool,
}

/// Outstanding loan between payments. `step` never mutates; it returns the
/// month's entry together with the next state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanState {
    pub balance: Money,
    pub annual_rate: Rate,
    pub amortization_months: u32,
    pub financing: FinancingMode,
    pub months_elapsed: u32,
    /// Level payment in force (zero while interest-only)
    pub payment: Money,
}

impl LoanState {
    pub fn originate(
        principal: Money,
        annual_rate: Rate,
        amortization_months: u32,
        financing: FinancingMode,
    ) -> Self {
        let balance = principal.max(Decimal::ZERO);
        let payment = match financing {
            FinancingMode::Amortizing => {
                amortizing_payment(balance, annual_rate, amortization_months)
            }
            _ => Decimal::ZERO,
        };
        LoanState {
            balance,
            annual_rate,
            amortization_months,
            financing,
            months_elapsed: 0,
            payment,
        }
    }

    /// A loan with nothing outstanding.
    pub fn paid_off() -> Self {
        LoanState::originate(Decimal::ZERO, Decimal::ZERO, 0, FinancingMode::None)
    }

    pub fn step(&self) -> (DebtServiceEntry, LoanState) {
        let month = self.months_elapsed + 1;
        let balance = self.balance.max(Decimal::ZERO);

        if self.financing == FinancingMode::None || balance.is_zero() {
            let entry = DebtServiceEntry {
                beginning_balance: balance,
                ending_balance: balance,
                ..DebtServiceEntry::default()
            };
            let next = LoanState {
                balance,
                months_elapsed: month,
                ..*self
            };
            return (entry, next);
        }

        let interest = interest_only_payment(balance, self.annual_rate);

        let level_payment = match self.financing {
            FinancingMode::InterestOnly => None,
            FinancingMode::InterestOnlyThenAmortizing { io_months } if month <= io_months => None,
            FinancingMode::InterestOnlyThenAmortizing { io_months } if month == io_months + 1 => {
                // Re-size against today's balance and the term left after IO
                let remaining = self.amortization_months.saturating_sub(io_months).max(1);
                Some(amortizing_payment(balance, self.annual_rate, remaining))
            }
            _ => Some(self.payment),
        };

        let (principal, payment_in_force) = match level_payment {
            None => (Decimal::ZERO, self.payment),
            Some(level) => (
                (level - interest).max(Decimal::ZERO).min(balance),
                level,
            ),
        };
        let ending_balance = (balance - principal).max(Decimal::ZERO);

        let entry = DebtServiceEntry {
            beginning_balance: balance,
            interest,
            principal,
            payment: interest + principal,
            ending_balance,
            interest_only: level_payment.is_none(),
        };
        let next = LoanState {
            balance: ending_balance,
            months_elapsed: month,
            payment: payment_in_force,
            ..*self
        };
        (entry, next)
    }
}

// ---------------------------------------------------------------------------
// Standalone schedule view
// ---------------------------------------------------------------------------

/// Input for a standalone month-by-month loan schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleInput {
    pub principal: Money,
    pub annual_rate: Rate,
    pub amortization_months: u32,
    pub financing: FinancingMode,
    /// Months to project (loan term or hold period)
    pub term_months: u32,
}

/// A single month in the debt schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub month: u32,
    pub opening_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub payment: Money,
    pub closing_balance: Money,
    pub interest_only: bool,
}

/// Output for a standalone debt schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleOutput {
    pub periods: Vec<DebtPeriod>,
    /// First amortizing payment in the schedule (zero if never amortizing)
    pub level_payment: Money,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
    pub total_debt_service: Money,
    /// Balance outstanding after the final month
    pub balloon_balance: Money,
}

/// Build a month-by-month debt schedule for a single loan.
pub fn build_debt_schedule(
    input: &DebtScheduleInput,
) -> SyndicationResult<ComputationOutput<DebtScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.principal <= Decimal::ZERO {
        return Err(SyndicationError::InvalidInput {
            field: "principal".into(),
            reason: "Loan principal must be positive".into(),
        });
    }
    if input.annual_rate < Decimal::ZERO {
        return Err(SyndicationError::InvalidInput {
            field: "annual_rate".into(),
            reason: "Interest rate cannot be negative".into(),
        });
    }
    if input.term_months == 0 || input.term_months > MAX_SCHEDULE_MONTHS {
        return Err(SyndicationError::InvalidInput {
            field: "term_months".into(),
            reason: format!("Term must be between 1 and {MAX_SCHEDULE_MONTHS} months"),
        });
    }
    match input.financing {
        FinancingMode::None => {
            return Err(SyndicationError::InvalidInput {
                field: "financing".into(),
                reason: "Financing mode None has no debt schedule".into(),
            });
        }
        FinancingMode::Amortizing | FinancingMode::InterestOnlyThenAmortizing { .. }
            if input.amortization_months == 0 =>
        {
            return Err(SyndicationError::InvalidInput {
                field: "amortization_months".into(),
                reason: "Amortizing loans need a positive amortization term".into(),
            });
        }
        FinancingMode::InterestOnlyThenAmortizing { io_months }
            if io_months >= input.amortization_months =>
        {
            warnings.push(format!(
                "IO period of {io_months} months consumes the {}-month amortization term; \
                 remaining balance amortizes over 1 month",
                input.amortization_months
            ));
        }
        _ => {}
    }

    let mut state = LoanState::originate(
        input.principal,
        input.annual_rate,
        input.amortization_months,
        input.financing,
    );
    let mut periods = Vec::with_capacity(input.term_months as usize);
    let mut level_payment = Decimal::ZERO;

    for month in 1..=input.term_months {
        let (entry, next) = state.step();
        if level_payment.is_zero() && !entry.interest_only {
            level_payment = next.payment;
        }
        periods.push(DebtPeriod {
            month,
            opening_balance: entry.beginning_balance,
            interest: entry.interest,
            principal: entry.principal,
            payment: entry.payment,
            closing_balance: entry.ending_balance,
            interest_only: entry.interest_only,
        });
        state = next;
    }

    let total_interest_paid: Money = periods.iter().map(|p| p.interest).sum();
    let total_principal_paid: Money = periods.iter().map(|p| p.principal).sum();
    let balloon_balance = state.balance;

    if balloon_balance > Decimal::ZERO {
        warnings.push(format!(
            "Balloon balance of {} due at month {}",
            balloon_balance.round_dp(2),
            input.term_months
        ));
    }

    let output = DebtScheduleOutput {
        periods,
        level_payment,
        total_interest_paid,
        total_principal_paid,
        total_debt_service: total_interest_paid + total_principal_paid,
        balloon_balance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monthly Debt Schedule",
        input,
        warnings,
        elapsed,
        output,
    ))
}
