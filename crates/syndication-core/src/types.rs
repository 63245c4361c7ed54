use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Multiples (e.g., 1.85x equity multiple)
pub type Multiple = Decimal;

/// Sensitivity variable specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub name: String,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

/// How serious a non-fatal finding is. The caller decides whether to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal observation produced alongside a complete result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Stable machine-readable identifier (e.g. "dscr_below_1_20")
    pub code: String,
    pub message: String,
}

impl Finding {
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Finding {
            severity: Severity::Error,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A ratio that may legitimately be unbounded.
///
/// `Decimal` has no infinity, so the one case where infinity is the correct
/// answer (positive cash against zero remaining capital) is spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnRatio {
    Finite(Decimal),
    Unbounded,
}

impl ReturnRatio {
    /// `numerator / denominator`, with a zero denominator mapping to
    /// `Unbounded` for positive numerators and zero otherwise.
    pub fn of(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            if numerator > Decimal::ZERO {
                ReturnRatio::Unbounded
            } else {
                ReturnRatio::Finite(Decimal::ZERO)
            }
        } else {
            ReturnRatio::Finite(numerator / denominator)
        }
    }

    pub fn finite(&self) -> Option<Decimal> {
        match self {
            ReturnRatio::Finite(v) => Some(*v),
            ReturnRatio::Unbounded => None,
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_return_ratio_unbounded_on_zero_capital() {
        assert_eq!(ReturnRatio::of(dec!(100), dec!(0)), ReturnRatio::Unbounded);
        assert_eq!(
            ReturnRatio::of(dec!(0), dec!(0)),
            ReturnRatio::Finite(Decimal::ZERO)
        );
        assert_eq!(
            ReturnRatio::of(dec!(8), dec!(100)),
            ReturnRatio::Finite(dec!(0.08))
        );
    }

    #[test]
    fn test_finding_constructors() {
        let w = Finding::warning("x", "soft");
        let e = Finding::error("y", "hard");
        assert!(!w.is_error());
        assert!(e.is_error());
        assert_eq!(e.code, "y");
    }
}
