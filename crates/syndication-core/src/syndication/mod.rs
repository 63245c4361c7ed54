pub mod annual;
pub mod cash_flow;
pub mod debt_schedule;
pub mod engine;
pub mod inputs;
pub mod metrics;
pub mod sources_uses;
pub mod validation;
pub mod waterfall;

pub use engine::{analyze_deal, DealAnalysis};
pub use inputs::DealInputs;
pub use validation::{validate_deal, ValidationReport};
