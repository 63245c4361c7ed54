pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "syndication")]
pub mod syndication;

#[cfg(feature = "scenarios")]
pub mod scenarios;

pub use error::SyndicationError;
pub use types::*;

/// Standard result type for all syndication operations
pub type SyndicationResult<T> = Result<T, SyndicationError>;
