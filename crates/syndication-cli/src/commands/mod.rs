pub mod deal;
pub mod debt;
pub mod irr;
pub mod scenarios;
