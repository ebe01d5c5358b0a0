//! Derived market analytics: per-market opportunity metrics and the
//! cross-market no-arbitrage check.

pub mod noarb;
pub mod opportunity;

pub use noarb::{NoArbDetector, NoArbViolation};
pub use opportunity::{MarketOpportunity, Scanner};
