//! Post-dispatch analysis: aggregation of outcomes and the gate decision.

pub mod aggregator;
pub mod decision;

pub use aggregator::{aggregate, DerivedScores, FailedTask, ReviewRecord};
pub use decision::{approval_criteria, decide, Decision, Verdict};
