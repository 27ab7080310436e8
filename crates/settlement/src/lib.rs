//! The settlement engine.
//!
//! Pure functions only: the calculator turns a time series plus pricing data
//! into a settlement, the correction engine computes deltas against an
//! invoiced settlement, the validator checks pricing completeness before a
//! settlement may be invoiced, and reconciliation compares our totals with
//! the hub's wholesale settlement. All I/O stays with the callers in
//! `backoffice`.

pub mod calculator;
pub mod correction;
pub mod reconciliation;
pub mod validator;

pub use {
    calculator::{calculate, ActiveMargin, CalculationInput},
    correction::calculate_correction,
    reconciliation::reconcile,
    validator::validate_pricing,
};
