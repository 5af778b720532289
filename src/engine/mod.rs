//! Terminal front end for the reconciliation engine
//!
//! The `declarative` crate plans and applies; this module:
//! 1. Displays plans with attribute-level diffs
//! 2. Confirms interactively before applying
//! 3. Reports progress and a final summary

pub mod differ;
pub mod executor;

pub use differ::display_plan;
pub use executor::apply_plan;
