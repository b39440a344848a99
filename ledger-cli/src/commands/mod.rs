//! Command handlers
//!
//! Each handler validates what clap could not, calls one ledger operation,
//! and prints the result as JSON through the given [`Output`](crate::output::Output).

pub mod accounts;
pub mod admin;
pub mod ledger;
pub mod queries;
