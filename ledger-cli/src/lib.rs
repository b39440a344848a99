//! Referral ledger CLI library
//!
//! Operator tool for the referral ledger: applies schema evolution, registers
//! accounts, posts credits and debits, and dumps raw ledger rows as JSON.
//!
//! - `argument_parsing`: clap definitions and the top-level dispatcher
//! - `commands`: one handler per command family, each writing through [`Output`]
//! - `error`: CLI error type wrapping the library's errors

pub mod argument_parsing;
pub mod commands;
pub mod error;
pub mod output;

pub use argument_parsing::{run_cli, LedgerCli, LedgerCommand};
pub use error::{CliError, CliResult};
pub use output::Output;

/// CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
