//! Referral ledger command-line interface
//!
//! Entry point for the ledger-cli binary. Parses command-line arguments
//! and delegates to the appropriate command handler.

use ledger_cli::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_cli().await
}
