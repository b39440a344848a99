//! Ledger CLI argument parsing
//!
//! Global options select the database and logging; each subcommand maps onto
//! one ledger operation and prints its result as JSON.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use lib_ledger::{
    AccountId, FixedAmount, LedgerConfig, LedgerStore, LogMethod, ReferralCode, Role, UpgradeTrack,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands;
use crate::error::{CliError, CliResult};
use crate::output::{ConsoleOutput, Output};

/// Referral ledger operator CLI
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "ledger-cli")]
pub struct LedgerCli {
    /// Database URL (overrides the configuration file)
    #[arg(short, long, env = "LEDGER_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "LEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, env = "LEDGER_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LedgerCommand {
    /// Create or evolve the schema
    Migrate,

    /// Register a new account
    Register(RegisterArgs),

    /// Credit an account and pay commissions up its referral chain
    Credit(CreditArgs),

    /// Pay commissions on an amount without crediting the account itself
    Distribute(DistributeArgs),

    /// Accrue the fee share of a payment to the payer's referrer
    FeeShare(FeeShareArgs),

    /// Withdraw from an account's primary balance
    Debit(DebitArgs),

    /// Generate and store a new referral code for an account
    ReferralCode(AccountArg),

    /// Show one account
    Account(AccountLookupArgs),

    /// Show the most recent transaction-log rows of an account
    History(HistoryArgs),

    /// List referrals made by an account
    Referrals(ReferralsArgs),

    /// Show the referrer chain above an account
    Chain(AccountArg),

    /// Inspect or change upgrade levels
    Upgrade(UpgradeArgs),

    /// Assign a role and its commission rate
    SetRole(SetRoleArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AccountArg {
    /// Account id (UUID)
    #[arg(short, long)]
    pub account: AccountId,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Account id to use; a random one is generated when omitted
    #[arg(long)]
    pub id: Option<AccountId>,

    #[arg(short, long)]
    pub username: String,

    /// Pre-hashed credential
    #[arg(long)]
    pub credential_hash: String,

    /// Referral code of the referring account
    #[arg(short, long)]
    pub referral_code: Option<ReferralCode>,
}

#[derive(Args, Debug, Clone)]
pub struct CreditArgs {
    #[arg(short, long)]
    pub account: AccountId,

    /// Amount in the primary currency's smallest unit
    #[arg(long)]
    pub amount: i64,

    /// Account whose action produced the value (defaults to the credited account)
    #[arg(long)]
    pub source: Option<AccountId>,

    /// Credit without walking the referral chain
    #[arg(long)]
    pub no_commission: bool,

    /// Log method for credits without commission
    #[arg(long, default_value = "MINING")]
    pub method: LogMethod,
}

#[derive(Args, Debug, Clone)]
pub struct DistributeArgs {
    #[arg(short, long)]
    pub account: AccountId,

    #[arg(long)]
    pub amount: i64,
}

#[derive(Args, Debug, Clone)]
pub struct FeeShareArgs {
    #[arg(long)]
    pub payer: AccountId,

    /// Fee paid, as a decimal amount
    #[arg(long)]
    pub paid: FixedAmount,
}

#[derive(Args, Debug, Clone)]
pub struct DebitArgs {
    #[arg(short, long)]
    pub account: AccountId,

    #[arg(long)]
    pub amount: i64,

    #[arg(long, default_value = "CLAIM")]
    pub method: LogMethod,

    /// External transfer reference to record
    #[arg(long)]
    pub external_ref: Option<String>,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct AccountLookupArgs {
    #[arg(long)]
    pub id: Option<AccountId>,

    #[arg(long)]
    pub referral_code: Option<ReferralCode>,

    #[arg(long)]
    pub payout_address: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(short, long)]
    pub account: AccountId,

    #[arg(short, long, default_value_t = 20)]
    pub limit: u32,
}

#[derive(Args, Debug, Clone)]
pub struct ReferralsArgs {
    #[arg(short, long)]
    pub referrer: AccountId,

    /// Earliest creation time (RFC 3339)
    #[arg(long, requires = "to")]
    pub from: Option<DateTime<Utc>>,

    /// Latest creation time (RFC 3339)
    #[arg(long, requires = "from")]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Args, Debug, Clone)]
pub struct UpgradeArgs {
    #[arg(short, long)]
    pub account: AccountId,

    #[command(subcommand)]
    pub action: UpgradeAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum UpgradeAction {
    /// Show every level
    Show,
    /// Set one track to a level
    Set { track: UpgradeTrack, level: i64 },
    /// Raise one track by one level
    Increment { track: UpgradeTrack },
    /// Zero every track
    Reset,
}

#[derive(Args, Debug, Clone)]
pub struct SetRoleArgs {
    #[arg(short, long)]
    pub account: AccountId,

    #[arg(long)]
    pub role: Role,

    /// Commission rate in [0, 1]
    #[arg(long)]
    pub commission_rate: f64,

    /// Fee-share rate to assign alongside the role
    #[arg(long)]
    pub fee_share_rate: Option<f64>,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the effective configuration: file (if any), then URL override.
pub fn resolve_config(cli: &LedgerCli) -> CliResult<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

pub async fn run_cli() -> Result<()> {
    let cli = LedgerCli::parse();
    init_tracing(cli.verbose);

    let output = ConsoleOutput;
    let result = run(&cli, &output).await;
    if let Err(err) = &result {
        output.error(&err.to_string())?;
        std::process::exit(err.exit_code());
    }
    Ok(())
}

async fn run(cli: &LedgerCli, output: &ConsoleOutput) -> CliResult<()> {
    let config = resolve_config(cli)?;
    debug!(url = %config.database.url, "Resolved ledger configuration");

    let store = LedgerStore::open(&config).await?;
    let result = dispatch(&cli.command, &store, output).await;
    store.close().await;
    result
}

/// Route a parsed command to its handler.
pub async fn dispatch<O: Output>(command: &LedgerCommand, store: &LedgerStore, out: &O) -> CliResult<()> {
    match command {
        LedgerCommand::Migrate => commands::admin::handle_migrate(store, out).await,
        LedgerCommand::Register(args) => commands::accounts::handle_register(args, store, out).await,
        LedgerCommand::Credit(args) => commands::ledger::handle_credit(args, store, out).await,
        LedgerCommand::Distribute(args) => commands::ledger::handle_distribute(args, store, out).await,
        LedgerCommand::FeeShare(args) => commands::ledger::handle_fee_share(args, store, out).await,
        LedgerCommand::Debit(args) => commands::ledger::handle_debit(args, store, out).await,
        LedgerCommand::ReferralCode(args) => commands::accounts::handle_referral_code(args, store, out).await,
        LedgerCommand::Account(args) => commands::accounts::handle_account(args, store, out).await,
        LedgerCommand::History(args) => commands::queries::handle_history(args, store, out).await,
        LedgerCommand::Referrals(args) => commands::queries::handle_referrals(args, store, out).await,
        LedgerCommand::Chain(args) => commands::queries::handle_chain(args, store, out).await,
        LedgerCommand::Upgrade(args) => commands::admin::handle_upgrade(args, store, out).await,
        LedgerCommand::SetRole(args) => commands::admin::handle_set_role(args, store, out).await,
    }
}

/// Input error for combinations clap cannot express.
pub(crate) fn invalid(msg: impl Into<String>) -> CliError {
    CliError::InvalidInput(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        LedgerCli::command().debug_assert();
    }

    #[test]
    fn test_parse_credit() {
        let id = AccountId::new_random();
        let cli = LedgerCli::try_parse_from([
            "ledger-cli",
            "--database-url",
            "sqlite::memory:",
            "credit",
            "--account",
            &id.to_string(),
            "--amount",
            "100",
        ])
        .unwrap();
        match cli.command {
            LedgerCommand::Credit(args) => {
                assert_eq!(args.account, id);
                assert_eq!(args.amount, 100);
                assert!(!args.no_commission);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(LedgerCli::try_parse_from(["ledger-cli", "chain", "--account", "nope"]).is_err());
        assert!(LedgerCli::try_parse_from([
            "ledger-cli",
            "register",
            "--username",
            "steve",
            "--credential-hash",
            "h",
            "--referral-code",
            "TOO-LONG-CODE",
        ])
        .is_err());
        assert!(LedgerCli::try_parse_from(["ledger-cli", "account"]).is_err());
    }

    #[test]
    fn test_url_override() {
        let cli = LedgerCli::try_parse_from(["ledger-cli", "--database-url", "sqlite:other.db", "migrate"])
            .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database.url, "sqlite:other.db");
        assert_eq!(config.database.max_connections, 10);
    }
}
