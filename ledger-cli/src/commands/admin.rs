//! Schema, upgrade, and role administration

use lib_ledger::LedgerStore;
use serde_json::json;

use crate::argument_parsing::{SetRoleArgs, UpgradeAction, UpgradeArgs};
use crate::error::CliResult;
use crate::output::Output;

pub async fn handle_migrate<O: Output>(store: &LedgerStore, out: &O) -> CliResult<()> {
    let report = store.migrate().await?;
    out.print_json(&report)
}

pub async fn handle_upgrade<O: Output>(args: &UpgradeArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let account = args.account;
    match &args.action {
        UpgradeAction::Show => {}
        UpgradeAction::Set { track, level } => {
            store.set_upgrade_level(account, *track, *level).await?;
        }
        UpgradeAction::Increment { track } => {
            store.increment_upgrade_level(account, *track).await?;
        }
        UpgradeAction::Reset => store.reset_upgrades(account).await?,
    }

    let levels = store.upgrade_levels(account).await?;
    out.print_json(&json!({ "account": account, "levels": levels }))
}

pub async fn handle_set_role<O: Output>(args: &SetRoleArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    store
        .set_role(args.account, args.role, args.commission_rate)
        .await?;
    if let Some(rate) = args.fee_share_rate {
        store.set_fee_share_rate(args.account, rate).await?;
    }

    let account = store.account(args.account).await?;
    out.print_json(&account)
}
