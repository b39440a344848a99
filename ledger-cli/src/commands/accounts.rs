//! Registration and account lookup

use lib_ledger::{AccountId, LedgerStore, ReferralSource, Registration};
use serde_json::json;

use crate::argument_parsing::{invalid, AccountArg, AccountLookupArgs, RegisterArgs};
use crate::error::CliResult;
use crate::output::Output;

pub async fn handle_register<O: Output>(args: &RegisterArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let account = args.id.unwrap_or_else(AccountId::new_random);
    let mut registration = Registration::new(account, args.username.clone(), args.credential_hash.clone());
    if let Some(code) = &args.referral_code {
        registration = registration.referred_by(ReferralSource::Code(code.clone()));
    }

    let receipt = store.register(registration).await?;
    out.print_json(&receipt)
}

pub async fn handle_referral_code<O: Output>(args: &AccountArg, store: &LedgerStore, out: &O) -> CliResult<()> {
    let code = store.create_referral_code(args.account).await?;
    out.print_json(&json!({ "account": args.account, "referral_code": code }))
}

pub async fn handle_account<O: Output>(args: &AccountLookupArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let found = if let Some(id) = args.id {
        store.account(id).await?
    } else if let Some(code) = &args.referral_code {
        store.account_by_referral_code(code).await?
    } else if let Some(address) = &args.payout_address {
        store.account_by_payout_address(address).await?
    } else {
        return Err(invalid("one of --id, --referral-code or --payout-address is required"));
    };

    match found {
        Some(account) => out.print_json(&account),
        None => Err(invalid("no matching account")),
    }
}
