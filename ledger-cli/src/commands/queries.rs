//! Read-only views over the log and the referral tree

use lib_ledger::LedgerStore;
use serde_json::json;

use crate::argument_parsing::{AccountArg, HistoryArgs, ReferralsArgs};
use crate::error::CliResult;
use crate::output::Output;

pub async fn handle_history<O: Output>(args: &HistoryArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let entries = store.transaction_history(args.account, args.limit).await?;
    out.print_json(&entries)
}

pub async fn handle_referrals<O: Output>(args: &ReferralsArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let edges = match (args.from, args.to) {
        (Some(from), Some(to)) => store.referral_edges_between(args.referrer, from, to).await?,
        _ => store.referral_edges_by_referrer(args.referrer).await?,
    };
    out.print_json(&edges)
}

pub async fn handle_chain<O: Output>(args: &AccountArg, store: &LedgerStore, out: &O) -> CliResult<()> {
    let chain = store.ancestors_of(args.account).await?;
    let mut levels = Vec::with_capacity(chain.ancestors.len());
    for (i, ancestor) in chain.ancestors.iter().enumerate() {
        let rate = store.commission_rate_of(*ancestor).await?;
        levels.push(json!({ "level": i + 1, "account": ancestor, "rate": rate }));
    }

    out.print_json(&json!({
        "account": args.account,
        "ancestors": levels,
        "truncated": chain.truncated,
    }))
}
