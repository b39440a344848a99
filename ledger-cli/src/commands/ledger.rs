//! Balance-changing commands

use lib_ledger::LedgerStore;
use serde_json::json;

use crate::argument_parsing::{CreditArgs, DebitArgs, DistributeArgs, FeeShareArgs};
use crate::error::CliResult;
use crate::output::Output;

pub async fn handle_credit<O: Output>(args: &CreditArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    if args.no_commission {
        let log_id = store
            .credit_without_commission(args.account, args.amount, args.method)
            .await?;
        return out.print_json(&json!({
            "account": args.account,
            "amount": args.amount,
            "method": args.method,
            "log_id": log_id,
        }));
    }

    let source = args.source.unwrap_or(args.account);
    let report = store.propagate(args.account, args.amount, source).await?;
    out.print_json(&json!({
        "legs": report.legs,
        "stop": report.stop,
        "total_credited": report.total_credited(),
        "total_commission": report.total_commission(),
    }))
}

pub async fn handle_distribute<O: Output>(args: &DistributeArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let report = store.distribute_commissions(args.account, args.amount).await?;
    out.print_json(&json!({
        "legs": report.legs,
        "stop": report.stop,
        "total_commission": report.total_commission(),
    }))
}

pub async fn handle_fee_share<O: Output>(args: &FeeShareArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let accrual = store.share_fee(args.payer, &args.paid).await?;
    out.print_json(&accrual)
}

pub async fn handle_debit<O: Output>(args: &DebitArgs, store: &LedgerStore, out: &O) -> CliResult<()> {
    let log_id = store
        .debit(args.account, args.amount, args.method, args.external_ref.clone())
        .await?;
    let balance = store.primary_balance(args.account).await?;
    out.print_json(&json!({
        "account": args.account,
        "log_id": log_id,
        "primary_balance": balance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use crate::output::testing::MockOutput;
    use lib_ledger::{AccountId, LogMethod, ReferralSource, Registration};

    /// Root account with a 0.5 rate and one referred child.
    async fn parent_and_child() -> (LedgerStore, AccountId, AccountId) {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let parent = AccountId::new_random();
        let child = AccountId::new_random();
        store.register(Registration::new(parent, "parent", "h")).await.unwrap();
        let code = store.create_referral_code(parent).await.unwrap();
        store
            .register(Registration::new(child, "child", "h").referred_by(ReferralSource::Code(code)))
            .await
            .unwrap();
        store.set_role(parent, lib_ledger::Role::User, 0.5).await.unwrap();
        (store, parent, child)
    }

    fn credit(account: AccountId, amount: i64, no_commission: bool) -> CreditArgs {
        CreditArgs {
            account,
            amount,
            source: None,
            no_commission,
            method: LogMethod::Mining,
        }
    }

    #[tokio::test]
    async fn test_credit_pays_referrer() {
        let (store, parent, child) = parent_and_child().await;
        let out = MockOutput::new();

        handle_credit(&credit(child, 100, false), &store, &out).await.unwrap();
        let printed = out.last_json();
        assert_eq!(printed["total_credited"], 150);
        assert_eq!(printed["total_commission"], 50);
        assert_eq!(printed["stop"], "NoReferrer");
        assert_eq!(store.primary_balance(parent).await.unwrap(), Some(50));
    }

    #[tokio::test]
    async fn test_credit_without_commission_leaves_referrer() {
        let (store, parent, child) = parent_and_child().await;
        let out = MockOutput::new();

        handle_credit(&credit(child, 100, true), &store, &out).await.unwrap();
        assert_eq!(out.last_json()["method"], "Mining");
        assert_eq!(store.primary_balance(child).await.unwrap(), Some(100));
        assert_eq!(store.primary_balance(parent).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_fee_share_prints_accrual() {
        let (store, parent, child) = parent_and_child().await;
        store.set_fee_share_rate(parent, 0.1).await.unwrap();
        let out = MockOutput::new();

        let args = FeeShareArgs { payer: child, paid: "2".parse().unwrap() };
        handle_fee_share(&args, &store, &out).await.unwrap();
        assert_eq!(out.last_json()["referrer"], json!(parent));

        let orphan = FeeShareArgs { payer: parent, paid: "2".parse().unwrap() };
        handle_fee_share(&orphan, &store, &out).await.unwrap();
        assert!(out.last_json().is_null());
    }

    #[tokio::test]
    async fn test_debit_overdraft_rejected() {
        let (store, _, child) = parent_and_child().await;
        let out = MockOutput::new();
        handle_credit(&credit(child, 30, true), &store, &out).await.unwrap();

        let args = DebitArgs {
            account: child,
            amount: 20,
            method: LogMethod::Claim,
            external_ref: Some("tx-1".to_string()),
        };
        handle_debit(&args, &store, &out).await.unwrap();
        assert_eq!(out.last_json()["primary_balance"], 10);

        let err = handle_debit(&args, &store, &out).await.unwrap_err();
        assert!(matches!(err, CliError::Ledger(_)));
        assert_eq!(store.primary_balance(child).await.unwrap(), Some(10));
    }
}
