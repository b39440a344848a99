//! Shared fixtures for the ledger integration tests

#![allow(dead_code)]

use lib_ledger::{
    AccountId, LedgerConfig, LedgerStore, ReferralSource, Registration, Role,
};
use tempfile::TempDir;

/// Isolated in-memory ledger with the default policy
pub async fn create_store() -> LedgerStore {
    LedgerStore::open_in_memory()
        .await
        .expect("Failed to open in-memory ledger")
}

/// In-memory ledger with a custom depth cap
pub async fn create_store_with_depth(max_chain_depth: u32) -> LedgerStore {
    let mut config = LedgerConfig::in_memory();
    config.commission.max_chain_depth = max_chain_depth;
    LedgerStore::open(&config)
        .await
        .expect("Failed to open in-memory ledger")
}

/// File-backed ledger with a real pool, for concurrency tests
pub async fn create_temp_store(max_connections: u32) -> (LedgerStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = LedgerConfig::default();
    config.database.url = format!("sqlite:{}", temp_dir.path().join("ledger.db").display());
    config.database.max_connections = max_connections;
    config.database.min_connections = 1;
    let store = LedgerStore::open(&config)
        .await
        .expect("Failed to open file ledger");
    (store, temp_dir)
}

/// Register `name`, referred through `referrer`'s code when given.
pub async fn join(store: &LedgerStore, name: &str, referrer: Option<AccountId>) -> AccountId {
    let id = AccountId::new_random();
    let mut registration = Registration::new(id, name, "hash");
    if let Some(referrer) = referrer {
        let code = match store.referral_code_of(referrer).await.unwrap() {
            Some(code) => code,
            None => store.create_referral_code(referrer).await.unwrap(),
        };
        registration = registration.referred_by(ReferralSource::Code(code));
    }
    store.register(registration).await.expect("registration failed");
    id
}

/// Override the commission rate of an account.
pub async fn set_rate(store: &LedgerStore, account: AccountId, rate: f64) {
    store.set_role(account, Role::User, rate).await.unwrap();
}

/// Build a referral chain, root first: `chain[i]` is referred by `chain[i - 1]`.
pub async fn build_chain(store: &LedgerStore, length: usize, rate: f64) -> Vec<AccountId> {
    let mut chain: Vec<AccountId> = Vec::with_capacity(length);
    for i in 0..length {
        let id = join(store, &format!("level{}", i), chain.last().copied()).await;
        set_rate(store, id, rate).await;
        chain.push(id);
    }
    chain
}

pub async fn balance(store: &LedgerStore, account: AccountId) -> i64 {
    store.primary_balance(account).await.unwrap().unwrap()
}

pub async fn total_balance(store: &LedgerStore) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(SUM(primary_balance), 0) FROM accounts")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

pub async fn log_count(store: &LedgerStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transaction_log")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

/// Make every update of `account` fail, simulating a storage fault mid-transaction.
pub async fn fail_updates_of(store: &LedgerStore, account: AccountId) {
    let ddl = format!(
        "CREATE TRIGGER fail_{suffix} BEFORE UPDATE ON accounts WHEN NEW.id = '{id}' \
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
        suffix = account.as_uuid().simple(),
        id = account
    );
    sqlx::raw_sql(&ddl).execute(store.pool()).await.unwrap();
}
