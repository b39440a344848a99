//! Ledger writer primitives
//!
//! Single-statement operations that run on the caller's connection. None of
//! them opens or commits a transaction; composing them atomically is the job
//! of the public operations on [`LedgerStore`].
//!
//! Balance increments are always relative (`col = col + ?`) so concurrent
//! writers serialize on the row instead of overwriting each other.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::model::NewLogEntry;
use crate::types::{AccountId, FixedAmount, PrimaryAmount};

/// Integer counter columns on `accounts` that only ever move by a delta.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    PrimaryBalance,
    CumulativeCommission,
    DirectReferrals,
    AllReferrals,
}

impl Counter {
    const fn column(self) -> &'static str {
        match self {
            Counter::PrimaryBalance => "primary_balance",
            Counter::CumulativeCommission => "cumulative_commission",
            Counter::DirectReferrals => "direct_referral_count",
            Counter::AllReferrals => "all_referral_count",
        }
    }
}

/// Add a non-negative `delta` to an integer counter.
///
/// The update only applies while the sum still fits in an `i64`; SQLite would
/// otherwise store the result as a lossy REAL without raising an error.
pub(crate) async fn bump(
    conn: &mut SqliteConnection,
    account: AccountId,
    counter: Counter,
    delta: i64,
) -> LedgerResult<()> {
    if delta < 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "{} can only grow, got delta {}",
            counter.column(),
            delta
        )));
    }

    let sql = format!(
        "UPDATE accounts SET {col} = {col} + ? WHERE id = ? AND {col} <= ? - ?",
        col = counter.column()
    );
    let result = sqlx::query(&sql)
        .bind(delta)
        .bind(account.to_db())
        .bind(i64::MAX)
        .bind(delta)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }
    if account_exists(conn, account).await? {
        return Err(LedgerError::Overflow {
            account,
            column: counter.column(),
            delta,
        });
    }
    Err(LedgerError::AccountNotFound(account))
}

async fn account_exists(conn: &mut SqliteConnection, account: AccountId) -> LedgerResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM accounts WHERE id = ?")
        .bind(account.to_db())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub(crate) async fn credit_primary(
    conn: &mut SqliteConnection,
    account: AccountId,
    amount: PrimaryAmount,
) -> LedgerResult<()> {
    bump(conn, account, Counter::PrimaryBalance, amount).await
}

/// Decrement the primary balance only if it covers `amount`.
pub(crate) async fn debit_primary(
    conn: &mut SqliteConnection,
    account: AccountId,
    amount: PrimaryAmount,
) -> LedgerResult<()> {
    let result = sqlx::query(
        "UPDATE accounts SET primary_balance = primary_balance - ? \
         WHERE id = ? AND primary_balance >= ?",
    )
    .bind(amount)
    .bind(account.to_db())
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    match primary_balance(conn, account).await? {
        None => Err(LedgerError::AccountNotFound(account)),
        Some(available) => Err(LedgerError::InsufficientBalance {
            account,
            available,
            requested: amount,
        }),
    }
}

pub(crate) async fn primary_balance(
    conn: &mut SqliteConnection,
    account: AccountId,
) -> LedgerResult<Option<PrimaryAmount>> {
    let balance = sqlx::query_scalar("SELECT primary_balance FROM accounts WHERE id = ?")
        .bind(account.to_db())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance)
}

/// Fixed-point columns on `accounts`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FixedColumn {
    SecondaryBalance,
    CumulativeFeeShare,
}

impl FixedColumn {
    const fn column(self) -> &'static str {
        match self {
            FixedColumn::SecondaryBalance => "secondary_balance",
            FixedColumn::CumulativeFeeShare => "cumulative_fee_share",
        }
    }

    const fn qualified(self) -> &'static str {
        match self {
            FixedColumn::SecondaryBalance => "accounts.secondary_balance",
            FixedColumn::CumulativeFeeShare => "accounts.cumulative_fee_share",
        }
    }
}

pub(crate) async fn read_fixed(
    conn: &mut SqliteConnection,
    account: AccountId,
    column: FixedColumn,
) -> LedgerResult<Option<FixedAmount>> {
    let sql = format!("SELECT {} FROM accounts WHERE id = ?", column.column());
    let raw: Option<String> = sqlx::query_scalar(&sql)
        .bind(account.to_db())
        .fetch_optional(&mut *conn)
        .await?;
    raw.map(|text| FixedAmount::from_db(column.qualified(), &text))
        .transpose()
}

pub(crate) async fn write_fixed(
    conn: &mut SqliteConnection,
    account: AccountId,
    column: FixedColumn,
    value: &FixedAmount,
) -> LedgerResult<()> {
    let sql = format!("UPDATE accounts SET {} = ? WHERE id = ?", column.column());
    let result = sqlx::query(&sql)
        .bind(value.to_db())
        .bind(account.to_db())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(account));
    }
    Ok(())
}

/// Add `delta` to a fixed-point column and return the new total.
///
/// SQLite has no exact decimal arithmetic, so the sum is computed here and
/// written back conditionally on the value just read. Losing that race fails
/// with [`LedgerError::ConcurrentUpdate`] rather than dropping the other
/// writer's increment.
pub(crate) async fn add_fixed(
    conn: &mut SqliteConnection,
    account: AccountId,
    column: FixedColumn,
    delta: &FixedAmount,
) -> LedgerResult<FixedAmount> {
    let current = read_fixed(conn, account, column)
        .await?
        .ok_or(LedgerError::AccountNotFound(account))?;
    let updated = &current + delta;

    let sql = format!(
        "UPDATE accounts SET {col} = ? WHERE id = ? AND {col} = ?",
        col = column.column()
    );
    let result = sqlx::query(&sql)
        .bind(updated.to_db())
        .bind(account.to_db())
        .bind(current.to_db())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::ConcurrentUpdate {
            account,
            field: column.column(),
        });
    }
    Ok(updated)
}

/// Insert one transaction-log row and return its sequence id.
pub(crate) async fn insert_log(conn: &mut SqliteConnection, entry: &NewLogEntry) -> LedgerResult<i64> {
    let result = sqlx::query(
        "INSERT INTO transaction_log \
         (account_id, direction, method, primary_amount, secondary_amount, external_ref, status, source_account_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.account.to_db())
    .bind(entry.direction.as_str())
    .bind(entry.method.as_str())
    .bind(entry.primary_amount)
    .bind(entry.secondary_amount.as_ref().map(FixedAmount::to_db))
    .bind(entry.external_ref.as_deref())
    .bind(entry.status.as_str())
    .bind(entry.source.map(AccountId::to_db))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

impl LedgerStore {
    /// Append a log row, tracing it when per-row debug logging is enabled.
    pub(crate) async fn append_log(
        &self,
        conn: &mut SqliteConnection,
        entry: NewLogEntry,
    ) -> LedgerResult<i64> {
        let id = insert_log(conn, &entry).await?;
        if self.debug_logging() {
            debug!(
                log_id = id,
                account = %entry.account,
                direction = %entry.direction,
                method = %entry.method,
                primary_amount = entry.primary_amount,
                secondary_amount = ?entry.secondary_amount.as_ref().map(ToString::to_string),
                source = ?entry.source.map(|s| s.to_string()),
                "Transaction logged"
            );
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogMethod;

    async fn store_with_account() -> (LedgerStore, AccountId) {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let id = AccountId::new_random();
        sqlx::query("INSERT INTO accounts (id, username, credential_hash) VALUES (?, 'miner', 'h')")
            .bind(id.to_db())
            .execute(store.pool())
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let (store, id) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();

        credit_primary(&mut conn, id, 100).await.unwrap();
        debit_primary(&mut conn, id, 40).await.unwrap();
        assert_eq!(primary_balance(&mut conn, id).await.unwrap(), Some(60));

        let err = debit_primary(&mut conn, id, 61).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { available: 60, requested: 61, .. }
        ));
        assert_eq!(primary_balance(&mut conn, id).await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_bump_refuses_to_overflow() {
        let (store, id) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();

        credit_primary(&mut conn, id, i64::MAX - 1).await.unwrap();
        credit_primary(&mut conn, id, 1).await.unwrap();

        let err = credit_primary(&mut conn, id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Overflow { column: "primary_balance", delta: 1, .. }
        ));
        assert_eq!(primary_balance(&mut conn, id).await.unwrap(), Some(i64::MAX));

        let stored_type: String =
            sqlx::query_scalar("SELECT typeof(primary_balance) FROM accounts WHERE id = ?")
                .bind(id.to_db())
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(stored_type, "integer");

        assert!(matches!(
            bump(&mut conn, id, Counter::DirectReferrals, -1).await,
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_credit_missing_account() {
        let (store, _) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let ghost = AccountId::new_random();

        let err = credit_primary(&mut conn, ghost, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(id) if id == ghost));
        let err = debit_primary(&mut conn, ghost, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_add_fixed_accumulates_exactly() {
        let (store, id) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let tenth: FixedAmount = "0.1".parse().unwrap();

        for _ in 0..3 {
            add_fixed(&mut conn, id, FixedColumn::CumulativeFeeShare, &tenth)
                .await
                .unwrap();
        }
        let total = read_fixed(&mut conn, id, FixedColumn::CumulativeFeeShare)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(total.to_db(), "0.300000000000000000");
    }

    #[tokio::test]
    async fn test_insert_log_sequence() {
        let (store, id) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();

        let first = insert_log(&mut conn, &NewLogEntry::credit(id, LogMethod::Mining, 10))
            .await
            .unwrap();
        let second = insert_log(
            &mut conn,
            &NewLogEntry::credit(id, LogMethod::FeeShare, 0)
                .with_secondary("0.5".parse().unwrap())
                .with_external_ref("DATABASE_ONLY"),
        )
        .await
        .unwrap();
        assert!(second > first);

        let secondary: Option<String> =
            sqlx::query_scalar("SELECT secondary_amount FROM transaction_log WHERE id = ?")
                .bind(second)
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(secondary.as_deref(), Some("0.500000000000000000"));
    }

    #[tokio::test]
    async fn test_insert_log_rejects_unknown_account() {
        let (store, _) = store_with_account().await;
        let mut conn = store.pool().acquire().await.unwrap();
        let err = insert_log(
            &mut conn,
            &NewLogEntry::credit(AccountId::new_random(), LogMethod::Mining, 1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Rejected);
    }
}
