//! Account administration
//!
//! Scalar getters and setters for balances, rates, role, and payout details,
//! plus the guarded debit used for withdrawals.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteQueryResult;
use sqlx::FromRow;
use tracing::info;

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Account, AccountRow, NewLogEntry, ACCOUNT_COLUMNS};
use crate::types::{AccountId, FixedAmount, LogMethod, PrimaryAmount, Role};
use crate::writer::{self, FixedColumn};

/// Referral counters and lifetime commission of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
pub struct ReferralCounts {
    pub direct_referral_count: i64,
    pub all_referral_count: i64,
    pub cumulative_commission: i64,
}

fn expect_row(result: SqliteQueryResult, account: AccountId) -> LedgerResult<()> {
    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(account));
    }
    Ok(())
}

fn validate_rate(name: &str, rate: f64, max: Option<f64>) -> LedgerResult<()> {
    let in_range = rate.is_finite() && rate >= 0.0 && max.map_or(true, |m| rate <= m);
    if !in_range {
        return Err(LedgerError::InvalidArgument(format!(
            "{} out of range: {}",
            name, rate
        )));
    }
    Ok(())
}

impl LedgerStore {
    /// Snapshot of one account.
    pub async fn account(&self, id: AccountId) -> LedgerResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(id.to_db())
            .fetch_optional(self.pool())
            .await?;
        row.map(Account::try_from).transpose()
    }

    pub async fn primary_balance(&self, id: AccountId) -> LedgerResult<Option<PrimaryAmount>> {
        let mut conn = self.pool().acquire().await?;
        writer::primary_balance(&mut conn, id).await
    }

    pub async fn secondary_balance(&self, id: AccountId) -> LedgerResult<Option<FixedAmount>> {
        let mut conn = self.pool().acquire().await?;
        writer::read_fixed(&mut conn, id, FixedColumn::SecondaryBalance).await
    }

    pub async fn cumulative_fee_share(&self, id: AccountId) -> LedgerResult<Option<FixedAmount>> {
        let mut conn = self.pool().acquire().await?;
        writer::read_fixed(&mut conn, id, FixedColumn::CumulativeFeeShare).await
    }

    pub async fn referral_counts(&self, id: AccountId) -> LedgerResult<Option<ReferralCounts>> {
        let counts = sqlx::query_as(
            "SELECT direct_referral_count, all_referral_count, cumulative_commission \
             FROM accounts WHERE id = ?",
        )
        .bind(id.to_db())
        .fetch_optional(self.pool())
        .await?;
        Ok(counts)
    }

    /// Withdraw `amount` from the primary balance, logging an `OUT` row.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] (and writes nothing)
    /// when the balance does not cover the amount.
    pub async fn debit(
        &self,
        account: AccountId,
        amount: PrimaryAmount,
        method: LogMethod,
        external_ref: Option<String>,
    ) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        let mut entry = NewLogEntry::debit(account, method, amount).with_source(account);
        entry.external_ref = external_ref;

        let mut tx = self.begin("debit").await?;
        let result = async {
            writer::debit_primary(&mut tx, account, amount).await?;
            self.append_log(&mut tx, entry).await
        }
        .await;
        let log_id = self.finish(tx, "debit", result).await?;

        info!(account = %account, amount, method = %method, "Primary balance debited");
        Ok(log_id)
    }

    /// Assign a role together with the commission rate that comes with it.
    pub async fn set_role(&self, account: AccountId, role: Role, commission_rate: f64) -> LedgerResult<()> {
        validate_rate("commission rate", commission_rate, Some(1.0))?;
        let result = sqlx::query("UPDATE accounts SET role = ?, commission_rate = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(commission_rate)
            .bind(account.to_db())
            .execute(self.pool())
            .await?;
        expect_row(result, account)?;

        info!(account = %account, role = %role, commission_rate, "Role updated");
        Ok(())
    }

    pub async fn set_fee_share_rate(&self, account: AccountId, rate: f64) -> LedgerResult<()> {
        validate_rate("fee share rate", rate, None)?;
        let result = sqlx::query("UPDATE accounts SET fee_share_rate = ? WHERE id = ?")
            .bind(rate)
            .bind(account.to_db())
            .execute(self.pool())
            .await?;
        expect_row(result, account)?;

        info!(account = %account, rate, "Fee share rate updated");
        Ok(())
    }

    /// Overwrite the secondary balance with an externally reconciled value.
    pub async fn set_secondary_balance(&self, account: AccountId, balance: &FixedAmount) -> LedgerResult<()> {
        if balance.is_negative() {
            return Err(LedgerError::InvalidArgument(format!(
                "secondary balance must be non-negative, got {}",
                balance
            )));
        }
        let mut conn = self.pool().acquire().await?;
        writer::write_fixed(&mut conn, account, FixedColumn::SecondaryBalance, balance).await
    }

    pub async fn touch_last_login(&self, account: AccountId) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE accounts SET last_login = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(account.to_db())
            .execute(self.pool())
            .await?;
        expect_row(result, account)
    }

    /// Set or clear the address fee-share payouts are sent to.
    pub async fn set_payout_address(&self, account: AccountId, address: Option<&str>) -> LedgerResult<()> {
        let address = address.map(str::trim).filter(|a| !a.is_empty());
        let result = sqlx::query("UPDATE accounts SET payout_address = ? WHERE id = ?")
            .bind(address)
            .bind(account.to_db())
            .execute(self.pool())
            .await?;
        expect_row(result, account)
    }

    pub async fn account_by_payout_address(&self, address: &str) -> LedgerResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE payout_address = ? ORDER BY created_at LIMIT 1",
            ACCOUNT_COLUMNS
        );
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(address.trim())
            .fetch_optional(self.pool())
            .await?;
        row.map(Account::try_from).transpose()
    }

    /// Payout addresses of the given accounts; accounts without one are omitted.
    pub async fn payout_addresses(&self, ids: &[AccountId]) -> LedgerResult<HashMap<AccountId, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| id.to_db()).collect();
        let keys = serde_json::to_string(&keys)
            .map_err(|e| LedgerError::InvalidArgument(format!("encoding id list: {}", e)))?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, payout_address FROM accounts \
             WHERE id IN (SELECT value FROM json_each(?)) AND payout_address IS NOT NULL",
        )
        .bind(keys)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|(id, address)| AccountId::from_db("accounts.id", &id).map(|id| (id, address)))
            .collect()
    }
}
