//! Read-only access to raw ledger rows
//!
//! These return the rows exactly as the write paths recorded them. Aggregation
//! is left to the consumer.

use chrono::{DateTime, Utc};

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    ReferralEdge, ReferralEdgeRow, TransactionLogEntry, TransactionLogRow, TRANSACTION_LOG_COLUMNS,
};
use crate::types::AccountId;

/// Upper bound on rows returned by one history query.
pub const MAX_HISTORY_LIMIT: u32 = 1_000;

impl LedgerStore {
    /// Most recent log rows of `account`, newest first.
    pub async fn transaction_history(
        &self,
        account: AccountId,
        limit: u32,
    ) -> LedgerResult<Vec<TransactionLogEntry>> {
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(LedgerError::InvalidArgument(format!(
                "history limit must be 1 to {}, got {}",
                MAX_HISTORY_LIMIT, limit
            )));
        }

        let sql = format!(
            "SELECT {} FROM transaction_log WHERE account_id = ? ORDER BY id DESC LIMIT ?",
            TRANSACTION_LOG_COLUMNS
        );
        let rows: Vec<TransactionLogRow> = sqlx::query_as(&sql)
            .bind(account.to_db())
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(TransactionLogEntry::try_from).collect()
    }

    /// Log rows produced by `source`'s actions across all accounts, in creation order.
    pub async fn entries_from_source(&self, source: AccountId) -> LedgerResult<Vec<TransactionLogEntry>> {
        let sql = format!(
            "SELECT {} FROM transaction_log WHERE source_account_id = ? ORDER BY id",
            TRANSACTION_LOG_COLUMNS
        );
        let rows: Vec<TransactionLogRow> = sqlx::query_as(&sql)
            .bind(source.to_db())
            .fetch_all(self.pool())
            .await?;
        rows.into_iter().map(TransactionLogEntry::try_from).collect()
    }

    /// Every referral made by `referrer`, newest first.
    pub async fn referral_edges_by_referrer(&self, referrer: AccountId) -> LedgerResult<Vec<ReferralEdge>> {
        let rows: Vec<ReferralEdgeRow> = sqlx::query_as(
            "SELECT id, referrer_id, referred_id, code, created_at FROM referral_edges \
             WHERE referrer_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(referrer.to_db())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ReferralEdge::try_from).collect()
    }

    /// Referrals made by `referrer` with `from <= created_at <= to`, newest first.
    pub async fn referral_edges_between(
        &self,
        referrer: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<ReferralEdge>> {
        if from > to {
            return Err(LedgerError::InvalidArgument(format!(
                "empty date range: {} is after {}",
                from, to
            )));
        }

        let rows: Vec<ReferralEdgeRow> = sqlx::query_as(
            "SELECT id, referrer_id, referred_id, code, created_at FROM referral_edges \
             WHERE referrer_id = ? AND created_at BETWEEN ? AND ? \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(referrer.to_db())
        .bind(from.timestamp())
        .bind(to.timestamp())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(ReferralEdge::try_from).collect()
    }
}
