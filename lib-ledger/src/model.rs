//! Row types read from and written to the ledger tables
//!
//! `*Row` structs mirror the SQLite columns one-to-one and are decoded by
//! `sqlx`; the public structs carry domain types and are produced from rows
//! with `TryFrom`, so a malformed stored value surfaces as
//! [`LedgerError::Corrupt`] instead of a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{AccountId, Direction, FixedAmount, LogMethod, PrimaryAmount, Role, TxStatus};

pub(crate) fn timestamp_from_db(column: &'static str, secs: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| LedgerError::Corrupt {
        column: column.to_string(),
        details: format!("timestamp out of range: {}", secs),
    })
}

fn parse_tag<T>(column: &'static str, raw: &str) -> LedgerResult<T>
where
    T: std::str::FromStr<Err = LedgerError>,
{
    raw.parse().map_err(|e: LedgerError| LedgerError::Corrupt {
        column: column.to_string(),
        details: e.to_string(),
    })
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AccountRow {
    pub id: String,
    pub username: String,
    pub primary_balance: i64,
    pub secondary_balance: String,
    pub referral_code: Option<String>,
    pub referrer_id: Option<String>,
    pub commission_rate: f64,
    pub fee_share_rate: f64,
    pub cumulative_commission: i64,
    pub direct_referral_count: i64,
    pub all_referral_count: i64,
    pub cumulative_fee_share: String,
    pub last_login: Option<i64>,
    pub role: String,
    pub payout_address: Option<String>,
    pub created_at: i64,
}

/// Column list matching [`AccountRow`], without the credential hash.
pub(crate) const ACCOUNT_COLUMNS: &str = "id, username, primary_balance, secondary_balance, \
     referral_code, referrer_id, commission_rate, fee_share_rate, cumulative_commission, \
     direct_referral_count, all_referral_count, cumulative_fee_share, last_login, role, \
     payout_address, created_at";

/// Snapshot of one account's balances, rates, and referral counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub primary_balance: PrimaryAmount,
    pub secondary_balance: FixedAmount,
    pub referral_code: Option<String>,
    pub referrer: Option<AccountId>,
    pub commission_rate: f64,
    pub fee_share_rate: f64,
    pub cumulative_commission: PrimaryAmount,
    pub direct_referral_count: i64,
    pub all_referral_count: i64,
    pub cumulative_fee_share: FixedAmount,
    pub last_login: Option<DateTime<Utc>>,
    pub role: Role,
    pub payout_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = LedgerError;

    fn try_from(row: AccountRow) -> LedgerResult<Self> {
        Ok(Self {
            id: AccountId::from_db("accounts.id", &row.id)?,
            username: row.username,
            primary_balance: row.primary_balance,
            secondary_balance: FixedAmount::from_db(
                "accounts.secondary_balance",
                &row.secondary_balance,
            )?,
            referral_code: row.referral_code,
            referrer: row
                .referrer_id
                .as_deref()
                .map(|raw| AccountId::from_db("accounts.referrer_id", raw))
                .transpose()?,
            commission_rate: row.commission_rate,
            fee_share_rate: row.fee_share_rate,
            cumulative_commission: row.cumulative_commission,
            direct_referral_count: row.direct_referral_count,
            all_referral_count: row.all_referral_count,
            cumulative_fee_share: FixedAmount::from_db(
                "accounts.cumulative_fee_share",
                &row.cumulative_fee_share,
            )?,
            last_login: row
                .last_login
                .map(|secs| timestamp_from_db("accounts.last_login", secs))
                .transpose()?,
            role: parse_tag("accounts.role", &row.role)?,
            payout_address: row.payout_address,
            created_at: timestamp_from_db("accounts.created_at", row.created_at)?,
        })
    }
}

// ============================================================================
// Transaction log
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TransactionLogRow {
    pub id: i64,
    pub account_id: String,
    pub direction: String,
    pub method: String,
    pub primary_amount: i64,
    pub secondary_amount: Option<String>,
    pub external_ref: Option<String>,
    pub status: String,
    pub source_account_id: Option<String>,
    pub created_at: i64,
}

pub(crate) const TRANSACTION_LOG_COLUMNS: &str = "id, account_id, direction, method, \
     primary_amount, secondary_amount, external_ref, status, source_account_id, created_at";

/// One immutable ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Sequence id; creation order within and across chains
    pub id: i64,
    pub account: AccountId,
    pub direction: Direction,
    pub method: LogMethod,
    pub primary_amount: PrimaryAmount,
    pub secondary_amount: Option<FixedAmount>,
    pub external_ref: Option<String>,
    pub status: TxStatus,
    /// Account whose action produced this entry
    pub source: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionLogRow> for TransactionLogEntry {
    type Error = LedgerError;

    fn try_from(row: TransactionLogRow) -> LedgerResult<Self> {
        Ok(Self {
            id: row.id,
            account: AccountId::from_db("transaction_log.account_id", &row.account_id)?,
            direction: parse_tag("transaction_log.direction", &row.direction)?,
            method: parse_tag("transaction_log.method", &row.method)?,
            primary_amount: row.primary_amount,
            secondary_amount: row
                .secondary_amount
                .as_deref()
                .map(|raw| FixedAmount::from_db("transaction_log.secondary_amount", raw))
                .transpose()?,
            external_ref: row.external_ref,
            status: parse_tag("transaction_log.status", &row.status)?,
            source: row
                .source_account_id
                .as_deref()
                .map(|raw| AccountId::from_db("transaction_log.source_account_id", raw))
                .transpose()?,
            created_at: timestamp_from_db("transaction_log.created_at", row.created_at)?,
        })
    }
}

/// Log row to be appended; the sequence id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub account: AccountId,
    pub direction: Direction,
    pub method: LogMethod,
    pub primary_amount: PrimaryAmount,
    pub secondary_amount: Option<FixedAmount>,
    pub external_ref: Option<String>,
    pub status: TxStatus,
    pub source: Option<AccountId>,
}

impl NewLogEntry {
    /// Successful incoming primary-currency credit.
    pub fn credit(account: AccountId, method: LogMethod, amount: PrimaryAmount) -> Self {
        Self {
            account,
            direction: Direction::In,
            method,
            primary_amount: amount,
            secondary_amount: None,
            external_ref: None,
            status: TxStatus::Success,
            source: None,
        }
    }

    /// Successful outgoing primary-currency debit.
    pub fn debit(account: AccountId, method: LogMethod, amount: PrimaryAmount) -> Self {
        Self {
            direction: Direction::Out,
            ..Self::credit(account, method, amount)
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: AccountId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, amount: FixedAmount) -> Self {
        self.secondary_amount = Some(amount);
        self
    }

    #[must_use]
    pub fn with_external_ref(mut self, reference: impl Into<String>) -> Self {
        self.external_ref = Some(reference.into());
        self
    }
}

// ============================================================================
// Referral edges
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ReferralEdgeRow {
    pub id: i64,
    pub referrer_id: String,
    pub referred_id: String,
    pub code: String,
    pub created_at: i64,
}

/// Immutable record of one referral made at registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub id: i64,
    pub referrer: AccountId,
    pub referred: AccountId,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReferralEdgeRow> for ReferralEdge {
    type Error = LedgerError;

    fn try_from(row: ReferralEdgeRow) -> LedgerResult<Self> {
        Ok(Self {
            id: row.id,
            referrer: AccountId::from_db("referral_edges.referrer_id", &row.referrer_id)?,
            referred: AccountId::from_db("referral_edges.referred_id", &row.referred_id)?,
            code: row.code,
            created_at: timestamp_from_db("referral_edges.created_at", row.created_at)?,
        })
    }
}
