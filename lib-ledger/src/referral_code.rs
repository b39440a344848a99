//! Referral codes
//!
//! Six symbols drawn uniformly from `A-Z0-9`. Candidates are sampled until one
//! is not already stored; the unique index on `accounts.referral_code` is the
//! final guard against two writers picking the same code.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Account, AccountRow, ACCOUNT_COLUMNS};
use crate::types::AccountId;

pub const CODE_LENGTH: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Candidates drawn before giving up; with 36^6 codes this is only reached
/// when the code space is nearly full.
const MAX_ATTEMPTS: usize = 1_000;

/// Validated, upper-case referral code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferralCode(String);

impl ReferralCode {
    /// Draw a random code (not checked for uniqueness).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ReferralCode {
    type Err = LedgerError;

    /// Accepts lower-case input and surrounding whitespace.
    fn from_str(s: &str) -> LedgerResult<Self> {
        let code = s.trim().to_ascii_uppercase();
        let well_formed = code.len() == CODE_LENGTH
            && code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !well_formed {
            return Err(LedgerError::InvalidArgument(format!(
                "referral code must be {} characters from A-Z0-9, got '{}'",
                CODE_LENGTH, s
            )));
        }
        Ok(Self(code))
    }
}

impl TryFrom<String> for ReferralCode {
    type Error = LedgerError;

    fn try_from(value: String) -> LedgerResult<Self> {
        value.parse()
    }
}

impl From<ReferralCode> for String {
    fn from(code: ReferralCode) -> Self {
        code.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) async fn code_in_use(conn: &mut SqliteConnection, code: &ReferralCode) -> LedgerResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE referral_code = ?")
        .bind(code.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

pub(crate) async fn owner_of_code(
    conn: &mut SqliteConnection,
    code: &ReferralCode,
) -> LedgerResult<Option<AccountId>> {
    let raw: Option<String> = sqlx::query_scalar("SELECT id FROM accounts WHERE referral_code = ?")
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    raw.map(|id| AccountId::from_db("accounts.id", &id))
        .transpose()
}

pub(crate) async fn generate_unique_in(conn: &mut SqliteConnection) -> LedgerResult<ReferralCode> {
    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = ReferralCode::random(&mut rand::thread_rng());
        if !code_in_use(conn, &candidate).await? {
            if attempt > 1 {
                warn!(attempt, "Referral code collided before finding a free one");
            }
            return Ok(candidate);
        }
    }
    Err(LedgerError::Statement(format!(
        "no free referral code after {} attempts",
        MAX_ATTEMPTS
    )))
}

impl LedgerStore {
    /// A code not currently assigned to any account.
    pub async fn generate_unique_code(&self) -> LedgerResult<ReferralCode> {
        let mut conn = self.pool().acquire().await?;
        generate_unique_in(&mut conn).await
    }

    /// Generate and store a fresh code for an existing account, replacing any
    /// previous one.
    pub async fn create_referral_code(&self, account: AccountId) -> LedgerResult<ReferralCode> {
        let mut tx = self.begin("create_referral_code").await?;
        let result = async {
            let code = generate_unique_in(&mut tx).await?;
            let updated = sqlx::query("UPDATE accounts SET referral_code = ? WHERE id = ?")
                .bind(code.as_str())
                .bind(account.to_db())
                .execute(&mut *tx)
                .await?;
            if updated.rows_affected() == 0 {
                return Err(LedgerError::AccountNotFound(account));
            }
            Ok(code)
        }
        .await;
        let code = self.finish(tx, "create_referral_code", result).await?;

        info!(account = %account, code = %code, "Referral code created");
        Ok(code)
    }

    pub async fn referral_code_of(&self, account: AccountId) -> LedgerResult<Option<ReferralCode>> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT referral_code FROM accounts WHERE id = ?")
                .bind(account.to_db())
                .fetch_optional(self.pool())
                .await?;
        raw.flatten()
            .map(|code| {
                code.parse::<ReferralCode>().map_err(|e| LedgerError::Corrupt {
                    column: "accounts.referral_code".to_string(),
                    details: e.to_string(),
                })
            })
            .transpose()
    }

    /// Account that owns `code`, if any.
    pub async fn account_by_referral_code(&self, code: &ReferralCode) -> LedgerResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE referral_code = ?", ACCOUNT_COLUMNS);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(code.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.map(Account::try_from).transpose()
    }
}
