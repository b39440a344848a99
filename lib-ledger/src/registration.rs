//! Registration transaction
//!
//! Creating an account and attaching it to the referral tree happen together:
//! the account row, its referrer link, the referrer's direct count, the
//! all-levels count of every ancestor, and the referral edge either all commit
//! or none of them do.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::graph;
use crate::referral_code::{self, ReferralCode};
use crate::types::AccountId;
use crate::writer::{self, Counter};

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 16;

/// How a new account was referred
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralSource {
    /// Referrer already resolved by the caller; `code` is recorded on the edge.
    Explicit {
        referrer: AccountId,
        code: ReferralCode,
    },
    /// Code to resolve to its owner inside the registration transaction.
    Code(ReferralCode),
}

/// Input of [`LedgerStore::register`]
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: AccountId,
    pub username: String,
    pub credential_hash: String,
    pub referral: Option<ReferralSource>,
}

impl Registration {
    pub fn new(
        account: AccountId,
        username: impl Into<String>,
        credential_hash: impl Into<String>,
    ) -> Self {
        Self {
            account,
            username: username.into(),
            credential_hash: credential_hash.into(),
            referral: None,
        }
    }

    #[must_use]
    pub fn referred_by(mut self, source: ReferralSource) -> Self {
        self.referral = Some(source);
        self
    }

    fn validate(&self) -> LedgerResult<()> {
        let name_len = self.username.chars().count();
        if self.username.trim().is_empty() || name_len > MAX_USERNAME_LEN {
            return Err(LedgerError::InvalidArgument(format!(
                "username must be 1 to {} characters, got {}",
                MAX_USERNAME_LEN, name_len
            )));
        }
        if self.credential_hash.is_empty() {
            return Err(LedgerError::InvalidArgument(
                "credential hash must not be empty".into(),
            ));
        }
        if let Some(ReferralSource::Explicit { referrer, .. }) = &self.referral {
            if *referrer == self.account {
                return Err(LedgerError::InvalidArgument(format!(
                    "account {} cannot refer itself",
                    self.account
                )));
            }
        }
        Ok(())
    }
}

/// What a registration wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReceipt {
    pub account: AccountId,
    pub referrer: Option<AccountId>,
    /// Ancestors whose all-levels count was incremented, referrer included.
    pub ancestors_updated: u32,
    pub edge_id: Option<i64>,
}

impl LedgerStore {
    /// Insert a new account and, when referred, link it into the referral tree.
    pub async fn register(&self, registration: Registration) -> LedgerResult<RegistrationReceipt> {
        registration.validate()?;

        let mut tx = self.begin("register").await?;
        let result = self.register_in(&mut tx, &registration).await;
        let receipt = self.finish(tx, "register", result).await?;

        info!(
            account = %receipt.account,
            username = %registration.username,
            referrer = ?receipt.referrer.map(|r| r.to_string()),
            ancestors_updated = receipt.ancestors_updated,
            "Account registered"
        );
        Ok(receipt)
    }

    async fn register_in(
        &self,
        conn: &mut SqliteConnection,
        registration: &Registration,
    ) -> LedgerResult<RegistrationReceipt> {
        let account = registration.account;

        sqlx::query("INSERT INTO accounts (id, username, credential_hash) VALUES (?, ?, ?)")
            .bind(account.to_db())
            .bind(&registration.username)
            .bind(&registration.credential_hash)
            .execute(&mut *conn)
            .await?;

        let mut receipt = RegistrationReceipt {
            account,
            referrer: None,
            ancestors_updated: 0,
            edge_id: None,
        };

        let (referrer, code) = match &registration.referral {
            None => return Ok(receipt),
            Some(ReferralSource::Explicit { referrer, code }) => (*referrer, code),
            Some(ReferralSource::Code(code)) => {
                let owner = referral_code::owner_of_code(conn, code)
                    .await?
                    .ok_or_else(|| LedgerError::UnknownReferralCode(code.to_string()))?;
                (owner, code)
            }
        };

        sqlx::query("UPDATE accounts SET referrer_id = ? WHERE id = ?")
            .bind(referrer.to_db())
            .bind(account.to_db())
            .execute(&mut *conn)
            .await?;

        writer::bump(conn, referrer, Counter::DirectReferrals, 1).await?;

        let max_depth = self.commission_policy().max_chain_depth;
        let mut ancestor = Some(referrer);
        while let Some(current) = ancestor {
            if receipt.ancestors_updated >= max_depth {
                break;
            }
            writer::bump(conn, current, Counter::AllReferrals, 1).await?;
            receipt.ancestors_updated += 1;
            ancestor = graph::referrer_in(conn, current).await?;
        }

        let edge = sqlx::query(
            "INSERT INTO referral_edges (referrer_id, referred_id, code) VALUES (?, ?, ?)",
        )
        .bind(referrer.to_db())
        .bind(account.to_db())
        .bind(code.as_str())
        .execute(&mut *conn)
        .await?;

        receipt.referrer = Some(referrer);
        receipt.edge_id = Some(edge.last_insert_rowid());
        Ok(receipt)
    }
}
