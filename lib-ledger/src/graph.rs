//! Referral graph accessor
//!
//! Pure reads over the `referrer_id` links and per-account rates. The `*_in`
//! functions run on a caller-supplied connection so they observe writes made
//! earlier in the same transaction; the [`LedgerStore`] methods run standalone.
//!
//! Absent data (no row, NULL column) resolves to a default. Storage failures
//! are always returned as errors.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::backend::LedgerStore;
use crate::error::LedgerResult;
use crate::types::AccountId;

/// Where a commission rate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RateOrigin {
    /// The account row supplied a usable value.
    Stored,
    /// The row or value was absent (or unusable) and the platform default applied.
    PlatformDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommissionRate {
    pub value: f64,
    pub origin: RateOrigin,
}

impl CommissionRate {
    fn resolve(stored: Option<f64>, default_rate: f64) -> Self {
        match stored {
            Some(rate) if rate.is_finite() => Self {
                value: rate.clamp(0.0, 1.0),
                origin: RateOrigin::Stored,
            },
            _ => Self {
                value: default_rate,
                origin: RateOrigin::PlatformDefault,
            },
        }
    }
}

fn sanitize_fee_share_rate(stored: Option<f64>) -> f64 {
    match stored {
        Some(rate) if rate.is_finite() => rate.max(0.0),
        _ => 0.0,
    }
}

/// Ancestors of an account, nearest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AncestorChain {
    pub ancestors: Vec<AccountId>,
    /// The walk stopped at the depth cap with a referrer still ahead.
    pub truncated: bool,
}

pub(crate) async fn referrer_in(
    conn: &mut SqliteConnection,
    account: AccountId,
) -> LedgerResult<Option<AccountId>> {
    let raw: Option<Option<String>> =
        sqlx::query_scalar("SELECT referrer_id FROM accounts WHERE id = ?")
            .bind(account.to_db())
            .fetch_optional(&mut *conn)
            .await?;

    raw.flatten()
        .map(|id| AccountId::from_db("accounts.referrer_id", &id))
        .transpose()
}

pub(crate) async fn commission_rate_in(
    conn: &mut SqliteConnection,
    account: AccountId,
    default_rate: f64,
) -> LedgerResult<CommissionRate> {
    let stored: Option<Option<f64>> =
        sqlx::query_scalar("SELECT commission_rate FROM accounts WHERE id = ?")
            .bind(account.to_db())
            .fetch_optional(&mut *conn)
            .await?;
    Ok(CommissionRate::resolve(stored.flatten(), default_rate))
}

pub(crate) async fn fee_share_rate_in(
    conn: &mut SqliteConnection,
    account: AccountId,
) -> LedgerResult<f64> {
    let stored: Option<Option<f64>> =
        sqlx::query_scalar("SELECT fee_share_rate FROM accounts WHERE id = ?")
            .bind(account.to_db())
            .fetch_optional(&mut *conn)
            .await?;
    Ok(sanitize_fee_share_rate(stored.flatten()))
}

/// Follow referrer links upward for at most `max_depth` hops.
pub(crate) async fn ancestors_in(
    conn: &mut SqliteConnection,
    account: AccountId,
    max_depth: u32,
) -> LedgerResult<AncestorChain> {
    let mut chain = AncestorChain::default();
    let mut current = account;

    while let Some(referrer) = referrer_in(conn, current).await? {
        if chain.ancestors.len() >= max_depth as usize {
            chain.truncated = true;
            break;
        }
        chain.ancestors.push(referrer);
        current = referrer;
    }
    Ok(chain)
}

impl LedgerStore {
    /// Direct referrer of `account`, if any.
    pub async fn referrer_of(&self, account: AccountId) -> LedgerResult<Option<AccountId>> {
        let mut conn = self.pool().acquire().await?;
        referrer_in(&mut conn, account).await
    }

    pub async fn commission_rate_of(&self, account: AccountId) -> LedgerResult<CommissionRate> {
        let mut conn = self.pool().acquire().await?;
        commission_rate_in(&mut conn, account, self.commission_policy().default_rate).await
    }

    pub async fn fee_share_rate_of(&self, account: AccountId) -> LedgerResult<f64> {
        let mut conn = self.pool().acquire().await?;
        fee_share_rate_in(&mut conn, account).await
    }

    /// Referrer chain of `account`, bounded by the configured depth cap.
    pub async fn ancestors_of(&self, account: AccountId) -> LedgerResult<AncestorChain> {
        let mut conn = self.pool().acquire().await?;
        ancestors_in(&mut conn, account, self.commission_policy().max_chain_depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_COMMISSION_RATE;

    async fn insert(store: &LedgerStore, referrer: Option<AccountId>, rate: Option<f64>) -> AccountId {
        let id = AccountId::new_random();
        sqlx::query(
            "INSERT INTO accounts (id, username, credential_hash, referrer_id, commission_rate) \
             VALUES (?, 'u', 'h', ?, ?)",
        )
        .bind(id.to_db())
        .bind(referrer.map(AccountId::to_db))
        .bind(rate)
        .execute(store.pool())
        .await
        .unwrap();
        id
    }

    #[test]
    fn test_rate_resolution() {
        let stored = CommissionRate::resolve(Some(0.5), 0.3);
        assert_eq!(stored.value, 0.5);
        assert_eq!(stored.origin, RateOrigin::Stored);

        assert_eq!(CommissionRate::resolve(Some(1.7), 0.3).value, 1.0);
        assert_eq!(CommissionRate::resolve(Some(-0.2), 0.3).value, 0.0);

        let fallback = CommissionRate::resolve(Some(f64::NAN), 0.3);
        assert_eq!(fallback.origin, RateOrigin::PlatformDefault);
        assert_eq!(CommissionRate::resolve(None, 0.3).value, 0.3);

        assert_eq!(sanitize_fee_share_rate(Some(-1.0)), 0.0);
        assert_eq!(sanitize_fee_share_rate(Some(0.05)), 0.05);
        assert_eq!(sanitize_fee_share_rate(None), 0.0);
    }

    #[tokio::test]
    async fn test_missing_rate_uses_platform_default() {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let without_rate = insert(&store, None, None).await;

        let rate = store.commission_rate_of(without_rate).await.unwrap();
        assert_eq!(rate.origin, RateOrigin::PlatformDefault);
        assert_eq!(rate.value, DEFAULT_COMMISSION_RATE);

        let ghost = store.commission_rate_of(AccountId::new_random()).await.unwrap();
        assert_eq!(ghost.origin, RateOrigin::PlatformDefault);
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_masked() {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let id = insert(&store, None, Some(0.5)).await;
        store.close().await;
        assert!(store.commission_rate_of(id).await.is_err());
    }

    #[tokio::test]
    async fn test_ancestors_nearest_first() {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let a = insert(&store, None, None).await;
        let b = insert(&store, Some(a), None).await;
        let c = insert(&store, Some(b), None).await;

        assert_eq!(store.referrer_of(c).await.unwrap(), Some(b));
        assert_eq!(store.referrer_of(a).await.unwrap(), None);

        let chain = store.ancestors_of(c).await.unwrap();
        assert_eq!(chain.ancestors, vec![b, a]);
        assert!(!chain.truncated);
    }

    #[tokio::test]
    async fn test_ancestors_of_cycle_is_bounded() {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let a = insert(&store, None, None).await;
        let b = insert(&store, Some(a), None).await;
        sqlx::query("UPDATE accounts SET referrer_id = ? WHERE id = ?")
            .bind(b.to_db())
            .bind(a.to_db())
            .execute(store.pool())
            .await
            .unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        let chain = ancestors_in(&mut conn, a, 5).await.unwrap();
        assert_eq!(chain.ancestors, vec![b, a, b, a, b]);
        assert!(chain.truncated);
    }
}
