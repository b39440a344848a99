//! Per-account upgrade levels
//!
//! Each account has one `upgrade_state` row holding a small counter per
//! [`UpgradeTrack`]. The row is created lazily on first access.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::types::AccountId;

/// Upgradeable gameplay track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeTrack {
    Speed,
    Inventory,
    ResetCooldown,
    PassiveIncome,
    MiningArea,
}

impl UpgradeTrack {
    pub const ALL: [UpgradeTrack; 5] = [
        UpgradeTrack::Speed,
        UpgradeTrack::Inventory,
        UpgradeTrack::ResetCooldown,
        UpgradeTrack::PassiveIncome,
        UpgradeTrack::MiningArea,
    ];

    /// Track name, which is also its `upgrade_state` column.
    pub const fn as_str(&self) -> &'static str {
        match self {
            UpgradeTrack::Speed => "speed",
            UpgradeTrack::Inventory => "inventory",
            UpgradeTrack::ResetCooldown => "reset_cooldown",
            UpgradeTrack::PassiveIncome => "passive_income",
            UpgradeTrack::MiningArea => "mining_area",
        }
    }
}

impl fmt::Display for UpgradeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpgradeTrack {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        UpgradeTrack::ALL
            .into_iter()
            .find(|track| track.as_str() == wanted)
            .ok_or_else(|| LedgerError::InvalidArgument(format!("unknown upgrade track: {}", s)))
    }
}

/// All upgrade levels of one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
pub struct UpgradeLevels {
    pub speed: i64,
    pub inventory: i64,
    pub reset_cooldown: i64,
    pub passive_income: i64,
    pub mining_area: i64,
}

impl UpgradeLevels {
    pub fn get(&self, track: UpgradeTrack) -> i64 {
        match track {
            UpgradeTrack::Speed => self.speed,
            UpgradeTrack::Inventory => self.inventory,
            UpgradeTrack::ResetCooldown => self.reset_cooldown,
            UpgradeTrack::PassiveIncome => self.passive_income,
            UpgradeTrack::MiningArea => self.mining_area,
        }
    }
}

fn ensure_level(level: i64) -> LedgerResult<()> {
    if level < 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "upgrade level must be non-negative, got {}",
            level
        )));
    }
    Ok(())
}

impl LedgerStore {
    /// Current level on `track`, creating the default row when absent.
    pub async fn upgrade_level(&self, account: AccountId, track: UpgradeTrack) -> LedgerResult<i64> {
        Ok(self.upgrade_levels(account).await?.get(track))
    }

    /// Every level of `account`, creating the default row when absent.
    pub async fn upgrade_levels(&self, account: AccountId) -> LedgerResult<UpgradeLevels> {
        let mut tx = self.begin("upgrade_levels").await?;
        let result = async {
            sqlx::query("INSERT INTO upgrade_state (account_id) VALUES (?) ON CONFLICT (account_id) DO NOTHING")
                .bind(account.to_db())
                .execute(&mut *tx)
                .await?;
            let levels: UpgradeLevels = sqlx::query_as(
                "SELECT speed, inventory, reset_cooldown, passive_income, mining_area \
                 FROM upgrade_state WHERE account_id = ?",
            )
            .bind(account.to_db())
            .fetch_one(&mut *tx)
            .await?;
            Ok::<_, LedgerError>(levels)
        }
        .await;
        self.finish(tx, "upgrade_levels", result).await
    }

    pub async fn set_upgrade_level(
        &self,
        account: AccountId,
        track: UpgradeTrack,
        level: i64,
    ) -> LedgerResult<()> {
        ensure_level(level)?;
        let sql = format!(
            "INSERT INTO upgrade_state (account_id, {col}) VALUES (?, ?) \
             ON CONFLICT (account_id) DO UPDATE SET {col} = excluded.{col}",
            col = track.as_str()
        );
        sqlx::query(&sql)
            .bind(account.to_db())
            .bind(level)
            .execute(self.pool())
            .await?;

        info!(account = %account, track = %track, level, "Upgrade level set");
        Ok(())
    }

    /// Raise the level on `track` by one in a single statement; returns the new level.
    pub async fn increment_upgrade_level(
        &self,
        account: AccountId,
        track: UpgradeTrack,
    ) -> LedgerResult<i64> {
        let sql = format!(
            "INSERT INTO upgrade_state (account_id, {col}) VALUES (?, 1) \
             ON CONFLICT (account_id) DO UPDATE SET {col} = {col} + 1 \
             RETURNING {col}",
            col = track.as_str()
        );
        let level: i64 = sqlx::query_scalar(&sql)
            .bind(account.to_db())
            .fetch_one(self.pool())
            .await?;

        info!(account = %account, track = %track, level, "Upgrade level incremented");
        Ok(level)
    }

    /// Zero every track of `account`.
    pub async fn reset_upgrades(&self, account: AccountId) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE upgrade_state SET speed = 0, inventory = 0, reset_cooldown = 0, \
             passive_income = 0, mining_area = 0 WHERE account_id = ?",
        )
        .bind(account.to_db())
        .execute(self.pool())
        .await?;

        info!(account = %account, "Upgrades reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registration::Registration;

    async fn store_with_account() -> (LedgerStore, AccountId) {
        let store = LedgerStore::open_in_memory().await.unwrap();
        let id = AccountId::new_random();
        store.register(Registration::new(id, "digger", "hash")).await.unwrap();
        (store, id)
    }

    #[test]
    fn test_track_names() {
        assert_eq!("reset_cooldown".parse::<UpgradeTrack>().unwrap(), UpgradeTrack::ResetCooldown);
        assert_eq!("SPEED".parse::<UpgradeTrack>().unwrap(), UpgradeTrack::Speed);
        let err = "upgrade_speed; DROP TABLE accounts".parse::<UpgradeTrack>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_level_defaults_to_zero() {
        let (store, id) = store_with_account().await;
        assert_eq!(store.upgrade_level(id, UpgradeTrack::Inventory).await.unwrap(), 0);
        assert_eq!(store.upgrade_levels(id).await.unwrap(), UpgradeLevels::default());
    }

    #[tokio::test]
    async fn test_set_increment_reset() {
        let (store, id) = store_with_account().await;

        store.set_upgrade_level(id, UpgradeTrack::Speed, 4).await.unwrap();
        assert_eq!(store.increment_upgrade_level(id, UpgradeTrack::Speed).await.unwrap(), 5);
        assert_eq!(store.increment_upgrade_level(id, UpgradeTrack::MiningArea).await.unwrap(), 1);

        let levels = store.upgrade_levels(id).await.unwrap();
        assert_eq!(levels.speed, 5);
        assert_eq!(levels.mining_area, 1);
        assert_eq!(levels.inventory, 0);

        store.reset_upgrades(id).await.unwrap();
        assert_eq!(store.upgrade_levels(id).await.unwrap(), UpgradeLevels::default());
    }

    #[tokio::test]
    async fn test_first_increment_creates_row() {
        let (store, id) = store_with_account().await;
        assert_eq!(store.increment_upgrade_level(id, UpgradeTrack::PassiveIncome).await.unwrap(), 1);
        assert_eq!(store.upgrade_level(id, UpgradeTrack::PassiveIncome).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_negative_level_rejected() {
        let (store, id) = store_with_account().await;
        let err = store
            .set_upgrade_level(id, UpgradeTrack::Speed, -1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unknown_account_rejected() {
        let (store, _) = store_with_account().await;
        let err = store
            .increment_upgrade_level(AccountId::new_random(), UpgradeTrack::Speed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }
}
