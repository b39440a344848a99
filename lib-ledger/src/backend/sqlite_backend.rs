//! SQLite storage backend for the referral ledger
//!
//! # Features
//!
//! - WAL mode for concurrent readers while a writer holds the lock
//! - Foreign keys enforced on every connection
//! - Write transactions open with `BEGIN IMMEDIATE` and wait out `busy_timeout`
//! - Idempotent schema evolution on open
//! - Bounded pool with an acquisition timeout; callers queue for a connection
//!   instead of failing immediately

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error, info, warn};

use crate::config::{CommissionConfig, LedgerConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::schema::{self, SchemaReport};

/// Opening statement of every write transaction.
pub(crate) const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

/// Pooled handle to the ledger database
///
/// Cheap to clone; clones share the pool. No balances or rates are cached
/// here: every read goes to the database.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
    commission: CommissionConfig,
    debug_logging: bool,
}

impl LedgerStore {
    /// Open (or create) the database described by `config` and bring its
    /// schema up to date.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        config
            .validate()
            .map_err(|e| LedgerError::InvalidArgument(e.to_string()))?;

        let db = &config.database;
        let in_memory = db.url.contains(":memory:");
        info!(url = %db.url, in_memory, "Opening ledger database");

        let options = SqliteConnectOptions::from_str(&db.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(db.busy_timeout);

        // An in-memory database lives exactly as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(db.max_connections)
                .min_connections(db.min_connections)
                .idle_timeout(Some(db.idle_timeout))
                .max_lifetime(Some(db.max_lifetime))
        };

        let pool = pool_options
            .acquire_timeout(db.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                let err = LedgerError::from(e);
                error!(error = %err, "Could not create database connection pool");
                err
            })?;

        let report = schema::apply(&pool).await?;
        info!(
            columns_added = report.columns_added.len(),
            "Ledger database initialized"
        );

        Ok(Self {
            pool,
            commission: config.commission.clone(),
            debug_logging: config.debug,
        })
    }

    /// Open an isolated in-memory ledger with default policy (for testing).
    pub async fn open_in_memory() -> LedgerResult<Self> {
        Self::open(&LedgerConfig::in_memory()).await
    }

    /// Re-apply schema evolution. A no-op on an up-to-date database.
    pub async fn migrate(&self) -> LedgerResult<SchemaReport> {
        schema::apply(&self.pool).await
    }

    /// Close the pool, waiting for in-flight transactions to finish.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Ledger connection pool has been closed");
    }

    /// Underlying pool, for read-only collaborators and test fixtures.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn commission_policy(&self) -> &CommissionConfig {
        &self.commission
    }

    pub(crate) fn debug_logging(&self) -> bool {
        self.debug_logging
    }

    /// Acquire a connection and open the operation's transaction.
    ///
    /// The transaction takes the write lock immediately, so concurrent writers
    /// queue on `busy_timeout` instead of failing when a read snapshot cannot
    /// be upgraded.
    pub(crate) async fn begin(&self, operation: &'static str) -> LedgerResult<Transaction<'static, Sqlite>> {
        self.pool.begin_with(BEGIN_WRITE).await.map_err(|e| {
            let err = LedgerError::from(e);
            error!(operation, error = %err, "Failed to acquire connection or start transaction");
            err
        })
    }

    /// Commit on success, roll back on failure; the connection returns to the
    /// pool on every path.
    pub(crate) async fn finish<T>(
        &self,
        tx: Transaction<'static, Sqlite>,
        operation: &'static str,
        result: LedgerResult<T>,
    ) -> LedgerResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await.map_err(|e| {
                    let err = LedgerError::from(e);
                    error!(operation, error = %err, "Commit failed");
                    err
                })?;
                debug!(operation, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                error!(operation, error = %err, "Operation failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(operation, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
