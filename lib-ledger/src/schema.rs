//! Schema store
//!
//! Creates the ledger tables and evolves them column by column. Every step is
//! a no-op when already applied, and the whole pass runs in one transaction,
//! so `apply` is safe to call on every startup against any earlier layout.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info};

use crate::backend::sqlite_backend::BEGIN_WRITE;
use crate::error::{LedgerError, LedgerResult};

/// Tables in their oldest shape; later columns arrive through [`COLUMN_ADDITIONS`].
const BASE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL,
    credential_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS referral_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    referrer_id TEXT NOT NULL REFERENCES accounts(id),
    referred_id TEXT NOT NULL REFERENCES accounts(id),
    code TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS transaction_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL REFERENCES accounts(id),
    direction TEXT NOT NULL CHECK (direction IN ('IN', 'OUT')),
    method TEXT NOT NULL,
    primary_amount INTEGER NOT NULL DEFAULT 0,
    secondary_amount TEXT,
    external_ref TEXT,
    status TEXT NOT NULL DEFAULT 'SUCCESS',
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS upgrade_state (
    account_id TEXT PRIMARY KEY NOT NULL REFERENCES accounts(id),
    speed INTEGER NOT NULL DEFAULT 0,
    inventory INTEGER NOT NULL DEFAULT 0,
    reset_cooldown INTEGER NOT NULL DEFAULT 0,
    passive_income INTEGER NOT NULL DEFAULT 0,
    mining_area INTEGER NOT NULL DEFAULT 0
);
"#;

struct ColumnAddition {
    table: &'static str,
    column: &'static str,
    definition: &'static str,
}

const COLUMN_ADDITIONS: &[ColumnAddition] = &[
    ColumnAddition {
        table: "accounts",
        column: "primary_balance",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    ColumnAddition {
        table: "accounts",
        column: "secondary_balance",
        definition: "TEXT NOT NULL DEFAULT '0.000000000000000000'",
    },
    ColumnAddition {
        table: "accounts",
        column: "referral_code",
        definition: "TEXT CHECK (referral_code IS NULL OR length(referral_code) = 6)",
    },
    ColumnAddition {
        table: "accounts",
        column: "referrer_id",
        definition: "TEXT REFERENCES accounts(id)",
    },
    ColumnAddition {
        table: "accounts",
        column: "commission_rate",
        definition: "REAL DEFAULT 0.3",
    },
    ColumnAddition {
        table: "accounts",
        column: "fee_share_rate",
        definition: "REAL DEFAULT 0",
    },
    ColumnAddition {
        table: "accounts",
        column: "cumulative_commission",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    ColumnAddition {
        table: "accounts",
        column: "direct_referral_count",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    ColumnAddition {
        table: "accounts",
        column: "all_referral_count",
        definition: "INTEGER NOT NULL DEFAULT 0",
    },
    ColumnAddition {
        table: "accounts",
        column: "cumulative_fee_share",
        definition: "TEXT NOT NULL DEFAULT '0.000000000000000000'",
    },
    ColumnAddition {
        table: "accounts",
        column: "last_login",
        definition: "INTEGER",
    },
    ColumnAddition {
        table: "accounts",
        column: "role",
        definition: "TEXT NOT NULL DEFAULT 'USER'",
    },
    ColumnAddition {
        table: "accounts",
        column: "payout_address",
        definition: "TEXT",
    },
    ColumnAddition {
        table: "transaction_log",
        column: "source_account_id",
        definition: "TEXT REFERENCES accounts(id)",
    },
];

/// Indexes are created after column evolution since several cover added columns.
const INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_referral_code ON accounts(referral_code);
CREATE INDEX IF NOT EXISTS idx_accounts_referrer ON accounts(referrer_id);
CREATE INDEX IF NOT EXISTS idx_accounts_payout_address ON accounts(payout_address);
CREATE INDEX IF NOT EXISTS idx_referral_edges_referrer ON referral_edges(referrer_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_referral_edges_referred ON referral_edges(referred_id);
CREATE INDEX IF NOT EXISTS idx_referral_edges_created_at ON referral_edges(created_at);
CREATE INDEX IF NOT EXISTS idx_transaction_log_account ON transaction_log(account_id, id);
CREATE INDEX IF NOT EXISTS idx_transaction_log_method ON transaction_log(method);
CREATE INDEX IF NOT EXISTS idx_transaction_log_source ON transaction_log(source_account_id);
"#;

/// Outcome of one schema pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// `table.column` for every column this pass added.
    pub columns_added: Vec<String>,
}

/// Bring the schema up to date in a single transaction.
pub(crate) async fn apply(pool: &SqlitePool) -> LedgerResult<SchemaReport> {
    let mut tx = pool.begin_with(BEGIN_WRITE).await?;

    let result = evolve(&mut tx).await;
    match result {
        Ok(report) => {
            tx.commit().await?;
            if report.columns_added.is_empty() {
                debug!("Schema already up to date");
            } else {
                info!(columns = ?report.columns_added, "Schema evolved");
            }
            Ok(report)
        }
        Err(err) => {
            error!(error = %err, "Schema evolution failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Schema rollback failed");
            }
            Err(err)
        }
    }
}

async fn evolve(conn: &mut SqliteConnection) -> LedgerResult<SchemaReport> {
    sqlx::raw_sql(BASE_TABLES).execute(&mut *conn).await?;

    let mut report = SchemaReport::default();
    for addition in COLUMN_ADDITIONS {
        if column_exists(conn, addition.table, addition.column).await? {
            continue;
        }
        let ddl = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            addition.table, addition.column, addition.definition
        );
        sqlx::raw_sql(&ddl).execute(&mut *conn).await.map_err(|e| {
            LedgerError::Statement(format!(
                "adding {}.{}: {}",
                addition.table, addition.column, e
            ))
        })?;
        report
            .columns_added
            .push(format!("{}.{}", addition.table, addition.column));
    }

    sqlx::raw_sql(INDEXES).execute(&mut *conn).await?;
    Ok(report)
}

async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> LedgerResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn bare_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_gets_every_column() {
        let pool = bare_pool().await;
        let report = apply(&pool).await.unwrap();
        assert_eq!(report.columns_added.len(), COLUMN_ADDITIONS.len());

        let mut conn = pool.acquire().await.unwrap();
        for addition in COLUMN_ADDITIONS {
            assert!(column_exists(&mut conn, addition.table, addition.column)
                .await
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let pool = bare_pool().await;
        apply(&pool).await.unwrap();
        let again = apply(&pool).await.unwrap();
        assert!(again.columns_added.is_empty());
    }

    #[tokio::test]
    async fn test_partially_evolved_database() {
        let pool = bare_pool().await;
        sqlx::raw_sql(
            "CREATE TABLE accounts (
                 id TEXT PRIMARY KEY NOT NULL,
                 username TEXT NOT NULL,
                 credential_hash TEXT NOT NULL,
                 created_at INTEGER NOT NULL DEFAULT 0,
                 primary_balance INTEGER NOT NULL DEFAULT 0
             );
             INSERT INTO accounts (id, username, credential_hash, primary_balance)
             VALUES ('00000000-0000-0000-0000-000000000001', 'legacy', 'h', 42);",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = apply(&pool).await.unwrap();
        assert!(!report
            .columns_added
            .contains(&"accounts.primary_balance".to_string()));
        assert!(report
            .columns_added
            .contains(&"accounts.commission_rate".to_string()));

        // Existing rows keep their data and pick up column defaults
        let (balance, rate, role): (i64, f64, String) = sqlx::query_as(
            "SELECT primary_balance, commission_rate, role FROM accounts WHERE username = 'legacy'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(balance, 42);
        assert_eq!(rate, 0.3);
        assert_eq!(role, "USER");
    }

    #[tokio::test]
    async fn test_referral_code_unique_index() {
        let pool = bare_pool().await;
        apply(&pool).await.unwrap();
        sqlx::raw_sql(
            "INSERT INTO accounts (id, username, credential_hash, referral_code) VALUES ('a', 'a', 'h', 'ABC123');",
        )
        .execute(&pool)
        .await
        .unwrap();
        let dup = sqlx::raw_sql(
            "INSERT INTO accounts (id, username, credential_hash, referral_code) VALUES ('b', 'b', 'h', 'ABC123');",
        )
        .execute(&pool)
        .await;
        assert!(dup.is_err());
    }
}
