//! Ledger error taxonomy
//!
//! Driver errors never leave the crate as-is: they are classified into
//! [`LedgerError`] at the operation boundary, and every variant maps onto one
//! [`ErrorKind`] callers can branch on.

use thiserror::Error;

use crate::types::{AccountId, PrimaryAmount};

/// Coarse failure class of a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No connection could be obtained (pool exhausted, closed, or misconfigured).
    Unavailable,
    /// A statement or constraint failed and the operation was rolled back.
    Rejected,
    /// Input was refused before any storage access.
    InvalidArgument,
    /// Lock contention or a lost compare-and-set; the caller may resubmit.
    Retryable,
    /// A stored value could not be decoded.
    Corrupt,
}

/// Errors returned by ledger operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("storage busy: {0}")]
    Busy(String),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("insufficient balance on {account}: have {available}, need {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: PrimaryAmount,
        requested: PrimaryAmount,
    },

    #[error("concurrent update of {field} on {account}")]
    ConcurrentUpdate {
        account: AccountId,
        field: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown referral code: {0}")]
    UnknownReferralCode(String),

    #[error("{column} on {account} would overflow by adding {delta}")]
    Overflow {
        account: AccountId,
        column: &'static str,
        delta: i64,
    },

    #[error("corrupt value in {column}: {details}")]
    Corrupt { column: String, details: String },

    /// A driver decode failure that names no column.
    #[error("undecodable value: {0}")]
    Undecodable(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Unavailable(_) => ErrorKind::Unavailable,
            LedgerError::Statement(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::Overflow { .. } => ErrorKind::Rejected,
            LedgerError::Busy(_) | LedgerError::ConcurrentUpdate { .. } => ErrorKind::Retryable,
            LedgerError::InvalidArgument(_) | LedgerError::UnknownReferralCode(_) => {
                ErrorKind::InvalidArgument
            }
            LedgerError::Corrupt { .. } | LedgerError::Undecodable(_) => ErrorKind::Corrupt,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable | ErrorKind::Unavailable)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => LedgerError::Unavailable(err.to_string()),
            sqlx::Error::Database(db) if is_contention_code(db.code().as_deref()) => {
                LedgerError::Busy(err.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => LedgerError::Corrupt {
                column: index.trim_matches('"').to_string(),
                details: source.to_string(),
            },
            sqlx::Error::Decode(_) => LedgerError::Undecodable(err.to_string()),
            _ => LedgerError::Statement(err.to_string()),
        }
    }
}

/// `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6), including their extended codes.
fn is_contention_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        let err: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_contention_codes() {
        assert!(is_contention_code(Some("5")));
        assert!(is_contention_code(Some("517")));
        assert!(is_contention_code(Some("6")));
        assert!(!is_contention_code(Some("19")));
        assert!(!is_contention_code(Some("2067")));
        assert!(!is_contention_code(None));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            LedgerError::InvalidArgument("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            LedgerError::AccountNotFound(AccountId::new_random()).kind(),
            ErrorKind::Rejected
        );
        assert!(!LedgerError::Statement("constraint".into()).is_retryable());
        let overflow = LedgerError::Overflow {
            account: AccountId::new_random(),
            column: "primary_balance",
            delta: 1,
        };
        assert_eq!(overflow.kind(), ErrorKind::Rejected);
        assert!(!overflow.is_retryable());
    }

    #[test]
    fn test_column_decode_keeps_column_name() {
        let err: LedgerError = sqlx::Error::ColumnDecode {
            index: "\"primary_balance\"".to_string(),
            source: "mismatched types".into(),
        }
        .into();
        match err {
            LedgerError::Corrupt { column, details } => {
                assert_eq!(column, "primary_balance");
                assert_eq!(details, "mismatched types");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err: LedgerError = sqlx::Error::Decode("bad bytes".into()).into();
        assert!(matches!(err, LedgerError::Undecodable(_)));
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
