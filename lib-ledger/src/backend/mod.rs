//! Storage backend
//!
//! The ledger runs on a pooled SQLite database. [`LedgerStore`] owns the pool
//! and hands every public operation exactly one transaction for its whole
//! duration; the primitives in the other modules receive that transaction as
//! an explicit `&mut SqliteConnection`.

pub mod sqlite_backend;

pub use sqlite_backend::LedgerStore;
