//! Referral commission ledger
//!
//! Per-account balances, a multi-level referral tree, and an append-only
//! transaction log on SQLite. Every balance mutation and the referral payouts
//! it triggers commit atomically.
//!
//! ```no_run
//! use lib_ledger::{AccountId, LedgerStore, Registration};
//!
//! # async fn demo() -> lib_ledger::LedgerResult<()> {
//! let store = LedgerStore::open_in_memory().await?;
//! let miner = AccountId::new_random();
//! store.register(Registration::new(miner, "miner", "argon2-hash")).await?;
//! let report = store.propagate(miner, 100, miner).await?;
//! assert_eq!(report.total_credited(), 100);
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod backend;
pub mod commission;
pub mod config;
pub mod error;
pub mod fee_share;
pub mod graph;
pub mod model;
pub mod queries;
pub mod referral_code;
pub mod registration;
pub mod schema;
pub mod types;
pub mod upgrades;
mod writer;

pub use accounts::ReferralCounts;
pub use backend::LedgerStore;
pub use commission::{commission_for, BatchOutcome, ChainStop, CommissionLeg, PropagationReport};
pub use config::{CommissionConfig, ConfigError, DatabaseConfig, LedgerConfig};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use fee_share::{FeeShareAccrual, LEDGER_ONLY_REF};
pub use graph::{AncestorChain, CommissionRate, RateOrigin};
pub use model::{Account, NewLogEntry, ReferralEdge, TransactionLogEntry};
pub use referral_code::ReferralCode;
pub use registration::{ReferralSource, Registration, RegistrationReceipt};
pub use schema::SchemaReport;
pub use types::{AccountId, Direction, FixedAmount, LogMethod, PrimaryAmount, Role, TxStatus};
pub use upgrades::{UpgradeLevels, UpgradeTrack};
