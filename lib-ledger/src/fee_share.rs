//! Fee-share distribution
//!
//! When an account pays a fee in the secondary currency, its direct referrer
//! accrues `paid * fee_share_rate` to a cumulative fee-share total. Only one
//! level is paid. Nothing is transferred anywhere: the accrual is recorded in
//! the ledger with the external reference [`LEDGER_ONLY_REF`] and paid out by
//! an external process.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::graph;
use crate::model::NewLogEntry;
use crate::types::{AccountId, FixedAmount, LogMethod};
use crate::writer::{self, FixedColumn};

/// External reference recorded on accruals that moved no funds.
pub const LEDGER_ONLY_REF: &str = "DATABASE_ONLY";

/// Fee share credited to a referrer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeShareAccrual {
    pub referrer: AccountId,
    pub amount: FixedAmount,
    /// Referrer's cumulative fee share after this accrual.
    pub cumulative: FixedAmount,
    pub log_id: i64,
}

impl LedgerStore {
    /// Accrue the fee share of `paid` to the payer's direct referrer.
    ///
    /// Returns `None` when the payer has no referrer or the share truncates to
    /// zero. Concurrent accruals to the same referrer queue on the write lock.
    pub async fn share_fee(
        &self,
        payer: AccountId,
        paid: &FixedAmount,
    ) -> LedgerResult<Option<FeeShareAccrual>> {
        if paid.is_negative() {
            return Err(LedgerError::InvalidArgument(format!(
                "fee amount must be non-negative, got {}",
                paid
            )));
        }

        let mut tx = self.begin("share_fee").await?;
        let result = self.share_fee_in(&mut tx, payer, paid).await;
        let accrual = self.finish(tx, "share_fee", result).await?;

        match &accrual {
            Some(accrual) => info!(
                payer = %payer,
                referrer = %accrual.referrer,
                amount = %accrual.amount,
                "Fee share accrued"
            ),
            None => debug!(payer = %payer, "No fee share due"),
        }
        Ok(accrual)
    }

    async fn share_fee_in(
        &self,
        conn: &mut SqliteConnection,
        payer: AccountId,
        paid: &FixedAmount,
    ) -> LedgerResult<Option<FeeShareAccrual>> {
        let Some(referrer) = graph::referrer_in(conn, payer).await? else {
            return Ok(None);
        };

        let rate = graph::fee_share_rate_in(conn, referrer).await?;
        if rate <= 0.0 {
            return Ok(None);
        }

        let amount = paid.mul_rate(rate);
        if !amount.is_positive() {
            return Ok(None);
        }

        let cumulative =
            writer::add_fixed(conn, referrer, FixedColumn::CumulativeFeeShare, &amount).await?;
        let log_id = self
            .append_log(
                conn,
                NewLogEntry::credit(referrer, LogMethod::FeeShare, 0)
                    .with_secondary(amount.clone())
                    .with_external_ref(LEDGER_ONLY_REF)
                    .with_source(payer),
            )
            .await?;

        Ok(Some(FeeShareAccrual {
            referrer,
            amount,
            cumulative,
            log_id,
        }))
    }
}
