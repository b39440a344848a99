//! Commission propagation engine
//!
//! A credit to one account pays a commission to its referrer, that commission
//! pays a commission to the referrer's referrer, and so on up the chain. Each
//! leg is computed from the previous leg (not the original base), so the legs
//! shrink geometrically:
//!
//! ```text
//! leg_0 = base
//! leg_k = floor(leg_{k-1} * rate_k)
//! ```
//!
//! The walk stops at the first account without a referrer, at the first leg
//! that rounds down to zero, or at the configured depth cap, whichever comes
//! first. The whole chain commits in one transaction or not at all.
//!
//! None of these operations is idempotent: submitting the same credit twice
//! pays every leg twice.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::backend::LedgerStore;
use crate::error::{LedgerError, LedgerResult};
use crate::graph;
use crate::model::NewLogEntry;
use crate::types::{decimal_from_rate, AccountId, LogMethod, PrimaryAmount};
use crate::writer::{self, Counter};

/// `floor(base * rate)`, computed exactly from the rate's decimal form.
///
/// Rates outside `[0, 1]` are clamped, so the result never exceeds `base`.
pub fn commission_for(base: PrimaryAmount, rate: f64) -> PrimaryAmount {
    if base <= 0 || !rate.is_finite() || rate <= 0.0 {
        return 0;
    }
    let product = BigDecimal::from(base) * decimal_from_rate(rate.min(1.0));
    product
        .with_scale_round(0, RoundingMode::Down)
        .to_i64()
        .unwrap_or(0)
}

/// One credit applied during propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionLeg {
    pub account: AccountId,
    pub amount: PrimaryAmount,
    /// 0 for the seed credit, 1 for its direct referrer, and so on.
    pub level: u32,
    /// Sequence id of the log row written for this leg.
    pub log_id: i64,
}

/// Why a chain walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainStop {
    NoReferrer,
    CommissionExhausted,
    DepthLimit,
}

/// Legs applied by one propagation, seed first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub legs: Vec<CommissionLeg>,
    pub stop: ChainStop,
}

impl PropagationReport {
    /// Sum of every leg, seed included.
    pub fn total_credited(&self) -> PrimaryAmount {
        self.legs.iter().map(|leg| leg.amount).sum()
    }

    /// Sum of the referral legs only.
    pub fn total_commission(&self) -> PrimaryAmount {
        self.legs
            .iter()
            .filter(|leg| leg.level > 0)
            .map(|leg| leg.amount)
            .sum()
    }
}

/// Result of one entry of a passive-income batch
#[derive(Debug)]
pub struct BatchOutcome {
    pub account: AccountId,
    pub result: LedgerResult<PropagationReport>,
}

fn ensure_non_negative(amount: PrimaryAmount) -> LedgerResult<()> {
    if amount < 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "amount must be non-negative, got {}",
            amount
        )));
    }
    Ok(())
}

impl LedgerStore {
    /// Credit `seed` with `base` and pay commissions up its referrer chain.
    ///
    /// `source` is the account whose action produced the value. The seed leg
    /// is logged as `MINING` when `source == seed` and as `REFERRAL_REWARD`
    /// otherwise; every referral leg records `source`.
    pub async fn propagate(
        &self,
        seed: AccountId,
        base: PrimaryAmount,
        source: AccountId,
    ) -> LedgerResult<PropagationReport> {
        ensure_non_negative(base)?;

        let mut tx = self.begin("propagate").await?;
        let result = self.propagate_in(&mut tx, seed, base, source).await;
        let report = self.finish(tx, "propagate", result).await?;

        info!(
            seed = %seed,
            base,
            legs = report.legs.len(),
            stop = ?report.stop,
            "Commission propagated"
        );
        Ok(report)
    }

    /// Pay commissions on `base` up the chain of `account` without crediting
    /// `account` itself.
    pub async fn distribute_commissions(
        &self,
        account: AccountId,
        base: PrimaryAmount,
    ) -> LedgerResult<PropagationReport> {
        ensure_non_negative(base)?;

        let mut tx = self.begin("distribute_commissions").await?;
        let result = async {
            let mut legs = Vec::new();
            let stop = self.walk_chain(&mut tx, account, base, account, &mut legs).await?;
            Ok::<_, LedgerError>(PropagationReport { legs, stop })
        }
        .await;
        self.finish(tx, "distribute_commissions", result).await
    }

    /// Apply one referral leg directly to `referrer`, with itself as source.
    pub async fn add_referral_reward(
        &self,
        referrer: AccountId,
        amount: PrimaryAmount,
    ) -> LedgerResult<i64> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "referral reward must be positive, got {}",
                amount
            )));
        }

        let mut tx = self.begin("add_referral_reward").await?;
        let result = self.apply_leg(&mut tx, referrer, amount, referrer).await;
        self.finish(tx, "add_referral_reward", result).await
    }

    /// Plain credit with one log row; no referral chain is touched.
    pub async fn credit_without_commission(
        &self,
        account: AccountId,
        amount: PrimaryAmount,
        method: LogMethod,
    ) -> LedgerResult<i64> {
        ensure_non_negative(amount)?;

        let mut tx = self.begin("credit_without_commission").await?;
        let result = async {
            writer::credit_primary(&mut tx, account, amount).await?;
            self.append_log(
                &mut tx,
                NewLogEntry::credit(account, method, amount).with_source(account),
            )
            .await
        }
        .await;
        self.finish(tx, "credit_without_commission", result).await
    }

    /// Propagate each positive entry in its own transaction.
    ///
    /// A failing entry does not affect the others; every outcome is reported.
    /// Entries are processed in account order.
    pub async fn credit_passive_income_batch(
        &self,
        income: &BTreeMap<AccountId, PrimaryAmount>,
    ) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(income.len());
        for (&account, &amount) in income {
            if amount <= 0 {
                continue;
            }
            let result = self.propagate(account, amount, account).await;
            outcomes.push(BatchOutcome { account, result });
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            warn!(processed = outcomes.len(), failed, "Passive income batch had failures");
        } else {
            info!(processed = outcomes.len(), "Passive income batch processed");
        }
        outcomes
    }

    async fn propagate_in(
        &self,
        conn: &mut SqliteConnection,
        seed: AccountId,
        base: PrimaryAmount,
        source: AccountId,
    ) -> LedgerResult<PropagationReport> {
        writer::credit_primary(conn, seed, base).await?;
        let method = if source == seed {
            LogMethod::Mining
        } else {
            LogMethod::ReferralReward
        };
        let log_id = self
            .append_log(conn, NewLogEntry::credit(seed, method, base).with_source(source))
            .await?;

        let mut legs = vec![CommissionLeg {
            account: seed,
            amount: base,
            level: 0,
            log_id,
        }];
        let stop = self.walk_chain(conn, seed, base, source, &mut legs).await?;
        Ok(PropagationReport { legs, stop })
    }

    /// Walk upward from `start`, appending each applied leg to `legs`.
    async fn walk_chain(
        &self,
        conn: &mut SqliteConnection,
        start: AccountId,
        base: PrimaryAmount,
        source: AccountId,
        legs: &mut Vec<CommissionLeg>,
    ) -> LedgerResult<ChainStop> {
        let policy = self.commission_policy();
        let mut current = start;
        let mut leg_base = base;

        for level in 1..=policy.max_chain_depth {
            let Some(referrer) = graph::referrer_in(conn, current).await? else {
                return Ok(ChainStop::NoReferrer);
            };
            let rate = graph::commission_rate_in(conn, referrer, policy.default_rate).await?;
            let commission = commission_for(leg_base, rate.value);
            if commission <= 0 {
                return Ok(ChainStop::CommissionExhausted);
            }

            let log_id = self.apply_leg(conn, referrer, commission, source).await?;
            legs.push(CommissionLeg {
                account: referrer,
                amount: commission,
                level,
                log_id,
            });

            current = referrer;
            leg_base = commission;
        }

        if graph::referrer_in(conn, current).await?.is_none() {
            return Ok(ChainStop::NoReferrer);
        }
        warn!(
            start = %start,
            max_chain_depth = policy.max_chain_depth,
            last = %current,
            "Referral chain reached the depth cap; stopping propagation"
        );
        Ok(ChainStop::DepthLimit)
    }

    /// Credit, log, and accumulate one referral leg.
    async fn apply_leg(
        &self,
        conn: &mut SqliteConnection,
        referrer: AccountId,
        amount: PrimaryAmount,
        source: AccountId,
    ) -> LedgerResult<i64> {
        writer::credit_primary(conn, referrer, amount).await?;
        let log_id = self
            .append_log(
                conn,
                NewLogEntry::credit(referrer, LogMethod::ReferralReward, amount).with_source(source),
            )
            .await?;
        writer::bump(conn, referrer, Counter::CumulativeCommission, amount).await?;
        Ok(log_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_commission_for_truncates() {
        assert_eq!(commission_for(100, 0.3), 30);
        assert_eq!(commission_for(1, 0.3), 0);
        assert_eq!(commission_for(10, 0.3), 3);
        assert_eq!(commission_for(100, 0.5), 50);
        assert_eq!(commission_for(50, 0.5), 25);
        assert_eq!(commission_for(7, 0.29), 2);
    }

    #[test]
    fn test_commission_for_decimal_exactness() {
        // 0.29 * 100 is 28.999999999999996 in binary floating point
        assert_eq!(commission_for(100, 0.29), 29);
        assert_eq!(commission_for(1000, 0.07), 70);
    }

    #[test]
    fn test_commission_for_degenerate_inputs() {
        assert_eq!(commission_for(0, 0.3), 0);
        assert_eq!(commission_for(-5, 0.3), 0);
        assert_eq!(commission_for(100, 0.0), 0);
        assert_eq!(commission_for(100, f64::NAN), 0);
        assert_eq!(commission_for(100, 2.0), 100);
        assert_eq!(commission_for(i64::MAX, 1.0), i64::MAX);
    }

    proptest! {
        #[test]
        fn prop_leg_never_exceeds_base(base in 0i64..=i64::MAX / 2, rate in 0.0f64..=1.0) {
            let leg = commission_for(base, rate);
            prop_assert!(leg >= 0);
            prop_assert!(leg <= base);
        }

        #[test]
        fn prop_chain_of_legs_is_non_increasing(
            base in 0i64..1_000_000_000,
            rates in proptest::collection::vec(0.0f64..=1.0, 1..20),
        ) {
            let mut previous = base;
            for rate in rates {
                let leg = commission_for(previous, rate);
                prop_assert!(leg <= previous);
                previous = leg;
            }
        }
    }
}
