//! Domain value types shared by the ledger modules
//!
//! Contains account identifiers, the fixed-point secondary currency, and the
//! closed tag sets written into the transaction log. Every type here knows how
//! it is represented in SQLite (`to_db` / `from_db`) so that callers never bind
//! raw strings for domain values.

use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Amount in the primary currency's smallest unit.
pub type PrimaryAmount = i64;

/// Number of fractional digits kept for fixed-point amounts.
pub const FIXED_SCALE: i64 = 18;

// ============================================================================
// Account identifiers
// ============================================================================

/// Opaque, globally unique account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Storage representation (hyphenated lowercase UUID).
    pub(crate) fn to_db(self) -> String {
        self.0.hyphenated().to_string()
    }

    /// Decode a stored identifier, reporting `column` on failure.
    pub(crate) fn from_db(column: &'static str, raw: &str) -> LedgerResult<Self> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| LedgerError::Corrupt {
                column: column.to_string(),
                details: format!("invalid account id '{}': {}", raw, e),
            })
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for AccountId {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| LedgerError::InvalidArgument(format!("malformed account id: {}", s)))
    }
}

impl From<Uuid> for AccountId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Fixed-point secondary currency
// ============================================================================

/// Non-integer currency amount with [`FIXED_SCALE`] fractional digits.
///
/// Values are truncated (never rounded up) to the fixed scale on construction,
/// and are persisted as canonical decimal text so SQLite never coerces them to
/// a float.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedAmount(BigDecimal);

impl FixedAmount {
    pub fn zero() -> Self {
        Self(BigDecimal::zero().with_scale(FIXED_SCALE))
    }

    /// Wrap a decimal, truncating digits beyond the fixed scale.
    pub fn new(value: BigDecimal) -> Self {
        Self(value.with_scale_round(FIXED_SCALE, RoundingMode::Down))
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > BigDecimal::zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    /// Multiply by a rate, truncating the product to the fixed scale.
    ///
    /// The rate enters the product through its shortest decimal representation,
    /// so `0.05` multiplies as exactly `0.05` rather than its binary expansion.
    pub fn mul_rate(&self, rate: f64) -> Self {
        Self::new(&self.0 * decimal_from_rate(rate))
    }

    pub fn checked_sub(&self, other: &FixedAmount) -> Option<Self> {
        let diff = &self.0 - &other.0;
        if diff < BigDecimal::zero() {
            None
        } else {
            Some(Self::new(diff))
        }
    }

    /// Canonical text form: optional sign, integer part, `.`, exactly 18 digits.
    pub(crate) fn to_db(&self) -> String {
        let (digits, _) = self.0.with_scale(FIXED_SCALE).as_bigint_and_exponent();
        let raw = digits.to_string();
        let (sign, body) = match raw.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", raw.as_str()),
        };
        let width = FIXED_SCALE as usize + 1;
        let padded = format!("{:0>width$}", body, width = width);
        let (whole, frac) = padded.split_at(padded.len() - FIXED_SCALE as usize);
        format!("{}{}.{}", sign, whole, frac)
    }

    pub(crate) fn from_db(column: &'static str, raw: &str) -> LedgerResult<Self> {
        BigDecimal::from_str(raw.trim())
            .map(Self::new)
            .map_err(|e| LedgerError::Corrupt {
                column: column.to_string(),
                details: format!("invalid decimal '{}': {}", raw, e),
            })
    }
}

impl Default for FixedAmount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for FixedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_db())
    }
}

impl FromStr for FixedAmount {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        BigDecimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|_| LedgerError::InvalidArgument(format!("malformed decimal amount: {}", s)))
    }
}

impl From<BigDecimal> for FixedAmount {
    fn from(value: BigDecimal) -> Self {
        Self::new(value)
    }
}

impl std::ops::Add for &FixedAmount {
    type Output = FixedAmount;

    fn add(self, rhs: &FixedAmount) -> FixedAmount {
        FixedAmount::new(&self.0 + &rhs.0)
    }
}

impl Serialize for FixedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FixedAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Exact decimal for a stored `REAL` rate.
///
/// `f64`'s `Display` yields the shortest representation that round-trips, so
/// `0.3` becomes the decimal `0.3`, not `0.299999999999999988...`.
pub(crate) fn decimal_from_rate(rate: f64) -> BigDecimal {
    if !rate.is_finite() {
        return BigDecimal::zero();
    }
    BigDecimal::from_str(&rate.to_string()).unwrap_or_else(|_| BigDecimal::zero())
}

// ============================================================================
// Transaction log tags
// ============================================================================

/// Whether a log entry adds to or removes from the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(LedgerError::InvalidArgument(format!("unknown direction: {}", other))),
        }
    }
}

/// Category tag of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogMethod {
    /// Value earned directly by the account's own activity
    Mining,
    /// Periodic income credited by the game server
    PassiveIncome,
    /// Commission leg paid to a referrer
    ReferralReward,
    /// Withdrawal of primary balance
    Claim,
    /// Fixed-point fee-share accrual
    FeeShare,
}

impl LogMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogMethod::Mining => "MINING",
            LogMethod::PassiveIncome => "PASSIVE_INCOME",
            LogMethod::ReferralReward => "REFERRAL_REWARD",
            LogMethod::Claim => "CLAIM",
            LogMethod::FeeShare => "SOL_FEE_SHARE",
        }
    }
}

impl fmt::Display for LogMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MINING" => Ok(LogMethod::Mining),
            "PASSIVE_INCOME" => Ok(LogMethod::PassiveIncome),
            "REFERRAL_REWARD" => Ok(LogMethod::ReferralReward),
            "CLAIM" => Ok(LogMethod::Claim),
            "SOL_FEE_SHARE" => Ok(LogMethod::FeeShare),
            other => Err(LedgerError::InvalidArgument(format!("unknown log method: {}", other))),
        }
    }
}

/// Settlement status of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
}

impl TxStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Success => "SUCCESS",
            TxStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        match s {
            "PENDING" => Ok(TxStatus::Pending),
            "SUCCESS" => Ok(TxStatus::Success),
            "FAILED" => Ok(TxStatus::Failed),
            other => Err(LedgerError::InvalidArgument(format!("unknown status: {}", other))),
        }
    }
}

/// Account role, which decides the commission policy administrators assign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    /// Key opinion leader with a negotiated commission and fee-share rate
    Kol,
    /// Business-development team member
    Bd,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Kol => "KOL",
            Role::Bd => "BD",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> LedgerResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "KOL" => Ok(Role::Kol),
            "BD" => Ok(Role::Bd),
            other => Err(LedgerError::InvalidArgument(format!("unknown role: {}", other))),
        }
    }
}
