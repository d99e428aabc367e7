//! KYC tiers and the limit-policy vocabulary.
//!
//! A tier caps how much an account may deposit, withdraw, and trade inside
//! rolling 24-hour and 30-day windows. The caps are configuration
//! ([`TierTable`]), not logic: the policy engine only compares window usage
//! against whatever table it is given.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// KYC verification level. Higher tiers unlock higher limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum KycTier {
    /// No verification: everything capped at zero.
    Unverified,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl std::fmt::Display for KycTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified => write!(f, "UNVERIFIED"),
            Self::Bronze => write!(f, "BRONZE"),
            Self::Silver => write!(f, "SILVER"),
            Self::Gold => write!(f, "GOLD"),
            Self::Platinum => write!(f, "PLATINUM"),
        }
    }
}

/// The operation kinds the limit policy gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitOp {
    Deposit,
    Withdraw,
    Trade,
}

impl std::fmt::Display for LimitOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdraw => write!(f, "WITHDRAW"),
            Self::Trade => write!(f, "TRADE"),
        }
    }
}

/// The rolling windows a cap applies over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitWindow {
    /// Rolling 24 hours.
    Day,
    /// Rolling 30 days.
    Month,
}

impl LimitWindow {
    /// The span of this window.
    #[must_use]
    pub fn span(self) -> chrono::Duration {
        match self {
            Self::Day => chrono::Duration::hours(24),
            Self::Month => chrono::Duration::days(30),
        }
    }
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "24H"),
            Self::Month => write!(f, "30D"),
        }
    }
}

/// Per-tier caps. `None` means uncapped; `Some(0)` denies everything.
///
/// Caps apply per currency: the window usage is summed per (account,
/// operation, currency) and compared against the same cap value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub deposit_day: Option<Decimal>,
    pub deposit_month: Option<Decimal>,
    pub withdraw_day: Option<Decimal>,
    pub withdraw_month: Option<Decimal>,
    pub trade_day: Option<Decimal>,
    pub trade_month: Option<Decimal>,
}

impl TierLimits {
    /// All operations capped at zero (the Unverified tier).
    #[must_use]
    pub fn locked() -> Self {
        Self {
            deposit_day: Some(Decimal::ZERO),
            deposit_month: Some(Decimal::ZERO),
            withdraw_day: Some(Decimal::ZERO),
            withdraw_month: Some(Decimal::ZERO),
            trade_day: Some(Decimal::ZERO),
            trade_month: Some(Decimal::ZERO),
        }
    }

    /// No caps at all.
    #[must_use]
    pub fn uncapped() -> Self {
        Self {
            deposit_day: None,
            deposit_month: None,
            withdraw_day: None,
            withdraw_month: None,
            trade_day: None,
            trade_month: None,
        }
    }

    /// Daily caps, with the 30-day caps derived via
    /// [`constants::MONTH_CAP_MULTIPLIER`].
    #[must_use]
    pub fn daily(deposit: i64, withdraw: i64, trade: i64) -> Self {
        let monthly = constants::MONTH_CAP_MULTIPLIER;
        Self {
            deposit_day: Some(Decimal::new(deposit, 0)),
            deposit_month: Some(Decimal::new(deposit * monthly, 0)),
            withdraw_day: Some(Decimal::new(withdraw, 0)),
            withdraw_month: Some(Decimal::new(withdraw * monthly, 0)),
            trade_day: Some(Decimal::new(trade, 0)),
            trade_month: Some(Decimal::new(trade * monthly, 0)),
        }
    }

    /// The cap for one operation in one window.
    #[must_use]
    pub fn cap(&self, op: LimitOp, window: LimitWindow) -> Option<Decimal> {
        match (op, window) {
            (LimitOp::Deposit, LimitWindow::Day) => self.deposit_day,
            (LimitOp::Deposit, LimitWindow::Month) => self.deposit_month,
            (LimitOp::Withdraw, LimitWindow::Day) => self.withdraw_day,
            (LimitOp::Withdraw, LimitWindow::Month) => self.withdraw_month,
            (LimitOp::Trade, LimitWindow::Day) => self.trade_day,
            (LimitOp::Trade, LimitWindow::Month) => self.trade_month,
        }
    }
}

/// The full tier → limits table. Configuration, not logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    pub unverified: TierLimits,
    pub bronze: TierLimits,
    pub silver: TierLimits,
    pub gold: TierLimits,
    pub platinum: TierLimits,
}

impl TierTable {
    /// Look up the limits for a tier.
    #[must_use]
    pub fn limits(&self, tier: KycTier) -> &TierLimits {
        match tier {
            KycTier::Unverified => &self.unverified,
            KycTier::Bronze => &self.bronze,
            KycTier::Silver => &self.silver,
            KycTier::Gold => &self.gold,
            KycTier::Platinum => &self.platinum,
        }
    }

    /// A table with no caps on any tier. Test / sandbox use.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            unverified: TierLimits::uncapped(),
            bronze: TierLimits::uncapped(),
            silver: TierLimits::uncapped(),
            gold: TierLimits::uncapped(),
            platinum: TierLimits::uncapped(),
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            unverified: TierLimits::locked(),
            bronze: TierLimits::daily(50_000_000, 10_000_000, 100_000_000),
            silver: TierLimits::daily(200_000_000, 50_000_000, 400_000_000),
            gold: TierLimits::daily(1_000_000_000, 200_000_000, 2_000_000_000),
            platinum: TierLimits {
                trade_day: None,
                trade_month: None,
                ..TierLimits::daily(5_000_000_000, 1_000_000_000, 0)
            },
        }
    }
}

/// The outcome of a limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitDecision {
    /// The operation fits inside every applicable window.
    Allow,
    /// The operation would breach a cap.
    Deny(LimitDenial),
}

impl LimitDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Map `Deny` to [`ClearbookError::LimitExceeded`] for callers that
    /// propagate with `?`.
    ///
    /// # Errors
    /// Returns the denial as `LimitExceeded` when the decision is `Deny`.
    pub fn into_result(self) -> Result<(), crate::error::ClearbookError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(denial) => Err(crate::error::ClearbookError::LimitExceeded(denial)),
        }
    }
}

/// Why a limit check denied an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDenial {
    pub op: LimitOp,
    pub window: LimitWindow,
    pub cap: Decimal,
    pub used: Decimal,
    pub attempted: Decimal,
}

impl std::fmt::Display for LimitDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} window: used {} + attempted {} would exceed cap {}",
            self.op, self.window, self.used, self.attempted, self.cap
        )
    }
}
