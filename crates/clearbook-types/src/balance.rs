//! Balance tracking types for the ClearBook reservation model.
//!
//! Every account has, per currency, an `available` balance (usable for new
//! orders and withdrawal requests) and a `reserved` balance (held by open
//! reservations awaiting settlement or release).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The balance pair for one (account, currency).
///
/// Invariant: both components are non-negative at all times, and
/// `available + reserved` changes only through a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    /// Available for new orders / withdrawal requests.
    pub available: Decimal,
    /// Held by open reservations (resting orders, pending withdrawals).
    pub reserved: Decimal,
}

impl Balance {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            reserved: Decimal::ZERO,
        }
    }

    /// Total balance (available + reserved).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.reserved
    }

    /// Whether this balance holds nothing at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.reserved.is_zero()
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}

/// Type alias for currency codes (e.g., "BTC", "USDT", "ETH").
pub type Currency = String;
