//! Wallet request model: deposit and withdrawal lifecycles.
//!
//! ## Status Machine
//!
//! ```text
//!   ┌─────────┐  oracle approve  ┌──────────┐  ledger posted  ┌─────────┐
//!   │ PENDING ├─────────────────▶│ APPROVED ├────────────────▶│ SETTLED │
//!   └────┬────┘                  └──────────┘                 └─────────┘
//!        │ oracle reject
//!        ▼
//!   ┌──────────┐
//!   │ REJECTED │
//!   └──────────┘
//! ```
//!
//! The lifecycle is linear: no request ever re-enters `Pending`. A pending
//! withdrawal holds a reservation the whole time it waits; a pending deposit
//! holds nothing (no existing funds are at risk).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Currency, RequestId, ReservationId};

/// Whether a request moves funds in or out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Deposit,
    Withdrawal,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}

/// Lifecycle status of a wallet request.
///
/// Transitions are **monotonic**:
/// - `Pending → Approved` (oracle approved; ledger posting in progress)
/// - `Approved → Settled` (ledger entries recorded)
/// - `Pending → Rejected` (oracle rejected; any reservation released)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Waiting on the external approval oracle. Stable resting state;
    /// there is no timeout in this core.
    Pending,
    /// Approved by the oracle; the ledger effect is being posted.
    Approved,
    /// Rejected by the oracle. Terminal.
    Rejected,
    /// Ledger effect posted. Terminal.
    Settled,
}

impl RequestStatus {
    /// Can a request move from this status to the given target?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Approved | Self::Rejected) | (Self::Approved, Self::Settled)
        )
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Settled)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Settled => write!(f, "SETTLED"),
        }
    }
}

/// A deposit or withdrawal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRequest {
    pub id: RequestId,
    pub account_id: AccountId,
    pub kind: RequestKind,
    pub currency: Currency,
    pub amount: Decimal,
    pub status: RequestStatus,
    /// Opaque external proof (bank receipt id, tx hash). Deposits only.
    pub external_ref: Option<String>,
    /// The hold backing a pending withdrawal. `None` for deposits.
    pub reservation_id: Option<ReservationId>,
    /// Oracle-supplied reason when rejected.
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRequest {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Move to a new status, enforcing the linear lifecycle.
    ///
    /// # Errors
    /// Fails with [`crate::ClearbookError::InvalidRequestState`] when the
    /// transition is not legal from the current status (double approval,
    /// rejecting a settled request, and so on).
    pub fn transition(&mut self, target: RequestStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(crate::ClearbookError::InvalidRequestState {
                request: self.id,
                status: self.status,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl WalletRequest {
    pub fn dummy_deposit(account_id: AccountId, currency: &str, amount: Decimal) -> Self {
        Self {
            id: RequestId::new(),
            account_id,
            kind: RequestKind::Deposit,
            currency: currency.to_string(),
            amount,
            status: RequestStatus::Pending,
            external_ref: Some(format!("test-receipt-{:08x}", rand::random::<u32>())),
            reservation_id: None,
            reject_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_withdrawal(account_id: AccountId, currency: &str, amount: Decimal) -> Self {
        Self {
            id: RequestId::new(),
            account_id,
            kind: RequestKind::Withdrawal,
            currency: currency.to_string(),
            amount,
            status: RequestStatus::Pending,
            external_ref: None,
            reservation_id: Some(ReservationId::new()),
            reject_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_valid() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Rejected));
        assert!(RequestStatus::Approved.can_transition_to(RequestStatus::Settled));
    }

    #[test]
    fn status_transitions_invalid() {
        assert!(!RequestStatus::Settled.can_transition_to(RequestStatus::Pending));
        assert!(!RequestStatus::Rejected.can_transition_to(RequestStatus::Approved));
        assert!(!RequestStatus::Approved.can_transition_to(RequestStatus::Rejected));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Settled));
    }

    #[test]
    fn double_approval_blocked() {
        let mut req =
            WalletRequest::dummy_deposit(AccountId::new(), "USDT", Decimal::new(100, 0));
        req.transition(RequestStatus::Approved).unwrap();
        req.transition(RequestStatus::Settled).unwrap();
        let err = req.transition(RequestStatus::Approved).unwrap_err();
        assert!(matches!(
            err,
            crate::ClearbookError::InvalidRequestState { .. }
        ));
    }

    #[test]
    fn reject_after_settle_blocked() {
        let mut req =
            WalletRequest::dummy_withdrawal(AccountId::new(), "USDT", Decimal::new(100, 0));
        req.transition(RequestStatus::Approved).unwrap();
        req.transition(RequestStatus::Settled).unwrap();
        assert!(req.transition(RequestStatus::Rejected).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Settled.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
    }

    #[test]
    fn serde_roundtrip() {
        let req = WalletRequest::dummy_withdrawal(AccountId::new(), "BTC", Decimal::ONE);
        let json = serde_json::to_string(&req).unwrap();
        let back: WalletRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.id, back.id);
        assert_eq!(req.kind, back.kind);
        assert_eq!(req.status, back.status);
        assert_eq!(req.reservation_id, back.reservation_id);
    }
}
