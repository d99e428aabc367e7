//! Deposit and withdrawal request handling.
//!
//! Every movement of external funds goes through a [`WalletRequest`]
//! that an external approval oracle must resolve. The asymmetry between
//! the two directions is deliberate:
//!
//! - a **withdrawal** reserves its amount the moment the request is
//!   accepted, so the funds cannot be spent while approval is pending;
//! - a **deposit** holds nothing while pending, because no funds exist
//!   on the ledger until the oracle confirms they arrived.
//!
//! Tier limits are checked at request time against posted journal
//! entries plus the account's still-pending requests, so a denied
//! request leaves no trace and a claim the oracle has not resolved yet
//! cannot be used to queue past the cap.

use std::sync::Arc;

use chrono::Utc;
use clearbook_ledger::{KycOracle, Ledger, LimitPolicy};
use clearbook_types::{
    AccountId, ClearbookError, EntryKind, EntryRef, LimitOp, RequestId, RequestKind,
    RequestStatus, Result, TierTable, WalletRequest,
};
use dashmap::DashMap;
use rust_decimal::Decimal;

/// Wallet service: request intake, the approval state machine, and the
/// ledger postings each resolution produces.
pub struct WalletService {
    ledger: Arc<Ledger>,
    policy: LimitPolicy,
    oracle: Arc<dyn KycOracle>,
    requests: DashMap<RequestId, WalletRequest>,
}

impl WalletService {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, oracle: Arc<dyn KycOracle>, tiers: TierTable) -> Self {
        Self {
            ledger,
            policy: LimitPolicy::new(tiers),
            oracle,
            requests: DashMap::new(),
        }
    }

    // =================================================================
    // Request intake
    // =================================================================

    /// Open a deposit request. No funds move until approval; the request
    /// just records the claim and its external proof.
    ///
    /// # Errors
    /// `InvalidQuantity` for a non-positive amount, `UnknownAccount`,
    /// `LimitExceeded` when the tier's deposit cap would be breached.
    pub fn request_deposit(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        external_ref: Option<String>,
    ) -> Result<WalletRequest> {
        self.admit(account_id, currency, amount, LimitOp::Deposit)?;

        let now = Utc::now();
        let request = WalletRequest {
            id: RequestId::new(),
            account_id,
            kind: RequestKind::Deposit,
            currency: currency.to_string(),
            amount,
            status: RequestStatus::Pending,
            external_ref,
            reservation_id: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(
            request = %request.id,
            account = %account_id,
            currency,
            %amount,
            "deposit requested"
        );
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    /// Open a withdrawal request, reserving the amount immediately so it
    /// cannot be spent while the oracle deliberates.
    ///
    /// # Errors
    /// `InvalidQuantity`, `UnknownAccount`, `LimitExceeded`, or
    /// `InsufficientFunds` when the available balance cannot back the
    /// reservation.
    pub fn request_withdrawal(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
    ) -> Result<WalletRequest> {
        self.admit(account_id, currency, amount, LimitOp::Withdraw)?;

        let request_id = RequestId::new();
        let reservation = self.ledger.reserve(
            account_id,
            currency,
            amount,
            EntryRef::Request(request_id),
        )?;

        let now = Utc::now();
        let request = WalletRequest {
            id: request_id,
            account_id,
            kind: RequestKind::Withdrawal,
            currency: currency.to_string(),
            amount,
            status: RequestStatus::Pending,
            external_ref: None,
            reservation_id: Some(reservation),
            reject_reason: None,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(
            request = %request.id,
            account = %account_id,
            currency,
            %amount,
            reservation = %reservation,
            "withdrawal requested"
        );
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    /// Shared intake gate: amount shape, account existence, tier cap.
    fn admit(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        op: LimitOp,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(ClearbookError::InvalidQuantity {
                reason: "request amount must be positive".into(),
            });
        }
        if !self.ledger.has_account(account_id) {
            return Err(ClearbookError::UnknownAccount(account_id));
        }
        let tier = self.oracle.tier_of(account_id);
        let entries = self.ledger.entries_for(account_id)?;
        let pending = self.pending_for_account(account_id);
        self.policy
            .evaluate(&entries, &pending, tier, op, currency, amount, Utc::now())
            .into_result()
    }

    // =================================================================
    // Approval resolution
    // =================================================================

    /// Resolve a pending request as approved and post its ledger effect:
    /// deposits credit available balance, withdrawals settle the hold
    /// taken at request time.
    ///
    /// # Errors
    /// `RequestNotFound`, or `InvalidRequestState` when the request is
    /// not pending (double approval, approving a rejection).
    pub fn approve(&self, request_id: RequestId) -> Result<WalletRequest> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or(ClearbookError::RequestNotFound(request_id))?;
        let request = entry.value_mut();

        // Claims the request; a concurrent second approval now fails the
        // transition instead of double-posting.
        request.transition(RequestStatus::Approved)?;

        match request.kind {
            RequestKind::Deposit => {
                self.ledger.credit(
                    request.account_id,
                    &request.currency,
                    request.amount,
                    EntryKind::Deposit,
                    EntryRef::Request(request.id),
                )?;
            }
            RequestKind::Withdrawal => {
                let reservation = request.reservation_id.ok_or_else(|| {
                    ClearbookError::Internal(format!(
                        "pending withdrawal {} has no reservation",
                        request.id
                    ))
                })?;
                self.ledger.settle(
                    reservation,
                    request.amount,
                    EntryKind::Withdrawal,
                    EntryRef::Request(request.id),
                )?;
            }
        }

        request.transition(RequestStatus::Settled)?;
        tracing::info!(
            request = %request.id,
            account = %request.account_id,
            kind = %request.kind,
            amount = %request.amount,
            "request approved and settled"
        );
        Ok(request.clone())
    }

    /// Resolve a pending request as rejected. A withdrawal's hold is
    /// released in full; a deposit only records the reason.
    ///
    /// # Errors
    /// `RequestNotFound`, or `InvalidRequestState` when the request is
    /// not pending.
    pub fn reject(&self, request_id: RequestId, reason: impl Into<String>) -> Result<WalletRequest> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or(ClearbookError::RequestNotFound(request_id))?;
        let request = entry.value_mut();

        request.transition(RequestStatus::Rejected)?;
        request.reject_reason = Some(reason.into());

        if let Some(reservation) = request.reservation_id {
            self.ledger.release(reservation)?;
        }

        tracing::warn!(
            request = %request.id,
            account = %request.account_id,
            kind = %request.kind,
            reason = request.reject_reason.as_deref().unwrap_or(""),
            "request rejected"
        );
        Ok(request.clone())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current snapshot of one request.
    pub fn request(&self, request_id: RequestId) -> Result<WalletRequest> {
        self.requests
            .get(&request_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClearbookError::RequestNotFound(request_id))
    }

    /// All of an account's requests, oldest first.
    #[must_use]
    pub fn requests_for_account(&self, account_id: AccountId) -> Vec<WalletRequest> {
        let mut requests: Vec<WalletRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by_key(|request| request.created_at);
        requests
    }

    /// One account's requests still waiting on the oracle. These count
    /// toward the account's rolling limit usage alongside posted entries.
    #[must_use]
    pub fn pending_for_account(&self, account_id: AccountId) -> Vec<WalletRequest> {
        self.requests
            .iter()
            .filter(|entry| {
                entry.value().account_id == account_id && entry.value().is_pending()
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Every request still waiting on the oracle, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<WalletRequest> {
        let mut requests: Vec<WalletRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().is_pending())
            .map(|entry| entry.value().clone())
            .collect();
        requests.sort_by_key(|request| request.created_at);
        requests
    }
}

#[cfg(test)]
mod tests {
    use clearbook_ledger::DirectoryOracle;
    use clearbook_types::KycTier;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn setup() -> (Arc<Ledger>, Arc<DirectoryOracle>, WalletService) {
        let ledger = Arc::new(Ledger::new());
        let oracle = Arc::new(DirectoryOracle::new());
        let wallet = WalletService::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle) as Arc<dyn KycOracle>,
            TierTable::default(),
        );
        (ledger, oracle, wallet)
    }

    fn gold_account(ledger: &Ledger, oracle: &DirectoryOracle) -> AccountId {
        let account = ledger.open_account();
        oracle.set_tier(account, KycTier::Gold);
        account
    }

    #[test]
    fn deposit_lifecycle() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);

        let request = wallet
            .request_deposit(account, "USDT", dec(500), Some("wire-123".into()))
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        // Nothing on the ledger until approval.
        assert_eq!(
            ledger.balance(account, "USDT").unwrap().available,
            Decimal::ZERO
        );

        let settled = wallet.approve(request.id).unwrap();
        assert_eq!(settled.status, RequestStatus::Settled);
        assert_eq!(ledger.balance(account, "USDT").unwrap().available, dec(500));

        // Approving twice cannot double-credit.
        let again = wallet.approve(request.id).unwrap_err();
        assert!(matches!(
            again,
            ClearbookError::InvalidRequestState { .. }
        ));
        assert_eq!(ledger.balance(account, "USDT").unwrap().available, dec(500));
    }

    #[test]
    fn pending_deposit_holds_nothing() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);

        wallet
            .request_deposit(account, "BTC", Decimal::ONE, None)
            .unwrap();
        let balance = ledger.balance(account, "BTC").unwrap();
        assert_eq!(balance.available, Decimal::ZERO);
        assert_eq!(balance.reserved, Decimal::ZERO);
    }

    #[test]
    fn withdrawal_reserves_then_settles() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);
        ledger
            .credit(
                account,
                "USDT",
                dec(100),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let request = wallet.request_withdrawal(account, "USDT", dec(40)).unwrap();
        let pending = ledger.balance(account, "USDT").unwrap();
        assert_eq!(pending.available, dec(60));
        assert_eq!(pending.reserved, dec(40));

        let settled = wallet.approve(request.id).unwrap();
        assert_eq!(settled.status, RequestStatus::Settled);
        let after = ledger.balance(account, "USDT").unwrap();
        assert_eq!(after.available, dec(60));
        assert_eq!(after.reserved, Decimal::ZERO);

        // The hold is gone with the funds.
        assert!(ledger
            .reservation(request.reservation_id.unwrap())
            .is_none());
    }

    #[test]
    fn rejected_withdrawal_releases_hold() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);
        ledger
            .credit(
                account,
                "USDT",
                dec(100),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let request = wallet.request_withdrawal(account, "USDT", dec(40)).unwrap();
        let rejected = wallet.reject(request.id, "compliance review failed").unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            rejected.reject_reason.as_deref(),
            Some("compliance review failed")
        );

        let balance = ledger.balance(account, "USDT").unwrap();
        assert_eq!(balance.available, dec(100));
        assert_eq!(balance.reserved, Decimal::ZERO);

        // Rejected is terminal.
        assert!(wallet.approve(request.id).is_err());
    }

    #[test]
    fn rejected_deposit_posts_nothing() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);

        let request = wallet
            .request_deposit(account, "USDT", dec(500), Some("wire-456".into()))
            .unwrap();
        let rejected = wallet.reject(request.id, "source of funds unclear").unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(
            ledger.balance(account, "USDT").unwrap().available,
            Decimal::ZERO
        );
        assert_eq!(ledger.entries_for(account).unwrap().len(), 0);
    }

    #[test]
    fn withdrawal_needs_available_funds() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);
        ledger
            .credit(
                account,
                "USDT",
                dec(10),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let err = wallet
            .request_withdrawal(account, "USDT", dec(40))
            .unwrap_err();
        assert!(matches!(err, ClearbookError::InsufficientFunds { .. }));
        // A failed request is never recorded.
        assert!(wallet.requests_for_account(account).is_empty());
    }

    #[test]
    fn unverified_tier_cannot_deposit() {
        let (ledger, _oracle, wallet) = setup();
        let account = ledger.open_account(); // stays Unverified

        let err = wallet
            .request_deposit(account, "USDT", dec(10), None)
            .unwrap_err();
        assert!(matches!(err, ClearbookError::LimitExceeded(_)));
        assert!(wallet.requests_for_account(account).is_empty());
    }

    #[test]
    fn withdrawal_cap_blocks_before_reserving() {
        let (ledger, oracle, wallet) = setup();
        let account = ledger.open_account();
        oracle.set_tier(account, KycTier::Bronze); // 10M withdraw/day
        ledger
            .credit(
                account,
                "USDT",
                dec(20_000_000),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let err = wallet
            .request_withdrawal(account, "USDT", dec(15_000_000))
            .unwrap_err();
        assert!(matches!(err, ClearbookError::LimitExceeded(_)));
        // The denial left no hold behind.
        assert_eq!(
            ledger.balance(account, "USDT").unwrap().reserved,
            Decimal::ZERO
        );
    }

    #[test]
    fn settled_deposits_count_toward_the_cap() {
        let (ledger, oracle, wallet) = setup();
        let account = ledger.open_account();
        oracle.set_tier(account, KycTier::Bronze); // 50M deposit/day

        let first = wallet
            .request_deposit(account, "USDT", dec(30_000_000), None)
            .unwrap();
        wallet.approve(first.id).unwrap();

        // 30M used + 25M attempted > 50M cap.
        let err = wallet
            .request_deposit(account, "USDT", dec(25_000_000), None)
            .unwrap_err();
        assert!(matches!(err, ClearbookError::LimitExceeded(_)));

        // 30M + 20M fills the cap exactly.
        wallet
            .request_deposit(account, "USDT", dec(20_000_000), None)
            .unwrap();
    }

    #[test]
    fn pending_requests_count_toward_the_cap() {
        let (ledger, oracle, wallet) = setup();
        let account = ledger.open_account();
        oracle.set_tier(account, KycTier::Bronze); // 50M deposit/day

        // Nothing settled yet, but the pending claim occupies the window.
        let pending = wallet
            .request_deposit(account, "USDT", dec(30_000_000), None)
            .unwrap();
        let err = wallet
            .request_deposit(account, "USDT", dec(25_000_000), None)
            .unwrap_err();
        assert!(matches!(err, ClearbookError::LimitExceeded(_)));

        // A rejection frees the window again.
        wallet.reject(pending.id, "receipt never arrived").unwrap();
        wallet
            .request_deposit(account, "USDT", dec(25_000_000), None)
            .unwrap();
    }

    #[test]
    fn settlement_does_not_double_count_usage() {
        let (ledger, oracle, wallet) = setup();
        let account = ledger.open_account();
        oracle.set_tier(account, KycTier::Bronze);
        ledger
            .credit(
                account,
                "USDT",
                dec(20_000_000),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        // 8M pending holds the window; approving moves the usage from
        // the request to the journal entry without growing it.
        let request = wallet
            .request_withdrawal(account, "USDT", dec(8_000_000))
            .unwrap();
        wallet.approve(request.id).unwrap();

        // 8M used + 2M fits the 10M/day withdrawal cap exactly.
        wallet
            .request_withdrawal(account, "USDT", dec(2_000_000))
            .unwrap();
    }

    #[test]
    fn unknown_request_errors() {
        let (_ledger, _oracle, wallet) = setup();
        let ghost = RequestId::new();
        assert!(matches!(
            wallet.approve(ghost),
            Err(ClearbookError::RequestNotFound(_))
        ));
        assert!(matches!(
            wallet.reject(ghost, "nope"),
            Err(ClearbookError::RequestNotFound(_))
        ));
        assert!(matches!(
            wallet.request(ghost),
            Err(ClearbookError::RequestNotFound(_))
        ));
    }

    #[test]
    fn pending_lists_only_unresolved() {
        let (ledger, oracle, wallet) = setup();
        let account = gold_account(&ledger, &oracle);

        let a = wallet.request_deposit(account, "USDT", dec(10), None).unwrap();
        let b = wallet.request_deposit(account, "USDT", dec(20), None).unwrap();
        wallet.approve(a.id).unwrap();

        let pending = wallet.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let all = wallet.requests_for_account(account);
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
    }
}
