//! The ledger store: balances, reservations, and the journal behind them.
//!
//! [`Ledger`] is the only writer of balance state. Every mutation validates
//! its preconditions, applies the balance effect, and appends exactly one
//! [`LedgerEntry`] per affected `(account, currency)`, all under the owning
//! account's lock, so an account's entries always land in the order its
//! balance changed.
//!
//! # Locking discipline
//!
//! - One mutex per account; multi-account operations (fill settlement) take
//!   them in ascending [`AccountId`] order.
//! - The journal mutex is always acquired last, after every account lock.
//!
//! Fill settlement is all-or-nothing: both holds are validated before the
//! first entry is appended, so a failed settlement leaves no trace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use clearbook_types::{
    AccountId, Balance, ClearbookError, Currency, EntryKind, EntryRef, FeeSchedule, Fill,
    LedgerEntry, ReservationId, Result,
};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::account::{AccountState, Reservation};
use crate::journal::Journal;

/// Event-sourced balance store for all accounts.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: DashMap<AccountId, Arc<Mutex<AccountState>>>,
    /// `ReservationId → owning account`, for settles that arrive with only
    /// the reservation in hand.
    reservation_owner: DashMap<ReservationId, AccountId>,
    journal: Mutex<Journal>,
}

fn poisoned() -> ClearbookError {
    ClearbookError::Internal("ledger lock poisoned by a panicked holder".into())
}

fn lock_state(cell: &Mutex<AccountState>) -> Result<MutexGuard<'_, AccountState>> {
    cell.lock().map_err(|_| poisoned())
}

fn require_positive(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ClearbookError::InvalidQuantity {
            reason: format!("{what} amount must be positive"),
        });
    }
    Ok(())
}

/// Apply one entry to account state and append it to the journal.
///
/// Must be called with both the account lock and the journal lock held.
fn post(
    journal: &mut Journal,
    state: &mut AccountState,
    account_id: AccountId,
    currency: &str,
    kind: EntryKind,
    amount: Decimal,
    reference: EntryRef,
) -> LedgerEntry {
    let balance_after = state.apply(currency, kind, amount);
    let entry = LedgerEntry {
        seq: journal.next_seq(),
        account_id,
        currency: currency.to_string(),
        kind,
        amount,
        balance_after,
        reference,
        recorded_at: Utc::now(),
    };
    journal.append(entry.clone());
    entry
}

/// Decrement a hold that settlement validated beforehand. Returns `true`
/// if the hold is now fully consumed and was removed.
fn consume_hold(state: &mut AccountState, id: ReservationId, amount: Decimal) -> bool {
    let closed = match state.reservation_mut(id) {
        Some(res) => {
            res.remaining -= amount;
            res.remaining.is_zero()
        }
        None => false,
    };
    if closed {
        state.remove_reservation(id);
    }
    closed
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =================================================================
    // Accounts
    // =================================================================

    /// Open a fresh account and return its id.
    pub fn open_account(&self) -> AccountId {
        let id = AccountId::new();
        self.ensure_account(id);
        id
    }

    /// Idempotently create an account with a caller-chosen id
    /// (fee-collection accounts, replays).
    pub fn ensure_account(&self, account_id: AccountId) {
        self.accounts.entry(account_id).or_default();
    }

    #[must_use]
    pub fn has_account(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    #[must_use]
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.iter().map(|entry| *entry.key()).collect()
    }

    fn cell(&self, account_id: AccountId) -> Result<Arc<Mutex<AccountState>>> {
        self.accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ClearbookError::UnknownAccount(account_id))
    }

    fn journal_guard(&self) -> Result<MutexGuard<'_, Journal>> {
        self.journal.lock().map_err(|_| poisoned())
    }

    // =================================================================
    // Direct postings
    // =================================================================

    /// Credit available balance. `kind` must be one of the credit kinds
    /// (`Deposit`, `TradeCredit`, `FeeCredit`).
    ///
    /// # Errors
    /// `InvalidQuantity` if the amount is not positive, `UnknownAccount`
    /// if the account was never opened.
    pub fn credit(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        kind: EntryKind,
        reference: EntryRef,
    ) -> Result<LedgerEntry> {
        require_positive(amount, "credit")?;
        if !matches!(
            kind,
            EntryKind::Deposit | EntryKind::TradeCredit | EntryKind::FeeCredit
        ) {
            return Err(ClearbookError::Internal(format!(
                "entry kind {kind} cannot be posted as a direct credit"
            )));
        }

        let cell = self.cell(account_id)?;
        let mut state = lock_state(&cell)?;
        let mut journal = self.journal_guard()?;
        let entry = post(
            &mut journal,
            &mut state,
            account_id,
            currency,
            kind,
            amount,
            reference,
        );
        tracing::debug!(account = %account_id, %currency, %amount, kind = %kind, "credit posted");
        Ok(entry)
    }

    /// Debit available balance directly. `kind` must be `Fee`; every other
    /// deduction goes through a reservation.
    ///
    /// # Errors
    /// `InsufficientFunds` if available balance does not cover the amount.
    pub fn debit(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        kind: EntryKind,
        reference: EntryRef,
    ) -> Result<LedgerEntry> {
        require_positive(amount, "debit")?;
        if kind != EntryKind::Fee {
            return Err(ClearbookError::Internal(format!(
                "entry kind {kind} cannot be posted as a direct debit"
            )));
        }

        let cell = self.cell(account_id)?;
        let mut state = lock_state(&cell)?;
        let available = state.balance(currency).available;
        if available < amount {
            return Err(ClearbookError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        let mut journal = self.journal_guard()?;
        let entry = post(
            &mut journal,
            &mut state,
            account_id,
            currency,
            kind,
            amount,
            reference,
        );
        tracing::debug!(account = %account_id, %currency, %amount, kind = %kind, "debit posted");
        Ok(entry)
    }

    // =================================================================
    // Reservations
    // =================================================================

    /// Place a hold: move `amount` from available to reserved and open a
    /// reservation for it. `reference` names the operation the hold backs
    /// (the order or withdrawal request).
    ///
    /// # Errors
    /// `InsufficientFunds` if available balance does not cover the hold.
    pub fn reserve(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        reference: EntryRef,
    ) -> Result<ReservationId> {
        require_positive(amount, "reserve")?;

        let cell = self.cell(account_id)?;
        let mut state = lock_state(&cell)?;
        let available = state.balance(currency).available;
        if available < amount {
            return Err(ClearbookError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        let id = ReservationId::new();
        {
            let mut journal = self.journal_guard()?;
            post(
                &mut journal,
                &mut state,
                account_id,
                currency,
                EntryKind::Reserve,
                amount,
                reference,
            );
        }
        state.insert_reservation(Reservation {
            id,
            account_id,
            currency: currency.to_string(),
            remaining: amount,
            origin: reference,
            created_at: Utc::now(),
        });
        self.reservation_owner.insert(id, account_id);

        tracing::debug!(account = %account_id, reservation = %id, %currency, %amount, "hold placed");
        Ok(id)
    }

    /// Return whatever a reservation still holds to available balance and
    /// close it. Idempotent: an unknown or already-closed reservation
    /// returns `Ok(None)` and posts nothing.
    pub fn release(&self, reservation_id: ReservationId) -> Result<Option<LedgerEntry>> {
        let Some(owner) = self
            .reservation_owner
            .get(&reservation_id)
            .map(|entry| *entry.value())
        else {
            return Ok(None);
        };

        let cell = self.cell(owner)?;
        let mut state = lock_state(&cell)?;
        // A settle may have consumed the hold between the index lookup and
        // taking the account lock.
        let Some(reservation) = state.remove_reservation(reservation_id) else {
            return Ok(None);
        };
        self.reservation_owner.remove(&reservation_id);

        let mut journal = self.journal_guard()?;
        let entry = post(
            &mut journal,
            &mut state,
            owner,
            &reservation.currency,
            EntryKind::Release,
            reservation.remaining,
            EntryRef::Reservation(reservation_id),
        );
        tracing::debug!(
            account = %owner,
            reservation = %reservation_id,
            returned = %reservation.remaining,
            "hold released"
        );
        Ok(Some(entry))
    }

    /// Consume part of a hold. `kind` must be `Withdrawal` or `TradeDebit`.
    /// The reservation closes automatically when its remaining reaches zero.
    ///
    /// # Errors
    /// `UnknownReservation` if the hold does not exist (or already closed);
    /// `ReservationMismatch` if `amount` exceeds what the hold still
    /// carries; in that case no state changes at all.
    pub fn settle(
        &self,
        reservation_id: ReservationId,
        amount: Decimal,
        kind: EntryKind,
        reference: EntryRef,
    ) -> Result<LedgerEntry> {
        require_positive(amount, "settle")?;
        if !matches!(kind, EntryKind::Withdrawal | EntryKind::TradeDebit) {
            return Err(ClearbookError::Internal(format!(
                "entry kind {kind} cannot settle a reservation"
            )));
        }

        let owner = self
            .reservation_owner
            .get(&reservation_id)
            .map(|entry| *entry.value())
            .ok_or(ClearbookError::UnknownReservation(reservation_id))?;
        let cell = self.cell(owner)?;
        let mut state = lock_state(&cell)?;

        let (currency, closed) = {
            let Some(res) = state.reservation_mut(reservation_id) else {
                return Err(ClearbookError::UnknownReservation(reservation_id));
            };
            if res.remaining < amount {
                return Err(ClearbookError::ReservationMismatch {
                    reservation: reservation_id,
                    requested: amount,
                    remaining: res.remaining,
                });
            }
            res.remaining -= amount;
            (res.currency.clone(), res.remaining.is_zero())
        };
        if closed {
            state.remove_reservation(reservation_id);
            self.reservation_owner.remove(&reservation_id);
        }

        let mut journal = self.journal_guard()?;
        let entry = post(
            &mut journal,
            &mut state,
            owner,
            &currency,
            kind,
            amount,
            reference,
        );
        tracing::debug!(
            account = %owner,
            reservation = %reservation_id,
            %amount,
            kind = %kind,
            closed,
            "hold settled"
        );
        Ok(entry)
    }

    // =================================================================
    // Fill settlement
    // =================================================================

    /// Settle one fill atomically: consume both sides' holds, deliver the
    /// proceeds, and book fees on each credited amount.
    ///
    /// For a BTC/USDT fill of `qty` at `price`:
    /// - **Buyer**: hold loses `quote_amount` USDT, available gains `qty`
    ///   BTC minus the buyer's fee
    /// - **Seller**: hold loses `qty` BTC, available gains `quote_amount`
    ///   USDT minus the seller's fee
    /// - **Fee account**: gains both fees
    ///
    /// Taker/maker fee rates follow `fill.taker_side`. Both holds are
    /// validated before anything posts; on any error the ledger is
    /// untouched.
    ///
    /// # Errors
    /// `UnknownReservation` / `ReservationMismatch` if a hold is missing
    /// or too small, `UnknownAccount` if a participant was never opened.
    pub fn settle_fill(
        &self,
        fill: &Fill,
        buyer_reservation: ReservationId,
        seller_reservation: ReservationId,
        fees: &FeeSchedule,
    ) -> Result<Vec<LedgerEntry>> {
        let buyer = fill.buyer_account();
        let seller = fill.seller_account();
        if buyer == seller {
            return Err(ClearbookError::Internal(format!(
                "self fill reached settlement: {}",
                fill.id
            )));
        }

        let base = fill.pair.base.as_str();
        let quote = fill.pair.quote.as_str();

        // Fee is charged on what each side receives.
        let (buyer_fee, seller_fee) = if fill.taker_is_buyer() {
            (fees.taker_fee(fill.qty), fees.maker_fee(fill.quote_amount))
        } else {
            (fees.maker_fee(fill.qty), fees.taker_fee(fill.quote_amount))
        };
        if buyer_fee > fill.qty || seller_fee > fill.quote_amount {
            return Err(ClearbookError::Internal(format!(
                "fee exceeds credited amount on fill {}",
                fill.id
            )));
        }

        // Lock every participant in ascending id order.
        let mut participants = vec![buyer, seller, fees.fee_account];
        participants.sort_unstable();
        participants.dedup();

        let cells: Vec<(AccountId, Arc<Mutex<AccountState>>)> = participants
            .iter()
            .map(|&id| self.cell(id).map(|cell| (id, cell)))
            .collect::<Result<_>>()?;
        let mut guards: Vec<MutexGuard<'_, AccountState>> = Vec::with_capacity(cells.len());
        for (_, cell) in &cells {
            guards.push(lock_state(cell)?);
        }

        let buyer_idx = slot(&participants, buyer)?;
        let seller_idx = slot(&participants, seller)?;
        let fee_idx = slot(&participants, fees.fee_account)?;

        // Validate both holds before touching anything.
        check_hold(&guards[buyer_idx], buyer_reservation, quote, fill.quote_amount)?;
        check_hold(&guards[seller_idx], seller_reservation, base, fill.qty)?;

        // Past this point nothing can fail: post all legs.
        let mut journal = self.journal_guard()?;
        let reference = EntryRef::Fill(fill.id);
        let mut entries = Vec::with_capacity(8);

        entries.push(post(
            &mut journal,
            &mut guards[buyer_idx],
            buyer,
            quote,
            EntryKind::TradeDebit,
            fill.quote_amount,
            reference,
        ));
        if consume_hold(&mut guards[buyer_idx], buyer_reservation, fill.quote_amount) {
            self.reservation_owner.remove(&buyer_reservation);
        }

        entries.push(post(
            &mut journal,
            &mut guards[seller_idx],
            seller,
            base,
            EntryKind::TradeDebit,
            fill.qty,
            reference,
        ));
        if consume_hold(&mut guards[seller_idx], seller_reservation, fill.qty) {
            self.reservation_owner.remove(&seller_reservation);
        }

        entries.push(post(
            &mut journal,
            &mut guards[buyer_idx],
            buyer,
            base,
            EntryKind::TradeCredit,
            fill.qty,
            reference,
        ));
        entries.push(post(
            &mut journal,
            &mut guards[seller_idx],
            seller,
            quote,
            EntryKind::TradeCredit,
            fill.quote_amount,
            reference,
        ));

        if buyer_fee > Decimal::ZERO {
            entries.push(post(
                &mut journal,
                &mut guards[buyer_idx],
                buyer,
                base,
                EntryKind::Fee,
                buyer_fee,
                reference,
            ));
            entries.push(post(
                &mut journal,
                &mut guards[fee_idx],
                fees.fee_account,
                base,
                EntryKind::FeeCredit,
                buyer_fee,
                reference,
            ));
        }
        if seller_fee > Decimal::ZERO {
            entries.push(post(
                &mut journal,
                &mut guards[seller_idx],
                seller,
                quote,
                EntryKind::Fee,
                seller_fee,
                reference,
            ));
            entries.push(post(
                &mut journal,
                &mut guards[fee_idx],
                fees.fee_account,
                quote,
                EntryKind::FeeCredit,
                seller_fee,
                reference,
            ));
        }

        tracing::info!(
            fill = %fill.id,
            buyer = %buyer,
            seller = %seller,
            price = %fill.price,
            qty = %fill.qty,
            buyer_fee = %buyer_fee,
            seller_fee = %seller_fee,
            entries = entries.len(),
            "fill settled"
        );
        Ok(entries)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Balance in one currency.
    ///
    /// # Errors
    /// `UnknownAccount` if the account was never opened.
    pub fn balance(&self, account_id: AccountId, currency: &str) -> Result<Balance> {
        let cell = self.cell(account_id)?;
        let state = lock_state(&cell)?;
        Ok(state.balance(currency))
    }

    /// All non-zero balances for an account.
    pub fn balances(&self, account_id: AccountId) -> Result<HashMap<Currency, Balance>> {
        let cell = self.cell(account_id)?;
        let state = lock_state(&cell)?;
        Ok(state.balances())
    }

    /// Look up an open reservation.
    #[must_use]
    pub fn reservation(&self, reservation_id: ReservationId) -> Option<Reservation> {
        let owner = *self.reservation_owner.get(&reservation_id)?.value();
        let cell = self.accounts.get(&owner).map(|e| Arc::clone(e.value()))?;
        let state = cell.lock().ok()?;
        state.reservation(reservation_id).cloned()
    }

    /// All open reservations for an account.
    pub fn open_reservations(&self, account_id: AccountId) -> Result<Vec<Reservation>> {
        let cell = self.cell(account_id)?;
        let state = lock_state(&cell)?;
        Ok(state.open_reservations())
    }

    /// Sum of open holds for `(account, currency)`, an audit cross-check
    /// against the reserved balance component.
    pub fn reserved_total(&self, account_id: AccountId, currency: &str) -> Result<Decimal> {
        let cell = self.cell(account_id)?;
        let state = lock_state(&cell)?;
        Ok(state.reserved_total(currency))
    }

    /// All journal entries for an account, oldest first.
    pub fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>> {
        Ok(self.journal_guard()?.for_account(account_id))
    }

    /// All journal entries one logical operation produced, oldest first.
    pub fn entries_for_reference(&self, reference: EntryRef) -> Result<Vec<LedgerEntry>> {
        Ok(self.journal_guard()?.for_reference(reference))
    }

    /// Every journal entry, oldest first.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.journal_guard()?.entries().to_vec())
    }

    /// Entries recorded at or after `since`.
    pub fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        Ok(self.journal_guard()?.since(since))
    }

    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.journal_guard()?.len())
    }

    /// Hex digest of the journal's economic content.
    pub fn checksum(&self) -> Result<String> {
        Ok(hex::encode(self.journal_guard()?.checksum()))
    }

    /// Rebuild all balances from the journal, verifying every recorded
    /// snapshot along the way.
    pub fn replay(&self) -> Result<HashMap<(AccountId, Currency), Balance>> {
        self.journal_guard()?.replay()
    }

    /// JSON dump of the whole journal, for offline audit.
    pub fn export_journal(&self) -> Result<String> {
        self.journal_guard()?.export_json()
    }
}

fn slot(participants: &[AccountId], id: AccountId) -> Result<usize> {
    participants
        .iter()
        .position(|&p| p == id)
        .ok_or_else(|| ClearbookError::Internal(format!("participant {id} missing from lock set")))
}

fn check_hold(
    state: &AccountState,
    reservation_id: ReservationId,
    currency: &str,
    needed: Decimal,
) -> Result<()> {
    let hold = state
        .reservation(reservation_id)
        .ok_or(ClearbookError::UnknownReservation(reservation_id))?;
    if hold.currency != currency {
        return Err(ClearbookError::Internal(format!(
            "hold {} is in {}, fill settles {}",
            reservation_id, hold.currency, currency
        )));
    }
    if hold.remaining < needed {
        return Err(ClearbookError::ReservationMismatch {
            reservation: reservation_id,
            requested: needed,
            remaining: hold.remaining,
        });
    }
    Ok(())
}
