//! Per-account balance state and open reservations.
//!
//! [`AccountState`] is the mutable half of an account: current balances per
//! currency plus the reservations still holding funds. It is always reached
//! through the owning [`Ledger`](crate::Ledger), which serializes access
//! with one mutex per account.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clearbook_types::{AccountId, Balance, Currency, EntryKind, EntryRef, ReservationId};
use rust_decimal::Decimal;
use serde::Serialize;

/// An open hold on part of an account's balance.
///
/// Created by a reserve, consumed incrementally by settles, and removed
/// either when `remaining` reaches zero or by an explicit release.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub account_id: AccountId,
    pub currency: Currency,
    /// How much of the original hold is still unconsumed.
    pub remaining: Decimal,
    /// The operation that created the hold.
    pub origin: EntryRef,
    pub created_at: DateTime<Utc>,
}

/// Balances and open reservations for one account.
#[derive(Debug, Default)]
pub(crate) struct AccountState {
    balances: HashMap<Currency, Balance>,
    reservations: HashMap<ReservationId, Reservation>,
}

impl AccountState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Balance in one currency. Zero if the account never touched it.
    pub(crate) fn balance(&self, currency: &str) -> Balance {
        self.balances.get(currency).copied().unwrap_or_default()
    }

    /// Snapshot of all non-zero balances.
    pub(crate) fn balances(&self) -> HashMap<Currency, Balance> {
        self.balances
            .iter()
            .filter(|(_, b)| !b.is_zero())
            .map(|(c, b)| (c.clone(), *b))
            .collect()
    }

    /// Apply one entry kind's effect and return the balance after.
    ///
    /// Callers must have validated preconditions (sufficient available,
    /// sufficient remaining on the reservation) before applying.
    pub(crate) fn apply(&mut self, currency: &str, kind: EntryKind, amount: Decimal) -> Balance {
        let slot = self.balances.entry(currency.to_string()).or_default();
        *slot = kind.apply(*slot, amount);
        *slot
    }

    pub(crate) fn insert_reservation(&mut self, reservation: Reservation) {
        self.reservations.insert(reservation.id, reservation);
    }

    pub(crate) fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.get(&id)
    }

    pub(crate) fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.get_mut(&id)
    }

    pub(crate) fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        self.reservations.remove(&id)
    }

    pub(crate) fn open_reservations(&self) -> Vec<Reservation> {
        self.reservations.values().cloned().collect()
    }

    /// Sum of open holds in one currency. Must equal the reserved
    /// component of the balance at all times.
    pub(crate) fn reserved_total(&self, currency: &str) -> Decimal {
        self.reservations
            .values()
            .filter(|r| r.currency == currency)
            .map(|r| r.remaining)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn untouched_currency_is_zero() {
        let state = AccountState::new();
        assert!(state.balance("BTC").is_zero());
    }

    #[test]
    fn apply_tracks_balance() {
        let mut state = AccountState::new();
        let after = state.apply("USDT", EntryKind::Deposit, dec(1000));
        assert_eq!(after.available, dec(1000));

        let after = state.apply("USDT", EntryKind::Reserve, dec(400));
        assert_eq!(after.available, dec(600));
        assert_eq!(after.reserved, dec(400));
        assert_eq!(state.balance("USDT").total(), dec(1000));
    }

    #[test]
    fn balances_snapshot_skips_zero() {
        let mut state = AccountState::new();
        state.apply("USDT", EntryKind::Deposit, dec(10));
        state.apply("BTC", EntryKind::Deposit, dec(5));
        state.apply("BTC", EntryKind::Fee, dec(5));

        let snapshot = state.balances();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("USDT"));
    }

    #[test]
    fn reserved_total_sums_open_holds() {
        let mut state = AccountState::new();
        let account_id = AccountId::new();
        for amount in [dec(10), dec(20)] {
            let id = ReservationId::new();
            state.insert_reservation(Reservation {
                id,
                account_id,
                currency: "USDT".to_string(),
                remaining: amount,
                origin: EntryRef::Reservation(id),
                created_at: Utc::now(),
            });
        }
        assert_eq!(state.reserved_total("USDT"), dec(30));
        assert_eq!(state.reserved_total("BTC"), Decimal::ZERO);
    }

    #[test]
    fn remove_reservation_returns_it() {
        let mut state = AccountState::new();
        let id = ReservationId::new();
        state.insert_reservation(Reservation {
            id,
            account_id: AccountId::new(),
            currency: "BTC".to_string(),
            remaining: dec(1),
            origin: EntryRef::Reservation(id),
            created_at: Utc::now(),
        });
        assert!(state.reservation(id).is_some());
        let removed = state.remove_reservation(id).unwrap();
        assert_eq!(removed.remaining, dec(1));
        assert!(state.reservation(id).is_none());
    }
}
