//! Ledger entry model: the append-only event record behind every balance.
//!
//! Every balance mutation appends exactly one [`LedgerEntry`]. Entries are
//! never edited or deleted; corrections are new entries with inverse effect
//! referencing the original. Replaying the entry stream for an account
//! reconstructs its balance at any point in time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Balance, Currency, EntrySeq, FillId, OrderId, RequestId, ReservationId};

/// What kind of balance event an entry records.
///
/// The kind fixes the entry's effect on the `(available, reserved)` pair,
/// which makes replay deterministic:
///
/// | kind          | available | reserved |
/// |---------------|-----------|----------|
/// | `Deposit`     | `+a`      |          |
/// | `Withdrawal`  |           | `-a`     |
/// | `Reserve`     | `-a`      | `+a`     |
/// | `Release`     | `+a`      | `-a`     |
/// | `TradeDebit`  |           | `-a`     |
/// | `TradeCredit` | `+a`      |          |
/// | `Fee`         | `-a`      |          |
/// | `FeeCredit`   | `+a`      |          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// External funds arrived (settled deposit request).
    Deposit,
    /// Reserved funds left the system (settled withdrawal request).
    Withdrawal,
    /// Hold moved funds available → reserved.
    Reserve,
    /// Hold returned funds reserved → available.
    Release,
    /// Trade settlement consumed reserved funds.
    TradeDebit,
    /// Trade settlement delivered funds from the counterparty.
    TradeCredit,
    /// Fee charged on a credited amount.
    Fee,
    /// Fee income booked to the fee-collection account.
    FeeCredit,
}

impl EntryKind {
    /// Apply this kind's effect to a balance. Used by journal replay.
    #[must_use]
    pub fn apply(self, balance: Balance, amount: Decimal) -> Balance {
        let Balance {
            available,
            reserved,
        } = balance;
        match self {
            Self::Deposit | Self::TradeCredit | Self::FeeCredit => Balance {
                available: available + amount,
                reserved,
            },
            Self::Withdrawal | Self::TradeDebit => Balance {
                available,
                reserved: reserved - amount,
            },
            Self::Reserve => Balance {
                available: available - amount,
                reserved: reserved + amount,
            },
            Self::Release => Balance {
                available: available + amount,
                reserved: reserved - amount,
            },
            Self::Fee => Balance {
                available: available - amount,
                reserved,
            },
        }
    }

    /// The entry's contribution to total supply (available + reserved).
    ///
    /// Reserve/Release are internal moves and contribute zero; summing the
    /// signed amounts of all entries for a currency therefore equals the net
    /// external flow; the conservation check builds on this.
    #[must_use]
    pub fn signed_amount(self, amount: Decimal) -> Decimal {
        match self {
            Self::Deposit | Self::TradeCredit | Self::FeeCredit => amount,
            Self::Withdrawal | Self::TradeDebit | Self::Fee => -amount,
            Self::Reserve | Self::Release => Decimal::ZERO,
        }
    }

    /// Whether this kind records external value entering or leaving the
    /// system (as opposed to moving between accounts or buckets).
    #[must_use]
    pub fn is_external_flow(self) -> bool {
        matches!(self, Self::Deposit | Self::Withdrawal)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
            Self::Reserve => write!(f, "RESERVE"),
            Self::Release => write!(f, "RELEASE"),
            Self::TradeDebit => write!(f, "TRADE_DEBIT"),
            Self::TradeCredit => write!(f, "TRADE_CREDIT"),
            Self::Fee => write!(f, "FEE"),
            Self::FeeCredit => write!(f, "FEE_CREDIT"),
        }
    }
}

/// The logical operation a ledger entry belongs to.
///
/// Every entry carries a reference so a whole operation (all entries of one
/// fill, one request settlement) can be reconstructed and, if needed,
/// compensated by inverse entries pointing back at the originals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryRef {
    /// Entries posted by one fill.
    Fill(FillId),
    /// Entries posted while settling one wallet request.
    Request(RequestId),
    /// Entries posted on behalf of one order (its reserve / release).
    Order(OrderId),
    /// Entries acting directly on a reservation.
    Reservation(ReservationId),
    /// Inverse-correction entry pointing at the original it compensates.
    Adjustment(EntrySeq),
}

impl std::fmt::Display for EntryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fill(id) => write!(f, "fill:{id}"),
            Self::Request(id) => write!(f, "{id}"),
            Self::Order(id) => write!(f, "order:{id}"),
            Self::Reservation(id) => write!(f, "{id}"),
            Self::Adjustment(seq) => write!(f, "adjust:{seq}"),
        }
    }
}

/// One immutable, append-only balance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Journal position; doubles as the entry's identifier.
    pub seq: EntrySeq,
    pub account_id: AccountId,
    pub currency: Currency,
    pub kind: EntryKind,
    /// Always positive; direction comes from `kind`.
    pub amount: Decimal,
    /// Snapshot of the account's balance in `currency` after this entry.
    pub balance_after: Balance,
    /// The logical operation this entry belongs to.
    pub reference: EntryRef,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// This entry's contribution to total supply.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed_amount(self.amount)
    }
}

impl std::fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} -> avail {} rsvd {}",
            self.seq,
            self.account_id,
            self.kind,
            self.amount,
            self.currency,
            self.balance_after.available,
            self.balance_after.reserved,
        )
    }
}
