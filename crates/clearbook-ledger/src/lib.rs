//! # clearbook-ledger
//!
//! Event-sourced fund ledger for the **ClearBook** exchange core.
//!
//! This crate owns every balance in the system:
//!
//! - [`Ledger`]: append-only journal plus live balance and reservation
//!   state, one lock per account
//! - [`Journal`]: the entry log itself, replayable, checksummed,
//!   self-verifying
//! - [`LimitPolicy`] / [`LimitUsage`]: rolling-window tier limits computed
//!   from the journal
//! - [`KycOracle`] / [`DirectoryOracle`]: account-to-tier resolution
//! - [`verify_conservation`]: full cross-check of journal, balances, and
//!   holds
//!
//! ## Funds lifecycle
//!
//! ```text
//! deposit ──▶ available ──reserve──▶ reserved ──settle──▶ gone (withdrawal)
//!                ▲                      │                 or counterparty
//!                └──────release─────────┘                 (trade)
//! ```
//!
//! Every transition appends exactly one entry per affected
//! `(account, currency)`; replaying the journal from entry zero reproduces
//! the live balances or fails loudly. Money is never created or destroyed
//! by an internal move; only deposits and withdrawals change supply.

pub mod account;
pub mod audit;
pub mod journal;
pub mod limits;
pub mod store;

pub use account::Reservation;
pub use audit::{verify_conservation, AuditReport};
pub use journal::Journal;
pub use limits::{DirectoryOracle, KycOracle, LimitLine, LimitPolicy, LimitReport, LimitUsage};
pub use store::Ledger;
