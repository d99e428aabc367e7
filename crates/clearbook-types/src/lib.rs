//! # clearbook-types
//!
//! Shared types, errors, and configuration for the **ClearBook** trading core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`OrderId`], [`FillId`], [`ReservationId`], [`RequestId`], [`EntrySeq`], [`Pair`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderKind`], [`OrderStatus`]
//! - **Fill model**: [`Fill`]
//! - **Ledger model**: [`LedgerEntry`], [`EntryKind`], [`EntryRef`], [`Balance`]
//! - **Wallet model**: [`WalletRequest`], [`RequestKind`], [`RequestStatus`]
//! - **Limit policy**: [`KycTier`], [`TierTable`], [`LimitDecision`], [`LimitDenial`]
//! - **Configuration**: [`ExchangeConfig`], [`PairConfig`], [`FeeSchedule`]
//! - **Errors**: [`ClearbookError`] with `CB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod fill;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod tier;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use clearbook_types::{Order, OrderSide, Fill, LedgerEntry, ...};

pub use balance::*;
pub use config::*;
pub use error::*;
pub use fill::*;
pub use ids::*;
pub use ledger::*;
pub use order::*;
pub use tier::*;
pub use wallet::*;

// Constants are accessed via `clearbook_types::constants::FOO`
// (not re-exported to avoid name collisions).
