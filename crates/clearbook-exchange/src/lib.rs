//! # clearbook-exchange
//!
//! **The assembled ClearBook venue.**
//!
//! One [`Exchange`] value is a complete trading core: an event-sourced
//! ledger, tier-based limit policy, per-pair matching sequencers, and
//! the approval-gated wallet, wired together so that:
//!
//! - every order is fully funded before it can touch a book
//! - every fill settles atomically, fees included, in its pair's
//!   sequencing order
//! - every external funds movement waits on the approval oracle
//! - the journal replays to the live balances, or the audit fails loudly
//!
//! ```no_run
//! use clearbook_exchange::Exchange;
//! use clearbook_types::{AccountId, ExchangeConfig, KycTier, OrderKind, OrderSide};
//! use rust_decimal::Decimal;
//!
//! # async fn demo() -> clearbook_types::Result<()> {
//! let venue = Exchange::new(ExchangeConfig::new(AccountId::new()));
//! let alice = venue.open_account();
//! venue.set_tier(alice, KycTier::Gold);
//!
//! let deposit = venue.request_deposit(alice, "USDT", Decimal::new(100_000, 0), None)?;
//! venue.approve_request(deposit.id)?;
//!
//! let placed = venue
//!     .place_order(
//!         alice,
//!         "BTC/USDT",
//!         OrderSide::Buy,
//!         OrderKind::Limit,
//!         Decimal::ONE,
//!         Some(Decimal::new(50_000, 0)),
//!     )
//!     .await?;
//! println!("order {} is {}", placed.order.id, placed.order.status);
//! # Ok(())
//! # }
//! ```

pub mod exchange;
pub mod telemetry;

pub use exchange::Exchange;
