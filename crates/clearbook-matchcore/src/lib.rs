//! # clearbook-matchcore
//!
//! **Price-time priority matching for ClearBook.**
//!
//! Each trading pair gets its own book and its own sequencer task; the
//! task is the only writer, so matching needs no locks and order effects
//! land in submission order. [`MatchingEngine`] sits in front as the
//! admission gate:
//!
//! - **Fully funded books**: worst-case cost is reserved before an order
//!   can touch a book
//! - **Fills at maker price**: the resting order sets the price; takers
//!   keep any improvement
//! - **Match-or-cancel markets**: a market order never rests
//! - **Self-trade prevention**: an account's own resting orders are
//!   skipped, not matched

pub mod book;
pub mod engine;
pub mod feed;
pub mod matcher;
pub mod price_level;
pub mod sequencer;

pub use book::{DepthLevel, DepthSnapshot, OrderBook};
pub use engine::MatchingEngine;
pub use feed::{PriceFeed, StaticFeed};
pub use matcher::{match_order, MatchOutcome};
pub use price_level::PriceLevel;
pub use sequencer::{BookQuote, PlacedOrder, SequencerHandle};
