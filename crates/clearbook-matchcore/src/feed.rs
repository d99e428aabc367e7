//! External reference prices.
//!
//! Market buys have no limit price, so admission needs an upper bound to
//! reserve against. The feed supplies that reference; the engine falls
//! back to the book's best ask when the feed has no quote.

use clearbook_types::Pair;
use dashmap::DashMap;
use rust_decimal::Decimal;

/// Source of reference prices for worst-case cost bounds.
pub trait PriceFeed: Send + Sync {
    /// Latest reference price for the pair, if known.
    fn reference_price(&self, pair: &Pair) -> Option<Decimal>;
}

/// Fixed prices keyed by pair symbol. Empty by default; a pair without a
/// price simply has no feed quote.
#[derive(Debug, Default)]
pub struct StaticFeed {
    prices: DashMap<String, Decimal>,
}

impl StaticFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_string(), price);
    }
}

impl PriceFeed for StaticFeed {
    fn reference_price(&self, pair: &Pair) -> Option<Decimal> {
        self.prices.get(&pair.symbol()).map(|entry| *entry.value())
    }
}
