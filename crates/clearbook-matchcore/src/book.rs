//! The order book for a single trading pair.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) cancellation.
//! Only limit orders rest here; a market order either matches on arrival or
//! its remainder is cancelled.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use clearbook_types::{
    ClearbookError, Order, OrderId, OrderKind, OrderSide, Pair, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::price_level::PriceLevel;

/// The book for a single pair.
#[derive(Debug)]
pub struct OrderBook {
    /// The pair this book serves (e.g., BTC/USDT).
    pub pair: Pair,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)` for O(log N) cancel.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
}

impl OrderBook {
    #[must_use]
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest a limit order in the book at its quoted price.
    ///
    /// # Errors
    /// `DuplicateOrder` if the id is already resting; `Internal` if handed
    /// a market order, which must never rest.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if order.kind == OrderKind::Market {
            return Err(ClearbookError::Internal(format!(
                "market order {} cannot rest in the book",
                order.id
            )));
        }
        if self.index.contains_key(&order.id) {
            return Err(ClearbookError::DuplicateOrder(order.id));
        }

        let price = order.effective_price();
        self.index.insert(order.id, (order.side, price));

        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_back(order);
            }
        }
        Ok(())
    }

    /// Put a maker back at the **front** of its level, keeping the time
    /// priority it held before a partial fill or a self-match skip.
    pub fn restore_front(&mut self, order: Order) {
        let price = order.effective_price();
        self.index.insert(order.id, (order.side, price));
        match order.side {
            OrderSide::Buy => {
                self.bids
                    .entry(Reverse(price))
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_front(order);
            }
            OrderSide::Sell => {
                self.asks
                    .entry(price)
                    .or_insert_with(|| PriceLevel::new(price))
                    .push_front(order);
            }
        }
    }

    // =================================================================
    // Removal
    // =================================================================

    /// Remove a resting order by id, e.g. for cancellation. Returns `None`
    /// if the order is not in the book (already filled or never rested).
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, price) = self.index.remove(&order_id)?;
        match side {
            OrderSide::Buy => {
                let level = self.bids.get_mut(&Reverse(price))?;
                let order = level.remove_order(order_id)?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                Some(order)
            }
            OrderSide::Sell => {
                let level = self.asks.get_mut(&price)?;
                let order = level.remove_order(order_id)?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                Some(order)
            }
        }
    }

    /// Pop the front order of the best level on `side` (`Buy` = highest
    /// bid, `Sell` = lowest ask). Empty levels are pruned.
    pub fn pop_best(&mut self, side: OrderSide) -> Option<Order> {
        let order = match side {
            OrderSide::Buy => {
                let key = *self.bids.keys().next()?;
                let level = self.bids.get_mut(&key)?;
                let order = level.pop_front()?;
                if level.is_empty() {
                    self.bids.remove(&key);
                }
                order
            }
            OrderSide::Sell => {
                let key = *self.asks.keys().next()?;
                let level = self.asks.get_mut(&key)?;
                let order = level.pop_front()?;
                if level.is_empty() {
                    self.asks.remove(&key);
                }
                order
            }
        };
        self.index.remove(&order.id);
        Some(order)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Best price on `side` of the book.
    #[must_use]
    pub fn best_price(&self, side: OrderSide) -> Option<Decimal> {
        match side {
            OrderSide::Buy => self.best_bid(),
            OrderSide::Sell => self.best_ask(),
        }
    }

    /// Spread = best_ask - best_bid. `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Total number of orders currently resting.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Aggregated view of the top `levels` levels per side.
    #[must_use]
    pub fn depth(&self, levels: usize) -> DepthSnapshot {
        DepthSnapshot {
            pair: self.pair.clone(),
            bids: self.bids.values().take(levels).map(DepthLevel::of).collect(),
            asks: self.asks.values().take(levels).map(DepthLevel::of).collect(),
        }
    }
}

/// One aggregated level of a [`DepthSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub qty: Decimal,
    pub orders: usize,
}

impl DepthLevel {
    fn of(level: &PriceLevel) -> Self {
        Self {
            price: level.price,
            qty: level.total_quantity(),
            orders: level.len(),
        }
    }
}

/// Aggregated book view: best levels first on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub pair: Pair,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}
