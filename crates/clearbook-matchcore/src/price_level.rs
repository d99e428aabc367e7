//! A single price level in the order book.
//!
//! Orders at the same price are stored in FIFO order (time priority)
//! using a [`VecDeque`].

use std::collections::VecDeque;

use clearbook_types::{Order, OrderId};
use rust_decimal::Decimal;

/// All resting orders quoted at one price.
///
/// The front of the deque is the oldest order and fills first. A maker
/// that matched partially goes back to the front, so a partial fill
/// never costs time priority.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price at this level.
    pub price: Decimal,
    /// Orders in time-priority order (front = oldest = fills first).
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Add an order at the back (lowest time priority).
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Put an order back at the front, restoring its time priority.
    pub fn push_front(&mut self, order: Order) {
        self.orders.push_front(order);
    }

    /// Remove and return the front (oldest) order.
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// Peek at the front order without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Total unfilled quantity across all orders at this level.
    #[must_use]
    pub fn total_quantity(&self) -> Decimal {
        self.orders.iter().map(Order::remaining_qty).sum()
    }

    /// Remove a specific order by ID. Returns the removed order, or `None`.
    pub fn remove_order(&mut self, order_id: OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}
