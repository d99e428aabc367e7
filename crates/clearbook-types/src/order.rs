//! Order model for the ClearBook matching engine.
//!
//! Every order is backed by a balance reservation: the worst-case cost is
//! moved to `reserved` before the order may enter a book. The matcher settles
//! against that reservation fill by fill; the remainder is released when the
//! order reaches a terminal state.
//!
//! ## Status Machine
//!
//! ```text
//!   ┌─────┐      ┌──────┐      ┌─────────────────┐      ┌────────┐
//!   │ NEW ├─────▶│ OPEN ├─────▶│ PARTIALLY_FILLED ├────▶│ FILLED │
//!   └──┬──┘      └──┬───┘      └──────┬───────────┘     └────────┘
//!      │            │                 │
//!      ▼            ▼                 ▼
//!  REJECTED      CANCELLED        CANCELLED
//! ```
//!
//! Transitions are **monotonic**: terminal states (`Filled`, `Cancelled`,
//! `Rejected`) have no outgoing edges.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, OrderId, Pair, ReservationId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The opposite book side (the side an incoming order matches against).
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The kind of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Market,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted by the API but not yet through admission.
    New,
    /// Resting in the book, nothing filled yet.
    Open,
    /// Resting in the book with some quantity filled.
    PartiallyFilled,
    /// Fully filled. Terminal.
    Filled,
    /// Cancelled; any unfilled reservation released. Terminal.
    Cancelled,
    /// Failed admission (validation, limits, or funding). Terminal.
    Rejected,
}

impl OrderStatus {
    /// Can an order move from this status to the given target?
    ///
    /// Encodes the monotonic status machine; terminal states have no
    /// outgoing transitions.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::New,
                Self::Open
                    | Self::PartiallyFilled
                    | Self::Filled
                    | Self::Cancelled
                    | Self::Rejected
            ) | (Self::Open, Self::PartiallyFilled | Self::Filled | Self::Cancelled)
                | (Self::PartiallyFilled, Self::Filled | Self::Cancelled)
        )
    }

    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Whether an order in this status is resting in a book.
    #[must_use]
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Core order struct. References the [`ReservationId`] that funds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub pair: Pair,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub qty: Decimal,
    /// Present for limit orders, `None` for market orders.
    pub limit_price: Option<Decimal>,
    pub filled_qty: Decimal,
    /// The reservation holding this order's worst-case cost. `None` only
    /// for orders rejected at admission, which never reserved funds.
    pub reservation_id: Option<ReservationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Quantity still unfilled.
    #[must_use]
    pub fn remaining_qty(&self) -> Decimal {
        self.qty - self.filled_qty
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.filled_qty == self.qty
    }

    /// The price this order is willing to trade at, for book comparisons.
    /// Market buys cross any ask; market sells cross any bid.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        match (self.kind, self.side) {
            (OrderKind::Limit, _) => self.limit_price.unwrap_or(Decimal::ZERO),
            (OrderKind::Market, OrderSide::Buy) => Decimal::MAX,
            (OrderKind::Market, OrderSide::Sell) => Decimal::ZERO,
        }
    }

    /// Whether this order crosses a resting order quoted at `maker_price`.
    #[must_use]
    pub fn crosses(&self, maker_price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => self.effective_price() >= maker_price,
            OrderSide::Sell => self.effective_price() <= maker_price,
        }
    }

    /// The currency this order spends (what the reservation holds).
    #[must_use]
    pub fn spending_currency(&self) -> &str {
        match self.side {
            OrderSide::Buy => &self.pair.quote,
            OrderSide::Sell => &self.pair.base,
        }
    }

    /// The currency this order receives when filled.
    #[must_use]
    pub fn receiving_currency(&self) -> &str {
        match self.side {
            OrderSide::Buy => &self.pair.base,
            OrderSide::Sell => &self.pair.quote,
        }
    }

    /// The reservation funding this order.
    ///
    /// # Errors
    /// `Internal` if the order has none; only rejected orders are
    /// unfunded, and they never reach the matcher or settlement.
    pub fn funding(&self) -> crate::Result<ReservationId> {
        self.reservation_id.ok_or_else(|| {
            crate::ClearbookError::Internal(format!("order {} has no funding reservation", self.id))
        })
    }

    /// Move to a new status, enforcing the monotonic status machine.
    ///
    /// # Errors
    /// An illegal transition is an engine bug and surfaces as
    /// [`crate::ClearbookError::Internal`].
    pub fn transition(&mut self, target: OrderStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(crate::ClearbookError::Internal(format!(
                "illegal order status transition {} -> {} on {}",
                self.status, target, self.id
            )));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_limit_for_account(AccountId::new(), side, price, qty)
    }

    pub fn dummy_limit_for_account(
        account_id: AccountId,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account_id,
            pair: Pair::new("BTC", "USDT"),
            side,
            kind: OrderKind::Limit,
            status: OrderStatus::Open,
            qty,
            limit_price: Some(price),
            filled_qty: Decimal::ZERO,
            reservation_id: Some(ReservationId::new()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_market(side: OrderSide, qty: Decimal) -> Self {
        Self {
            id: OrderId::new(),
            account_id: AccountId::new(),
            pair: Pair::new("BTC", "USDT"),
            side,
            kind: OrderKind::Market,
            status: OrderStatus::New,
            qty,
            limit_price: None,
            filled_qty: Decimal::ZERO,
            reservation_id: Some(ReservationId::new()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_valid() {
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Open));
        assert!(OrderStatus::New.can_transition_to(OrderStatus::Rejected));
        assert!(OrderStatus::Open.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::Open.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Filled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn status_transitions_invalid() {
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Open));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Open));
        assert!(!OrderStatus::Open.can_transition_to(OrderStatus::New));
        assert!(!OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Open));
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn transition_rejects_terminal_exit() {
        let mut order = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE);
        order.transition(OrderStatus::Filled).unwrap();
        assert!(order.transition(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn effective_price_limit() {
        let order = Order::dummy_limit(OrderSide::Buy, Decimal::new(50000, 0), Decimal::ONE);
        assert_eq!(order.effective_price(), Decimal::new(50000, 0));
    }

    #[test]
    fn market_orders_cross_anything() {
        let buy = Order::dummy_market(OrderSide::Buy, Decimal::ONE);
        let sell = Order::dummy_market(OrderSide::Sell, Decimal::ONE);
        assert!(buy.crosses(Decimal::new(1_000_000, 0)));
        assert!(sell.crosses(Decimal::new(1, 2)));
    }

    #[test]
    fn limit_crossing() {
        let buy = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE);
        assert!(buy.crosses(Decimal::new(99, 0)));
        assert!(buy.crosses(Decimal::new(100, 0)));
        assert!(!buy.crosses(Decimal::new(101, 0)));

        let sell = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), Decimal::ONE);
        assert!(sell.crosses(Decimal::new(101, 0)));
        assert!(!sell.crosses(Decimal::new(99, 0)));
    }

    #[test]
    fn spending_and_receiving_currency() {
        let buy = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE);
        assert_eq!(buy.spending_currency(), "USDT");
        assert_eq!(buy.receiving_currency(), "BTC");

        let sell = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), Decimal::ONE);
        assert_eq!(sell.spending_currency(), "BTC");
        assert_eq!(sell.receiving_currency(), "USDT");
    }

    #[test]
    fn fill_tracking() {
        let mut order =
            Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::new(10, 0));
        assert!(!order.is_filled());
        assert_eq!(order.remaining_qty(), Decimal::new(10, 0));
        order.filled_qty = Decimal::new(10, 0);
        assert!(order.is_filled());
        assert_eq!(order.remaining_qty(), Decimal::ZERO);
    }
}
