//! Fill records produced by the ClearBook matcher.
//!
//! A [`Fill`] is the immutable record of one match between a taker and a
//! maker. Fills always execute at the **maker's** quoted price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, FillId, OrderId, OrderSide, Pair};

/// One match between a taker (incoming) and maker (resting) order.
///
/// Each fill produces exactly one TradeDebit and one TradeCredit ledger
/// entry per side, plus the fee entries of the configured schedule,
/// all referencing this fill's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// Deterministic per pair: derived from the pair's fill sequence.
    pub id: FillId,
    /// The pair this fill executed on.
    pub pair: Pair,
    /// The aggressive (incoming) order.
    pub taker_order_id: OrderId,
    /// The taker's account.
    pub taker_account_id: AccountId,
    /// The passive (resting) order whose price set the fill price.
    pub maker_order_id: OrderId,
    /// The maker's account.
    pub maker_account_id: AccountId,
    /// Execution price, always the maker's quoted price.
    pub price: Decimal,
    /// Executed quantity in base currency.
    pub qty: Decimal,
    /// Quote amount = price × qty.
    pub quote_amount: Decimal,
    /// Which side the taker was on.
    pub taker_side: OrderSide,
    /// When this fill was executed.
    pub executed_at: DateTime<Utc>,
}

impl Fill {
    /// The fee-relevant notional value (quote amount).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quote_amount
    }

    /// Returns `true` if the taker was buying.
    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == OrderSide::Buy
    }

    /// The account that pays quote and receives base.
    #[must_use]
    pub fn buyer_account(&self) -> AccountId {
        if self.taker_is_buyer() {
            self.taker_account_id
        } else {
            self.maker_account_id
        }
    }

    /// The account that pays base and receives quote.
    #[must_use]
    pub fn seller_account(&self) -> AccountId {
        if self.taker_is_buyer() {
            self.maker_account_id
        } else {
            self.taker_account_id
        }
    }
}

impl std::fmt::Display for Fill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fill[{}] {} {} {} @ {} = {}",
            self.id, self.pair, self.taker_side, self.qty, self.price, self.quote_amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fill() -> Fill {
        Fill {
            id: FillId::deterministic("BTC/USDT", 0),
            pair: Pair::new("BTC", "USDT"),
            taker_order_id: OrderId::new(),
            taker_account_id: AccountId::new(),
            maker_order_id: OrderId::new(),
            maker_account_id: AccountId::new(),
            price: Decimal::new(50000, 0),
            qty: Decimal::new(1, 0),
            quote_amount: Decimal::new(50000, 0),
            taker_side: OrderSide::Buy,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn fill_notional() {
        let f = make_fill();
        assert_eq!(f.notional(), Decimal::new(50000, 0));
    }

    #[test]
    fn buyer_seller_resolution() {
        let f = make_fill();
        assert!(f.taker_is_buyer());
        assert_eq!(f.buyer_account(), f.taker_account_id);
        assert_eq!(f.seller_account(), f.maker_account_id);

        let mut g = make_fill();
        g.taker_side = OrderSide::Sell;
        assert_eq!(g.buyer_account(), g.maker_account_id);
        assert_eq!(g.seller_account(), g.taker_account_id);
    }

    #[test]
    fn fill_display() {
        let f = make_fill();
        let s = format!("{f}");
        assert!(s.contains("BTC/USDT"));
        assert!(s.contains("50000"));
    }

    #[test]
    fn fill_serde_roundtrip() {
        let fill = make_fill();
        let json = serde_json::to_string(&fill).unwrap();
        let back: Fill = serde_json::from_str(&json).unwrap();
        assert_eq!(fill.id, back.id);
        assert_eq!(fill.price, back.price);
        assert_eq!(fill.qty, back.qty);
    }
}
