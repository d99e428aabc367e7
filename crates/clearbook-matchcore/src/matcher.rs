//! Continuous price-time matching.
//!
//! An incoming (taker) order walks the opposite side of the book from the
//! best price inward. Every fill executes at the **maker's** quoted price;
//! the taker never pays more (buy) or receives less (sell) than its limit.
//!
//! Self-trades are blocked at match level: a maker owned by the taker's
//! account is skipped and put back untouched, still at its original time
//! priority.
//!
//! Market orders are match-or-cancel: whatever the book cannot fill is
//! cancelled, never rested.

use chrono::Utc;
use clearbook_types::{Fill, FillId, Order, OrderKind, OrderStatus, Result};
use rust_decimal::Decimal;

use crate::book::OrderBook;

/// Everything one taker order did to the book.
#[derive(Debug)]
pub struct MatchOutcome {
    /// The taker in its post-match state (filled, resting, or cancelled).
    pub taker: Order,
    /// Fills in execution order.
    pub fills: Vec<Fill>,
    /// Every maker whose state changed, in final form.
    pub makers: Vec<Order>,
}

impl MatchOutcome {
    /// Total base quantity the taker executed.
    #[must_use]
    pub fn executed_qty(&self) -> Decimal {
        self.fills.iter().map(|f| f.qty).sum()
    }
}

/// Match `taker` against the book.
///
/// `fill_seq` is the pair's running fill counter; fill ids are derived
/// from it, so a replayed command stream reproduces identical ids.
///
/// The book is left consistent on return: filled makers removed, a
/// partially filled maker back at the front of its level, and a limit
/// taker with remaining quantity resting at its price.
pub fn match_order(
    book: &mut OrderBook,
    mut taker: Order,
    fill_seq: &mut u64,
) -> Result<MatchOutcome> {
    debug_assert_eq!(taker.pair, book.pair, "taker routed to wrong book");

    let symbol = book.pair.symbol();
    let mut fills = Vec::new();
    let mut makers = Vec::new();
    let mut skipped_own = Vec::new();

    while taker.remaining_qty() > Decimal::ZERO {
        let Some(best) = book.best_price(taker.side.opposite()) else {
            break;
        };
        if !taker.crosses(best) {
            break;
        }
        let Some(mut maker) = book.pop_best(taker.side.opposite()) else {
            break;
        };

        if maker.account_id == taker.account_id {
            tracing::warn!(
                account = %taker.account_id,
                taker_order = %taker.id,
                maker_order = %maker.id,
                "Self-trade blocked: same account on both sides"
            );
            skipped_own.push(maker);
            continue;
        }

        let price = maker.effective_price();
        let fill_qty = taker.remaining_qty().min(maker.remaining_qty());
        let quote_amount = price.checked_mul(fill_qty).unwrap_or(Decimal::MAX);

        let fill = Fill {
            id: FillId::deterministic(&symbol, *fill_seq),
            pair: book.pair.clone(),
            taker_order_id: taker.id,
            taker_account_id: taker.account_id,
            maker_order_id: maker.id,
            maker_account_id: maker.account_id,
            price,
            qty: fill_qty,
            quote_amount,
            taker_side: taker.side,
            executed_at: Utc::now(),
        };
        *fill_seq += 1;

        taker.filled_qty += fill_qty;
        maker.filled_qty += fill_qty;

        tracing::debug!(
            fill = %fill.id,
            taker = %taker.id,
            maker = %maker.id,
            price = %price,
            qty = %fill_qty,
            "orders matched"
        );
        fills.push(fill);

        if maker.is_filled() {
            maker.transition(OrderStatus::Filled)?;
        } else {
            // Partial fill never costs the maker its place in line.
            if maker.status == OrderStatus::Open {
                maker.transition(OrderStatus::PartiallyFilled)?;
            }
            book.restore_front(maker.clone());
        }
        makers.push(maker);
    }

    // Skipped own orders go back untouched. They were popped front-first,
    // so re-fronting in reverse restores the original order.
    for own in skipped_own.into_iter().rev() {
        book.restore_front(own);
    }

    if taker.is_filled() {
        taker.transition(OrderStatus::Filled)?;
    } else if taker.kind == OrderKind::Limit {
        taker.transition(if fills.is_empty() {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        })?;
        book.insert_order(taker.clone())?;
    } else {
        // Market remainder is cancelled, never rested.
        taker.transition(OrderStatus::Cancelled)?;
    }

    Ok(MatchOutcome {
        taker,
        fills,
        makers,
    })
}

#[cfg(test)]
mod tests {
    use clearbook_types::{AccountId, OrderSide, Pair};

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn book() -> OrderBook {
        OrderBook::new(Pair::new("BTC", "USDT"))
    }

    fn limit(side: OrderSide, price: i64, qty: i64) -> Order {
        let mut order = Order::dummy_limit(side, dec(price), dec(qty));
        order.status = OrderStatus::New;
        order
    }

    fn rest(book: &mut OrderBook, mut order: Order) -> Order {
        order.status = OrderStatus::Open;
        book.insert_order(order.clone()).unwrap();
        order
    }

    #[test]
    fn fills_at_maker_price() {
        let mut book = book();
        let maker = rest(&mut book, limit(OrderSide::Sell, 101, 1));
        let mut seq = 0;

        let outcome = match_order(&mut book, limit(OrderSide::Buy, 105, 1), &mut seq).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        let fill = &outcome.fills[0];
        assert_eq!(fill.price, dec(101), "executes at maker's quote, not taker's limit");
        assert_eq!(fill.qty, dec(1));
        assert_eq!(fill.quote_amount, dec(101));
        assert_eq!(fill.maker_order_id, maker.id);
        assert_eq!(outcome.taker.status, OrderStatus::Filled);
        assert_eq!(outcome.makers[0].status, OrderStatus::Filled);
        assert!(book.is_empty());
        assert_eq!(seq, 1);
    }

    #[test]
    fn partial_maker_keeps_front_of_level() {
        let mut book = book();
        let maker = rest(&mut book, limit(OrderSide::Sell, 101, 10));
        rest(&mut book, limit(OrderSide::Sell, 101, 5));
        let mut seq = 0;

        let outcome = match_order(&mut book, limit(OrderSide::Buy, 101, 4), &mut seq).unwrap();

        assert_eq!(outcome.taker.status, OrderStatus::Filled);
        assert_eq!(outcome.makers.len(), 1);
        assert_eq!(outcome.makers[0].id, maker.id);
        assert_eq!(outcome.makers[0].status, OrderStatus::PartiallyFilled);
        assert_eq!(outcome.makers[0].remaining_qty(), dec(6));

        // Next pop must be the same maker, still ahead of the later order.
        let front = book.pop_best(OrderSide::Sell).unwrap();
        assert_eq!(front.id, maker.id);
        assert_eq!(front.remaining_qty(), dec(6));
    }

    #[test]
    fn limit_taker_rests_remainder() {
        let mut book = book();
        rest(&mut book, limit(OrderSide::Sell, 99, 2));
        let mut seq = 0;

        let taker = limit(OrderSide::Buy, 100, 5);
        let taker_id = taker.id;
        let outcome = match_order(&mut book, taker, &mut seq).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].price, dec(99));
        assert_eq!(outcome.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(outcome.taker.remaining_qty(), dec(3));
        assert!(book.contains_order(taker_id));
        assert_eq!(book.best_bid(), Some(dec(100)));
    }

    #[test]
    fn limit_taker_without_cross_rests_open() {
        let mut book = book();
        rest(&mut book, limit(OrderSide::Sell, 101, 1));
        let mut seq = 0;

        let outcome = match_order(&mut book, limit(OrderSide::Buy, 100, 1), &mut seq).unwrap();

        assert!(outcome.fills.is_empty());
        assert_eq!(outcome.taker.status, OrderStatus::Open);
        assert_eq!(book.best_bid(), Some(dec(100)));
        assert_eq!(book.best_ask(), Some(dec(101)));
        assert_eq!(seq, 0);
    }

    #[test]
    fn walks_levels_in_price_time_order() {
        let mut book = book();
        let first = rest(&mut book, limit(OrderSide::Sell, 101, 1));
        let second = rest(&mut book, limit(OrderSide::Sell, 101, 1));
        let third = rest(&mut book, limit(OrderSide::Sell, 102, 1));
        let mut seq = 0;

        let outcome = match_order(&mut book, limit(OrderSide::Buy, 102, 3), &mut seq).unwrap();

        assert_eq!(outcome.fills.len(), 3);
        assert_eq!(outcome.fills[0].maker_order_id, first.id);
        assert_eq!(outcome.fills[0].price, dec(101));
        assert_eq!(outcome.fills[1].maker_order_id, second.id);
        assert_eq!(outcome.fills[2].maker_order_id, third.id);
        assert_eq!(outcome.fills[2].price, dec(102));
        assert_eq!(outcome.taker.status, OrderStatus::Filled);
        assert!(book.is_empty());
    }

    #[test]
    fn market_remainder_cancelled() {
        let mut book = book();
        rest(&mut book, limit(OrderSide::Sell, 101, 1));
        let mut seq = 0;

        let outcome =
            match_order(&mut book, Order::dummy_market(OrderSide::Buy, dec(3)), &mut seq).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.taker.status, OrderStatus::Cancelled);
        assert_eq!(outcome.taker.filled_qty, dec(1));
        assert!(book.is_empty(), "market remainder must not rest");
    }

    #[test]
    fn market_with_no_liquidity_cancelled() {
        let mut book = book();
        let mut seq = 0;

        let outcome =
            match_order(&mut book, Order::dummy_market(OrderSide::Sell, dec(2)), &mut seq).unwrap();

        assert!(outcome.fills.is_empty());
        assert_eq!(outcome.taker.status, OrderStatus::Cancelled);
        assert_eq!(seq, 0);
    }

    #[test]
    fn own_resting_order_is_skipped_not_matched() {
        let mut book = book();
        let account = AccountId::new();

        let mut own = limit(OrderSide::Sell, 101, 1);
        own.account_id = account;
        let own_id = own.id;
        rest(&mut book, own);

        let mut taker = limit(OrderSide::Buy, 101, 1);
        taker.account_id = account;
        let mut seq = 0;

        let outcome = match_order(&mut book, taker, &mut seq).unwrap();

        assert!(outcome.fills.is_empty());
        assert!(book.contains_order(own_id), "skipped maker stays resting");
        assert_eq!(outcome.taker.status, OrderStatus::Open);
        assert_eq!(book.best_ask(), Some(dec(101)));
        assert_eq!(book.best_bid(), Some(dec(101)));
    }

    #[test]
    fn skip_reaches_other_makers_behind_own_order() {
        let mut book = book();
        let account = AccountId::new();

        let mut own = limit(OrderSide::Sell, 101, 1);
        own.account_id = account;
        let own_id = own.id;
        rest(&mut book, own);
        let other = rest(&mut book, limit(OrderSide::Sell, 101, 1));

        let mut taker = limit(OrderSide::Buy, 101, 1);
        taker.account_id = account;
        let mut seq = 0;

        let outcome = match_order(&mut book, taker, &mut seq).unwrap();

        assert_eq!(outcome.fills.len(), 1);
        assert_eq!(outcome.fills[0].maker_order_id, other.id);
        assert!(book.contains_order(own_id), "own order restored after skip");
        // The restored order is back at the front of its level.
        assert_eq!(book.pop_best(OrderSide::Sell).unwrap().id, own_id);
    }

    #[test]
    fn fill_ids_deterministic_per_sequence() {
        let mut book_a = book();
        let mut book_b = book();
        rest(&mut book_a, limit(OrderSide::Sell, 101, 1));
        rest(&mut book_b, limit(OrderSide::Sell, 101, 1));

        let mut seq_a = 7;
        let mut seq_b = 7;
        let out_a = match_order(&mut book_a, limit(OrderSide::Buy, 101, 1), &mut seq_a).unwrap();
        let out_b = match_order(&mut book_b, limit(OrderSide::Buy, 101, 1), &mut seq_b).unwrap();

        assert_eq!(out_a.fills[0].id, out_b.fills[0].id);
        assert_eq!(out_a.executed_qty(), dec(1));
    }
}
