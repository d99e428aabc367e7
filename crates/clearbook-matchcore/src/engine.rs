//! Order admission and routing.
//!
//! [`MatchingEngine`] is the front door for trading: it validates an
//! order's shape, bounds its worst-case cost, runs the tier limit gate,
//! reserves funding, and only then hands the order to its pair's
//! sequencer. An order that reaches a book is always fully funded for
//! every fill it can produce.
//!
//! Admission order: validation → worst-case cost → limit check →
//! reserve → sequence. Failures after validation are recorded as
//! `Rejected` orders so clients can query what happened; failures before
//! that leave no trace.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use clearbook_ledger::{KycOracle, Ledger, LimitPolicy};
use clearbook_types::{
    constants, AccountId, ClearbookError, EntryRef, ExchangeConfig, Fill, FillId, LimitDecision,
    LimitOp, Order, OrderId, OrderKind, OrderSide, OrderStatus, Pair, PairConfig, Result,
};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::book::DepthSnapshot;
use crate::feed::PriceFeed;
use crate::sequencer::{self, BookQuote, PlacedOrder, SequencerHandle};

/// The trading engine: one sequencer per configured pair, shared order
/// and fill stores, and the admission gate in front of them.
pub struct MatchingEngine {
    ledger: Arc<Ledger>,
    policy: LimitPolicy,
    oracle: Arc<dyn KycOracle>,
    feed: Arc<dyn PriceFeed>,
    config: ExchangeConfig,
    orders: Arc<DashMap<OrderId, Order>>,
    fills: Arc<DashMap<FillId, Fill>>,
    sequencers: HashMap<String, SequencerHandle>,
}

impl MatchingEngine {
    /// Wire up the engine and spawn one sequencer task per configured
    /// pair. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        ledger: Arc<Ledger>,
        oracle: Arc<dyn KycOracle>,
        feed: Arc<dyn PriceFeed>,
        config: ExchangeConfig,
    ) -> Self {
        ledger.ensure_account(config.fees.fee_account);

        let orders = Arc::new(DashMap::new());
        let fills = Arc::new(DashMap::new());
        let mut sequencers = HashMap::new();
        for pair_config in &config.pairs {
            let handle = sequencer::spawn_pair(
                pair_config.pair(),
                config.sequencer_queue_depth,
                Arc::clone(&ledger),
                config.fees.clone(),
                Arc::clone(&orders),
                Arc::clone(&fills),
            );
            sequencers.insert(pair_config.symbol(), handle);
        }
        tracing::info!(pairs = sequencers.len(), "matching engine started");

        Self {
            policy: LimitPolicy::new(config.tiers.clone()),
            ledger,
            oracle,
            feed,
            config,
            orders,
            fills,
            sequencers,
        }
    }

    // =================================================================
    // Trading
    // =================================================================

    /// Admit and match one order.
    ///
    /// # Errors
    /// `UnknownPair`, `InvalidQuantity`, `UnknownAccount`,
    /// `NoReferencePrice` (market buy with no price anywhere),
    /// `LimitExceeded`, `InsufficientFunds`, plus anything matching or
    /// settlement surfaces.
    pub async fn place_order(
        &self,
        account_id: AccountId,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<PlacedOrder> {
        let pair_config = self
            .config
            .pair(symbol)
            .ok_or_else(|| ClearbookError::UnknownPair(symbol.to_string()))?;
        validate_shape(pair_config, kind, qty, limit_price)?;
        if !self.ledger.has_account(account_id) {
            return Err(ClearbookError::UnknownAccount(account_id));
        }

        let pair = pair_config.pair();
        let handle = self.handle(symbol)?;
        let (spend_currency, worst_case) = self
            .worst_case_spend(&pair, side, kind, qty, limit_price, handle)
            .await?;

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            account_id,
            pair,
            side,
            kind,
            status: OrderStatus::New,
            qty,
            limit_price,
            filled_qty: Decimal::ZERO,
            reservation_id: None,
            created_at: now,
            updated_at: now,
        };

        let tier = self.oracle.tier_of(account_id);
        let entries = self.ledger.entries_for(account_id)?;
        // Wallet requests never count against the trade window.
        let decision = self.policy.evaluate(
            &entries,
            &[],
            tier,
            LimitOp::Trade,
            &spend_currency,
            worst_case,
            now,
        );
        if let LimitDecision::Deny(denial) = decision {
            self.reject(order, "limit");
            return Err(ClearbookError::LimitExceeded(denial));
        }

        let reservation = match self.ledger.reserve(
            account_id,
            &spend_currency,
            worst_case,
            EntryRef::Order(order.id),
        ) {
            Ok(reservation) => reservation,
            Err(err) => {
                self.reject(order, "funding");
                return Err(err);
            }
        };
        order.reservation_id = Some(reservation);

        match handle.submit(order).await {
            Ok(placed) => Ok(placed),
            Err(err) => {
                // The pair's task is gone; free the hold rather than
                // strand it.
                let _ = self.ledger.release(reservation);
                Err(err)
            }
        }
    }

    /// Cancel an order through its pair's sequencer.
    ///
    /// Cancelling an already-cancelled order returns it unchanged;
    /// `Filled` and `Rejected` orders fail with `OrderNotCancellable`.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let Some(symbol) = self
            .orders
            .get(&order_id)
            .map(|entry| entry.value().pair.symbol())
        else {
            return Err(ClearbookError::OrderNotFound(order_id));
        };
        self.handle(&symbol)?.cancel(order_id).await
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current snapshot of one order.
    pub fn order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or(ClearbookError::OrderNotFound(order_id))
    }

    /// All of an account's orders, oldest first.
    #[must_use]
    pub fn orders_for_account(&self, account_id: AccountId) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }

    /// Every fill an order took part in, as taker or maker, oldest first.
    #[must_use]
    pub fn fills_for_order(&self, order_id: OrderId) -> Vec<Fill> {
        let mut fills: Vec<Fill> = self
            .fills
            .iter()
            .filter(|entry| {
                let fill = entry.value();
                fill.taker_order_id == order_id || fill.maker_order_id == order_id
            })
            .map(|entry| entry.value().clone())
            .collect();
        fills.sort_by_key(|fill| fill.executed_at);
        fills
    }

    /// Aggregated book depth for a pair.
    pub async fn depth(&self, symbol: &str, levels: usize) -> Result<DepthSnapshot> {
        self.handle(symbol)?.depth(levels).await
    }

    /// Top-of-book prices for a pair.
    pub async fn quote(&self, symbol: &str) -> Result<BookQuote> {
        self.handle(symbol)?.quote().await
    }

    /// Symbols this engine trades.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.sequencers.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    // =================================================================
    // Internals
    // =================================================================

    fn handle(&self, symbol: &str) -> Result<&SequencerHandle> {
        self.sequencers
            .get(symbol)
            .ok_or_else(|| ClearbookError::UnknownPair(symbol.to_string()))
    }

    /// Currency and amount to reserve so every possible fill is covered.
    ///
    /// Sells spend their base quantity. Limit buys spend at most
    /// `price × qty`. Market buys are bounded by a reference price (feed
    /// first, then best ask) plus the configured slippage allowance.
    async fn worst_case_spend(
        &self,
        pair: &Pair,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        limit_price: Option<Decimal>,
        handle: &SequencerHandle,
    ) -> Result<(String, Decimal)> {
        match (side, kind) {
            (OrderSide::Sell, _) => Ok((pair.base.clone(), qty)),
            (OrderSide::Buy, OrderKind::Limit) => {
                let price = limit_price.ok_or_else(|| {
                    ClearbookError::Internal("validated limit order lost its price".into())
                })?;
                Ok((pair.quote.clone(), price * qty))
            }
            (OrderSide::Buy, OrderKind::Market) => {
                let reference = match self.feed.reference_price(pair) {
                    Some(price) => price,
                    None => handle.quote().await?.ask.ok_or_else(|| {
                        ClearbookError::NoReferencePrice {
                            pair: pair.symbol(),
                        }
                    })?,
                };
                let bound = reference * (Decimal::ONE + self.config.market_slippage);
                Ok((pair.quote.clone(), bound * qty))
            }
        }
    }

    /// Record an admission failure as a queryable `Rejected` order.
    fn reject(&self, mut order: Order, reason: &str) {
        let order_id = order.id;
        if order.transition(OrderStatus::Rejected).is_ok() {
            tracing::warn!(
                order = %order_id,
                account = %order.account_id,
                reason,
                "order rejected at admission"
            );
            self.orders.insert(order_id, order);
        }
    }
}

fn validate_shape(
    pair_config: &PairConfig,
    kind: OrderKind,
    qty: Decimal,
    limit_price: Option<Decimal>,
) -> Result<()> {
    if qty <= Decimal::ZERO {
        return Err(ClearbookError::InvalidQuantity {
            reason: "quantity must be positive".into(),
        });
    }
    if qty.scale() > constants::QTY_PRECISION {
        return Err(ClearbookError::InvalidQuantity {
            reason: format!(
                "quantity precision exceeds {} decimal places",
                constants::QTY_PRECISION
            ),
        });
    }
    if qty < pair_config.min_order_size {
        return Err(ClearbookError::InvalidQuantity {
            reason: format!(
                "quantity {qty} below minimum order size {}",
                pair_config.min_order_size
            ),
        });
    }
    match kind {
        OrderKind::Limit => {
            let Some(price) = limit_price else {
                return Err(ClearbookError::InvalidQuantity {
                    reason: "limit order requires a price".into(),
                });
            };
            if price <= Decimal::ZERO {
                return Err(ClearbookError::InvalidQuantity {
                    reason: "limit price must be positive".into(),
                });
            }
            if price.scale() > constants::PRICE_PRECISION {
                return Err(ClearbookError::InvalidQuantity {
                    reason: format!(
                        "price precision exceeds {} decimal places",
                        constants::PRICE_PRECISION
                    ),
                });
            }
        }
        OrderKind::Market => {
            if limit_price.is_some() {
                return Err(ClearbookError::InvalidQuantity {
                    reason: "market order must not carry a price".into(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clearbook_ledger::DirectoryOracle;
    use clearbook_types::{EntryKind, KycTier, RequestId};

    use crate::feed::StaticFeed;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Setup {
        ledger: Arc<Ledger>,
        oracle: Arc<DirectoryOracle>,
        feed: Arc<StaticFeed>,
        engine: MatchingEngine,
    }

    fn setup() -> Setup {
        let ledger = Arc::new(Ledger::new());
        let oracle = Arc::new(DirectoryOracle::new());
        let feed = Arc::new(StaticFeed::new());
        let config = ExchangeConfig::new(AccountId::new());
        let engine = MatchingEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle) as Arc<dyn KycOracle>,
            Arc::clone(&feed) as Arc<dyn PriceFeed>,
            config,
        );
        Setup {
            ledger,
            oracle,
            feed,
            engine,
        }
    }

    impl Setup {
        /// A gold-tier account funded in one currency.
        fn trader(&self, currency: &str, amount: Decimal) -> AccountId {
            let account = self.ledger.open_account();
            self.oracle.set_tier(account, KycTier::Gold);
            if amount > Decimal::ZERO {
                self.ledger
                    .credit(
                        account,
                        currency,
                        amount,
                        EntryKind::Deposit,
                        EntryRef::Request(RequestId::new()),
                    )
                    .unwrap();
            }
            account
        }
    }

    #[tokio::test]
    async fn limit_orders_match_and_charge_fees() {
        let s = setup();
        let seller = s.trader("BTC", dec(1));
        let buyer = s.trader("USDT", dec(50_000));

        let rested = s
            .engine
            .place_order(
                seller,
                "BTC/USDT",
                OrderSide::Sell,
                OrderKind::Limit,
                dec(1),
                Some(dec(50_000)),
            )
            .await
            .unwrap();
        assert_eq!(rested.order.status, OrderStatus::Open);

        let placed = s
            .engine
            .place_order(
                buyer,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                Some(dec(50_000)),
            )
            .await
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Filled);
        assert_eq!(placed.fills.len(), 1);
        assert_eq!(placed.fills[0].price, dec(50_000));

        // Taker (buyer) pays 20 bps on the BTC credit, maker 10 bps on USDT.
        assert_eq!(
            s.ledger.balance(buyer, "BTC").unwrap().available,
            Decimal::new(998, 3)
        );
        assert_eq!(
            s.ledger.balance(seller, "USDT").unwrap().available,
            dec(49_950)
        );
        let fee_account = s.engine.config.fees.fee_account;
        assert_eq!(
            s.ledger.balance(fee_account, "BTC").unwrap().available,
            Decimal::new(2, 3)
        );
        assert_eq!(
            s.ledger.balance(fee_account, "USDT").unwrap().available,
            dec(50)
        );

        // The fill is queryable from either side of the trade.
        let taker_fills = s.engine.fills_for_order(placed.order.id);
        assert_eq!(taker_fills.len(), 1);
        assert_eq!(taker_fills[0].id, placed.fills[0].id);
        let maker_fills = s.engine.fills_for_order(rested.order.id);
        assert_eq!(maker_fills.len(), 1);
        assert_eq!(maker_fills[0].id, placed.fills[0].id);
    }

    #[tokio::test]
    async fn shape_validation() {
        let s = setup();
        let account = s.trader("USDT", dec(1000));

        let unknown = s
            .engine
            .place_order(
                account,
                "DOGE/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                Some(dec(1)),
            )
            .await;
        assert!(matches!(unknown, Err(ClearbookError::UnknownPair(_))));

        let zero_qty = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                Decimal::ZERO,
                Some(dec(1)),
            )
            .await;
        assert!(matches!(
            zero_qty,
            Err(ClearbookError::InvalidQuantity { .. })
        ));

        let below_min = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                Decimal::new(1, 6), // 0.000001 < 0.00001 minimum
                Some(dec(1)),
            )
            .await;
        assert!(matches!(
            below_min,
            Err(ClearbookError::InvalidQuantity { .. })
        ));

        let priceless_limit = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                None,
            )
            .await;
        assert!(matches!(
            priceless_limit,
            Err(ClearbookError::InvalidQuantity { .. })
        ));

        let priced_market = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Market,
                dec(1),
                Some(dec(1)),
            )
            .await;
        assert!(matches!(
            priced_market,
            Err(ClearbookError::InvalidQuantity { .. })
        ));

        // Nothing was recorded for any of these.
        assert!(s.engine.orders_for_account(account).is_empty());
    }

    #[tokio::test]
    async fn unverified_account_denied_and_recorded() {
        let s = setup();
        let account = s.ledger.open_account(); // no tier set: Unverified
        s.ledger
            .credit(
                account,
                "USDT",
                dec(1000),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let result = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                Some(dec(100)),
            )
            .await;
        assert!(matches!(result, Err(ClearbookError::LimitExceeded(_))));

        // The denial is queryable and no funds moved.
        let orders = s.engine.orders_for_account(account);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);
        assert!(orders[0].reservation_id.is_none());
        assert_eq!(s.ledger.balance(account, "USDT").unwrap().available, dec(1000));
    }

    #[tokio::test]
    async fn insufficient_funds_rejected() {
        let s = setup();
        let account = s.trader("USDT", dec(10));

        let result = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                Some(dec(100)),
            )
            .await;
        assert!(matches!(
            result,
            Err(ClearbookError::InsufficientFunds { .. })
        ));

        let orders = s.engine.orders_for_account(account);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Rejected);
        // A rejected order is terminal and not cancellable.
        let cancel = s.engine.cancel_order(orders[0].id).await;
        assert!(matches!(
            cancel,
            Err(ClearbookError::OrderNotCancellable { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_and_query_through_engine() {
        let s = setup();
        let account = s.trader("USDT", dec(500));

        let placed = s
            .engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(2),
                Some(dec(100)),
            )
            .await
            .unwrap();
        assert_eq!(s.engine.order(placed.order.id).unwrap().status, OrderStatus::Open);

        let cancelled = s.engine.cancel_order(placed.order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            s.engine.order(placed.order.id).unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(s.ledger.balance(account, "USDT").unwrap().available, dec(500));

        let unknown = s.engine.cancel_order(OrderId::new()).await;
        assert!(matches!(unknown, Err(ClearbookError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn market_buy_bounded_by_feed_price() {
        let s = setup();
        let seller = s.trader("BTC", dec(1));
        let buyer = s.trader("USDT", dec(105));
        s.feed.set_price("BTC/USDT", dec(100));

        s.engine
            .place_order(
                seller,
                "BTC/USDT",
                OrderSide::Sell,
                OrderKind::Limit,
                dec(1),
                Some(dec(100)),
            )
            .await
            .unwrap();

        // Worst case = 100 × 1.05 = 105; fill executes at 100.
        let placed = s
            .engine
            .place_order(buyer, "BTC/USDT", OrderSide::Buy, OrderKind::Market, dec(1), None)
            .await
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Filled);
        assert_eq!(placed.fills[0].price, dec(100));

        // The slippage cushion came back.
        let usdt = s.ledger.balance(buyer, "USDT").unwrap();
        assert_eq!(usdt.available, dec(5));
        assert_eq!(usdt.reserved, Decimal::ZERO);
    }

    #[tokio::test]
    async fn market_buy_falls_back_to_best_ask() {
        let s = setup();
        let seller = s.trader("BTC", dec(1));
        let buyer = s.trader("USDT", dec(210));

        s.engine
            .place_order(
                seller,
                "BTC/USDT",
                OrderSide::Sell,
                OrderKind::Limit,
                dec(1),
                Some(dec(200)),
            )
            .await
            .unwrap();

        // No feed price: bound comes from the best ask (200 × 1.05 = 210).
        let placed = s
            .engine
            .place_order(buyer, "BTC/USDT", OrderSide::Buy, OrderKind::Market, dec(1), None)
            .await
            .unwrap();
        assert_eq!(placed.fills[0].price, dec(200));
    }

    #[tokio::test]
    async fn market_buy_without_any_reference_fails() {
        let s = setup();
        let buyer = s.trader("USDT", dec(1000));

        let result = s
            .engine
            .place_order(buyer, "BTC/USDT", OrderSide::Buy, OrderKind::Market, dec(1), None)
            .await;
        assert!(matches!(
            result,
            Err(ClearbookError::NoReferencePrice { .. })
        ));
        assert!(s.engine.orders_for_account(buyer).is_empty());
    }

    #[tokio::test]
    async fn market_sell_remainder_cancelled_and_released() {
        let s = setup();
        let buyer = s.trader("USDT", dec(100));
        let seller = s.trader("BTC", dec(3));

        s.engine
            .place_order(
                buyer,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(1),
                Some(dec(100)),
            )
            .await
            .unwrap();

        let placed = s
            .engine
            .place_order(seller, "BTC/USDT", OrderSide::Sell, OrderKind::Market, dec(3), None)
            .await
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Cancelled);
        assert_eq!(placed.order.filled_qty, dec(1));

        // 1 BTC sold, 2 BTC back in available, nothing left on hold.
        let btc = s.ledger.balance(seller, "BTC").unwrap();
        assert_eq!(btc.available, dec(2));
        assert_eq!(btc.reserved, Decimal::ZERO);
    }

    #[tokio::test]
    async fn trade_limit_gates_on_worst_case() {
        let s = setup();
        let whale = s.ledger.open_account();
        s.oracle.set_tier(whale, KycTier::Bronze); // 100M trade/day cap
        s.ledger
            .credit(
                whale,
                "USDT",
                dec(150_000_000),
                EntryKind::Deposit,
                EntryRef::Request(RequestId::new()),
            )
            .unwrap();

        let result = s
            .engine
            .place_order(
                whale,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(3000),
                Some(dec(50_000)), // 150M worst case
            )
            .await;
        assert!(matches!(result, Err(ClearbookError::LimitExceeded(_))));
    }

    #[tokio::test]
    async fn depth_reflects_resting_orders() {
        let s = setup();
        let account = s.trader("USDT", dec(300));

        s.engine
            .place_order(
                account,
                "BTC/USDT",
                OrderSide::Buy,
                OrderKind::Limit,
                dec(2),
                Some(dec(100)),
            )
            .await
            .unwrap();

        let depth = s.engine.depth("BTC/USDT", 5).await.unwrap();
        assert_eq!(depth.bids.len(), 1);
        assert_eq!(depth.bids[0].price, dec(100));
        assert_eq!(depth.bids[0].qty, dec(2));
        assert!(depth.asks.is_empty());

        assert_eq!(s.engine.symbols(), vec!["BTC/USDT", "ETH/USDT"]);
    }
}
