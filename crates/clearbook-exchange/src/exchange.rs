//! The assembled exchange.
//!
//! [`Exchange`] wires the ledger, the limit policy, the matching engine,
//! and the wallet service together behind one facade. Everything a
//! client can do to this venue goes through here; the components
//! underneath never reach around each other. Orders and requests touch
//! balances only through the ledger, and usage for limit checks is read
//! back out of the same journal the postings went into.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use clearbook_ledger::{
    verify_conservation, AuditReport, DirectoryOracle, KycOracle, Ledger, LimitPolicy, LimitReport,
};
use clearbook_matchcore::{
    BookQuote, DepthSnapshot, MatchingEngine, PlacedOrder, PriceFeed, StaticFeed,
};
use clearbook_types::{
    AccountId, Balance, ClearbookError, ExchangeConfig, Fill, KycTier, LedgerEntry, Order, OrderId,
    OrderKind, OrderSide, RequestId, Result, WalletRequest,
};
use clearbook_wallet::{approval_channel, run_approvals, ApprovalEvent, WalletService};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// One live exchange instance.
pub struct Exchange {
    config: ExchangeConfig,
    ledger: Arc<Ledger>,
    oracle: Arc<DirectoryOracle>,
    feed: Arc<StaticFeed>,
    policy: LimitPolicy,
    engine: MatchingEngine,
    wallet: Arc<WalletService>,
    approvals: mpsc::Sender<ApprovalEvent>,
}

impl Exchange {
    /// Assemble and start an exchange: one sequencer task per configured
    /// pair plus the approval intake task. Must be called from within a
    /// Tokio runtime.
    #[must_use]
    pub fn new(config: ExchangeConfig) -> Self {
        let ledger = Arc::new(Ledger::new());
        let oracle = Arc::new(DirectoryOracle::new());
        let feed = Arc::new(StaticFeed::new());

        let engine = MatchingEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle) as Arc<dyn KycOracle>,
            Arc::clone(&feed) as Arc<dyn PriceFeed>,
            config.clone(),
        );
        let wallet = Arc::new(WalletService::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle) as Arc<dyn KycOracle>,
            config.tiers.clone(),
        ));

        let (approvals, verdicts) = approval_channel(config.approval_queue_depth);
        tokio::spawn(run_approvals(Arc::clone(&wallet), verdicts));

        tracing::info!(
            pairs = config.pairs.len(),
            fee_account = %config.fees.fee_account,
            "exchange assembled"
        );
        Self {
            policy: LimitPolicy::new(config.tiers.clone()),
            config,
            ledger,
            oracle,
            feed,
            engine,
            wallet,
            approvals,
        }
    }

    // =================================================================
    // Accounts and administration
    // =================================================================

    /// Open a fresh account. Starts Unverified: every limited operation
    /// is capped at zero until a tier is assigned.
    pub fn open_account(&self) -> AccountId {
        self.ledger.open_account()
    }

    /// Assign an account's KYC tier.
    pub fn set_tier(&self, account_id: AccountId, tier: KycTier) {
        self.oracle.set_tier(account_id, tier);
    }

    /// Publish a reference price for market-buy reservation sizing.
    pub fn set_reference_price(&self, symbol: &str, price: Decimal) {
        self.feed.set_price(symbol, price);
    }

    /// Sender half of the approval channel, for wiring the external
    /// oracle's verdict stream in.
    #[must_use]
    pub fn approval_sender(&self) -> mpsc::Sender<ApprovalEvent> {
        self.approvals.clone()
    }

    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Direct ledger access for audits and exports.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // =================================================================
    // Trading
    // =================================================================

    /// Place an order. The reply carries the post-sequencing order and
    /// any fills it produced on the way in.
    pub async fn place_order(
        &self,
        account_id: AccountId,
        symbol: &str,
        side: OrderSide,
        kind: OrderKind,
        qty: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<PlacedOrder> {
        self.engine
            .place_order(account_id, symbol, side, kind, qty, limit_price)
            .await
    }

    /// Cancel a resting order and release its remaining hold.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        self.engine.cancel_order(order_id).await
    }

    /// Current snapshot of one order.
    pub fn order(&self, order_id: OrderId) -> Result<Order> {
        self.engine.order(order_id)
    }

    /// All of an account's orders, oldest first.
    #[must_use]
    pub fn orders_for_account(&self, account_id: AccountId) -> Vec<Order> {
        self.engine.orders_for_account(account_id)
    }

    /// Every fill an order took part in, oldest first.
    #[must_use]
    pub fn fills_for_order(&self, order_id: OrderId) -> Vec<Fill> {
        self.engine.fills_for_order(order_id)
    }

    /// Aggregated book depth for a pair.
    pub async fn depth(&self, symbol: &str, levels: usize) -> Result<DepthSnapshot> {
        self.engine.depth(symbol, levels).await
    }

    /// Top-of-book prices for a pair.
    pub async fn quote(&self, symbol: &str) -> Result<BookQuote> {
        self.engine.quote(symbol).await
    }

    /// Symbols this venue trades.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.engine.symbols()
    }

    // =================================================================
    // Wallet
    // =================================================================

    /// Open a deposit request; funds arrive only on approval.
    pub fn request_deposit(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
        external_ref: Option<String>,
    ) -> Result<WalletRequest> {
        self.wallet
            .request_deposit(account_id, currency, amount, external_ref)
    }

    /// Open a withdrawal request; the amount is held immediately.
    pub fn request_withdrawal(
        &self,
        account_id: AccountId,
        currency: &str,
        amount: Decimal,
    ) -> Result<WalletRequest> {
        self.wallet.request_withdrawal(account_id, currency, amount)
    }

    /// Current snapshot of one wallet request.
    pub fn request(&self, request_id: RequestId) -> Result<WalletRequest> {
        self.wallet.request(request_id)
    }

    /// All of an account's wallet requests, oldest first.
    #[must_use]
    pub fn requests_for_account(&self, account_id: AccountId) -> Vec<WalletRequest> {
        self.wallet.requests_for_account(account_id)
    }

    /// Resolve a pending request as approved (synchronous path; the
    /// channel from [`Self::approval_sender`] does the same thing).
    pub fn approve_request(&self, request_id: RequestId) -> Result<WalletRequest> {
        self.wallet.approve(request_id)
    }

    /// Resolve a pending request as rejected.
    pub fn reject_request(
        &self,
        request_id: RequestId,
        reason: impl Into<String>,
    ) -> Result<WalletRequest> {
        self.wallet.reject(request_id, reason)
    }

    // =================================================================
    // Balances, limits, audit
    // =================================================================

    /// One account's balance in one currency.
    pub fn balance(&self, account_id: AccountId, currency: &str) -> Result<Balance> {
        self.ledger.balance(account_id, currency)
    }

    /// All non-zero balances for an account.
    pub fn balances(&self, account_id: AccountId) -> Result<HashMap<String, Balance>> {
        self.ledger.balances(account_id)
    }

    /// Caps and rolling usage for an account in one currency.
    pub fn limits(&self, account_id: AccountId, currency: &str) -> Result<LimitReport> {
        if !self.ledger.has_account(account_id) {
            return Err(ClearbookError::UnknownAccount(account_id));
        }
        let tier = self.oracle.tier_of(account_id);
        let entries = self.ledger.entries_for(account_id)?;
        let pending = self.wallet.pending_for_account(account_id);
        Ok(self
            .policy
            .report(&entries, &pending, tier, currency, Utc::now()))
    }

    /// An account's journal slice, oldest first.
    pub fn entries_for(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>> {
        self.ledger.entries_for(account_id)
    }

    /// Cross-check journal, balances, holds, and supply.
    pub fn audit(&self) -> Result<AuditReport> {
        verify_conservation(&self.ledger)
    }

    /// The whole journal as JSON, for offline audit tooling.
    pub fn export_journal(&self) -> Result<String> {
        self.ledger.export_journal()
    }
}
