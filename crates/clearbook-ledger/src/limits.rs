//! Rolling-window limit policy driven by KYC tier.
//!
//! Usage is derived from the journal, not tracked in counters: the sum of
//! matching entries inside each window **is** the usage, so limits survive
//! replay for free and can never drift from the ledger. Wallet requests
//! still pending with the oracle count too, keyed on their request time;
//! once a request settles its journal entry takes over, so nothing is
//! counted twice.

use chrono::{DateTime, Utc};
use clearbook_types::{
    AccountId, EntryKind, KycTier, LedgerEntry, LimitDecision, LimitDenial, LimitOp, LimitWindow,
    RequestKind, TierTable, WalletRequest,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;

/// Resolves an account to its KYC tier.
///
/// Implemented over whatever identity store the deployment uses; accounts
/// the oracle does not know default to [`KycTier::Unverified`].
pub trait KycOracle: Send + Sync {
    fn tier_of(&self, account: AccountId) -> KycTier;
}

/// In-memory tier directory.
#[derive(Debug, Default)]
pub struct DirectoryOracle {
    tiers: DashMap<AccountId, KycTier>,
}

impl DirectoryOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, account: AccountId, tier: KycTier) {
        self.tiers.insert(account, tier);
        tracing::debug!(%account, %tier, "tier assigned");
    }
}

impl KycOracle for DirectoryOracle {
    fn tier_of(&self, account: AccountId) -> KycTier {
        self.tiers
            .get(&account)
            .map_or(KycTier::Unverified, |entry| *entry.value())
    }
}

/// Amount an account has already consumed in each rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitUsage {
    /// Consumed inside the trailing 24 hours.
    pub day: Decimal,
    /// Consumed inside the trailing 30 days.
    pub month: Decimal,
}

/// The entry kind that counts against a limit operation.
fn counted_kind(op: LimitOp) -> EntryKind {
    match op {
        LimitOp::Deposit => EntryKind::Deposit,
        LimitOp::Withdraw => EntryKind::Withdrawal,
        // Trade usage is the notional an account spends, so only the
        // debit leg counts; credits would double it.
        LimitOp::Trade => EntryKind::TradeDebit,
    }
}

/// The request kind that counts against a limit operation while it is
/// still pending. Trades never go through wallet requests.
fn counted_request_kind(op: LimitOp) -> Option<RequestKind> {
    match op {
        LimitOp::Deposit => Some(RequestKind::Deposit),
        LimitOp::Withdraw => Some(RequestKind::Withdrawal),
        LimitOp::Trade => None,
    }
}

impl LimitUsage {
    /// Sum one account's posted entries plus its pending wallet requests
    /// for `op` in `currency` over both windows.
    ///
    /// `entries` and `pending` are that account's slices; rows for other
    /// accounts would inflate the result. Only requests still `Pending`
    /// count here, since a settled request already has a journal entry.
    #[must_use]
    pub fn collect(
        entries: &[LedgerEntry],
        pending: &[WalletRequest],
        op: LimitOp,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let kind = counted_kind(op);
        let day_start = now - LimitWindow::Day.span();
        let month_start = now - LimitWindow::Month.span();

        let mut usage = Self::default();
        for entry in entries {
            if entry.kind != kind || entry.currency != currency {
                continue;
            }
            if entry.recorded_at >= month_start {
                usage.month += entry.amount;
                if entry.recorded_at >= day_start {
                    usage.day += entry.amount;
                }
            }
        }
        if let Some(request_kind) = counted_request_kind(op) {
            for request in pending {
                if request.kind != request_kind
                    || request.currency != currency
                    || !request.is_pending()
                {
                    continue;
                }
                if request.created_at >= month_start {
                    usage.month += request.amount;
                    if request.created_at >= day_start {
                        usage.day += request.amount;
                    }
                }
            }
        }
        usage
    }

    #[must_use]
    pub fn in_window(&self, window: LimitWindow) -> Decimal {
        match window {
            LimitWindow::Day => self.day,
            LimitWindow::Month => self.month,
        }
    }
}

/// Pure cap arithmetic over a [`TierTable`].
#[derive(Debug, Clone, Default)]
pub struct LimitPolicy {
    table: TierTable,
}

impl LimitPolicy {
    #[must_use]
    pub fn new(table: TierTable) -> Self {
        Self { table }
    }

    /// Decide whether `attempted` fits on top of `usage` for this tier.
    ///
    /// Pure: same inputs, same decision. The day window is checked before
    /// the month window; a missing cap means the window is uncapped.
    #[must_use]
    pub fn check(
        &self,
        tier: KycTier,
        op: LimitOp,
        usage: LimitUsage,
        attempted: Decimal,
    ) -> LimitDecision {
        let limits = self.table.limits(tier);
        for window in [LimitWindow::Day, LimitWindow::Month] {
            let Some(cap) = limits.cap(op, window) else {
                continue;
            };
            let used = usage.in_window(window);
            if used + attempted > cap {
                return LimitDecision::Deny(LimitDenial {
                    op,
                    window,
                    cap,
                    used,
                    attempted,
                });
            }
        }
        LimitDecision::Allow
    }

    /// Collect usage from `entries` and `pending` and check in one call.
    #[must_use]
    pub fn evaluate(
        &self,
        entries: &[LedgerEntry],
        pending: &[WalletRequest],
        tier: KycTier,
        op: LimitOp,
        currency: &str,
        attempted: Decimal,
        now: DateTime<Utc>,
    ) -> LimitDecision {
        let usage = LimitUsage::collect(entries, pending, op, currency, now);
        let decision = self.check(tier, op, usage, attempted);
        if let LimitDecision::Deny(denial) = &decision {
            tracing::warn!(%tier, %currency, denial = %denial, "limit check denied");
        }
        decision
    }

    /// Full cap-and-usage snapshot for one account and currency: every
    /// operation crossed with every window.
    #[must_use]
    pub fn report(
        &self,
        entries: &[LedgerEntry],
        pending: &[WalletRequest],
        tier: KycTier,
        currency: &str,
        now: DateTime<Utc>,
    ) -> LimitReport {
        let limits = self.table.limits(tier);
        let mut lines = Vec::with_capacity(6);
        for op in [LimitOp::Deposit, LimitOp::Withdraw, LimitOp::Trade] {
            let usage = LimitUsage::collect(entries, pending, op, currency, now);
            for window in [LimitWindow::Day, LimitWindow::Month] {
                let cap = limits.cap(op, window);
                let used = usage.in_window(window);
                lines.push(LimitLine {
                    op,
                    window,
                    cap,
                    used,
                    remaining: cap.map(|cap| (cap - used).max(Decimal::ZERO)),
                });
            }
        }
        LimitReport {
            tier,
            currency: currency.to_string(),
            as_of: now,
            lines,
        }
    }
}

/// One operation × window row of a [`LimitReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitLine {
    pub op: LimitOp,
    pub window: LimitWindow,
    /// `None` means the window is uncapped.
    pub cap: Option<Decimal>,
    pub used: Decimal,
    /// Headroom left under the cap; `None` when uncapped.
    pub remaining: Option<Decimal>,
}

/// Snapshot of an account's caps and rolling usage in one currency.
#[derive(Debug, Clone, Serialize)]
pub struct LimitReport {
    pub tier: KycTier,
    pub currency: String,
    pub as_of: DateTime<Utc>,
    pub lines: Vec<LimitLine>,
}

impl LimitReport {
    /// The row for one operation and window.
    #[must_use]
    pub fn line(&self, op: LimitOp, window: LimitWindow) -> Option<&LimitLine> {
        self.lines
            .iter()
            .find(|line| line.op == op && line.window == window)
    }
}
