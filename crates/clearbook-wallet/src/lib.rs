//! # clearbook-wallet
//!
//! **External funds flow for ClearBook.**
//!
//! Deposits and withdrawals are requests, not actions: each one waits on
//! an external approval oracle before any ledger entry is posted. The
//! two directions hold funds differently while pending:
//!
//! - **Withdrawals reserve on request**: the amount is held the moment
//!   the request is accepted, so it cannot be double-spent while the
//!   oracle deliberates
//! - **Deposits hold nothing**: the funds do not exist on the ledger
//!   until approval confirms they arrived
//! - **Tier caps at the gate**: rolling 24h/30d usage is derived from
//!   posted journal entries, never from a separate counter

pub mod approvals;
pub mod service;

pub use approvals::{approval_channel, run_approvals, ApprovalEvent};
pub use service::WalletService;
