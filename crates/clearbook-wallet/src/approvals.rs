//! Approval oracle intake.
//!
//! The approval oracle itself (compliance desk, chain watcher, bank
//! feed) lives outside this core; its verdicts arrive as
//! [`ApprovalEvent`]s on a bounded channel. [`run_approvals`] drains
//! that channel and applies each verdict to the wallet. A verdict that
//! cannot be applied (unknown id, already-resolved request) is logged
//! and skipped rather than stopping the intake: the oracle is an
//! external party and its mistakes must not wedge everyone's requests.

use std::sync::Arc;

use clearbook_types::RequestId;
use tokio::sync::mpsc;

use crate::service::WalletService;

/// A verdict from the external approval oracle.
#[derive(Debug, Clone)]
pub enum ApprovalEvent {
    /// The request checked out; post its ledger effect.
    Approve { request: RequestId },
    /// The request was refused; unwind any hold and record why.
    Reject { request: RequestId, reason: String },
}

impl ApprovalEvent {
    /// The request this verdict resolves.
    #[must_use]
    pub fn request(&self) -> RequestId {
        match self {
            Self::Approve { request } | Self::Reject { request, .. } => *request,
        }
    }
}

/// Build the bounded channel the oracle writes verdicts into.
#[must_use]
pub fn approval_channel(
    depth: usize,
) -> (mpsc::Sender<ApprovalEvent>, mpsc::Receiver<ApprovalEvent>) {
    mpsc::channel(depth)
}

/// Apply approval verdicts until every sender is dropped.
pub async fn run_approvals(wallet: Arc<WalletService>, mut events: mpsc::Receiver<ApprovalEvent>) {
    tracing::info!("approval intake started");
    while let Some(event) = events.recv().await {
        let request = event.request();
        let outcome = match event {
            ApprovalEvent::Approve { .. } => wallet.approve(request),
            ApprovalEvent::Reject { reason, .. } => wallet.reject(request, reason),
        };
        if let Err(err) = outcome {
            tracing::warn!(%request, %err, "approval verdict could not be applied");
        }
    }
    tracing::info!("approval intake stopped");
}
