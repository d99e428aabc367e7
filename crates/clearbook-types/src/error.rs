//! Error types for the ClearBook trading core.
//!
//! All errors use the `CB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Account / balance errors
//! - 3xx: Reservation errors
//! - 4xx: Limit policy errors
//! - 5xx: Wallet request errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    AccountId, LimitDenial, OrderId, OrderStatus, RequestId, RequestStatus, ReservationId,
};

/// Central error enum for all ClearBook operations.
#[derive(Debug, Error)]
pub enum ClearbookError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested order was not found.
    #[error("CB_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order quantity failed validation (non-positive, below the
    /// pair minimum, or a market order carrying a limit price).
    #[error("CB_ERR_101: Invalid quantity: {reason}")]
    InvalidQuantity { reason: String },

    /// An order with this ID already exists.
    #[error("CB_ERR_102: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order is already terminal and cannot be cancelled.
    #[error("CB_ERR_103: Order {order} cannot be cancelled in status {status}")]
    OrderNotCancellable { order: OrderId, status: OrderStatus },

    /// The pair is not listed on this venue.
    #[error("CB_ERR_104: Unknown trading pair: {0}")]
    UnknownPair(String),

    /// A market buy needs a reference ask to size its reservation and
    /// neither the price feed nor the book has one.
    #[error("CB_ERR_105: No reference price for market buy on {pair}")]
    NoReferencePrice { pair: String },

    // =================================================================
    // Account / Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("CB_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// The account has never been opened on this ledger.
    #[error("CB_ERR_201: Unknown account: {0}")]
    UnknownAccount(AccountId),

    // =================================================================
    // Reservation Errors (3xx)
    // =================================================================
    /// A settle asked for more than the reservation still holds.
    /// Always a logic fault upstream, never a user error.
    #[error(
        "CB_ERR_300: Reservation mismatch on {reservation}: requested {requested}, remaining {remaining}"
    )]
    ReservationMismatch {
        reservation: ReservationId,
        requested: Decimal,
        remaining: Decimal,
    },

    /// The reservation is unknown or already closed.
    #[error("CB_ERR_301: Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    // =================================================================
    // Limit Policy Errors (4xx)
    // =================================================================
    /// The operation would breach a tier cap.
    #[error("CB_ERR_400: Limit exceeded: {0}")]
    LimitExceeded(LimitDenial),

    // =================================================================
    // Wallet Request Errors (5xx)
    // =================================================================
    /// The wallet request is not in a status that permits the
    /// attempted action.
    #[error("CB_ERR_500: Request {request} not actionable in status {status}")]
    InvalidRequestState {
        request: RequestId,
        status: RequestStatus,
    },

    /// The wallet request was not found.
    #[error("CB_ERR_501: Request not found: {0}")]
    RequestNotFound(RequestId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Supply conservation invariant violated; critical safety alert.
    #[error("CB_ERR_902: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    /// The pair sequencer task is gone and cannot accept commands.
    #[error("CB_ERR_903: Sequencer unavailable for {pair}")]
    SequencerUnavailable { pair: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ClearbookError>;

impl From<serde_json::Error> for ClearbookError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
