//! Per-pair command sequencer.
//!
//! All order flow for one pair goes through a single bounded queue drained
//! by one task: the pair's total order. Two commands on the same pair can
//! never interleave; different pairs run independently.
//!
//! The task owns the pair's book and fill counter, and settles fills
//! against the ledger before replying: a reply in hand means the match
//! and its ledger entries are both done.

use std::collections::HashMap;
use std::sync::Arc;

use clearbook_ledger::Ledger;
use clearbook_types::{
    ClearbookError, FeeSchedule, Fill, FillId, Order, OrderId, OrderStatus, Pair, ReservationId,
    Result,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};

use crate::book::{DepthSnapshot, OrderBook};
use crate::matcher;

// ============================================================================
// Command / reply types
// ============================================================================

/// What a submitted order did, returned to the caller.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    /// The order in its post-match state.
    pub order: Order,
    /// Fills in execution order, empty if nothing crossed.
    pub fills: Vec<Fill>,
}

/// Top-of-book prices.
#[derive(Debug, Clone, Copy)]
pub struct BookQuote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

/// One command in a pair's total order.
#[derive(Debug)]
enum SequencerCommand {
    Submit {
        order: Order,
        reply: oneshot::Sender<Result<PlacedOrder>>,
    },
    Cancel {
        order_id: OrderId,
        reply: oneshot::Sender<Result<Order>>,
    },
    Depth {
        levels: usize,
        reply: oneshot::Sender<DepthSnapshot>,
    },
    Quote {
        reply: oneshot::Sender<BookQuote>,
    },
}

// ============================================================================
// Handle
// ============================================================================

/// Cheap, cloneable sender side of one pair's sequencer.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    pair: Pair,
    tx: mpsc::Sender<SequencerCommand>,
}

impl SequencerHandle {
    /// Run an admitted order through the pair's total order.
    ///
    /// # Errors
    /// `SequencerUnavailable` if the pair's task has stopped; otherwise
    /// whatever matching or settlement returned.
    pub async fn submit(&self, order: Order) -> Result<PlacedOrder> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SequencerCommand::Submit { order, reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Cancel a resting order through the pair's total order.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SequencerCommand::Cancel { order_id, reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Aggregated view of the top `levels` book levels.
    pub async fn depth(&self, levels: usize) -> Result<DepthSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SequencerCommand::Depth { levels, reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Current top-of-book prices.
    pub async fn quote(&self) -> Result<BookQuote> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SequencerCommand::Quote { reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> ClearbookError {
        ClearbookError::SequencerUnavailable {
            pair: self.pair.symbol(),
        }
    }
}

/// Spawn the sequencer task for one pair and return its handle.
///
/// The task runs until every handle is dropped. Must be called from
/// within a Tokio runtime.
pub(crate) fn spawn_pair(
    pair: Pair,
    queue_depth: usize,
    ledger: Arc<Ledger>,
    fees: FeeSchedule,
    orders: Arc<DashMap<OrderId, Order>>,
    fills: Arc<DashMap<FillId, Fill>>,
) -> SequencerHandle {
    let (tx, rx) = mpsc::channel(queue_depth);
    let runtime = PairRuntime {
        book: OrderBook::new(pair.clone()),
        fill_seq: 0,
        ledger,
        fees,
        orders,
        fills,
    };
    tokio::spawn(runtime.run(rx));
    SequencerHandle { pair, tx }
}

// ============================================================================
// Runtime (the task side)
// ============================================================================

struct PairRuntime {
    book: OrderBook,
    /// Running fill counter; fill ids derive from it.
    fill_seq: u64,
    ledger: Arc<Ledger>,
    fees: FeeSchedule,
    /// Shared order store; this task is the only writer for its pair's
    /// sequenced orders.
    orders: Arc<DashMap<OrderId, Order>>,
    /// Shared fill store, same single-writer rule as `orders`.
    fills: Arc<DashMap<FillId, Fill>>,
}

impl PairRuntime {
    async fn run(mut self, mut rx: mpsc::Receiver<SequencerCommand>) {
        tracing::info!(pair = %self.book.pair, "sequencer started");
        while let Some(command) = rx.recv().await {
            match command {
                SequencerCommand::Submit { order, reply } => {
                    let _ = reply.send(self.process_submit(order));
                }
                SequencerCommand::Cancel { order_id, reply } => {
                    let _ = reply.send(self.process_cancel(order_id));
                }
                SequencerCommand::Depth { levels, reply } => {
                    let _ = reply.send(self.book.depth(levels));
                }
                SequencerCommand::Quote { reply } => {
                    let _ = reply.send(BookQuote {
                        bid: self.book.best_bid(),
                        ask: self.book.best_ask(),
                    });
                }
            }
        }
        tracing::info!(pair = %self.book.pair, "sequencer stopped");
    }

    fn process_submit(&mut self, order: Order) -> Result<PlacedOrder> {
        let order_id = order.id;
        let outcome = matcher::match_order(&mut self.book, order, &mut self.fill_seq)?;

        // Admission reserved every side's worst case, so a settlement
        // failure past this point is corrupted state, not a user error.
        let maker_funding: HashMap<OrderId, ReservationId> = outcome
            .makers
            .iter()
            .map(|maker| Ok((maker.id, maker.funding()?)))
            .collect::<Result<_>>()?;
        let taker_funding = outcome.taker.funding()?;

        for fill in &outcome.fills {
            let maker_res = *maker_funding.get(&fill.maker_order_id).ok_or_else(|| {
                ClearbookError::Internal(format!(
                    "fill {} references maker {} with no funding",
                    fill.id, fill.maker_order_id
                ))
            })?;
            let (buyer_res, seller_res) = if fill.taker_is_buyer() {
                (taker_funding, maker_res)
            } else {
                (maker_res, taker_funding)
            };
            self.ledger
                .settle_fill(fill, buyer_res, seller_res, &self.fees)
                .map_err(|err| {
                    tracing::error!(fill = %fill.id, %err, "fill settlement failed");
                    err
                })?;
            self.fills.insert(fill.id, fill.clone());
        }

        for maker in &outcome.makers {
            self.orders.insert(maker.id, maker.clone());
            if maker.status == OrderStatus::Filled {
                // Exact consumption normally closes the hold already.
                self.ledger.release(maker.funding()?)?;
            }
        }
        self.orders.insert(order_id, outcome.taker.clone());
        if outcome.taker.status.is_terminal() {
            // Returns the price-improvement or unmatched remainder.
            self.ledger.release(taker_funding)?;
        }

        tracing::info!(
            pair = %self.book.pair,
            order = %order_id,
            status = %outcome.taker.status,
            fills = outcome.fills.len(),
            "order sequenced"
        );
        Ok(PlacedOrder {
            order: outcome.taker,
            fills: outcome.fills,
        })
    }

    fn process_cancel(&mut self, order_id: OrderId) -> Result<Order> {
        let Some(stored) = self.orders.get(&order_id).map(|entry| entry.value().clone()) else {
            return Err(ClearbookError::OrderNotFound(order_id));
        };

        match stored.status {
            // Cancelling twice is a no-op, not an error.
            OrderStatus::Cancelled => Ok(stored),
            status if status.is_terminal() => Err(ClearbookError::OrderNotCancellable {
                order: order_id,
                status,
            }),
            _ => {
                let Some(mut resting) = self.book.remove(order_id) else {
                    return Err(ClearbookError::Internal(format!(
                        "active order {order_id} missing from its book"
                    )));
                };
                resting.transition(OrderStatus::Cancelled)?;
                self.ledger.release(resting.funding()?)?;
                self.orders.insert(order_id, resting.clone());
                tracing::info!(pair = %self.book.pair, order = %order_id, "order cancelled");
                Ok(resting)
            }
        }
    }
}
