use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mqtt2db_api::{InboundMessage, OverflowPolicy};

use crate::reconcile::{Outcome, Reconciler};

// ═══════════════════════════════════════════════════════════════
//  MessageSender: broker sessions -> dispatch loop
// ═══════════════════════════════════════════════════════════════

/// The dispatch loop has stopped; no further messages are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dispatch loop closed")]
pub struct DispatchClosed;

/// Sending half of the dispatch channel. Cloned into every broker session.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<InboundMessage>,
    overflow: OverflowPolicy,
}

impl MessageSender {
    /// Forward one message.
    ///
    /// `Drop`: a full channel drops the message with a warning.
    /// `BackPressure`: waits for room, stalling the caller's event loop.
    pub async fn send(&self, msg: InboundMessage) -> Result<(), DispatchClosed> {
        match self.overflow {
            OverflowPolicy::Drop => match self.tx.try_send(msg) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(topic = %msg.topic, "dispatch channel full, dropping");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchClosed),
            },
            OverflowPolicy::BackPressure => self.tx.send(msg).await.map_err(|_| DispatchClosed),
        }
    }
}

/// Create the dispatch channel.
pub fn channel(buffer: usize, overflow: OverflowPolicy) -> (MessageSender, mpsc::Receiver<InboundMessage>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (MessageSender { tx, overflow }, rx)
}

// ═══════════════════════════════════════════════════════════════
//  Dispatch loop
// ═══════════════════════════════════════════════════════════════

/// Counters reported when the dispatch loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    /// Messages that matched no subscription.
    pub unmatched: u64,
    pub inserted: u64,
    pub merged: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn record(&mut self, outcomes: &[Outcome]) {
        self.received += 1;
        if outcomes.is_empty() {
            self.unmatched += 1;
        }
        for outcome in outcomes {
            match outcome {
                Outcome::Inserted { .. } => self.inserted += 1,
                Outcome::Merged { .. } => self.merged += 1,
                Outcome::Dropped(_) => self.dropped += 1,
                Outcome::Failed { .. } => self.failed += 1,
            }
        }
    }
}

/// Serial dispatch: one message at a time, in arrival order.
///
/// On cancellation the channel is closed and messages already queued are
/// still reconciled before the loop returns.
pub async fn run(
    reconciler: Arc<Reconciler>,
    mut rx: mpsc::Receiver<InboundMessage>,
    token: CancellationToken,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        let outcomes = reconciler.handle(&msg).await;
                        stats.record(&outcomes);
                    }
                    None => break,
                }
            }
            _ = token.cancelled() => {
                rx.close();
                while let Some(msg) = rx.recv().await {
                    let outcomes = reconciler.handle(&msg).await;
                    stats.record(&outcomes);
                }
                break;
            }
        }
    }

    tracing::info!(
        received = stats.received,
        unmatched = stats.unmatched,
        inserted = stats.inserted,
        merged = stats.merged,
        dropped = stats.dropped,
        failed = stats.failed,
        "dispatch finished"
    );
    stats
}

/// Spawn [`run`] as a tokio task.
pub fn spawn(
    reconciler: Arc<Reconciler>,
    rx: mpsc::Receiver<InboundMessage>,
    token: CancellationToken,
) -> JoinHandle<DispatchStats> {
    tokio::spawn(run(reconciler, rx, token))
}
