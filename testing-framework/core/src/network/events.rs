use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use tokio::{sync::oneshot, time::Instant};

use super::{ClientError, TxId};

/// What a peer pushes for a registered transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitSignal {
    /// The transaction landed in a block with the given validation code.
    Committed { code: String },
    /// The connection to the peer failed before a verdict arrived.
    ListenerError(String),
}

/// A signal stamped with the instant it was handed to the listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitNotice {
    pub signal: CommitSignal,
    pub arrived_at: Instant,
}

impl CommitNotice {
    #[must_use]
    pub fn now(signal: CommitSignal) -> Self {
        Self {
            signal,
            arrived_at: Instant::now(),
        }
    }
}

/// Commit notification source for one peer on one channel.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn peer(&self) -> &str;

    fn channel(&self) -> &str;

    async fn connect(&self) -> Result<(), ClientError>;

    fn is_connected(&self) -> bool;

    /// Registers interest in `tx_id`. The receiver resolves at most once.
    fn register(&self, tx_id: &TxId) -> Result<oneshot::Receiver<CommitNotice>, ClientError>;

    /// Drops any registration for `tx_id`; a no-op when none exists.
    fn unregister(&self, tx_id: &TxId);

    fn disconnect(&self);
}

/// Single-use senders keyed by transaction id.
///
/// Delivering a signal removes the sender, so the first signal for a
/// registration wins and later ones find nothing to resolve.
#[derive(Debug, Default)]
pub struct TxEventRegistry {
    pending: Mutex<HashMap<TxId, oneshot::Sender<CommitNotice>>>,
}

impl TxEventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tx_id`, superseding an earlier registration for the same id.
    pub fn register(&self, tx_id: &TxId) -> oneshot::Receiver<CommitNotice> {
        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tx_id.clone(), sender);
        receiver
    }

    /// Returns `true` when the signal resolved a live registration. The
    /// notice carries the current instant as its arrival time.
    pub fn notify(&self, tx_id: &TxId, signal: CommitSignal) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(tx_id);

        sender.is_some_and(|sender| sender.send(CommitNotice::now(signal)).is_ok())
    }

    pub fn unregister(&self, tx_id: &TxId) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(tx_id);
    }

    /// Resolves every registration with a listener error.
    pub fn fail_all(&self, message: &str) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .collect();

        for (_, sender) in drained {
            let _ = sender.send(CommitNotice::now(CommitSignal::ListenerError(
                message.to_owned(),
            )));
        }
    }

    #[must_use]
    pub fn pending(&self) -> Vec<TxId> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_registered(&self, tx_id: &TxId) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(tx_id)
    }
}
