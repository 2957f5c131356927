use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::{
    sync::oneshot,
    time::{Instant, sleep_until},
};

use crate::{
    clock::Clock,
    network::{CommitNotice, CommitSignal, EventSource, TxId, VALIDATION_CODE_VALID},
};

/// How one listener resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    Valid,
    Invalid(String),
    Timeout,
    ListenerError(String),
}

impl Disposition {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitEvent {
    pub peer: String,
    pub disposition: Disposition,
    /// Arrival time in clock milliseconds.
    pub time: u64,
}

impl CommitEvent {
    #[must_use]
    pub fn describe(&self, tx_id: &TxId) -> String {
        match &self.disposition {
            Disposition::Valid => format!("Commit success on {} for transaction {tx_id}", self.peer),
            Disposition::Invalid(code) => {
                format!("Commit error on {} with code {code}", self.peer)
            }
            Disposition::Timeout => {
                format!("Commit timeout on {} for transaction {tx_id}", self.peer)
            }
            Disposition::ListenerError(message) => {
                format!("Event hub error on {}: {message}", self.peer)
            }
        }
    }
}

/// A commit listener registered ahead of the broadcast.
///
/// Resolves exactly once to a [`CommitEvent`]; the registration on the event
/// source is dropped on every path, including when this value is dropped
/// without being awaited.
pub struct PendingCommit {
    source: Arc<dyn EventSource>,
    tx_id: TxId,
    receiver: Option<oneshot::Receiver<CommitNotice>>,
    registration_error: Option<String>,
    deadline: Instant,
    clock: Arc<dyn Clock>,
}

impl PendingCommit {
    /// Registers on `source` now; the deadline timer starts now as well.
    pub fn register(
        source: Arc<dyn EventSource>,
        tx_id: &TxId,
        budget: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (receiver, registration_error) = match source.register(tx_id) {
            Ok(receiver) => (Some(receiver), None),
            Err(err) => (None, Some(err.to_string())),
        };

        Self {
            source,
            tx_id: tx_id.clone(),
            receiver,
            registration_error,
            deadline: Instant::now() + budget,
            clock,
        }
    }

    #[must_use]
    pub fn peer(&self) -> &str {
        self.source.peer()
    }

    /// Resolves the listener. A delivered notice is timestamped with its
    /// arrival, not with the moment this future gets polled.
    pub async fn wait(mut self) -> CommitEvent {
        let (disposition, arrived_at) = match self.receiver.take() {
            Some(receiver) => {
                tokio::select! {
                    notice = receiver => match notice {
                        Ok(CommitNotice { signal, arrived_at }) => {
                            (Self::disposition(signal), Some(arrived_at))
                        }
                        Err(_) => (
                            Disposition::ListenerError(
                                "listener closed before a commit notification arrived".to_owned(),
                            ),
                            None,
                        ),
                    },
                    () = sleep_until(self.deadline) => (Disposition::Timeout, None),
                }
            }
            None => (
                Disposition::ListenerError(
                    self.registration_error
                        .take()
                        .unwrap_or_else(|| "listener is not registered".to_owned()),
                ),
                None,
            ),
        };

        let now = self.clock.now_ms();
        let time = arrived_at.map_or(now, |arrived_at| {
            now.saturating_sub(arrived_at.elapsed().as_millis() as u64)
        });

        CommitEvent {
            peer: self.source.peer().to_owned(),
            disposition,
            time,
        }
    }

    fn disposition(signal: CommitSignal) -> Disposition {
        match signal {
            CommitSignal::Committed { code } if code == VALIDATION_CODE_VALID => Disposition::Valid,
            CommitSignal::Committed { code } => Disposition::Invalid(code),
            CommitSignal::ListenerError(message) => Disposition::ListenerError(message),
        }
    }
}

impl Drop for PendingCommit {
    fn drop(&mut self) {
        self.source.unregister(&self.tx_id);
    }
}

/// Registers one listener per source for `tx_id`.
pub fn register_all(
    sources: &[Arc<dyn EventSource>],
    tx_id: &TxId,
    budget: Duration,
    clock: &Arc<dyn Clock>,
) -> Vec<PendingCommit> {
    sources
        .iter()
        .map(|source| PendingCommit::register(Arc::clone(source), tx_id, budget, Arc::clone(clock)))
        .collect()
}

/// Waits for every listener; never fails, every path yields a disposition.
pub async fn await_all(pending: Vec<PendingCommit>) -> Vec<CommitEvent> {
    join_all(pending.into_iter().map(PendingCommit::wait)).await
}

/// Registers on `source` and waits for the outcome.
pub async fn watch(
    source: Arc<dyn EventSource>,
    tx_id: &TxId,
    budget: Duration,
    clock: Arc<dyn Clock>,
) -> CommitEvent {
    PendingCommit::register(source, tx_id, budget, clock)
        .wait()
        .await
}

/// Completion time at the latency-threshold rank.
///
/// Sorts `events` ascending by arrival and picks index
/// `ceil(len * threshold - 1)`.
#[must_use]
pub fn threshold_time(events: &mut [CommitEvent], threshold: f64) -> Option<u64> {
    if events.is_empty() {
        return None;
    }
    events.sort_by_key(|event| event.time);

    let rank = (events.len() as f64 * threshold - 1.0).ceil();
    let index = (rank.max(0.0) as usize).min(events.len() - 1);
    Some(events[index].time)
}
