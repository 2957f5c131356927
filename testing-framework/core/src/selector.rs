use std::sync::atomic::{AtomicU64, Ordering};

pub use fabric_bench_config::LoadBalancing;

/// Load-balancing state of one connector instance.
#[derive(Debug)]
pub struct SelectorState {
    mode: LoadBalancing,
    counter: AtomicU64,
    worker_ordinal: u64,
}

impl SelectorState {
    #[must_use]
    pub const fn new(mode: LoadBalancing, worker_ordinal: u64) -> Self {
        Self {
            mode,
            counter: AtomicU64::new(0),
            worker_ordinal,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> LoadBalancing {
        self.mode
    }

    /// Advances the per-transaction counter and returns the index every
    /// selection of that transaction uses.
    pub fn begin_transaction(&self) -> u64 {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        match self.mode {
            LoadBalancing::Client => self.worker_ordinal,
            LoadBalancing::RoundRobin => counter,
        }
    }

    #[must_use]
    pub fn transactions_started(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

/// Picks `candidates[index % len]`; `None` for an empty list.
#[must_use]
pub fn select<T>(candidates: &[T], index: u64) -> Option<&T> {
    if candidates.is_empty() {
        return None;
    }
    candidates.get((index % candidates.len() as u64) as usize)
}
