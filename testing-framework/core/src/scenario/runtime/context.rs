use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    connector::{ConnectorContext, FabricConnector},
    tx_status::TxStatus,
};

/// Timing facts of one round, available to components at build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunMetrics {
    run_duration: Duration,
}

impl RunMetrics {
    #[must_use]
    pub const fn new(run_duration: Duration) -> Self {
        Self { run_duration }
    }

    #[must_use]
    pub const fn run_duration(&self) -> Duration {
        self.run_duration
    }
}

/// Aggregate view of the statuses recorded during a round.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub verified: usize,
    pub mean_latency_ms: Option<f64>,
}

impl RunSummary {
    #[must_use]
    pub fn from_statuses(statuses: &[TxStatus]) -> Self {
        let succeeded: Vec<_> = statuses.iter().filter(|status| status.is_success()).collect();
        let mean_latency_ms = (!succeeded.is_empty()).then(|| {
            let total: u64 = succeeded.iter().map(|status| status.latency_ms()).sum();
            total as f64 / succeeded.len() as f64
        });

        Self {
            total: statuses.len(),
            succeeded: succeeded.len(),
            failed: statuses.len() - succeeded.len(),
            verified: statuses.iter().filter(|status| status.is_verified()).count(),
            mean_latency_ms,
        }
    }

    #[must_use]
    pub fn success_ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.succeeded as f64 / self.total as f64)
    }
}

/// Shared state workloads and expectations see during one round.
pub struct RunContext {
    connector: Arc<FabricConnector>,
    context: Arc<ConnectorContext>,
    run_metrics: RunMetrics,
    statuses: Mutex<Vec<TxStatus>>,
}

impl RunContext {
    #[must_use]
    pub const fn new(
        connector: Arc<FabricConnector>,
        context: Arc<ConnectorContext>,
        run_metrics: RunMetrics,
    ) -> Self {
        Self {
            connector,
            context,
            run_metrics,
            statuses: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn connector(&self) -> &FabricConnector {
        &self.connector
    }

    #[must_use]
    pub fn connector_context(&self) -> &ConnectorContext {
        &self.context
    }

    #[must_use]
    pub const fn run_metrics(&self) -> RunMetrics {
        self.run_metrics
    }

    pub fn record(&self, status: TxStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(status);
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<TxStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_statuses(
            &self
                .statuses
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
