pub mod commit;
mod evaluate;
mod submit;

use std::{collections::HashMap, sync::Arc, time::Duration};

use fabric_bench_config::ConnectorSettings;
use thiserror::Error;

use crate::{
    clients::ClientRegistry,
    clock::Clock,
    deadline::DeadlineTracker,
    network::{EventSource, FabricClient},
    request::{TargetingStrategy, TransactionRequest},
    selector::{SelectorState, select},
    topology::ChannelTopology,
    tx_status::TxStatus,
};

/// Misconfigured workload; raised to the caller instead of a [`TxStatus`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "No contracts for invokerIdentity {identity}{} found. Identity and/or MspId does not exist",
        .msp_id.as_ref().map(|msp| format!(" in {msp}")).unwrap_or_default()
    )]
    UnknownInvoker {
        identity: String,
        msp_id: Option<String>,
    },
    #[error("channel {0} is not part of the connector context")]
    UnknownChannel(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSettings {
    pub verify_proposal_responses: bool,
    pub verify_read_write_sets: bool,
    pub latency_threshold: f64,
    pub min_phase_timeout: Duration,
}

impl From<&ConnectorSettings> for EngineSettings {
    fn from(settings: &ConnectorSettings) -> Self {
        Self {
            verify_proposal_responses: settings.verify_proposal_responses,
            verify_read_write_sets: settings.verify_read_write_sets,
            latency_threshold: settings.latency_threshold,
            min_phase_timeout: settings.min_phase_timeout,
        }
    }
}

/// Handles and cached topology one engine instance works against.
#[derive(Clone, Default)]
pub struct EngineResources {
    pub clients: ClientRegistry,
    pub channels: HashMap<String, ChannelTopology>,
    pub event_sources: HashMap<String, Vec<Arc<dyn EventSource>>>,
}

/// Executes the submit and evaluate protocols for single requests.
pub struct TransactionEngine {
    settings: EngineSettings,
    resources: EngineResources,
    selector: SelectorState,
    deadline: DeadlineTracker,
    clock: Arc<dyn Clock>,
}

impl TransactionEngine {
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        resources: EngineResources,
        selector: SelectorState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            deadline: DeadlineTracker::new(settings.min_phase_timeout, Arc::clone(&clock)),
            settings,
            resources,
            selector,
            clock,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub const fn resources(&self) -> &EngineResources {
        &self.resources
    }

    #[must_use]
    pub const fn selector(&self) -> &SelectorState {
        &self.selector
    }

    /// Runs `request` with the flavor its read-only flag asks for.
    pub async fn execute(&self, request: &TransactionRequest) -> Result<TxStatus, EngineError> {
        if request.read_only {
            self.evaluate(request).await
        } else {
            self.submit(request).await
        }
    }

    fn client_for(&self, request: &TransactionRequest) -> Result<Arc<dyn FabricClient>, EngineError> {
        self.resources
            .clients
            .get(&request.invoker_alias)
            .ok_or_else(|| EngineError::UnknownInvoker {
                identity: request.invoker_identity.clone(),
                msp_id: request.invoker_msp_id.clone(),
            })
    }

    fn channel(&self, name: &str) -> Result<&ChannelTopology, EngineError> {
        self.resources
            .channels
            .get(name)
            .ok_or_else(|| EngineError::UnknownChannel(name.to_owned()))
    }

    fn event_sources(&self, channel: &str) -> &[Arc<dyn EventSource>] {
        self.resources
            .event_sources
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Endorsing peers for one request, aligned with the proposal targets.
#[must_use]
pub fn resolve_targets(
    strategy: &TargetingStrategy,
    channel: &ChannelTopology,
    index: u64,
) -> Vec<String> {
    match strategy {
        TargetingStrategy::ExplicitPeers(peers) => peers.clone(),
        TargetingStrategy::ExplicitOrganizations(orgs) => channel
            .endorsing_peers
            .iter()
            .filter(|org| orgs.contains(&org.msp_id))
            .flat_map(|org| org.peers.iter().cloned())
            .collect(),
        TargetingStrategy::Automatic => channel
            .endorsing_peers
            .iter()
            .filter_map(|org| select(&org.peers, index).cloned())
            .collect(),
    }
}
