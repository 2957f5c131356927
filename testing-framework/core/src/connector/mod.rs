use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use fabric_bench_config::{ConnectorSettings, settings::SettingsError};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    clients::ClientRegistry,
    clock::{Clock, SystemClock},
    engine::{EngineError, EngineResources, EngineSettings, TransactionEngine},
    lifecycle::{AdminClients, ChaincodeOperations, ChannelOperations, LifecycleError},
    network::{ClientError, ClientFactory, EventSource},
    request::{FabricRequest, TargetingStrategy, TransactionRequest},
    selector::SelectorState,
    topology::{TopologyError, TopologyProvider},
    tx_status::TxStatus,
};

/// Role of the process hosting the connector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessRole {
    /// Sets the network up before the rounds start.
    Manager,
    #[default]
    Worker,
}

/// Workload or setup error raised to the caller instead of a [`TxStatus`].
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No contractId provided in the request")]
    MissingContractId,
    #[error("Could not find details for contract ID {0}")]
    UnknownContract(String),
    #[error("No contractFunction provided in the request for contract {0}")]
    MissingContractFunction(String),
    #[error("no invoker identity given and none declared for the first organization")]
    NoDefaultInvoker,
    #[error("no connector context acquired, call get_context first")]
    NoContext,
    #[error("dynamic topology discovery is not supported, declare the network statically")]
    DynamicTopology,
    #[error("invalid connector settings: {0}")]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },
}

/// Submitted and finished transaction counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxStats {
    pub submitted: u64,
    pub finished: u64,
}

/// Client handles, cached topology and connected listeners of one round.
pub struct ConnectorContext {
    round_index: usize,
    engine: TransactionEngine,
}

impl ConnectorContext {
    #[must_use]
    pub const fn round_index(&self) -> usize {
        self.round_index
    }

    #[must_use]
    pub const fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    async fn teardown(&self) {
        let resources = self.engine.resources();
        for sources in resources.event_sources.values() {
            for source in sources {
                if source.is_connected() {
                    source.disconnect();
                }
            }
        }
        for client in resources.clients.drain() {
            client.close().await;
        }
    }
}

/// Adapter between a benchmark driver and a Fabric-style network.
pub struct FabricConnector {
    settings: ConnectorSettings,
    topology: Arc<dyn TopologyProvider>,
    factory: Arc<dyn ClientFactory>,
    worker_index: u64,
    clock: Arc<dyn Clock>,
    context: Mutex<Option<Arc<ConnectorContext>>>,
    submitted: AtomicU64,
    finished: AtomicU64,
}

impl FabricConnector {
    #[must_use]
    pub fn new(
        settings: ConnectorSettings,
        topology: Arc<dyn TopologyProvider>,
        factory: Arc<dyn ClientFactory>,
        worker_index: u64,
    ) -> Self {
        Self {
            settings,
            topology,
            factory,
            worker_index,
            clock: Arc::new(SystemClock),
            context: Mutex::new(None),
            submitted: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        }
    }

    /// Replaces the wall clock used for status timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<dyn TopologyProvider> {
        &self.topology
    }

    #[must_use]
    pub const fn worker_index(&self) -> u64 {
        self.worker_index
    }

    /// One-time setup. The manager additionally creates and joins channels.
    pub async fn init(&self, role: ProcessRole) -> Result<(), ConnectorError> {
        self.settings.validate()?;
        if !self.topology.is_static() {
            return Err(ConnectorError::DynamicTopology);
        }

        info!(tls = self.topology.tls_posture().label(), "fabric TLS posture");

        if role == ProcessRole::Manager {
            let admins = self.admin_clients();
            let outcome = ChannelOperations::new(
                Arc::clone(&self.topology),
                admins.clone(),
                self.settings.clone(),
            )
            .create_and_join_channels()
            .await;
            admins.close().await;
            outcome?;
        }
        Ok(())
    }

    /// Installs and instantiates every contract flagged for install.
    pub async fn install_smart_contract(&self) -> Result<(), ConnectorError> {
        let admins = self.admin_clients();
        let outcome = ChaincodeOperations::new(
            Arc::clone(&self.topology),
            admins.clone(),
            self.settings.clone(),
            Arc::clone(&self.clock),
        )
        .install_and_instantiate_all()
        .await;
        admins.close().await;
        Ok(outcome?)
    }

    /// Acquires the round context; a second call without a release returns
    /// the same context.
    pub async fn get_context(
        &self,
        round_index: usize,
    ) -> Result<Arc<ConnectorContext>, ConnectorError> {
        let mut slot = self.context.lock().await;
        if let Some(context) = slot.as_ref() {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(self.build_context(round_index).await?);
        *slot = Some(Arc::clone(&context));
        info!(round = round_index, worker = self.worker_index, "connector context acquired");
        Ok(context)
    }

    /// Disconnects listeners and closes client handles; a no-op without a context.
    pub async fn release_context(&self) {
        let Some(context) = self.context.lock().await.take() else {
            return;
        };
        context.teardown().await;
        info!(round = context.round_index(), "connector context released");
    }

    /// Runs one request against the current context.
    pub async fn send_request(&self, request: &FabricRequest) -> Result<TxStatus, ConnectorError> {
        let context = self
            .context
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(ConnectorError::NoContext)?;

        let request = self.shape_request(request)?;
        let counted = !request.read_only || self.settings.count_query_as_load;

        if counted {
            self.submitted.fetch_add(1, Ordering::SeqCst);
        }
        let outcome = context.engine().execute(&request).await;
        if counted {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        Ok(outcome?)
    }

    /// Runs `requests` concurrently; results keep the input order.
    pub async fn send_requests(
        &self,
        requests: &[FabricRequest],
    ) -> Vec<Result<TxStatus, ConnectorError>> {
        join_all(requests.iter().map(|request| self.send_request(request))).await
    }

    #[must_use]
    pub fn stats(&self) -> TxStats {
        TxStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            finished: self.finished.load(Ordering::SeqCst),
        }
    }

    fn admin_clients(&self) -> AdminClients {
        AdminClients::new(Arc::clone(&self.topology), Arc::clone(&self.factory))
    }

    async fn build_context(&self, round_index: usize) -> Result<ConnectorContext, ConnectorError> {
        let clients = ClientRegistry::new();
        for identity in self.topology.aliases() {
            let material = self.topology.identity_material(&identity.alias)?;
            let client = self
                .factory
                .create_client(material)
                .await
                .map_err(|source| ConnectorError::Client {
                    context: format!("Couldn't create client for {}", identity.alias),
                    source,
                })?;
            clients.insert(identity.alias, client);
        }

        let listener = self
            .topology
            .default_invoker()
            .and_then(|invoker| clients.get(&invoker.alias))
            .or_else(|| clients.aliases().first().and_then(|alias| clients.get(alias)));

        let mut channels = HashMap::new();
        let mut event_sources: HashMap<String, Vec<Arc<dyn EventSource>>> = HashMap::new();
        for name in self.topology.channels() {
            let Some(channel) = self.topology.channel(&name) else {
                continue;
            };

            let mut sources = Vec::with_capacity(channel.event_sources.len());
            if let Some(client) = &listener {
                for peer in &channel.event_sources {
                    let source = client.event_source(&name, peer);
                    source.connect().await.map_err(|source| ConnectorError::Client {
                        context: format!("Couldn't connect to the event source of {peer} on {name}"),
                        source,
                    })?;
                    sources.push(source);
                }
            } else {
                warn!(channel = %name, "no client handle available for commit listeners");
            }
            debug!(channel = %name, listeners = sources.len(), "channel topology cached");

            event_sources.insert(name.clone(), sources);
            channels.insert(name, channel);
        }

        let resources = EngineResources {
            clients,
            channels,
            event_sources,
        };
        let selector = SelectorState::new(self.settings.load_balancing, self.worker_index);
        let engine = TransactionEngine::new(
            EngineSettings::from(&self.settings),
            resources,
            selector,
            Arc::clone(&self.clock),
        );

        Ok(ConnectorContext {
            round_index,
            engine,
        })
    }

    fn shape_request(&self, request: &FabricRequest) -> Result<TransactionRequest, ConnectorError> {
        let contract_id = request
            .contract_id
            .as_deref()
            .ok_or(ConnectorError::MissingContractId)?;
        let contract = self
            .topology
            .contract(contract_id)
            .ok_or_else(|| ConnectorError::UnknownContract(contract_id.to_owned()))?;
        let function = request
            .contract_function
            .clone()
            .ok_or_else(|| ConnectorError::MissingContractFunction(contract_id.to_owned()))?;

        let (invoker_alias, invoker_identity, invoker_msp_id) = match &request.invoker_identity {
            Some(identity) => (
                self.topology
                    .alias_for(request.invoker_msp_id.as_deref(), identity),
                identity.clone(),
                request.invoker_msp_id.clone(),
            ),
            None => {
                let invoker = self
                    .topology
                    .default_invoker()
                    .ok_or(ConnectorError::NoDefaultInvoker)?;
                (invoker.alias, invoker.identity, Some(invoker.msp_id))
            }
        };

        Ok(TransactionRequest {
            channel: request.channel.clone().unwrap_or(contract.channel.clone()),
            chaincode_id: contract.chaincode_id().to_owned(),
            function,
            arguments: request.contract_arguments.clone().unwrap_or_default(),
            transient_map: request
                .transient_map
                .iter()
                .map(|(key, value)| (key.clone(), Bytes::from(value.clone().into_bytes())))
                .collect(),
            invoker_alias,
            invoker_identity,
            invoker_msp_id,
            targeting: TargetingStrategy::from_request(
                request.target_peers.as_ref(),
                request.target_organizations.as_ref(),
            ),
            orderer: request.orderer.clone(),
            read_only: request.read_only,
            timeout: request
                .timeout
                .unwrap_or(self.settings.default_request_timeout),
        })
    }
}
