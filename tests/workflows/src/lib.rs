//! In-process Fabric-style network for exercising the connector end to end.
//!
//! Peers endorse and commit according to per-peer scripts; every call the
//! connector makes is recorded so tests can assert on it afterwards.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use fabric_bench_config::{
    ConnectorSettings, NetworkConfig,
    network::{IdentityMaterial, validate_network},
};
use fabric_bench_core::{
    FabricConnector,
    clock::MonotonicClock,
    lifecycle::config_update::ConfigUpdate,
    network::{
        BroadcastResponse, ChaincodeInfo, ClientError, ClientFactory, CommitNotice, CommitSignal,
        ConfigSignature, CreateChannelRequest, Endorsement, EventSource, FabricClient,
        InstallRequest, InstantiateRequest, JoinChannelRequest, LifecycleClient, PeerError,
        PeerStatus, ProposalRequest, ProposalResponses, STATUS_SUCCESS, SignedProposal,
        TransactionClient, TransactionEnvelope, TxEventRegistry, TxId, VALIDATION_CODE_VALID,
    },
    topology::NetworkTopology,
};
use tokio::{sync::oneshot, time::sleep};

/// Two organizations with one peer each, one orderer and one channel.
pub const TWO_ORG_NETWORK: &str = r#"
name: two-orgs
organizations:
  - msp_id: Org1MSP
    admin: admin
    identities:
      - name: admin
        certificate: { pem: "org1-admin-cert" }
        private_key: { pem: "org1-admin-key" }
      - name: user1
        certificate: { pem: "org1-user1-cert" }
        private_key: { pem: "org1-user1-key" }
    peers:
      - name: peer0.org1
  - msp_id: Org2MSP
    admin: admin
    identities:
      - name: admin
        certificate: { pem: "org2-admin-cert" }
        private_key: { pem: "org2-admin-key" }
    peers:
      - name: peer0.org2
orderers:
  - name: orderer0
channels:
  - name: mychannel
    create: true
    organizations: [Org1MSP, Org2MSP]
    definition:
      build_transaction:
        consortium: SampleConsortium
        msps: [Org1MSP, Org2MSP]
        capabilities: [V1_4_3]
    contracts:
      - id: marbles
        version: v1
        install: true
        init_arguments: ["init"]
"#;

/// Like [`TWO_ORG_NETWORK`] but with several endorsers per organization.
pub const WIDE_NETWORK: &str = r#"
name: wide
organizations:
  - msp_id: Org1MSP
    admin: admin
    identities:
      - name: admin
        certificate: { pem: "org1-admin-cert" }
        private_key: { pem: "org1-admin-key" }
    peers:
      - name: peer0.org1
      - name: peer1.org1
  - msp_id: Org2MSP
    admin: admin
    identities:
      - name: admin
        certificate: { pem: "org2-admin-cert" }
        private_key: { pem: "org2-admin-key" }
    peers:
      - name: peer0.org2
      - name: peer1.org2
      - name: peer2.org2
        event_source: false
orderers:
  - name: orderer0
  - name: orderer1
channels:
  - name: mychannel
    organizations: [Org1MSP, Org2MSP]
    contracts:
      - id: marbles
        version: v1
"#;

/// Parses and validates an inline network description.
pub fn network_config(yaml: &str) -> NetworkConfig {
    let config: NetworkConfig = serde_yaml::from_str(yaml).expect("network yaml");
    validate_network(&config).expect("valid network");
    config
}

/// Settings without settle delays, suited to paused-time tests.
pub fn test_settings() -> ConnectorSettings {
    ConnectorSettings::default().without_settle_delays()
}

/// Connector wired to `network`, timestamped by tokio's clock.
pub fn connector(
    network: &MockNetwork,
    config: NetworkConfig,
    settings: ConnectorSettings,
) -> FabricConnector {
    FabricConnector::new(
        settings,
        Arc::new(NetworkTopology::new(config)),
        network.factory(),
        0,
    )
    .with_clock(Arc::new(MonotonicClock::new()))
}

/// Endorsement behavior of one peer.
#[derive(Clone, Debug)]
pub struct PeerScript {
    pub status: i32,
    pub message: String,
    pub payload: Bytes,
    pub fingerprint: Option<String>,
    pub signed: bool,
    /// Reported as a per-peer error instead of an endorsement.
    pub error: Option<String>,
}

impl PeerScript {
    fn for_peer(peer: &str) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: String::new(),
            payload: Bytes::from(format!("{peer}:ok")),
            fingerprint: Some("rw-1".to_owned()),
            signed: true,
            error: None,
        }
    }
}

/// What a peer reports for a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitScript {
    Commit { after: Duration, code: String },
    ListenerError { after: Duration, message: String },
    /// Never reports anything.
    Silent,
}

impl CommitScript {
    #[must_use]
    pub fn valid_after(after: Duration) -> Self {
        Self::Commit {
            after,
            code: VALIDATION_CODE_VALID.to_owned(),
        }
    }

    #[must_use]
    pub fn invalid(code: &str) -> Self {
        Self::Commit {
            after: Duration::ZERO,
            code: code.to_owned(),
        }
    }
}

impl Default for CommitScript {
    fn default() -> Self {
        Self::valid_after(Duration::ZERO)
    }
}

#[derive(Clone, Debug)]
pub struct RecordedProposal {
    /// Alias of the client that sent the proposal.
    pub invoker: String,
    pub channel: String,
    pub request: ProposalRequest,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct RecordedBroadcast {
    pub channel: String,
    pub orderer: String,
    pub tx_id: TxId,
    pub endorsements: usize,
}

#[derive(Default)]
struct NetworkState {
    peers: HashMap<String, PeerScript>,
    commits: HashMap<String, CommitScript>,
    proposal_delay: Duration,
    proposal_failure: Option<String>,
    broadcast_status: Option<String>,
    broadcast_delay: Duration,
    commits_before_ack: bool,
    missing_responses: HashSet<String>,
    unreachable_event_sources: HashSet<String>,
    failing_clients: HashSet<String>,
    join_rejections: HashSet<String>,
    install_rejections: HashSet<String>,

    proposals: Vec<RecordedProposal>,
    queries: Vec<RecordedProposal>,
    broadcasts: Vec<RecordedBroadcast>,
    created_channels: Vec<CreateChannelRequest>,
    joined: HashMap<String, BTreeSet<String>>,
    genesis_requests: usize,
    installed: HashMap<String, Vec<ChaincodeInfo>>,
    install_requests: Vec<InstallRequest>,
    instantiated: HashMap<String, Vec<ChaincodeInfo>>,
    instantiate_requests: Vec<InstantiateRequest>,
    pending_instantiations: HashMap<TxId, (String, ChaincodeInfo)>,
    created_clients: Vec<String>,
    closed_clients: Vec<String>,
    sources: HashMap<(String, String), Vec<Arc<TxEventRegistry>>>,
    connected_sources: usize,
}

impl NetworkState {
    fn peer(&self, peer: &str) -> PeerScript {
        self.peers
            .get(peer)
            .cloned()
            .unwrap_or_else(|| PeerScript::for_peer(peer))
    }
}

/// Shared handle to the scripted network.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[must_use]
    pub fn factory(&self) -> Arc<MockClientFactory> {
        Arc::new(MockClientFactory {
            network: self.clone(),
        })
    }

    pub fn script_peer(&self, peer: &str, edit: impl FnOnce(&mut PeerScript)) {
        let mut state = self.state();
        let script = state
            .peers
            .entry(peer.to_owned())
            .or_insert_with(|| PeerScript::for_peer(peer));
        edit(script);
    }

    pub fn script_commit(&self, peer: &str, script: CommitScript) {
        self.state().commits.insert(peer.to_owned(), script);
    }

    pub fn delay_proposals(&self, delay: Duration) {
        self.state().proposal_delay = delay;
    }

    pub fn fail_proposals(&self, message: &str) {
        self.state().proposal_failure = Some(message.to_owned());
    }

    pub fn respond_to_broadcasts_with(&self, status: &str) {
        self.state().broadcast_status = Some(status.to_owned());
    }

    pub fn delay_broadcasts(&self, delay: Duration) {
        self.state().broadcast_delay = delay;
    }

    /// Delivers commits as soon as the orderer accepts, ahead of its ack.
    pub fn commit_before_ack(&self) {
        self.state().commits_before_ack = true;
    }

    /// Leaves `peer` out of every response list it was targeted in.
    pub fn drop_responses_from(&self, peer: &str) {
        self.state().missing_responses.insert(peer.to_owned());
    }

    pub fn make_event_source_unreachable(&self, peer: &str) {
        self.state()
            .unreachable_event_sources
            .insert(peer.to_owned());
    }

    pub fn fail_client_creation(&self, alias: &str) {
        self.state().failing_clients.insert(alias.to_owned());
    }

    pub fn reject_join(&self, peer: &str) {
        self.state().join_rejections.insert(peer.to_owned());
    }

    pub fn reject_install(&self, peer: &str) {
        self.state().install_rejections.insert(peer.to_owned());
    }

    pub fn mark_joined(&self, peer: &str, channel: &str) {
        self.state()
            .joined
            .entry(peer.to_owned())
            .or_default()
            .insert(channel.to_owned());
    }

    pub fn mark_installed(&self, peer: &str, name: &str, version: &str) {
        self.state()
            .installed
            .entry(peer.to_owned())
            .or_default()
            .push(chaincode(name, version));
    }

    pub fn mark_instantiated(&self, channel: &str, name: &str, version: &str) {
        self.state()
            .instantiated
            .entry(channel.to_owned())
            .or_default()
            .push(chaincode(name, version));
    }

    #[must_use]
    pub fn proposals(&self) -> Vec<RecordedProposal> {
        self.state().proposals.clone()
    }

    #[must_use]
    pub fn queries(&self) -> Vec<RecordedProposal> {
        self.state().queries.clone()
    }

    #[must_use]
    pub fn broadcasts(&self) -> Vec<RecordedBroadcast> {
        self.state().broadcasts.clone()
    }

    #[must_use]
    pub fn created_channels(&self) -> Vec<CreateChannelRequest> {
        self.state().created_channels.clone()
    }

    #[must_use]
    pub fn joined_channels(&self, peer: &str) -> Vec<String> {
        self.state()
            .joined
            .get(peer)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn genesis_requests(&self) -> usize {
        self.state().genesis_requests
    }

    #[must_use]
    pub fn installed(&self, peer: &str) -> Vec<ChaincodeInfo> {
        self.state().installed.get(peer).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn install_requests(&self) -> Vec<InstallRequest> {
        self.state().install_requests.clone()
    }

    #[must_use]
    pub fn instantiated(&self, channel: &str) -> Vec<ChaincodeInfo> {
        self.state()
            .instantiated
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn instantiate_requests(&self) -> Vec<InstantiateRequest> {
        self.state().instantiate_requests.clone()
    }

    #[must_use]
    pub fn created_clients(&self) -> Vec<String> {
        self.state().created_clients.clone()
    }

    #[must_use]
    pub fn closed_clients(&self) -> Vec<String> {
        self.state().closed_clients.clone()
    }

    /// Sources currently connected, across every client.
    #[must_use]
    pub fn connected_sources(&self) -> usize {
        self.state().connected_sources
    }

    fn register_source(&self, channel: &str, peer: &str) -> Arc<TxEventRegistry> {
        let registry = Arc::new(TxEventRegistry::new());
        self.state()
            .sources
            .entry((channel.to_owned(), peer.to_owned()))
            .or_default()
            .push(Arc::clone(&registry));
        registry
    }

    /// Plays the commit script of every listening peer of `channel`.
    fn deliver_commits(&self, channel: &str, tx_id: &TxId) {
        let deliveries: Vec<(CommitScript, Vec<Arc<TxEventRegistry>>)> = {
            let state = self.state();
            state
                .sources
                .iter()
                .filter(|((source_channel, _), _)| source_channel == channel)
                .map(|((_, peer), registries)| {
                    (
                        state.commits.get(peer).cloned().unwrap_or_default(),
                        registries.clone(),
                    )
                })
                .collect()
        };

        for (script, registries) in deliveries {
            let (after, signal) = match script {
                CommitScript::Commit { after, code } => (after, CommitSignal::Committed { code }),
                CommitScript::ListenerError { after, message } => {
                    (after, CommitSignal::ListenerError(message))
                }
                CommitScript::Silent => continue,
            };
            let tx_id = tx_id.clone();
            tokio::spawn(async move {
                sleep(after).await;
                for registry in registries {
                    registry.notify(&tx_id, signal.clone());
                }
            });
        }
    }
}

fn chaincode(name: &str, version: &str) -> ChaincodeInfo {
    ChaincodeInfo {
        name: name.to_owned(),
        version: version.to_owned(),
    }
}

fn peer_status(peer: &str, status: i32, message: &str) -> PeerStatus {
    PeerStatus {
        peer: peer.to_owned(),
        status,
        message: message.to_owned(),
    }
}

/// Client handle bound to one wallet alias.
pub struct MockClient {
    alias: String,
    msp_id: String,
    network: MockNetwork,
}

impl MockClient {
    fn endorse(&self, targets: &[String]) -> Vec<Result<Endorsement, PeerError>> {
        let state = self.network.state();
        targets
            .iter()
            .filter(|peer| !state.missing_responses.contains(*peer))
            .map(|peer| {
                let script = state.peer(peer);
                match script.error {
                    Some(message) => Err(PeerError::new(message)),
                    None => Ok(Endorsement {
                        peer: peer.clone(),
                        status: script.status,
                        message: script.message,
                        payload: script.payload,
                        rw_set_fingerprint: script.fingerprint,
                        signature: if script.signed {
                            Bytes::from_static(b"signature")
                        } else {
                            Bytes::new()
                        },
                    }),
                }
            })
            .collect()
    }
}

#[async_trait]
impl TransactionClient for MockClient {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn msp_id(&self) -> &str {
        &self.msp_id
    }

    async fn send_proposal(
        &self,
        channel: &str,
        request: &ProposalRequest,
        timeout: Duration,
    ) -> Result<ProposalResponses, ClientError> {
        let (delay, failure) = {
            let mut state = self.network.state();
            state.proposals.push(RecordedProposal {
                invoker: self.alias.clone(),
                channel: channel.to_owned(),
                request: request.clone(),
                timeout,
            });
            (state.proposal_delay, state.proposal_failure.clone())
        };

        if delay > timeout {
            sleep(timeout).await;
            return Err(ClientError::Timeout(timeout));
        }
        sleep(delay).await;
        if let Some(message) = failure {
            return Err(ClientError::Rejected(message));
        }

        Ok(ProposalResponses {
            proposal: SignedProposal {
                tx_id: request.tx_id.clone(),
                channel: channel.to_owned(),
                bytes: Bytes::from(request.function.clone().into_bytes()),
            },
            responses: self.endorse(&request.targets),
        })
    }

    async fn query(
        &self,
        channel: &str,
        request: &ProposalRequest,
    ) -> Result<Vec<Result<Bytes, PeerError>>, ClientError> {
        let (delay, failure) = {
            let mut state = self.network.state();
            state.queries.push(RecordedProposal {
                invoker: self.alias.clone(),
                channel: channel.to_owned(),
                request: request.clone(),
                timeout: Duration::ZERO,
            });
            (state.proposal_delay, state.proposal_failure.clone())
        };

        sleep(delay).await;
        if let Some(message) = failure {
            return Err(ClientError::Rejected(message));
        }

        Ok(self
            .endorse(&request.targets)
            .into_iter()
            .map(|response| match response {
                Ok(endorsement) if endorsement.is_success() => Ok(endorsement.payload),
                Ok(endorsement) => Err(PeerError::new(endorsement.message)),
                Err(err) => Err(err),
            })
            .collect())
    }

    fn verify_endorsement(&self, _channel: &str, endorsement: &Endorsement) -> bool {
        !endorsement.signature.is_empty()
    }

    async fn broadcast(
        &self,
        channel: &str,
        orderer: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<BroadcastResponse, ClientError> {
        let (delay, status, early) = {
            let mut state = self.network.state();
            state.broadcasts.push(RecordedBroadcast {
                channel: channel.to_owned(),
                orderer: orderer.to_owned(),
                tx_id: envelope.tx_id.clone(),
                endorsements: envelope.endorsements.len(),
            });
            (
                state.broadcast_delay,
                state.broadcast_status.clone(),
                state.commits_before_ack,
            )
        };

        let response = match status {
            Some(status) => BroadcastResponse {
                status,
                info: String::new(),
            },
            None => BroadcastResponse::success(),
        };

        if response.is_success() {
            {
                let mut state = self.network.state();
                if let Some((channel, info)) = state.pending_instantiations.remove(&envelope.tx_id)
                {
                    state.instantiated.entry(channel).or_default().push(info);
                }
            }
            if early {
                self.network.deliver_commits(channel, &envelope.tx_id);
            }
        }

        sleep(delay).await;
        if response.is_success() && !early {
            self.network.deliver_commits(channel, &envelope.tx_id);
        }
        Ok(response)
    }

    fn event_source(&self, channel: &str, peer: &str) -> Arc<dyn EventSource> {
        Arc::new(MockEventSource {
            channel: channel.to_owned(),
            peer: peer.to_owned(),
            registry: self.network.register_source(channel, peer),
            connected: AtomicBool::new(false),
            network: self.network.clone(),
        })
    }

    async fn close(&self) {
        self.network.state().closed_clients.push(self.alias.clone());
    }
}

#[async_trait]
impl LifecycleClient for MockClient {
    fn extract_channel_config(&self, envelope: &[u8]) -> Result<Bytes, ClientError> {
        if envelope.is_empty() {
            return Err(ClientError::InvalidResponse(
                "empty channel transaction".to_owned(),
            ));
        }
        Ok(Bytes::copy_from_slice(envelope))
    }

    fn encode_config_update(&self, update: &ConfigUpdate) -> Result<Bytes, ClientError> {
        Ok(Bytes::from(serde_json::to_vec(update)?))
    }

    fn sign_channel_config(&self, config: &[u8]) -> Result<ConfigSignature, ClientError> {
        Ok(ConfigSignature {
            signer_msp_id: self.msp_id.clone(),
            signature: Bytes::from(format!("{}:{}", self.alias, config.len())),
        })
    }

    async fn create_channel(
        &self,
        request: &CreateChannelRequest,
    ) -> Result<BroadcastResponse, ClientError> {
        self.network.state().created_channels.push(request.clone());
        Ok(BroadcastResponse::success())
    }

    async fn query_channels(&self, peer: &str) -> Result<Vec<String>, ClientError> {
        Ok(self.network.joined_channels(peer))
    }

    async fn genesis_block(&self, channel: &str, _orderer: &str) -> Result<Bytes, ClientError> {
        self.network.state().genesis_requests += 1;
        Ok(Bytes::from(format!("genesis:{channel}")))
    }

    async fn join_channel(
        &self,
        request: &JoinChannelRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError> {
        let mut state = self.network.state();
        Ok(request
            .targets
            .iter()
            .map(|peer| {
                if state.join_rejections.contains(peer) {
                    return Ok(peer_status(peer, 500, "join refused"));
                }
                state
                    .joined
                    .entry(peer.clone())
                    .or_default()
                    .insert(request.channel.clone());
                Ok(peer_status(peer, STATUS_SUCCESS, ""))
            })
            .collect())
    }

    async fn query_installed_chaincodes(
        &self,
        peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError> {
        Ok(self.network.installed(peer))
    }

    async fn install_chaincode(
        &self,
        request: &InstallRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError> {
        let mut state = self.network.state();
        state.install_requests.push(request.clone());
        Ok(request
            .targets
            .iter()
            .map(|peer| {
                if state.install_rejections.contains(peer) {
                    return Ok(peer_status(peer, 500, "install refused"));
                }
                state
                    .installed
                    .entry(peer.clone())
                    .or_default()
                    .push(chaincode(&request.chaincode_id, &request.version));
                Ok(peer_status(peer, STATUS_SUCCESS, ""))
            })
            .collect())
    }

    async fn query_instantiated_chaincodes(
        &self,
        channel: &str,
        _peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError> {
        Ok(self.network.instantiated(channel))
    }

    async fn send_instantiate_proposal(
        &self,
        channel: &str,
        request: &InstantiateRequest,
        _timeout: Duration,
    ) -> Result<ProposalResponses, ClientError> {
        {
            let mut state = self.network.state();
            state.instantiate_requests.push(request.clone());
            state.pending_instantiations.insert(
                request.tx_id.clone(),
                (
                    channel.to_owned(),
                    chaincode(&request.chaincode_id, &request.version),
                ),
            );
        }

        Ok(ProposalResponses {
            proposal: SignedProposal {
                tx_id: request.tx_id.clone(),
                channel: channel.to_owned(),
                bytes: Bytes::new(),
            },
            responses: self.endorse(&request.targets),
        })
    }
}

/// Commit listener fed by [`MockNetwork::deliver_commits`].
pub struct MockEventSource {
    channel: String,
    peer: String,
    registry: Arc<TxEventRegistry>,
    connected: AtomicBool,
    network: MockNetwork,
}

#[async_trait]
impl EventSource for MockEventSource {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let mut state = self.network.state();
        if state.unreachable_event_sources.contains(&self.peer) {
            return Err(ClientError::Rejected(format!(
                "connection to {} refused",
                self.peer
            )));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            state.connected_sources += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn register(&self, tx_id: &TxId) -> Result<oneshot::Receiver<CommitNotice>, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected {
                peer: self.peer.clone(),
                channel: self.channel.clone(),
            });
        }
        Ok(self.registry.register(tx_id))
    }

    fn unregister(&self, tx_id: &TxId) {
        self.registry.unregister(tx_id);
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.network.state().connected_sources -= 1;
        }
        self.registry.fail_all("event source disconnected");
    }
}

/// Hands out [`MockClient`]s and records which aliases were requested.
pub struct MockClientFactory {
    network: MockNetwork,
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn create_client(
        &self,
        identity: IdentityMaterial,
    ) -> Result<Arc<dyn FabricClient>, ClientError> {
        let mut state = self.network.state();
        if state.failing_clients.contains(&identity.alias) {
            return Err(ClientError::Rejected(format!(
                "identity {} was revoked",
                identity.alias
            )));
        }
        state.created_clients.push(identity.alias.clone());

        Ok(Arc::new(MockClient {
            alias: identity.alias,
            msp_id: identity.msp_id,
            network: self.network.clone(),
        }))
    }
}
