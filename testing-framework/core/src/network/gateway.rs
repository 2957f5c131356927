//! REST gateway transport for the client seams.
//!
//! The gateway fronts the peers and orderers of one network and holds the
//! signing keys of the registered identities; requests name the identity
//! they act for through headers.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use fabric_bench_config::{
    constants::{DEFAULT_GATEWAY_HTTP_TIMEOUT, DEFAULT_GATEWAY_POLL_INTERVAL},
    network::IdentityMaterial,
};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

use super::{
    BroadcastResponse, ChaincodeInfo, ClientError, ClientFactory, CommitNotice, CommitSignal,
    ConfigSignature, CreateChannelRequest, Endorsement, EventSource, FabricClient,
    InstallRequest, InstantiateRequest, JoinChannelRequest, LifecycleClient, PeerError,
    PeerStatus, ProposalRequest, ProposalResponses, TransactionClient, TransactionEnvelope,
    TxEventRegistry, TxId,
};
use crate::lifecycle::config_update::ConfigUpdate;

const IDENTITY_HEADER: &str = "x-fabric-identity";
const MSP_HEADER: &str = "x-fabric-msp-id";

pub mod paths {
    pub const CHANNELS: &str = "/channels";
    pub const INSTALL: &str = "/chaincodes/install";

    #[must_use]
    pub fn proposals(channel: &str) -> String {
        format!("/channels/{channel}/proposals")
    }

    #[must_use]
    pub fn queries(channel: &str) -> String {
        format!("/channels/{channel}/queries")
    }

    #[must_use]
    pub fn broadcast(channel: &str, orderer: &str) -> String {
        format!("/channels/{channel}/orderers/{orderer}/broadcast")
    }

    #[must_use]
    pub fn genesis_block(channel: &str, orderer: &str) -> String {
        format!("/channels/{channel}/orderers/{orderer}/genesis")
    }

    #[must_use]
    pub fn join(channel: &str) -> String {
        format!("/channels/{channel}/join")
    }

    #[must_use]
    pub fn instantiate(channel: &str) -> String {
        format!("/channels/{channel}/instantiate")
    }

    #[must_use]
    pub fn peer_channels(peer: &str) -> String {
        format!("/peers/{peer}/channels")
    }

    #[must_use]
    pub fn installed(peer: &str) -> String {
        format!("/peers/{peer}/chaincodes/installed")
    }

    #[must_use]
    pub fn instantiated(channel: &str, peer: &str) -> String {
        format!("/channels/{channel}/peers/{peer}/chaincodes/instantiated")
    }

    #[must_use]
    pub fn commit_status(channel: &str, peer: &str, tx_id: &str) -> String {
        format!("/channels/{channel}/peers/{peer}/transactions/{tx_id}")
    }

    #[must_use]
    pub fn ping(channel: &str, peer: &str) -> String {
        format!("/channels/{channel}/peers/{peer}/events")
    }
}

#[derive(Serialize)]
struct TimedRequest<'a, T> {
    #[serde(flatten)]
    request: &'a T,
    timeout_ms: u64,
}

/// Commit state of one transaction as seen by one peer.
#[derive(Debug, Deserialize, Serialize)]
pub struct CommitStatus {
    /// Validation code, absent while the transaction is not in a block.
    #[serde(default)]
    pub code: Option<String>,
}

/// Client handle speaking to a REST gateway on behalf of one identity.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: Url,
    client: Client,
    identity: Arc<IdentityMaterial>,
    poll_interval: Duration,
}

impl GatewayClient {
    pub fn new(base_url: &str, identity: IdentityMaterial) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|err| ClientError::InvalidUrl {
            url: base_url.to_owned(),
            reason: err.to_string(),
        })?;
        let client = Client::builder()
            .timeout(DEFAULT_GATEWAY_HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url,
            client,
            identity: Arc::new(identity),
            poll_interval: DEFAULT_GATEWAY_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(IDENTITY_HEADER, &self.identity.alias)
            .header(MSP_HEADER, &self.identity.msp_id)
    }

    async fn get_json<R>(&self, path: &str) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let url = self.url(path)?;
        let body = self
            .authorize(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<T, R>(
        &self,
        path: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<R, ClientError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path)?;
        let mut builder = self.authorize(self.client.post(url)).json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ClientError::Timeout(timeout.unwrap_or(DEFAULT_GATEWAY_HTTP_TIMEOUT))
            } else {
                ClientError::Request(err)
            }
        })?;
        let body = response.error_for_status()?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn commit_status(
        &self,
        channel: &str,
        peer: &str,
        tx_id: &TxId,
    ) -> Result<CommitStatus, ClientError> {
        self.get_json(&paths::commit_status(channel, peer, tx_id.as_str()))
            .await
    }
}

#[async_trait]
impl TransactionClient for GatewayClient {
    fn alias(&self) -> &str {
        &self.identity.alias
    }

    fn msp_id(&self) -> &str {
        &self.identity.msp_id
    }

    async fn send_proposal(
        &self,
        channel: &str,
        request: &ProposalRequest,
        timeout: Duration,
    ) -> Result<ProposalResponses, ClientError> {
        let body = TimedRequest {
            request,
            timeout_ms: duration_ms(timeout),
        };
        self.post_json(&paths::proposals(channel), &body, Some(timeout))
            .await
    }

    async fn query(
        &self,
        channel: &str,
        request: &ProposalRequest,
    ) -> Result<Vec<Result<Bytes, PeerError>>, ClientError> {
        self.post_json(&paths::queries(channel), request, None)
            .await
    }

    /// The gateway checks signatures before relaying; an unsigned
    /// endorsement means that check did not happen.
    fn verify_endorsement(&self, _channel: &str, endorsement: &Endorsement) -> bool {
        !endorsement.signature.is_empty()
    }

    async fn broadcast(
        &self,
        channel: &str,
        orderer: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<BroadcastResponse, ClientError> {
        self.post_json(&paths::broadcast(channel, orderer), envelope, None)
            .await
    }

    fn event_source(&self, channel: &str, peer: &str) -> Arc<dyn EventSource> {
        Arc::new(GatewayEventSource::new(self.clone(), channel, peer))
    }

    async fn close(&self) {
        debug!(alias = %self.identity.alias, "closing gateway client");
    }
}

#[async_trait]
impl LifecycleClient for GatewayClient {
    /// Prebuilt envelopes are forwarded untouched; the gateway unwraps them.
    fn extract_channel_config(&self, envelope: &[u8]) -> Result<Bytes, ClientError> {
        if envelope.is_empty() {
            return Err(ClientError::InvalidResponse(
                "empty channel configuration envelope".to_owned(),
            ));
        }
        Ok(Bytes::copy_from_slice(envelope))
    }

    fn encode_config_update(&self, update: &ConfigUpdate) -> Result<Bytes, ClientError> {
        Ok(Bytes::from(serde_json::to_vec(update)?))
    }

    /// Names the signer by certificate; the gateway applies the key it holds.
    fn sign_channel_config(&self, config: &[u8]) -> Result<ConfigSignature, ClientError> {
        if config.is_empty() {
            return Err(ClientError::InvalidResponse(
                "cannot sign an empty configuration update".to_owned(),
            ));
        }
        Ok(ConfigSignature {
            signer_msp_id: self.identity.msp_id.clone(),
            signature: Bytes::from(self.identity.certificate.clone().into_bytes()),
        })
    }

    async fn create_channel(
        &self,
        request: &CreateChannelRequest,
    ) -> Result<BroadcastResponse, ClientError> {
        self.post_json(paths::CHANNELS, request, None).await
    }

    async fn query_channels(&self, peer: &str) -> Result<Vec<String>, ClientError> {
        self.get_json(&paths::peer_channels(peer)).await
    }

    async fn genesis_block(&self, channel: &str, orderer: &str) -> Result<Bytes, ClientError> {
        let url = self.url(&paths::genesis_block(channel, orderer))?;
        Ok(self
            .authorize(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?)
    }

    async fn join_channel(
        &self,
        request: &JoinChannelRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError> {
        self.post_json(&paths::join(&request.channel), request, None)
            .await
    }

    async fn query_installed_chaincodes(
        &self,
        peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError> {
        self.get_json(&paths::installed(peer)).await
    }

    async fn install_chaincode(
        &self,
        request: &InstallRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError> {
        self.post_json(paths::INSTALL, request, None).await
    }

    async fn query_instantiated_chaincodes(
        &self,
        channel: &str,
        peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError> {
        self.get_json(&paths::instantiated(channel, peer)).await
    }

    async fn send_instantiate_proposal(
        &self,
        channel: &str,
        request: &InstantiateRequest,
        timeout: Duration,
    ) -> Result<ProposalResponses, ClientError> {
        let body = TimedRequest {
            request,
            timeout_ms: duration_ms(timeout),
        };
        self.post_json(&paths::instantiate(channel), &body, Some(timeout))
            .await
    }
}

/// Commit notifications for one peer, polled from the gateway.
pub struct GatewayEventSource {
    client: GatewayClient,
    channel: String,
    peer: String,
    registry: Arc<TxEventRegistry>,
    connected: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl GatewayEventSource {
    #[must_use]
    pub fn new(client: GatewayClient, channel: &str, peer: &str) -> Self {
        Self {
            client,
            channel: channel.to_owned(),
            peer: peer.to_owned(),
            registry: Arc::new(TxEventRegistry::new()),
            connected: Arc::new(AtomicBool::new(false)),
            poller: Mutex::new(None),
        }
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let channel = self.channel.clone();
        let peer = self.peer.clone();
        let registry = Arc::clone(&self.registry);
        let connected = Arc::clone(&self.connected);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(client.poll_interval);
            loop {
                interval.tick().await;
                for tx_id in registry.pending() {
                    match client.commit_status(&channel, &peer, &tx_id).await {
                        Ok(CommitStatus { code: Some(code) }) => {
                            registry.notify(&tx_id, CommitSignal::Committed { code });
                        }
                        Ok(CommitStatus { code: None }) => {}
                        Err(err) => {
                            warn!(peer, channel, %err, "commit polling failed, dropping listeners");
                            connected.store(false, Ordering::SeqCst);
                            registry.fail_all(&err.to_string());
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl EventSource for GatewayEventSource {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        let _: serde_json::Value = self
            .client
            .get_json(&paths::ping(&self.channel, &self.peer))
            .await?;

        let handle = self.spawn_poller();
        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        self.connected.store(true, Ordering::SeqCst);
        debug!(peer = %self.peer, channel = %self.channel, "event source connected");
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
        self.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
        self.registry.fail_all("event source disconnected");
    }
}

impl Drop for GatewayEventSource {
    fn drop(&mut self) {
        if let Some(handle) = self
            .poller
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

/// Creates [`GatewayClient`] handles against one gateway endpoint.
#[derive(Clone, Debug)]
pub struct GatewayClientFactory {
    base_url: String,
    poll_interval: Duration,
}

impl GatewayClientFactory {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval: DEFAULT_GATEWAY_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl ClientFactory for GatewayClientFactory {
    async fn create_client(
        &self,
        identity: IdentityMaterial,
    ) -> Result<Arc<dyn FabricClient>, ClientError> {
        let client =
            GatewayClient::new(&self.base_url, identity)?.with_poll_interval(self.poll_interval);
        Ok(Arc::new(client))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
