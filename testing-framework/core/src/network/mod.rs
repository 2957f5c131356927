pub mod events;
pub mod gateway;
pub mod types;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use fabric_bench_config::network::IdentityMaterial;
use thiserror::Error;

pub use events::{CommitNotice, CommitSignal, EventSource, TxEventRegistry};
pub use types::*;

use crate::lifecycle::config_update::ConfigUpdate;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("failed to decode gateway response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("TIMEOUT")]
    Timeout(Duration),
    #[error("{0}")]
    Rejected(String),
    #[error("event source for {peer} on {channel} is not connected")]
    Disconnected { peer: String, channel: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid gateway url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Issues proposals, queries and broadcasts for one signing identity.
#[async_trait]
pub trait TransactionClient: Send + Sync {
    /// Wallet alias the handle signs with.
    fn alias(&self) -> &str;

    fn msp_id(&self) -> &str;

    fn new_tx_id(&self) -> TxId {
        TxId::random()
    }

    /// Sends one proposal to all of `request.targets` in a single batch.
    async fn send_proposal(
        &self,
        channel: &str,
        request: &ProposalRequest,
        timeout: Duration,
    ) -> Result<ProposalResponses, ClientError>;

    /// Read-only proposal; payloads are aligned with `request.targets`.
    async fn query(
        &self,
        channel: &str,
        request: &ProposalRequest,
    ) -> Result<Vec<Result<Bytes, PeerError>>, ClientError>;

    /// Checks the endorser's signature and identity.
    fn verify_endorsement(&self, channel: &str, endorsement: &Endorsement) -> bool;

    async fn broadcast(
        &self,
        channel: &str,
        orderer: &str,
        envelope: &TransactionEnvelope,
    ) -> Result<BroadcastResponse, ClientError>;

    /// New, unconnected commit notification source for `peer`.
    fn event_source(&self, channel: &str, peer: &str) -> Arc<dyn EventSource>;

    async fn close(&self);
}

/// Administrative operations used while setting up channels and chaincode.
#[async_trait]
pub trait LifecycleClient: Send + Sync {
    /// Pulls the configuration update out of a prebuilt channel transaction.
    fn extract_channel_config(&self, envelope: &[u8]) -> Result<Bytes, ClientError>;

    fn encode_config_update(&self, update: &ConfigUpdate) -> Result<Bytes, ClientError>;

    fn sign_channel_config(&self, config: &[u8]) -> Result<ConfigSignature, ClientError>;

    async fn create_channel(
        &self,
        request: &CreateChannelRequest,
    ) -> Result<BroadcastResponse, ClientError>;

    /// Channels `peer` is a member of.
    async fn query_channels(&self, peer: &str) -> Result<Vec<String>, ClientError>;

    async fn genesis_block(&self, channel: &str, orderer: &str) -> Result<Bytes, ClientError>;

    async fn join_channel(
        &self,
        request: &JoinChannelRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError>;

    async fn query_installed_chaincodes(
        &self,
        peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError>;

    async fn install_chaincode(
        &self,
        request: &InstallRequest,
    ) -> Result<Vec<Result<PeerStatus, PeerError>>, ClientError>;

    async fn query_instantiated_chaincodes(
        &self,
        channel: &str,
        peer: &str,
    ) -> Result<Vec<ChaincodeInfo>, ClientError>;

    async fn send_instantiate_proposal(
        &self,
        channel: &str,
        request: &InstantiateRequest,
        timeout: Duration,
    ) -> Result<ProposalResponses, ClientError>;
}

/// Client handle: everything the connector needs from one identity.
pub trait FabricClient: TransactionClient + LifecycleClient {}

impl<T> FabricClient for T where T: TransactionClient + LifecycleClient {}

/// Creates client handles from exported identity material.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create_client(
        &self,
        identity: IdentityMaterial,
    ) -> Result<Arc<dyn FabricClient>, ClientError>;
}
