pub mod network;

use fabric_bench_config::network::{
    ChannelCreationDefinition, ContractDefinition, IdentityMaterial, TlsPosture,
};
use thiserror::Error;

pub use network::NetworkTopology;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("no identity registered under alias {0}")]
    UnknownAlias(String),
    #[error("failed to load identity material for {alias}: {source}")]
    Material {
        alias: String,
        #[source]
        source: std::io::Error,
    },
}

/// Endorsing peers of one organization, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrganizationPeers {
    pub msp_id: String,
    pub peers: Vec<String>,
}

/// Read-only view of one channel, cached per connector context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelTopology {
    pub name: String,
    pub endorsing_peers: Vec<OrganizationPeers>,
    pub orderers: Vec<String>,
    pub event_sources: Vec<String>,
}

impl ChannelTopology {
    #[must_use]
    pub fn organizations(&self) -> Vec<&str> {
        self.endorsing_peers
            .iter()
            .map(|org| org.msp_id.as_str())
            .collect()
    }

    #[must_use]
    pub fn endorsing_peers_of(&self, msp_id: &str) -> &[String] {
        self.endorsing_peers
            .iter()
            .find(|org| org.msp_id == msp_id)
            .map(|org| org.peers.as_slice())
            .unwrap_or_default()
    }

    /// Every endorsing peer of the channel, organization by organization.
    #[must_use]
    pub fn all_endorsing_peers(&self) -> Vec<String> {
        self.endorsing_peers
            .iter()
            .flat_map(|org| org.peers.iter().cloned())
            .collect()
    }
}

/// Wallet alias of one declared identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityAlias {
    pub alias: String,
    pub msp_id: String,
    pub identity: String,
}

/// Static contract metadata together with its owning channel.
#[derive(Clone, Debug)]
pub struct ContractDetails {
    pub channel: String,
    pub definition: ContractDefinition,
}

impl ContractDetails {
    #[must_use]
    pub fn chaincode_id(&self) -> &str {
        &self.definition.id
    }
}

/// Network layout the engine consumes; populated once and read-only after.
pub trait TopologyProvider: Send + Sync {
    fn channels(&self) -> Vec<String>;

    fn channel(&self, name: &str) -> Option<ChannelTopology>;

    fn organizations(&self) -> Vec<String>;

    /// All peers of an organization, endorsing or not.
    fn organization_peers(&self, msp_id: &str) -> Vec<String>;

    fn alias_for(&self, msp_id: Option<&str>, identity: &str) -> String;

    fn aliases(&self) -> Vec<IdentityAlias>;

    fn identity_material(&self, alias: &str) -> Result<IdentityMaterial, TopologyError>;

    fn admin_alias(&self, msp_id: &str) -> Option<String>;

    fn default_invoker(&self) -> Option<IdentityAlias>;

    fn contract(&self, contract_id: &str) -> Option<ContractDetails>;

    fn contracts(&self, channel: &str) -> Vec<ContractDetails>;

    fn channels_for_creation(&self) -> Vec<String>;

    fn channel_creation(&self, channel: &str) -> Option<ChannelCreationDefinition>;

    fn tls_posture(&self) -> TlsPosture;

    /// `false` when the topology would have to be discovered at runtime.
    fn is_static(&self) -> bool;
}
