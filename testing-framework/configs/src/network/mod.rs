pub mod identity;
pub mod invariants;

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use identity::{IdentityDefinition, IdentityMaterial, PemSource};
pub use invariants::{NetworkConfigError, validate_network};

use crate::settings::ConnectorSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Invalid(#[from] NetworkConfigError),
}

/// Static description of the network under test.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub name: String,
    /// Base URL of the REST gateway fronting the network.
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub tls: TlsSettings,
    /// Topology discovery is not supported; only a static topology is.
    #[serde(default)]
    pub discover: bool,
    #[serde(default)]
    pub fabric: ConnectorSettings,
    pub organizations: Vec<OrganizationDefinition>,
    #[serde(default)]
    pub orderers: Vec<OrdererDefinition>,
    #[serde(default)]
    pub channels: Vec<ChannelDefinition>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mutual: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsPosture {
    Mutual,
    Server,
    None,
}

impl TlsPosture {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mutual => "mutual",
            Self::Server => "server",
            Self::None => "none",
        }
    }
}

impl TlsSettings {
    #[must_use]
    pub const fn posture(self) -> TlsPosture {
        match (self.enabled, self.mutual) {
            (_, true) => TlsPosture::Mutual,
            (true, false) => TlsPosture::Server,
            (false, false) => TlsPosture::None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrganizationDefinition {
    pub msp_id: String,
    /// Identity name used for administrative operations.
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default)]
    pub identities: Vec<IdentityDefinition>,
    #[serde(default)]
    pub peers: Vec<PeerDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerDefinition {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "enabled")]
    pub endorsing: bool,
    #[serde(default = "enabled")]
    pub event_source: bool,
}

const fn enabled() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrdererDefinition {
    pub name: String,
    #[serde(default)]
    pub msp_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    #[serde(default)]
    pub create: bool,
    /// Member organizations; every peer of a member joins the channel.
    pub organizations: Vec<String>,
    /// Orderers serving the channel, all declared orderers when empty.
    #[serde(default)]
    pub orderers: Vec<String>,
    #[serde(default)]
    pub definition: Option<ChannelCreationDefinition>,
    #[serde(default)]
    pub contracts: Vec<ContractDefinition>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelCreationDefinition {
    #[serde(default)]
    pub prebuilt_transaction: Option<PathBuf>,
    #[serde(default)]
    pub build_transaction: Option<ChannelBuildDescription>,
}

/// Declarative description a channel configuration update is synthesized from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelBuildDescription {
    pub consortium: String,
    pub msps: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractLanguage {
    #[default]
    Golang,
    Node,
    Java,
}

impl ContractLanguage {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Golang => "golang",
            Self::Node => "node",
            Self::Java => "java",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractDefinition {
    /// Chaincode name on the ledger.
    pub id: String,
    /// Name requests use to refer to the contract, `id` when absent.
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub language: ContractLanguage,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,
    #[serde(default)]
    pub install: bool,
    #[serde(default)]
    pub upgrade: bool,
    #[serde(default)]
    pub init_function: Option<String>,
    #[serde(default)]
    pub init_arguments: Vec<String>,
    #[serde(default)]
    pub init_transient_map: BTreeMap<String, String>,
    #[serde(default)]
    pub endorsement_policy: Option<Value>,
    #[serde(default)]
    pub collections_config: Option<Value>,
}

impl ContractDefinition {
    #[must_use]
    pub fn contract_id(&self) -> &str {
        self.contract_id.as_deref().unwrap_or(&self.id)
    }
}

impl NetworkConfig {
    /// Loads, resolves relative paths against the file location and validates.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        validate_network(&config)?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        for org in &mut self.organizations {
            for identity in &mut org.identities {
                identity.certificate.resolve_against(base);
                identity.private_key.resolve_against(base);
            }
        }
        for channel in &mut self.channels {
            if let Some(prebuilt) = channel
                .definition
                .as_mut()
                .and_then(|definition| definition.prebuilt_transaction.as_mut())
            {
                resolve(prebuilt);
            }
            for contract in &mut channel.contracts {
                // Go chaincode paths are import paths, not filesystem paths.
                if contract.language != ContractLanguage::Golang {
                    if let Some(path) = contract.path.as_mut() {
                        resolve(path);
                    }
                }
                if let Some(path) = contract.metadata_path.as_mut() {
                    resolve(path);
                }
            }
        }
    }

    /// The first declared organization is the default one.
    #[must_use]
    pub fn default_msp_id(&self) -> Option<&str> {
        self.organizations.first().map(|org| org.msp_id.as_str())
    }

    #[must_use]
    pub fn organization(&self, msp_id: &str) -> Option<&OrganizationDefinition> {
        self.organizations.iter().find(|org| org.msp_id == msp_id)
    }

    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelDefinition> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Identities of the default organization keep their name; all others are
    /// prefixed with `_{msp_id}_`.
    #[must_use]
    pub fn alias_for(&self, msp_id: &str, identity: &str) -> String {
        identity::alias_for(self.default_msp_id(), msp_id, identity)
    }

    #[must_use]
    pub fn channels_for_creation(&self) -> Vec<&ChannelDefinition> {
        self.channels.iter().filter(|channel| channel.create).collect()
    }
}
