pub mod chaincode;
pub mod channel;
pub mod config_update;

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;
use tracing::debug;

pub use chaincode::ChaincodeOperations;
pub use channel::ChannelOperations;

use crate::{
    clients::ClientRegistry,
    network::{ClientError, ClientFactory, FabricClient},
    topology::{TopologyError, TopologyProvider},
    util::bullet_list,
};

/// Setup-phase failure. Never folded into a transaction status.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Independent causes collected from several peers or organizations.
    #[error("{context}:{}", bullet_list(.causes))]
    Aggregated {
        context: String,
        causes: Vec<String>,
    },
    #[error("Channel creation specified but no prebuiltTransaction or buildTransaction provided")]
    MissingChannelDefinition { channel: String },
    #[error(
        "Couldn't read configuration binary for {channel} at {}: {source}",
        path.display()
    )]
    ReadPrebuilt {
        channel: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No Organization admin for {0} has been declared in the network configuration")]
    NoAdmin(String),
    #[error("channel {0} is not part of the network topology")]
    UnknownChannel(String),
    #[error("could not find any organisations with peers for channel {0}")]
    NoEndorsingPeers(String),
    #[error("no orderer declared for channel {0}")]
    NoOrderer(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{context}: {source}")]
    Client {
        context: String,
        #[source]
        source: ClientError,
    },
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl LifecycleError {
    pub(crate) fn client(context: impl Into<String>, source: ClientError) -> Self {
        Self::Client {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn aggregated(context: impl Into<String>, causes: Vec<String>) -> Self {
        Self::Aggregated {
            context: context.into(),
            causes,
        }
    }
}

/// Organization admin handles, created on first use and reused after.
#[derive(Clone)]
pub struct AdminClients {
    topology: Arc<dyn TopologyProvider>,
    factory: Arc<dyn ClientFactory>,
    clients: ClientRegistry,
}

impl AdminClients {
    #[must_use]
    pub fn new(topology: Arc<dyn TopologyProvider>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            topology,
            factory,
            clients: ClientRegistry::new(),
        }
    }

    pub async fn for_organization(
        &self,
        msp_id: &str,
    ) -> Result<Arc<dyn FabricClient>, LifecycleError> {
        let alias = self
            .topology
            .admin_alias(msp_id)
            .ok_or_else(|| LifecycleError::NoAdmin(msp_id.to_owned()))?;

        if let Some(client) = self.clients.get(&alias) {
            return Ok(client);
        }

        let material = self.topology.identity_material(&alias)?;
        let client = self
            .factory
            .create_client(material)
            .await
            .map_err(|source| {
                LifecycleError::client(format!("Couldn't create admin client {alias}"), source)
            })?;
        debug!(alias, org = msp_id, "created admin client");
        self.clients.insert(alias, Arc::clone(&client));
        Ok(client)
    }

    /// Closes every admin handle created so far.
    pub async fn close(&self) {
        for client in self.clients.drain() {
            client.close().await;
        }
    }
}
