use std::{fs, sync::Arc, time::Duration};

use bytes::Bytes;
use fabric_bench_config::ConnectorSettings;
use tracing::{error, info};

use super::{AdminClients, LifecycleError, config_update::ConfigUpdate};
use crate::{
    network::{CreateChannelRequest, FabricClient, JoinChannelRequest},
    topology::{ChannelTopology, TopologyProvider},
    util::bullet_list,
};

/// Creates the channels flagged for creation and joins their peers.
pub struct ChannelOperations {
    topology: Arc<dyn TopologyProvider>,
    admins: AdminClients,
    settings: ConnectorSettings,
}

impl ChannelOperations {
    #[must_use]
    pub const fn new(
        topology: Arc<dyn TopologyProvider>,
        admins: AdminClients,
        settings: ConnectorSettings,
    ) -> Self {
        Self {
            topology,
            admins,
            settings,
        }
    }

    pub async fn create_and_join_channels(&self) -> Result<(), LifecycleError> {
        let created = self.create_channels().await?;
        if created == 0 {
            return Ok(());
        }

        settle("channel creation", self.settings.sleep_after_create_channel).await;
        self.join_created_channels().await?;
        settle("channel join", self.settings.sleep_after_join_channel).await;
        Ok(())
    }

    async fn create_channels(&self) -> Result<usize, LifecycleError> {
        let mut created = 0;

        for name in self.topology.channels_for_creation() {
            if self.settings.skips_channel_creation(&name) {
                info!(channel = %name, "channel creation is configured to skip");
                continue;
            }

            let channel = self.channel(&name)?;
            self.create_channel(&channel).await?;
            info!(channel = %name, "channel successfully created");
            created += 1;
        }

        Ok(created)
    }

    async fn create_channel(&self, channel: &ChannelTopology) -> Result<(), LifecycleError> {
        let organizations = channel.organizations();
        let Some(first_org) = organizations.first() else {
            return Err(LifecycleError::NoEndorsingPeers(channel.name.clone()));
        };
        let encoder = self.admins.for_organization(first_org).await?;
        let config = self.config_update(&channel.name, encoder.as_ref())?;

        // The system channel policy is not introspected; every member admin signs.
        let mut signatures = Vec::with_capacity(organizations.len());
        let mut admin = encoder;
        for org in organizations {
            admin = self.admins.for_organization(org).await?;
            let signature = admin.sign_channel_config(&config).map_err(|source| {
                LifecycleError::client(
                    format!(
                        "{org}'s admin couldn't sign the configuration update of Channel '{}'",
                        channel.name
                    ),
                    source,
                )
            })?;
            signatures.push(signature);
        }

        let orderer = first_orderer(channel)?;
        let request = CreateChannelRequest {
            tx_id: admin.new_tx_id(),
            channel: channel.name.clone(),
            orderer: orderer.to_owned(),
            config,
            signatures,
        };

        let response = admin.create_channel(&request).await.map_err(|source| {
            LifecycleError::client(format!("Couldn't create Channel '{}'", channel.name), source)
        })?;
        if !response.is_success() {
            return Err(LifecycleError::Rejected(format!(
                "Couldn't create Channel '{}': Orderer response indicated unsuccessful creation: {}",
                channel.name, response.status
            )));
        }

        Ok(())
    }

    fn config_update(
        &self,
        channel: &str,
        client: &dyn FabricClient,
    ) -> Result<Bytes, LifecycleError> {
        let definition = self.topology.channel_creation(channel).unwrap_or_default();

        if let Some(path) = definition.prebuilt_transaction {
            info!(channel, path = %path.display(), "channel definition being retrieved from file");
            let envelope = fs::read(&path).map_err(|source| LifecycleError::ReadPrebuilt {
                channel: channel.to_owned(),
                path: path.clone(),
                source,
            })?;
            return client.extract_channel_config(&envelope).map_err(|source| {
                LifecycleError::client(
                    format!("Couldn't extract configuration object for {channel}"),
                    source,
                )
            });
        }

        if let Some(description) = definition.build_transaction {
            info!(channel, "channel definition being generated from description");
            let update = ConfigUpdate::from_description(channel, &description);
            return client.encode_config_update(&update).map_err(|source| {
                LifecycleError::client(
                    format!("Couldn't encode configuration update for {channel}"),
                    source,
                )
            });
        }

        Err(LifecycleError::MissingChannelDefinition {
            channel: channel.to_owned(),
        })
    }

    async fn join_created_channels(&self) -> Result<(), LifecycleError> {
        for name in self.topology.channels_for_creation() {
            let channel = self.channel(&name)?;
            self.join_channel(&channel).await?;
        }
        Ok(())
    }

    async fn join_channel(&self, channel: &ChannelTopology) -> Result<(), LifecycleError> {
        let mut genesis_block: Option<Bytes> = None;
        let mut join_errors = Vec::new();

        for org in &channel.endorsing_peers {
            let admin = self.admins.for_organization(&org.msp_id).await?;

            let mut pending = Vec::new();
            let mut query_errors = Vec::new();
            for peer in &org.peers {
                match admin.query_channels(peer).await {
                    Ok(channels) if channels.iter().any(|joined| *joined == channel.name) => {
                        info!(peer, channel = %channel.name, "peer has already joined channel");
                    }
                    Ok(_) => pending.push(peer.clone()),
                    Err(err) => query_errors.push(format!(
                        "Couldn't query {} information from {peer}: {err}",
                        channel.name
                    )),
                }
            }

            if !query_errors.is_empty() {
                return Err(LifecycleError::aggregated(
                    format!(
                        "Couldn't query {} information from {}'s peers",
                        channel.name, org.msp_id
                    ),
                    query_errors,
                ));
            }

            if pending.is_empty() {
                continue;
            }

            let block = match &genesis_block {
                Some(block) => block.clone(),
                None => {
                    let orderer = first_orderer(channel)?;
                    let block = admin
                        .genesis_block(&channel.name, orderer)
                        .await
                        .map_err(|source| {
                            LifecycleError::client(
                                format!("Couldn't retrieve the genesis block for {}", channel.name),
                                source,
                            )
                        })?;
                    genesis_block = Some(block.clone());
                    block
                }
            };

            let request = JoinChannelRequest {
                tx_id: admin.new_tx_id(),
                channel: channel.name.clone(),
                genesis_block: block,
                targets: pending.clone(),
            };

            let org_errors = match admin.join_channel(&request).await {
                Ok(responses) => pending
                    .iter()
                    .zip(responses)
                    .filter_map(|(peer, response)| match response {
                        Ok(status) if status.is_success() => None,
                        Ok(status) => Some(format!(
                            "{peer} could not join {}: {}",
                            channel.name, status.message
                        )),
                        Err(err) => Some(format!("{peer} could not join {}: {err}", channel.name)),
                    })
                    .collect::<Vec<_>>(),
                Err(err) => vec![format!(
                    "Couldn't join peers {} to {}: {err}",
                    pending.join(","),
                    channel.name
                )],
            };

            if org_errors.is_empty() {
                info!(org = %org.msp_id, channel = %channel.name, peers = ?pending, "peers successfully joined channel");
            } else {
                error!(
                    "The following errors occurred while {}'s peers tried to join {}:{}",
                    org.msp_id,
                    channel.name,
                    bullet_list(&org_errors)
                );
                join_errors.extend(org_errors);
            }
        }

        if join_errors.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::aggregated(
                format!("Peers couldn't join {}", channel.name),
                join_errors,
            ))
        }
    }

    fn channel(&self, name: &str) -> Result<ChannelTopology, LifecycleError> {
        self.topology
            .channel(name)
            .ok_or_else(|| LifecycleError::UnknownChannel(name.to_owned()))
    }
}

pub(crate) fn first_orderer(channel: &ChannelTopology) -> Result<&str, LifecycleError> {
    channel
        .orderers
        .first()
        .map(String::as_str)
        .ok_or_else(|| LifecycleError::NoOrderer(channel.name.clone()))
}

pub(crate) async fn settle(step: &str, delay: Duration) {
    if delay.is_zero() {
        return;
    }
    info!(step, delay_ms = delay.as_millis() as u64, "sleeping after setup step");
    tokio::time::sleep(delay).await;
}
