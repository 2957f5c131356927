use fabric_bench_config::{
    NetworkConfig,
    network::{ChannelCreationDefinition, IdentityMaterial, TlsPosture},
};

use super::{
    ChannelTopology, ContractDetails, IdentityAlias, OrganizationPeers, TopologyError,
    TopologyProvider,
};

/// Topology backed by a loaded [`NetworkConfig`].
#[derive(Clone, Debug)]
pub struct NetworkTopology {
    config: NetworkConfig,
}

impl NetworkTopology {
    #[must_use]
    pub const fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl TopologyProvider for NetworkTopology {
    fn channels(&self) -> Vec<String> {
        self.config
            .channels
            .iter()
            .map(|channel| channel.name.clone())
            .collect()
    }

    fn channel(&self, name: &str) -> Option<ChannelTopology> {
        let channel = self.config.channel(name)?;

        let mut endorsing_peers = Vec::new();
        let mut event_sources = Vec::new();
        for msp_id in &channel.organizations {
            let Some(org) = self.config.organization(msp_id) else {
                continue;
            };
            let peers = org
                .peers
                .iter()
                .filter(|peer| peer.endorsing)
                .map(|peer| peer.name.clone())
                .collect::<Vec<_>>();
            if !peers.is_empty() {
                endorsing_peers.push(OrganizationPeers {
                    msp_id: msp_id.clone(),
                    peers,
                });
            }
            event_sources.extend(
                org.peers
                    .iter()
                    .filter(|peer| peer.event_source)
                    .map(|peer| peer.name.clone()),
            );
        }

        let orderers = if channel.orderers.is_empty() {
            self.config
                .orderers
                .iter()
                .map(|orderer| orderer.name.clone())
                .collect()
        } else {
            channel.orderers.clone()
        };

        Some(ChannelTopology {
            name: channel.name.clone(),
            endorsing_peers,
            orderers,
            event_sources,
        })
    }

    fn organizations(&self) -> Vec<String> {
        self.config
            .organizations
            .iter()
            .map(|org| org.msp_id.clone())
            .collect()
    }

    fn organization_peers(&self, msp_id: &str) -> Vec<String> {
        self.config
            .organization(msp_id)
            .map(|org| org.peers.iter().map(|peer| peer.name.clone()).collect())
            .unwrap_or_default()
    }

    fn alias_for(&self, msp_id: Option<&str>, identity: &str) -> String {
        match msp_id.or_else(|| self.config.default_msp_id()) {
            Some(msp_id) => self.config.alias_for(msp_id, identity),
            None => identity.to_owned(),
        }
    }

    fn aliases(&self) -> Vec<IdentityAlias> {
        self.config
            .organizations
            .iter()
            .flat_map(|org| {
                org.identities.iter().map(|identity| IdentityAlias {
                    alias: self.config.alias_for(&org.msp_id, &identity.name),
                    msp_id: org.msp_id.clone(),
                    identity: identity.name.clone(),
                })
            })
            .collect()
    }

    fn identity_material(&self, alias: &str) -> Result<IdentityMaterial, TopologyError> {
        for org in &self.config.organizations {
            for identity in &org.identities {
                if self.config.alias_for(&org.msp_id, &identity.name) == alias {
                    return identity
                        .load(alias.to_owned(), &org.msp_id)
                        .map_err(|source| TopologyError::Material {
                            alias: alias.to_owned(),
                            source,
                        });
                }
            }
        }
        Err(TopologyError::UnknownAlias(alias.to_owned()))
    }

    fn admin_alias(&self, msp_id: &str) -> Option<String> {
        let org = self.config.organization(msp_id)?;
        let admin = org.admin.as_ref()?;
        Some(self.config.alias_for(msp_id, admin))
    }

    fn default_invoker(&self) -> Option<IdentityAlias> {
        let org = self.config.organizations.first()?;
        let identity = org.identities.first()?;
        Some(IdentityAlias {
            alias: self.config.alias_for(&org.msp_id, &identity.name),
            msp_id: org.msp_id.clone(),
            identity: identity.name.clone(),
        })
    }

    fn contract(&self, contract_id: &str) -> Option<ContractDetails> {
        self.config.channels.iter().find_map(|channel| {
            channel
                .contracts
                .iter()
                .find(|contract| contract.contract_id() == contract_id)
                .map(|contract| ContractDetails {
                    channel: channel.name.clone(),
                    definition: contract.clone(),
                })
        })
    }

    fn contracts(&self, channel: &str) -> Vec<ContractDetails> {
        self.config
            .channel(channel)
            .map(|definition| {
                definition
                    .contracts
                    .iter()
                    .map(|contract| ContractDetails {
                        channel: definition.name.clone(),
                        definition: contract.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn channels_for_creation(&self) -> Vec<String> {
        self.config
            .channels_for_creation()
            .into_iter()
            .map(|channel| channel.name.clone())
            .collect()
    }

    fn channel_creation(&self, channel: &str) -> Option<ChannelCreationDefinition> {
        self.config.channel(channel)?.definition.clone()
    }

    fn tls_posture(&self) -> TlsPosture {
        self.config.tls.posture()
    }

    fn is_static(&self) -> bool {
        !self.config.discover
    }
}
