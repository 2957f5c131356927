use std::sync::Arc;

use bytes::Bytes;
use fabric_bench_config::{ConnectorSettings, constants::DEFAULT_INIT_FUNCTION};
use tracing::{error, info};

use super::{
    AdminClients, LifecycleError,
    channel::{first_orderer, settle},
};
use crate::{
    clock::Clock,
    engine::commit::{self, CommitEvent},
    network::{
        EventSource, FabricClient, InstallRequest, InstantiateRequest, TransactionEnvelope, TxId,
    },
    topology::{ChannelTopology, ContractDetails, OrganizationPeers, TopologyProvider},
    util::bullet_list,
};

/// Installs and instantiates every contract flagged for install.
pub struct ChaincodeOperations {
    topology: Arc<dyn TopologyProvider>,
    admins: AdminClients,
    settings: ConnectorSettings,
    clock: Arc<dyn Clock>,
}

impl ChaincodeOperations {
    #[must_use]
    pub fn new(
        topology: Arc<dyn TopologyProvider>,
        admins: AdminClients,
        settings: ConnectorSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            topology,
            admins,
            settings,
            clock,
        }
    }

    pub async fn install_and_instantiate_all(&self) -> Result<(), LifecycleError> {
        self.install_contracts().await?;
        let instantiated = self.instantiate_contracts().await?;
        if instantiated > 0 {
            settle("contract instantiation", self.settings.sleep_after_instantiate).await;
        }
        Ok(())
    }

    async fn install_contracts(&self) -> Result<(), LifecycleError> {
        for name in self.topology.channels() {
            let channel = self.channel(&name)?;
            info!(channel = %name, "installing contracts");

            for contract in self.topology.contracts(&name) {
                if contract.definition.install {
                    self.install_contract(&channel, &contract).await?;
                }
            }
        }
        Ok(())
    }

    async fn install_contract(
        &self,
        channel: &ChannelTopology,
        contract: &ContractDetails,
    ) -> Result<(), LifecycleError> {
        let label = contract_label(contract);
        let mut install_errors = Vec::new();

        for org in &channel.endorsing_peers {
            let admin = self.admins.for_organization(&org.msp_id).await?;
            let targets = self.peers_missing(admin.as_ref(), org, contract, channel).await?;

            if targets.is_empty() {
                info!(contract = %label, org = %org.msp_id, channel = %channel.name, "no peers need the contract installed, skipping");
                continue;
            }

            let org_errors = install_on(admin.as_ref(), contract, &targets).await;
            if org_errors.is_empty() {
                info!(contract = %label, org = %org.msp_id, peers = ?targets, "contract successfully installed");
            }
            install_errors.extend(org_errors);
        }

        if install_errors.is_empty() {
            return Ok(());
        }

        let err = LifecycleError::aggregated(
            format!("Could not install {label} on some peers of {}", channel.name),
            install_errors,
        );
        error!("{err}");
        Err(err)
    }

    /// Peers of `org` that do not report the contract version as installed.
    async fn peers_missing(
        &self,
        admin: &dyn FabricClient,
        org: &OrganizationPeers,
        contract: &ContractDetails,
        channel: &ChannelTopology,
    ) -> Result<Vec<String>, LifecycleError> {
        let definition = &contract.definition;
        let mut missing = Vec::new();
        let mut query_errors = Vec::new();

        for peer in &org.peers {
            match admin.query_installed_chaincodes(peer).await {
                Ok(installed)
                    if installed.iter().any(|info| {
                        info.name == definition.id && info.version == definition.version
                    }) =>
                {
                    info!(peer, contract = %contract_label(contract), "contract already installed");
                }
                Ok(_) => missing.push(peer.clone()),
                Err(err) => query_errors.push(format!(
                    "Couldn't query installed contracts on {peer}: {err}"
                )),
            }
        }

        if query_errors.is_empty() {
            Ok(missing)
        } else {
            Err(LifecycleError::aggregated(
                format!(
                    "Could not query whether {} is installed on some peers of {}",
                    contract_label(contract),
                    channel.name
                ),
                query_errors,
            ))
        }
    }

    async fn instantiate_contracts(&self) -> Result<usize, LifecycleError> {
        let mut instantiated = 0;

        for name in self.topology.channels() {
            let channel = self.channel(&name)?;
            for contract in self.topology.contracts(&name) {
                if !contract.definition.install {
                    continue;
                }
                info!(contract = %contract_label(&contract), channel = %name, "instantiating contract, this might take some time");
                if self.instantiate_contract(&channel, &contract).await? {
                    instantiated += 1;
                }
            }
        }

        Ok(instantiated)
    }

    /// Returns `false` when the contract version was already instantiated.
    async fn instantiate_contract(
        &self,
        channel: &ChannelTopology,
        contract: &ContractDetails,
    ) -> Result<bool, LifecycleError> {
        let label = contract_label(contract);
        let definition = &contract.definition;

        let Some((main_org, probe)) = channel
            .endorsing_peers
            .first()
            .and_then(|org| org.peers.first().map(|peer| (org, peer)))
        else {
            return Err(LifecycleError::NoEndorsingPeers(channel.name.clone()));
        };
        let admin = self.admins.for_organization(&main_org.msp_id).await?;
        let targets = channel.all_endorsing_peers();

        let instantiated = admin
            .query_instantiated_chaincodes(&channel.name, probe)
            .await
            .map_err(|source| {
                LifecycleError::client(
                    format!("Couldn't query whether {label} is instantiated on {probe}"),
                    source,
                )
            })?;
        if instantiated
            .iter()
            .any(|info| info.name == definition.id && info.version == definition.version)
        {
            info!(contract = %label, channel = %channel.name, "contract already instantiated");
            return Ok(false);
        }

        let request = InstantiateRequest {
            tx_id: admin.new_tx_id(),
            chaincode_id: definition.id.clone(),
            version: definition.version.clone(),
            language: definition.language,
            function: definition
                .init_function
                .clone()
                .unwrap_or_else(|| DEFAULT_INIT_FUNCTION.to_owned()),
            arguments: definition.init_arguments.clone(),
            transient_map: definition
                .init_transient_map
                .iter()
                .map(|(key, value)| (key.clone(), Bytes::from(value.clone().into_bytes())))
                .collect(),
            endorsement_policy: definition.endorsement_policy.clone(),
            collections_config: definition.collections_config.clone(),
            targets: targets.clone(),
            upgrade: definition.upgrade,
        };

        let proposal = admin
            .send_instantiate_proposal(
                &channel.name,
                &request,
                self.settings.instantiate_proposal_timeout,
            )
            .await
            .map_err(|source| {
                LifecycleError::client(
                    format!(
                        "Couldn't endorse {label} in {} on peers [{}]",
                        channel.name,
                        targets.join(",")
                    ),
                    source,
                )
            })?;

        if proposal.responses.len() != targets.len() {
            return Err(LifecycleError::Rejected(format!(
                "Received {} endorsements for {label} in {} from {} targets",
                proposal.responses.len(),
                channel.name,
                targets.len()
            )));
        }

        let mut endorsements = Vec::with_capacity(proposal.responses.len());
        for (peer, response) in targets.iter().zip(proposal.responses) {
            match response {
                Ok(endorsement) if endorsement.is_success() => endorsements.push(endorsement),
                Ok(endorsement) => {
                    return Err(LifecycleError::Rejected(format!(
                        "Invalid endorsement for {label} in {} from {peer}: status code {}",
                        channel.name, endorsement.status
                    )));
                }
                Err(err) => {
                    return Err(LifecycleError::Rejected(format!(
                        "Invalid endorsement for {label} in {} from {peer}: {err}",
                        channel.name
                    )));
                }
            }
        }

        let sources: Vec<Arc<dyn EventSource>> = channel
            .event_sources
            .iter()
            .map(|peer| admin.event_source(&channel.name, peer))
            .collect();

        let envelope = TransactionEnvelope {
            tx_id: request.tx_id.clone(),
            proposal: proposal.proposal,
            endorsements,
        };
        let outcome = self
            .commit_instantiation(admin.as_ref(), channel, &sources, &envelope, &label)
            .await;

        for source in &sources {
            if source.is_connected() {
                source.disconnect();
            }
        }

        outcome?;
        info!(contract = %label, channel = %channel.name, "contract successfully instantiated");
        Ok(true)
    }

    async fn commit_instantiation(
        &self,
        admin: &dyn FabricClient,
        channel: &ChannelTopology,
        sources: &[Arc<dyn EventSource>],
        envelope: &TransactionEnvelope,
        label: &str,
    ) -> Result<(), LifecycleError> {
        let mut connect_errors = Vec::new();
        for source in sources {
            if let Err(err) = source.connect().await {
                connect_errors.push(format!(
                    "Event hub error from {} during instantiating {label} in {}: {err}",
                    source.peer(),
                    channel.name
                ));
            }
        }
        if !connect_errors.is_empty() {
            return Err(LifecycleError::aggregated(
                format!("The following errors occurred while instantiating {label} in {}", channel.name),
                connect_errors,
            ));
        }

        let pending = commit::register_all(
            sources,
            &envelope.tx_id,
            self.settings.instantiate_event_timeout,
            &self.clock,
        );

        let orderer = first_orderer(channel)?;
        let response = admin
            .broadcast(&channel.name, orderer, envelope)
            .await
            .map_err(|source| {
                LifecycleError::client(
                    format!("Orderer error for instantiating {label} in {}", channel.name),
                    source,
                )
            })?;
        if !response.is_success() {
            return Err(LifecycleError::Rejected(format!(
                "Orderer error for instantiating {label} in {}: {}",
                channel.name, response.status
            )));
        }

        let failures = instantiation_failures(&envelope.tx_id, &commit::await_all(pending).await);
        if failures.is_empty() {
            return Ok(());
        }

        error!(
            "The following errors occurred while instantiating {label} in {}:{}",
            channel.name,
            bullet_list(&failures)
        );
        Err(LifecycleError::aggregated(
            format!("Couldn't instantiate {label} in {}", channel.name),
            failures,
        ))
    }

    fn channel(&self, name: &str) -> Result<ChannelTopology, LifecycleError> {
        self.topology
            .channel(name)
            .ok_or_else(|| LifecycleError::UnknownChannel(name.to_owned()))
    }
}

async fn install_on(
    admin: &dyn FabricClient,
    contract: &ContractDetails,
    targets: &[String],
) -> Vec<String> {
    let definition = &contract.definition;
    let label = contract_label(contract);
    let request = InstallRequest {
        tx_id: admin.new_tx_id(),
        chaincode_id: definition.id.clone(),
        version: definition.version.clone(),
        language: definition.language,
        path: definition.path.clone(),
        metadata_path: definition.metadata_path.clone(),
        targets: targets.to_vec(),
    };

    match admin.install_chaincode(&request).await {
        Ok(responses) => targets
            .iter()
            .zip(responses)
            .filter_map(|(peer, response)| match response {
                Ok(status) if status.is_success() => None,
                Ok(status) => Some(format!(
                    "Unsuccessful install status for {label} on {peer}: {}",
                    status.message
                )),
                Err(err) => Some(format!("Install proposal error for {label} on {peer}: {err}")),
            })
            .collect(),
        Err(err) => vec![format!(
            "Couldn't install {label} on peers {}: {err}",
            targets.join(",")
        )],
    }
}

fn instantiation_failures(tx_id: &TxId, events: &[CommitEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|event| !event.disposition.is_valid())
        .map(|event| event.describe(tx_id))
        .collect()
}

fn contract_label(contract: &ContractDetails) -> String {
    format!("{}@{}", contract.definition.id, contract.definition.version)
}
