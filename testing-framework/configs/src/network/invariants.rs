use std::collections::HashSet;

use thiserror::Error;

use super::NetworkConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkConfigError {
    #[error("at least one organization must be declared")]
    NoOrganizations,
    #[error("no mspid has been defined for the first organization")]
    MissingDefaultMspId,
    #[error("organization {0} is declared more than once")]
    DuplicateOrganization(String),
    #[error("channel {0} is declared more than once")]
    DuplicateChannel(String),
    #[error("channel {channel} references unknown organization {msp_id}")]
    UnknownChannelMember { channel: String, msp_id: String },
    #[error("channel {channel} references unknown orderer {orderer}")]
    UnknownChannelOrderer { channel: String, orderer: String },
    #[error("contract id {0} is declared more than once")]
    DuplicateContract(String),
    #[error("organization {msp_id} admin {admin} is not one of its identities")]
    UnknownAdmin { msp_id: String, admin: String },
}

/// Validate the cross references of a loaded network description.
pub fn validate_network(config: &NetworkConfig) -> Result<(), NetworkConfigError> {
    let first = config
        .organizations
        .first()
        .ok_or(NetworkConfigError::NoOrganizations)?;
    if first.msp_id.is_empty() {
        return Err(NetworkConfigError::MissingDefaultMspId);
    }

    let mut orgs = HashSet::new();
    for org in &config.organizations {
        if !orgs.insert(org.msp_id.as_str()) {
            return Err(NetworkConfigError::DuplicateOrganization(org.msp_id.clone()));
        }
        if let Some(admin) = &org.admin {
            if !org.identities.iter().any(|identity| &identity.name == admin) {
                return Err(NetworkConfigError::UnknownAdmin {
                    msp_id: org.msp_id.clone(),
                    admin: admin.clone(),
                });
            }
        }
    }

    let orderers: HashSet<&str> = config.orderers.iter().map(|o| o.name.as_str()).collect();
    let mut channels = HashSet::new();
    let mut contracts = HashSet::new();
    for channel in &config.channels {
        if !channels.insert(channel.name.as_str()) {
            return Err(NetworkConfigError::DuplicateChannel(channel.name.clone()));
        }
        if let Some(msp_id) = channel
            .organizations
            .iter()
            .find(|msp_id| !orgs.contains(msp_id.as_str()))
        {
            return Err(NetworkConfigError::UnknownChannelMember {
                channel: channel.name.clone(),
                msp_id: msp_id.clone(),
            });
        }
        if let Some(orderer) = channel
            .orderers
            .iter()
            .find(|orderer| !orderers.contains(orderer.as_str()))
        {
            return Err(NetworkConfigError::UnknownChannelOrderer {
                channel: channel.name.clone(),
                orderer: orderer.clone(),
            });
        }
        for contract in &channel.contracts {
            if !contracts.insert(contract.contract_id().to_owned()) {
                return Err(NetworkConfigError::DuplicateContract(
                    contract.contract_id().to_owned(),
                ));
            }
        }
    }

    Ok(())
}
