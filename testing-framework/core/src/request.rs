use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DurationSecondsWithFrac, serde_as};
use tracing::warn;

/// Request issued by a workload, before it is checked against the topology.
#[serde_as]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricRequest {
    pub contract_id: Option<String>,
    pub contract_function: Option<String>,
    pub contract_arguments: Option<Vec<String>>,
    /// Resolved from the contract registration when absent.
    pub channel: Option<String>,
    pub invoker_identity: Option<String>,
    pub invoker_msp_id: Option<String>,
    pub transient_map: BTreeMap<String, String>,
    /// Loosely typed on purpose; see [`TargetingStrategy::from_request`].
    pub target_peers: Option<Value>,
    pub target_organizations: Option<Value>,
    pub orderer: Option<String>,
    pub read_only: bool,
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub timeout: Option<Duration>,
}

impl FabricRequest {
    #[must_use]
    pub fn invoke(contract_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            contract_id: Some(contract_id.into()),
            contract_function: Some(function.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn query(contract_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            read_only: true,
            ..Self::invoke(contract_id, function)
        }
    }

    #[must_use]
    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contract_arguments = Some(arguments.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_invoker(mut self, identity: impl Into<String>, msp_id: Option<String>) -> Self {
        self.invoker_identity = Some(identity.into());
        self.invoker_msp_id = msp_id;
        self
    }

    #[must_use]
    pub fn with_target_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers = peers.into_iter().map(|p| Value::String(p.into())).collect();
        self.target_peers = Some(Value::Array(peers));
        self
    }

    #[must_use]
    pub fn with_target_organizations<I, S>(mut self, orgs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let orgs = orgs.into_iter().map(|o| Value::String(o.into())).collect();
        self.target_organizations = Some(Value::Array(orgs));
        self
    }

    #[must_use]
    pub fn with_transient(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transient_map.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_orderer(mut self, orderer: impl Into<String>) -> Self {
        self.orderer = Some(orderer.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How the endorsing peers of one request are chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetingStrategy {
    /// One load-balanced peer per organization of the channel.
    Automatic,
    ExplicitPeers(Vec<String>),
    /// Every endorsing peer of the listed organizations.
    ExplicitOrganizations(Vec<String>),
}

impl TargetingStrategy {
    /// Explicit peers win over organizations. A value that is not a populated
    /// list of names is ignored with a warning and never consults the next
    /// option.
    #[must_use]
    pub fn from_request(target_peers: Option<&Value>, target_orgs: Option<&Value>) -> Self {
        if let Some(value) = target_peers.filter(|v| !v.is_null()) {
            return match populated_list(value) {
                Some(peers) => Self::ExplicitPeers(peers),
                None => {
                    warn!(targets = %value, "target peers is not a populated list, no peers targeted");
                    Self::Automatic
                }
            };
        }
        if let Some(value) = target_orgs.filter(|v| !v.is_null()) {
            return match populated_list(value) {
                Some(orgs) => Self::ExplicitOrganizations(orgs),
                None => {
                    warn!(targets = %value, "target organizations is not a populated list, no organizations targeted");
                    Self::Automatic
                }
            };
        }
        Self::Automatic
    }
}

fn populated_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array().filter(|items| !items.is_empty())?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_owned))
        .collect()
}

/// Request after contract, channel and invoker resolution.
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    pub channel: String,
    pub chaincode_id: String,
    pub function: String,
    pub arguments: Vec<String>,
    pub transient_map: BTreeMap<String, Bytes>,
    pub invoker_alias: String,
    pub invoker_identity: String,
    pub invoker_msp_id: Option<String>,
    pub targeting: TargetingStrategy,
    pub orderer: Option<String>,
    pub read_only: bool,
    pub timeout: Duration,
}
