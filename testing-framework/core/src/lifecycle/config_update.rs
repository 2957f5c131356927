//! Typed channel configuration updates synthesized from a build description.

use std::collections::BTreeMap;

use fabric_bench_config::network::ChannelBuildDescription;
use serde::{Deserialize, Serialize};

const READ_VERSION: u64 = 0;
const WRITE_VERSION: u64 = 0;
const APPLICATION_VERSION: u64 = 1;
const POLICY_VERSION: u64 = 0;

pub const ADMINS_POLICY: &str = "Admins";
pub const READERS_POLICY: &str = "Readers";
pub const WRITERS_POLICY: &str = "Writers";
pub const APPLICATION_GROUP: &str = "Application";
pub const CONSORTIUM_VALUE: &str = "Consortium";
pub const CAPABILITIES_VALUE: &str = "Capabilities";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub channel_id: String,
    /// Version carried by the channel header of the enclosing envelope.
    pub header_version: u64,
    pub read_set: ConfigGroup,
    pub write_set: ConfigGroup,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, ConfigGroup>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, ConfigValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub policies: BTreeMap<String, ConfigPolicy>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mod_policy: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub version: u64,
    pub value: ConfigValueBody,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mod_policy: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigValueBody {
    /// Placeholder used in read sets.
    #[default]
    Empty,
    Consortium {
        name: String,
    },
    Capabilities {
        capabilities: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPolicy {
    pub version: u64,
    pub policy: ImplicitMetaPolicy,
    pub mod_policy: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitMetaPolicy {
    pub sub_policy: String,
    pub rule: ImplicitMetaRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImplicitMetaRule {
    Any,
    All,
    Majority,
}

impl ConfigUpdate {
    /// Builds the update creating `channel` for the described consortium members.
    #[must_use]
    pub fn from_description(channel: &str, description: &ChannelBuildDescription) -> Self {
        Self {
            channel_id: channel.to_owned(),
            header_version: description.version,
            read_set: read_set(description),
            write_set: write_set(description),
        }
    }
}

fn member_groups(description: &ChannelBuildDescription) -> BTreeMap<String, ConfigGroup> {
    description
        .msps
        .iter()
        .map(|msp| (msp.clone(), ConfigGroup::default()))
        .collect()
}

fn read_set(description: &ChannelBuildDescription) -> ConfigGroup {
    let application = ConfigGroup {
        groups: member_groups(description),
        ..ConfigGroup::default()
    };

    ConfigGroup {
        version: READ_VERSION,
        groups: BTreeMap::from([(APPLICATION_GROUP.to_owned(), application)]),
        values: BTreeMap::from([(CONSORTIUM_VALUE.to_owned(), ConfigValue::default())]),
        ..ConfigGroup::default()
    }
}

fn write_set(description: &ChannelBuildDescription) -> ConfigGroup {
    let mut values = BTreeMap::from([(
        CONSORTIUM_VALUE.to_owned(),
        ConfigValue {
            version: WRITE_VERSION,
            value: ConfigValueBody::Consortium {
                name: description.consortium.clone(),
            },
            mod_policy: String::new(),
        },
    )]);

    if !description.capabilities.is_empty() {
        values.insert(
            CAPABILITIES_VALUE.to_owned(),
            ConfigValue {
                version: WRITE_VERSION,
                value: ConfigValueBody::Capabilities {
                    capabilities: description.capabilities.clone(),
                },
                mod_policy: ADMINS_POLICY.to_owned(),
            },
        );
    }

    let application = ConfigGroup {
        version: APPLICATION_VERSION,
        groups: member_groups(description),
        values: BTreeMap::new(),
        policies: default_policies(),
        mod_policy: ADMINS_POLICY.to_owned(),
    };

    ConfigGroup {
        version: WRITE_VERSION,
        groups: BTreeMap::from([(APPLICATION_GROUP.to_owned(), application)]),
        values,
        ..ConfigGroup::default()
    }
}

fn default_policies() -> BTreeMap<String, ConfigPolicy> {
    [
        (ADMINS_POLICY, ImplicitMetaRule::Majority),
        (READERS_POLICY, ImplicitMetaRule::Any),
        (WRITERS_POLICY, ImplicitMetaRule::Any),
    ]
    .into_iter()
    .map(|(name, rule)| {
        (
            name.to_owned(),
            ConfigPolicy {
                version: POLICY_VERSION,
                policy: ImplicitMetaPolicy {
                    sub_policy: name.to_owned(),
                    rule,
                },
                mod_policy: ADMINS_POLICY.to_owned(),
            },
        )
    })
    .collect()
}
