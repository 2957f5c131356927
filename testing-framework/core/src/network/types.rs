use std::{collections::BTreeMap, fmt, path::PathBuf};

use bytes::Bytes;
use fabric_bench_config::network::ContractLanguage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Response status peers use for a successful endorsement.
pub const STATUS_SUCCESS: i32 = 200;

/// Orderer acknowledgement status of an accepted broadcast.
pub const BROADCAST_SUCCESS: &str = "SUCCESS";

/// Validation code of a committed, valid transaction.
pub const VALIDATION_CODE_VALID: &str = "VALID";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identifier from 32 random bytes.
    #[must_use]
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error reported by a single peer inside an otherwise successful call.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct PeerError {
    pub message: String,
}

impl PeerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub tx_id: TxId,
    pub chaincode_id: String,
    pub function: String,
    pub arguments: Vec<String>,
    #[serde(default)]
    pub transient_map: BTreeMap<String, Bytes>,
    pub targets: Vec<String>,
}

/// A peer's simulation result for a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub peer: String,
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Bytes,
    #[serde(default)]
    pub rw_set_fingerprint: Option<String>,
    #[serde(default)]
    pub signature: Bytes,
}

impl Endorsement {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Signed proposal the endorsements were produced for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub tx_id: TxId,
    pub channel: String,
    #[serde(default)]
    pub bytes: Bytes,
}

/// Responses positionally aligned with the proposal's target list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponses {
    pub proposal: SignedProposal,
    pub responses: Vec<Result<Endorsement, PeerError>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx_id: TxId,
    pub proposal: SignedProposal,
    pub endorsements: Vec<Endorsement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: String,
    #[serde(default)]
    pub info: String,
}

impl BroadcastResponse {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: BROADCAST_SUCCESS.to_owned(),
            info: String::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == BROADCAST_SUCCESS
    }
}

/// Per-peer acknowledgement of an administrative proposal (join, install).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub peer: String,
    pub status: i32,
    #[serde(default)]
    pub message: String,
}

impl PeerStatus {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeInfo {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSignature {
    pub signer_msp_id: String,
    pub signature: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    pub tx_id: TxId,
    pub channel: String,
    pub orderer: String,
    pub config: Bytes,
    pub signatures: Vec<ConfigSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChannelRequest {
    pub tx_id: TxId,
    pub channel: String,
    pub genesis_block: Bytes,
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    pub tx_id: TxId,
    pub chaincode_id: String,
    pub version: String,
    pub language: ContractLanguage,
    pub path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiateRequest {
    pub tx_id: TxId,
    pub chaincode_id: String,
    pub version: String,
    pub language: ContractLanguage,
    pub function: String,
    pub arguments: Vec<String>,
    pub transient_map: BTreeMap<String, Bytes>,
    pub endorsement_policy: Option<Value>,
    pub collections_config: Option<Value>,
    pub targets: Vec<String>,
    /// Upgrade an existing definition instead of instantiating a new one.
    pub upgrade: bool,
}
