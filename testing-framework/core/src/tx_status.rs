use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use crate::network::TxId;

/// Annotation keys recorded on a [`TxStatus`].
pub mod keys {
    pub const REQUEST_TYPE: &str = "request_type";
    pub const TIME_CREATE: &str = "time_create";
    pub const TIME_ENDORSE: &str = "time_endorse";
    pub const TIME_ORDERER_ACK: &str = "time_orderer_ack";
    pub const PROPOSAL_ERROR: &str = "proposal_error";
    pub const READ_WRITE_SET_ERROR: &str = "read_write_set_error";
    pub const UNEXPECTED_ERROR: &str = "unexpected_error";

    pub const REQUEST_TRANSACTION: &str = "transaction";
    pub const REQUEST_QUERY: &str = "query";

    pub fn proposal_response_error(peer: &str) -> String {
        format!("proposal_response_error_{peer}")
    }

    pub fn endorsement_result(peer: &str) -> String {
        format!("endorsement_result_{peer}")
    }

    pub fn endorsement_verify_error(peer: &str) -> String {
        format!("endorsement_verify_error_{peer}")
    }

    pub fn endorsement_result_error(peer: &str) -> String {
        format!("endorsement_result_error_{peer}")
    }

    pub fn broadcast_error(orderer: &str) -> String {
        format!("broadcast_error_{orderer}")
    }

    pub fn broadcast_response_error(orderer: &str) -> String {
        format!("broadcast_response_error_{orderer}")
    }

    pub fn commit_success(peer: &str) -> String {
        format!("commit_success_{peer}")
    }

    pub fn commit_error(peer: &str) -> String {
        format!("commit_error_{peer}")
    }

    pub fn commit_timeout(peer: &str) -> String {
        format!("commit_timeout_{peer}")
    }

    pub fn event_hub_error(peer: &str) -> String {
        format!("event_hub_error_{peer}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Created,
    Success,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Annotation {
    Text(String),
    Time(u64),
    Payload(Bytes),
}

impl From<&str> for Annotation {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Annotation {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for Annotation {
    fn from(value: u64) -> Self {
        Self::Time(value)
    }
}

impl From<Bytes> for Annotation {
    fn from(value: Bytes) -> Self {
        Self::Payload(value)
    }
}

/// Outcome of one submitted or evaluated request.
#[derive(Clone, Debug, Serialize)]
pub struct TxStatus {
    id: TxId,
    status: TxState,
    time_create: u64,
    time_final: u64,
    verified: bool,
    result: Bytes,
    custom_data: BTreeMap<String, Annotation>,
}

impl TxStatus {
    pub(crate) fn new(id: TxId, time_create: u64) -> Self {
        Self {
            id,
            status: TxState::Created,
            time_create,
            time_final: 0,
            verified: false,
            result: Bytes::new(),
            custom_data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &TxId {
        &self.id
    }

    #[must_use]
    pub const fn status(&self) -> TxState {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TxState::Success
    }

    /// Whether some peer definitively confirmed or rejected the outcome.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified
    }

    #[must_use]
    pub const fn time_create(&self) -> u64 {
        self.time_create
    }

    #[must_use]
    pub const fn time_final(&self) -> u64 {
        self.time_final
    }

    /// Time between creation and the reported completion.
    #[must_use]
    pub const fn latency_ms(&self) -> u64 {
        self.time_final.saturating_sub(self.time_create)
    }

    #[must_use]
    pub const fn result(&self) -> &Bytes {
        &self.result
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&Annotation> {
        self.custom_data.get(key)
    }

    #[must_use]
    pub const fn annotations(&self) -> &BTreeMap<String, Annotation> {
        &self.custom_data
    }

    pub(crate) fn set(&mut self, key: impl Into<String>, value: impl Into<Annotation>) {
        self.custom_data.insert(key.into(), value.into());
    }

    pub(crate) const fn set_verification(&mut self, verified: bool) {
        self.verified = verified;
    }

    pub(crate) fn set_result(&mut self, result: Bytes) {
        self.result = result;
    }

    pub(crate) const fn set_status_success(&mut self, time_final: u64) {
        self.status = TxState::Success;
        self.time_final = time_final;
    }

    pub(crate) const fn set_status_fail(&mut self, time_final: u64) {
        self.status = TxState::Failed;
        self.time_final = time_final;
    }
}
