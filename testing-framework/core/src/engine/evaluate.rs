use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt as _;
use tokio::time::timeout;
use tracing::{error, warn};

use super::{EngineError, TransactionEngine, resolve_targets};
use crate::{
    network::{ClientError, ProposalRequest},
    request::TransactionRequest,
    tx_status::{TxStatus, keys},
    util::{bullet_list, panic_message},
};

impl TransactionEngine {
    /// Runs a read-only proposal. Nothing is ordered, so the outcome is
    /// always considered verified.
    pub async fn evaluate(&self, request: &TransactionRequest) -> Result<TxStatus, EngineError> {
        let index = self.selector.begin_transaction();
        let start = self.now();
        let client = self.client_for(request)?;
        let channel = self.channel(&request.channel)?;

        let tx_id = client.new_tx_id();
        let mut status = TxStatus::new(tx_id.clone(), start);
        status.set(keys::REQUEST_TYPE, keys::REQUEST_QUERY);
        status.set_verification(true);

        let targets = resolve_targets(&request.targeting, channel, index);
        if targets.is_empty() {
            warn!(channel = %channel.name, "no peers found to target for query");
        }

        let proposal = ProposalRequest {
            tx_id,
            chaincode_id: request.chaincode_id.clone(),
            function: request.function.clone(),
            arguments: request.arguments.clone(),
            transient_map: request.transient_map.clone(),
            targets: targets.clone(),
        };

        let budget = self.deadline.remaining(start, request.timeout);
        let query = async {
            match timeout(budget, client.query(&channel.name, &proposal)).await {
                Ok(results) => results,
                Err(_) => Err(ClientError::Timeout(budget)),
            }
        };

        let outcome = AssertUnwindSafe(query)
            .catch_unwind()
            .await
            .map_err(panic_message);

        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                status.set_status_fail(self.now());
                status.set_result(Bytes::new());
                status.set(keys::UNEXPECTED_ERROR, err.to_string());
                error!(
                    "Query[{}] failed: {err}",
                    status.id().short()
                );
                return Ok(status);
            }
            Err(message) => {
                status.set_status_fail(self.now());
                status.set_result(Bytes::new());
                status.set(keys::UNEXPECTED_ERROR, message.clone());
                error!("Query[{}] unexpected error: {message}", status.id().short());
                return Ok(status);
            }
        };

        if results.len() != targets.len() {
            let message = format!(
                "received {} query responses for {} targets",
                results.len(),
                targets.len()
            );
            status.set_status_fail(self.now());
            status.set_result(Bytes::new());
            status.set(keys::UNEXPECTED_ERROR, message.clone());
            error!("Query[{}] unexpected error: {message}", status.id().short());
            return Ok(status);
        }

        let mut errors = Vec::new();
        for (peer, result) in targets.iter().zip(results) {
            match result {
                Ok(payload) => {
                    status.set(keys::endorsement_result(peer), payload.clone());
                    status.set_result(payload);
                }
                Err(err) => {
                    status.set(keys::endorsement_result_error(peer), err.message.clone());
                    errors.push(format!("Endorsement error from {peer}: {err}"));
                }
            }
        }

        if targets.is_empty() {
            errors.push("no target peers for the query".to_owned());
        }

        if errors.is_empty() {
            status.set_status_success(self.now());
        } else {
            status.set_status_fail(self.now());
            status.set_result(Bytes::new());
            error!(
                "Query[{}] errors:{}",
                status.id().short(),
                bullet_list(&errors)
            );
        }

        Ok(status)
    }
}
