use std::{panic::AssertUnwindSafe, time::Duration};

use bytes::Bytes;
use futures::FutureExt as _;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::{
    EngineError, TransactionEngine,
    commit::{self, CommitEvent, Disposition},
    resolve_targets,
};
use crate::{
    network::{
        BroadcastResponse, ClientError, Endorsement, FabricClient, PeerError, ProposalRequest,
        SignedProposal, TransactionEnvelope, TxId,
    },
    request::TransactionRequest,
    selector::select,
    topology::ChannelTopology,
    tx_status::{TxStatus, keys},
    util::{bullet_list, panic_message},
};

/// Why a submission stopped before reaching a commit verdict.
enum Interruption {
    /// Errors of the protocol itself, already annotated on the status.
    LifeCycle(Vec<String>),
    Unexpected(String),
}

struct Submission<'a> {
    client: &'a dyn FabricClient,
    channel: &'a ChannelTopology,
    request: &'a TransactionRequest,
    tx_id: TxId,
    start: u64,
    index: u64,
}

impl TransactionEngine {
    /// Endorse, order and confirm one mutating request.
    ///
    /// Only workload errors are returned as `Err`; every network outcome is
    /// folded into the returned status.
    pub async fn submit(&self, request: &TransactionRequest) -> Result<TxStatus, EngineError> {
        let index = self.selector.begin_transaction();
        let start = self.now();
        let client = self.client_for(request)?;
        let channel = self.channel(&request.channel)?;

        let tx_id = client.new_tx_id();
        let mut status = TxStatus::new(tx_id.clone(), start);
        status.set(keys::REQUEST_TYPE, keys::REQUEST_TRANSACTION);

        let submission = Submission {
            client: client.as_ref(),
            channel,
            request,
            tx_id,
            start,
            index,
        };

        let outcome = AssertUnwindSafe(self.drive(&submission, &mut status))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Interruption::Unexpected(panic_message(panic))));

        if let Err(interruption) = outcome {
            self.interrupt(&mut status, interruption);
        }

        Ok(status)
    }

    fn interrupt(&self, status: &mut TxStatus, interruption: Interruption) {
        status.set_status_fail(self.now());

        match interruption {
            Interruption::LifeCycle(errors) => {
                if !errors.is_empty() {
                    error!(
                        "Transaction[{}] life-cycle errors:{}",
                        status.id().short(),
                        bullet_list(&errors)
                    );
                }
            }
            Interruption::Unexpected(message) => {
                status.set_result(Bytes::new());
                status.set_verification(false);
                error!(
                    "Transaction[{}] unexpected error: {message}",
                    status.id().short()
                );
                status.set(keys::UNEXPECTED_ERROR, message);
            }
        }
    }

    async fn drive(
        &self,
        submission: &Submission<'_>,
        status: &mut TxStatus,
    ) -> Result<(), Interruption> {
        let Submission {
            client,
            channel,
            request,
            ..
        } = *submission;

        let targets = resolve_targets(&request.targeting, channel, submission.index);
        let (proposal, responses) = self.endorse(submission, &targets, status).await?;
        let endorsements = self.check_endorsements(client, channel, &targets, responses, status)?;

        // Listeners go up before the broadcast so a fast commit cannot be missed.
        let pending = commit::register_all(
            self.event_sources(&channel.name),
            &submission.tx_id,
            self.remaining(submission),
            &self.clock,
        );

        let orderer = match &request.orderer {
            Some(orderer) => orderer.clone(),
            None => select(&channel.orderers, submission.index)
                .cloned()
                .ok_or_else(|| {
                    Interruption::Unexpected(format!("no orderer known for channel {}", channel.name))
                })?,
        };

        let envelope = TransactionEnvelope {
            tx_id: submission.tx_id.clone(),
            proposal,
            endorsements,
        };
        self.order(submission, &orderer, &envelope, status).await?;

        let events = commit::await_all(pending).await;
        self.conclude(submission, events, status);
        Ok(())
    }

    async fn endorse(
        &self,
        submission: &Submission<'_>,
        targets: &[String],
        status: &mut TxStatus,
    ) -> Result<(SignedProposal, Vec<Result<Endorsement, PeerError>>), Interruption> {
        let request = submission.request;
        let proposal = ProposalRequest {
            tx_id: submission.tx_id.clone(),
            chaincode_id: request.chaincode_id.clone(),
            function: request.function.clone(),
            arguments: request.arguments.clone(),
            transient_map: request.transient_map.clone(),
            targets: targets.to_vec(),
        };

        status.set(keys::TIME_CREATE, self.now());
        let sent = if targets.is_empty() {
            warn!(
                channel = %submission.channel.name,
                "no peers found to target, check that the targeted organizations exist"
            );
            Err(ClientError::Rejected("no target peers for the proposal".to_owned()))
        } else {
            submission
                .client
                .send_proposal(&submission.channel.name, &proposal, self.remaining(submission))
                .await
        };
        status.set(keys::TIME_ENDORSE, self.now());

        match sent {
            Ok(responses) => {
                if responses.responses.len() != targets.len() {
                    return Err(Interruption::Unexpected(format!(
                        "received {} endorsement responses for {} targets",
                        responses.responses.len(),
                        targets.len()
                    )));
                }
                Ok((responses.proposal, responses.responses))
            }
            Err(err) => {
                // Explicit rejection, nothing further can happen to this transaction.
                status.set(keys::PROPOSAL_ERROR, err.to_string());
                status.set_verification(true);
                Err(Interruption::LifeCycle(vec![err.to_string()]))
            }
        }
    }

    /// Walks the responses left to right; the last payload seen is the result.
    fn check_endorsements(
        &self,
        client: &dyn FabricClient,
        channel: &ChannelTopology,
        targets: &[String],
        responses: Vec<Result<Endorsement, PeerError>>,
        status: &mut TxStatus,
    ) -> Result<Vec<Endorsement>, Interruption> {
        let mut errors = Vec::new();
        let mut endorsements = Vec::with_capacity(responses.len());

        for (target, response) in targets.iter().zip(responses) {
            let endorsement = match response {
                Ok(endorsement) => endorsement,
                Err(err) => {
                    status.set(keys::proposal_response_error(target), err.message.clone());
                    status.set_verification(true);
                    errors.push(format!("Proposal response error by {target}: {err}"));
                    continue;
                }
            };

            status.set_result(endorsement.payload.clone());
            status.set(keys::endorsement_result(target), endorsement.payload.clone());

            if self.settings.verify_proposal_responses
                && !client.verify_endorsement(&channel.name, &endorsement)
            {
                status.set(keys::endorsement_verify_error(target), "INVALID");
                status.set_verification(true);
                errors.push(format!(
                    "Couldn't verify endorsement signature or identity of {target}"
                ));
                continue;
            }

            if !endorsement.is_success() {
                status.set(
                    keys::endorsement_result_error(target),
                    format!("{} {}", endorsement.status, endorsement.message),
                );
                status.set_verification(true);
                errors.push(format!(
                    "Endorsement denied by {target}: {}",
                    endorsement.message
                ));
                continue;
            }

            endorsements.push(endorsement);
        }

        if !errors.is_empty() {
            return Err(Interruption::LifeCycle(errors));
        }

        if self.settings.verify_read_write_sets && !read_write_sets_match(&endorsements) {
            status.set(keys::READ_WRITE_SET_ERROR, "MISMATCH");
            status.set_verification(true);
            return Err(Interruption::LifeCycle(vec![
                "Read/Write set mismatch between endorsements".to_owned(),
            ]));
        }

        Ok(endorsements)
    }

    async fn order(
        &self,
        submission: &Submission<'_>,
        orderer: &str,
        envelope: &TransactionEnvelope,
        status: &mut TxStatus,
    ) -> Result<(), Interruption> {
        let budget = self.remaining(submission);
        let broadcast = submission
            .client
            .broadcast(&submission.channel.name, orderer, envelope);

        let response: Result<BroadcastResponse, String> = match timeout(budget, broadcast).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(ClientError::Timeout(budget).to_string()),
        };

        let response = match response {
            Ok(response) => response,
            Err(message) => {
                status.set(keys::broadcast_error(orderer), message.clone());
                status.set_verification(true);
                return Err(Interruption::LifeCycle(vec![format!(
                    "Broadcast error from {orderer}: {message}"
                )]));
            }
        };

        status.set(keys::TIME_ORDERER_ACK, self.now());

        if !response.is_success() {
            // Ordering explicitly refused, the transaction will never be ordered.
            status.set(keys::broadcast_response_error(orderer), response.status.clone());
            status.set_verification(true);
            return Err(Interruption::LifeCycle(vec![format!(
                "{orderer} response error with status {}",
                response.status
            )]));
        }

        debug!(tx_id = %submission.tx_id, orderer, "broadcast accepted");
        Ok(())
    }

    /// Any listener failure fails the transaction; the threshold only picks
    /// which arrival time is reported.
    fn conclude(&self, submission: &Submission<'_>, mut events: Vec<CommitEvent>, status: &mut TxStatus) {
        for event in &events {
            match &event.disposition {
                Disposition::Valid => {
                    status.set_verification(true);
                    status.set(keys::commit_success(&event.peer), event.time);
                }
                Disposition::Invalid(code) => {
                    status.set_verification(true);
                    status.set(keys::commit_error(&event.peer), code.clone());
                }
                Disposition::Timeout => {
                    status.set(keys::commit_timeout(&event.peer), "TIMEOUT");
                }
                Disposition::ListenerError(message) => {
                    status.set(keys::event_hub_error(&event.peer), message.clone());
                }
            }
        }

        let failures: Vec<String> = events
            .iter()
            .filter(|event| !event.disposition.is_valid())
            .map(|event| event.describe(&submission.tx_id))
            .collect();

        if !failures.is_empty() {
            status.set_status_fail(self.now());
            error!(
                "Transaction[{}] commit errors:{}",
                submission.tx_id.short(),
                bullet_list(&failures)
            );
            return;
        }

        let completed = commit::threshold_time(&mut events, self.settings.latency_threshold)
            .unwrap_or_else(|| {
                warn!(channel = %submission.channel.name, "no commit listeners for channel");
                self.now()
            });
        status.set_status_success(completed);
    }

    fn remaining(&self, submission: &Submission<'_>) -> Duration {
        self.deadline
            .remaining(submission.start, submission.request.timeout)
    }
}

/// All retained endorsements carry the same read/write-set fingerprint.
#[must_use]
pub fn read_write_sets_match(endorsements: &[Endorsement]) -> bool {
    endorsements
        .windows(2)
        .all(|pair| pair[0].rw_set_fingerprint == pair[1].rw_set_fingerprint)
}
