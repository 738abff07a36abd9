use std::collections::BTreeSet;

use futures::future::join_all;
use multichain_aa_types::{Call, PendingOperation, StatusRecord};
use multichain_core::{
    chain::{Chain, ChainContext, ChainService},
    error::{SequencerError, Step},
    factory::AccountFactory,
    wallet::{SigningConcurrency, WalletProvider},
};
use serde::{Deserialize, Serialize};

use super::MultiChainSequencer;
use crate::{
    poller::Sleeper,
    result::{ChainOperationResult, MultiChainResult},
    session::Session,
};

/// The calls to batch into one operation on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequest {
    pub chain_id: u64,
    pub calls: Vec<Call>,
}

impl ChainRequest {
    pub fn new(chain_id: u64, calls: Vec<Call>) -> Self {
        Self { chain_id, calls }
    }
}

impl<W, CS, F, S> MultiChainSequencer<W, CS, F, S>
where
    W: WalletProvider,
    CS: ChainService,
    F: AccountFactory,
    S: Sleeper,
{
    /// Submit one operation per chain, then wait for all of them.
    ///
    /// With [`SigningConcurrency::Sequential`] each chain is switched to and
    /// signed in request order, and a chain's signature is only requested
    /// once the previous chain's operation was accepted. With
    /// [`SigningConcurrency::Parallel`] all chains are prepared, signed and
    /// sent at once without touching the wallet's active chain.
    ///
    /// A failure before every chain was submitted yields
    /// [`SequencerError::PartialSubmissionFailure`]. Operations already
    /// accepted stay tracked in the session.
    #[tracing::instrument(skip(self, session, requests), fields(session_id = %session.id(), chains = requests.len()))]
    pub async fn submit_multi_chain(
        &self,
        session: &mut Session,
        requests: &[ChainRequest],
        concurrency: SigningConcurrency,
    ) -> Result<MultiChainResult, SequencerError> {
        if let Err(err) = self.validate_requests(requests) {
            session.record_failure(&err);
            return Err(err);
        }

        let submitted = match concurrency {
            SigningConcurrency::Sequential => self.submit_sequential(session, requests).await,
            SigningConcurrency::Parallel => self.submit_parallel(session, requests).await,
        };
        let submitted = match submitted {
            Ok(submitted) => submitted,
            Err(err) => {
                session.record_failure(&err);
                return Err(err);
            }
        };

        tracing::info!(
            operations = submitted.len(),
            "All operations submitted, polling for status"
        );

        let mut pollers = Vec::with_capacity(submitted.len());
        for op in &submitted {
            let chain = self.chain(session, op.chain_id)?;
            pollers.push(self.poller(chain.bundler(), op.chain_id, &op.id));
        }
        let records = self.poll_all(session, pollers).await;

        self.collect_results(submitted, records)
    }

    /// Pair submitted operations with their terminal records, in request order
    pub(super) fn collect_results(
        &self,
        submitted: Vec<PendingOperation>,
        records: Vec<StatusRecord>,
    ) -> Result<MultiChainResult, SequencerError> {
        let mut chains = Vec::with_capacity(submitted.len());
        for (op, record) in submitted.into_iter().zip(records) {
            let context = self.chains.get_chain(op.chain_id)?.context();
            chains.push(ChainOperationResult {
                explorer_link: explorer_link(context, &record),
                chain_id: op.chain_id,
                chain_name: op.chain_name,
                operation_id: op.id,
                call_count: op.call_count,
                status: record,
            });
        }

        let result = MultiChainResult::new(chains);
        tracing::info!(
            total_chains = result.total_chains,
            total_calls = result.total_calls,
            all_confirmed = result.all_confirmed(),
            "Multi-chain submission finished"
        );
        Ok(result)
    }

    pub(super) fn validate_requests(
        &self,
        requests: &[ChainRequest],
    ) -> Result<(), SequencerError> {
        if requests.is_empty() {
            return Err(SequencerError::InvalidRequest {
                message: "no chains requested".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for request in requests {
            if !seen.insert(request.chain_id) {
                return Err(SequencerError::InvalidRequest {
                    message: format!("chain {} requested more than once", request.chain_id),
                });
            }
            self.chains.get_chain(request.chain_id)?;
        }
        Ok(())
    }

    async fn submit_sequential(
        &self,
        session: &mut Session,
        requests: &[ChainRequest],
    ) -> Result<Vec<PendingOperation>, SequencerError> {
        let mut submitted = Vec::with_capacity(requests.len());
        for request in requests {
            match self
                .switch_and_submit(session, request.chain_id, &request.calls)
                .await
            {
                Ok(op) => submitted.push(op),
                Err(err) => {
                    let context = self.chains.get_chain(request.chain_id)?.context();
                    return Err(partial_failure(context, submitted, err));
                }
            }
        }
        Ok(submitted)
    }

    async fn submit_parallel(
        &self,
        session: &mut Session,
        requests: &[ChainRequest],
    ) -> Result<Vec<PendingOperation>, SequencerError> {
        if !session.is_connected() {
            return Err(SequencerError::NotConnected);
        }

        let chain_ids: Vec<u64> = requests.iter().map(|request| request.chain_id).collect();
        let gas = self.fetch_gas_parameters_all(session, &chain_ids).await?;

        let mut jobs = Vec::with_capacity(requests.len());
        for request in requests {
            let chain = self.chains.get_chain(request.chain_id)?;
            let Some(account) = session.account(request.chain_id).cloned() else {
                let err = SequencerError::AccountMissing {
                    chain_id: request.chain_id,
                    chain_name: chain.name().to_string(),
                };
                return Err(partial_failure(chain.context(), Vec::new(), err));
            };
            if request.calls.is_empty() {
                let err = SequencerError::InvalidRequest {
                    message: format!("no calls to submit on {}", chain.name()),
                };
                return Err(partial_failure(chain.context(), Vec::new(), err));
            }
            let params = gas
                .get(&request.chain_id)
                .copied()
                .unwrap_or(self.config.fallback_gas);
            jobs.push((chain, account, request.calls.as_slice(), params));
        }

        let outcomes = join_all(
            jobs.iter()
                .map(|(chain, account, calls, params)| {
                    self.submit_prepared(*chain, account, calls, *params)
                }),
        )
        .await;

        let mut submitted = Vec::with_capacity(outcomes.len());
        let mut first_failure = None;
        for ((chain, ..), outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(op) => {
                    session.record_success(
                        Some(op.chain_id),
                        Step::Send,
                        format!("operation {} accepted with {} calls", op.id, op.call_count),
                    );
                    session.track(op.clone());
                    submitted.push(op);
                }
                Err(err) => {
                    session.record_failure(&err);
                    if first_failure.is_none() {
                        first_failure = Some((chain.context(), err));
                    }
                }
            }
        }

        match first_failure {
            Some((context, err)) => Err(partial_failure(context, submitted, err)),
            None => Ok(submitted),
        }
    }
}

pub(super) fn partial_failure(
    context: &ChainContext,
    submitted: Vec<PendingOperation>,
    err: SequencerError,
) -> SequencerError {
    tracing::warn!(
        chain_id = context.chain_id,
        chain_name = %context.name,
        submitted = submitted.len(),
        error = %err,
        "Multi-chain submission stopped"
    );
    SequencerError::PartialSubmissionFailure {
        chain_id: context.chain_id,
        chain_name: context.name.clone(),
        step: err.step(),
        submitted,
        inner_error: Box::new(err),
    }
}

fn explorer_link(context: &ChainContext, record: &StatusRecord) -> Option<String> {
    record
        .transaction_hash
        .map(|tx_hash| context.transaction_link(tx_hash))
}
