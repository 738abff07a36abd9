use multichain_aa_types::{Call, OperationId, PendingOperation, StatusRecord};
use multichain_core::{
    chain::{Chain, ChainService},
    error::{SequencerError, Step},
    factory::AccountFactory,
    wallet::{BatchCallsRequest, WalletProvider},
};

use super::{
    MultiChainSequencer,
    multichain::{ChainRequest, partial_failure},
};
use crate::{
    poller::{Sleeper, WalletCalls},
    result::MultiChainResult,
    session::Session,
};

impl<W, CS, F, S> MultiChainSequencer<W, CS, F, S>
where
    W: WalletProvider,
    CS: ChainService,
    F: AccountFactory,
    S: Sleeper,
{
    /// Switch to `chain_id` and hand `calls` to the wallet's own batching
    /// (`wallet_sendCalls`), sent from the connected account. No smart
    /// account or bundler is involved. The chain lease is held for both steps.
    #[tracing::instrument(skip(self, session, calls), fields(session_id = %session.id(), calls = calls.len()))]
    pub async fn send_calls(
        &self,
        session: &mut Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<PendingOperation, SequencerError> {
        let request = match self.batch_request(session, chain_id, calls) {
            Ok(request) => request,
            Err(err) => {
                session.record_failure(&err);
                return Err(err);
            }
        };

        let _lease = self.chain_lease.lock().await;
        self.ensure_chain_leased(session, chain_id).await?;

        let result = self.send_batch(&request).await;
        match &result {
            Ok(op) => {
                session.record_success(
                    Some(chain_id),
                    Step::Send,
                    format!("batch {} accepted by wallet with {} calls", op.id, op.call_count),
                );
                session.track(op.clone());
            }
            Err(err) => session.record_failure(err),
        }
        result
    }

    fn batch_request(
        &self,
        session: &Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<BatchCallsRequest, SequencerError> {
        let chain = self.chains.get_chain(chain_id)?;
        let from = session
            .connected_account()
            .ok_or(SequencerError::NotConnected)?;
        if calls.is_empty() {
            return Err(SequencerError::InvalidRequest {
                message: format!("no calls to submit on {}", chain.name()),
            });
        }

        Ok(BatchCallsRequest {
            chain_id,
            from,
            calls: calls.to_vec(),
            atomic_required: false,
        })
    }

    async fn send_batch(
        &self,
        request: &BatchCallsRequest,
    ) -> Result<PendingOperation, SequencerError> {
        let context = self.chains.get_chain(request.chain_id)?.context();

        let id = self.wallet.send_calls(request).await.map_err(|err| {
            if err.is_user_rejection() {
                SequencerError::SubmissionRejected {
                    chain_id: context.chain_id,
                    chain_name: context.name.clone(),
                    message: err.message,
                }
            } else {
                SequencerError::SubmissionFailed {
                    chain_id: context.chain_id,
                    chain_name: context.name.clone(),
                    stage: Step::Send,
                    message: err.to_string(),
                    bundler_error: None,
                }
            }
        })?;

        tracing::info!(
            chain_id = context.chain_id,
            chain_name = %context.name,
            batch_id = %id,
            calls = request.calls.len(),
            "Batch accepted by wallet"
        );

        Ok(PendingOperation::submitted(
            id,
            context.chain_id,
            context.name.clone(),
            request.calls.len(),
        ))
    }

    /// Poll a wallet batch through `wallet_getCallsStatus` with the same
    /// interval, budget and backoff as bundler operations.
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id(), batch_id = %id))]
    pub async fn poll_calls_status(
        &self,
        session: &mut Session,
        chain_id: u64,
        id: &OperationId,
    ) -> Result<StatusRecord, SequencerError> {
        self.chain(session, chain_id)?;
        let poller = self.poller(WalletCalls(self.wallet.as_ref()), chain_id, id);
        let mut records = self.poll_all(session, vec![poller]).await;
        Ok(records
            .pop()
            .unwrap_or_else(|| StatusRecord::timeout(self.config.poll.max_attempts)))
    }

    /// Send one wallet batch per chain in request order, then wait for all
    /// of them. Always sequential: the wallet can only send on its active
    /// chain, and the next chain is switched to only after the previous
    /// batch was accepted.
    #[tracing::instrument(skip(self, session, requests), fields(session_id = %session.id(), chains = requests.len()))]
    pub async fn send_calls_multi_chain(
        &self,
        session: &mut Session,
        requests: &[ChainRequest],
    ) -> Result<MultiChainResult, SequencerError> {
        if let Err(err) = self.validate_requests(requests) {
            session.record_failure(&err);
            return Err(err);
        }

        let mut submitted = Vec::with_capacity(requests.len());
        for request in requests {
            match self.send_calls(session, request.chain_id, &request.calls).await {
                Ok(op) => submitted.push(op),
                Err(err) => {
                    let context = self.chains.get_chain(request.chain_id)?.context();
                    let err = partial_failure(context, submitted, err);
                    session.record_failure(&err);
                    return Err(err);
                }
            }
        }

        tracing::info!(batches = submitted.len(), "All batches sent, polling wallet");

        let pollers = submitted
            .iter()
            .map(|op| self.poller(WalletCalls(self.wallet.as_ref()), op.chain_id, &op.id))
            .collect();
        let records = self.poll_all(session, pollers).await;

        self.collect_results(submitted, records)
    }
}
