use multichain_aa_types::{Call, GasParameters, PendingOperation, SmartAccountHandle};
use multichain_core::{
    bundler::Bundler,
    chain::{Chain, ChainService},
    error::{SequencerError, Step},
    factory::AccountFactory,
    wallet::{SigningRequest, WalletProvider},
};

use super::{MultiChainSequencer, provider_unavailable};
use crate::{poller::Sleeper, session::Session};

impl<W, CS, F, S> MultiChainSequencer<W, CS, F, S>
where
    W: WalletProvider,
    CS: ChainService,
    F: AccountFactory,
    S: Sleeper,
{
    /// Submit `calls` as one batched operation on `chain_id`. The wallet must
    /// already be on that chain; see [`Self::switch_and_submit`]. The chain
    /// lease is held until the operation was sent.
    #[tracing::instrument(skip(self, session, calls), fields(session_id = %session.id(), calls = calls.len()))]
    pub async fn submit_operation(
        &self,
        session: &mut Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<PendingOperation, SequencerError> {
        let _lease = self.chain_lease.lock().await;
        self.submit_operation_leased(session, chain_id, calls).await
    }

    /// Caller holds the chain lease
    async fn submit_operation_leased(
        &self,
        session: &mut Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<PendingOperation, SequencerError> {
        let result = self.submit_checked(session, chain_id, calls).await;
        match &result {
            Ok(op) => {
                session.record_success(
                    Some(chain_id),
                    Step::Send,
                    format!("operation {} accepted with {} calls", op.id, op.call_count),
                );
                session.track(op.clone());
            }
            Err(err) => session.record_failure(err),
        }
        result
    }

    async fn submit_checked(
        &self,
        session: &mut Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<PendingOperation, SequencerError> {
        let chain = self.chains.get_chain(chain_id)?;
        if !session.is_connected() {
            return Err(SequencerError::NotConnected);
        }
        let account = session
            .account(chain_id)
            .cloned()
            .ok_or_else(|| SequencerError::AccountMissing {
                chain_id,
                chain_name: chain.name().to_string(),
            })?;
        if calls.is_empty() {
            return Err(SequencerError::InvalidRequest {
                message: format!("no calls to submit on {}", chain.name()),
            });
        }

        let active_chain_id = self
            .wallet
            .active_chain()
            .await
            .map_err(provider_unavailable)?;
        if active_chain_id != chain_id {
            return Err(SequencerError::WrongActiveChain {
                chain_id,
                chain_name: chain.name().to_string(),
                active_chain_id,
            });
        }

        let gas = match session.gas_parameters(chain_id) {
            Some(gas) => gas,
            None => self.fetch_gas_parameters(session, chain_id).await?,
        };

        self.submit_prepared(chain, &account, calls, gas).await
    }

    /// Switch to `chain_id` and submit, holding the chain lease for both so
    /// no other flow can move the wallet in between.
    pub async fn switch_and_submit(
        &self,
        session: &mut Session,
        chain_id: u64,
        calls: &[Call],
    ) -> Result<PendingOperation, SequencerError> {
        let _lease = self.chain_lease.lock().await;
        self.ensure_chain_leased(session, chain_id).await?;
        self.submit_operation_leased(session, chain_id, calls).await
    }

    /// Prepare, sign and send. Does not touch the session.
    pub(super) async fn submit_prepared(
        &self,
        chain: &CS::Chain,
        account: &SmartAccountHandle,
        calls: &[Call],
        gas: GasParameters,
    ) -> Result<PendingOperation, SequencerError> {
        let context = chain.context();
        let bundler = chain.bundler();

        let prepared = bundler
            .prepare_operation(account, calls, gas)
            .await
            .map_err(|err| SequencerError::submission_failed(context, Step::Prepare, err))?;

        tracing::debug!(
            chain_id = context.chain_id,
            operation_hash = %prepared.hash,
            "Requesting operation signature"
        );

        let request = SigningRequest {
            chain_id: context.chain_id,
            account: account.address,
            owner: account.owner,
            operation_hash: prepared.hash,
        };
        let signature = self
            .wallet
            .sign_operation(&request)
            .await
            .map_err(|err| {
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
                        stage: Step::Sign,
                        message: err.to_string(),
                        bundler_error: None,
                    }
                }
            })?;

        let id = bundler
            .send_operation(&prepared, signature)
            .await
            .map_err(|err| SequencerError::submission_failed(context, Step::Send, err))?;

        tracing::info!(
            chain_id = context.chain_id,
            chain_name = %context.name,
            operation_id = %id,
            calls = calls.len(),
            "Operation accepted by bundler"
        );

        Ok(PendingOperation::submitted(
            id,
            context.chain_id,
            context.name.clone(),
            calls.len(),
        ))
    }
}
