use std::{collections::BTreeMap, sync::Arc};

use alloy::primitives::Address;
use futures::{StreamExt, future::join_all, stream};
use multichain_aa_types::{
    GasParameters, OperationId, OperationStatus, SmartAccountHandle, StatusRecord,
};
use multichain_core::{
    bundler::Bundler,
    chain::{Chain, ChainService},
    error::{BundlerError, SequencerError, Step},
    factory::{AccountFactory, DerivationRequest},
    wallet::{WalletError, WalletProvider},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    poller::{PollConfig, PollUpdate, Sleeper, StatusPoller, StatusSource, TokioSleeper},
    session::Session,
};

mod batch;
mod multichain;
mod submit;

pub use multichain::ChainRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    pub poll: PollConfig,
    /// Used whenever a bundler cannot provide fee recommendations
    pub fallback_gas: GasParameters,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            fallback_gas: GasParameters::fallback(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "account", rename_all = "camelCase")]
pub enum ConnectOutcome {
    Connected(Address),
    AlreadyConnected(Address),
}

impl ConnectOutcome {
    pub fn account(&self) -> Address {
        match self {
            Self::Connected(account) | Self::AlreadyConnected(account) => *account,
        }
    }
}

/// Sequences account-abstraction operations across chains for one wallet.
///
/// The sequencer holds only collaborators and configuration. All per-flow
/// state lives in the [`Session`] passed to each call. The wallet's active
/// chain is shared, so chain switches and chain-bound submissions are
/// serialized through an internal lease.
pub struct MultiChainSequencer<W, CS, F, S = TokioSleeper> {
    wallet: Arc<W>,
    chains: Arc<CS>,
    factory: Arc<F>,
    sleeper: Arc<S>,
    config: SequencerConfig,
    chain_lease: Mutex<()>,
}

impl<W, CS, F> MultiChainSequencer<W, CS, F, TokioSleeper>
where
    W: WalletProvider,
    CS: ChainService,
    F: AccountFactory,
{
    pub fn new(wallet: Arc<W>, chains: Arc<CS>, factory: Arc<F>) -> Self {
        Self {
            wallet,
            chains,
            factory,
            sleeper: Arc::new(TokioSleeper),
            config: SequencerConfig::default(),
            chain_lease: Mutex::new(()),
        }
    }
}

impl<W, CS, F, S> MultiChainSequencer<W, CS, F, S>
where
    W: WalletProvider,
    CS: ChainService,
    F: AccountFactory,
    S: Sleeper,
{
    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sleeper<S2: Sleeper>(self, sleeper: Arc<S2>) -> MultiChainSequencer<W, CS, F, S2> {
        MultiChainSequencer {
            wallet: self.wallet,
            chains: self.chains,
            factory: self.factory,
            sleeper,
            config: self.config,
            chain_lease: self.chain_lease,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn chains(&self) -> &CS {
        &self.chains
    }

    /// Connect the session to the wallet. Does not prompt again when the
    /// session is already connected.
    #[tracing::instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn connect(&self, session: &mut Session) -> Result<ConnectOutcome, SequencerError> {
        if !self.wallet.is_available() {
            let err = SequencerError::ProviderUnavailable {
                message: "no wallet provider detected".to_string(),
            };
            session.record_failure(&err);
            return Err(err);
        }

        if let Some(account) = session.connected_account() {
            tracing::debug!(account = %account, "Session already connected");
            return Ok(ConnectOutcome::AlreadyConnected(account));
        }

        let accounts = match self.wallet.request_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                let err = if err.is_user_rejection() {
                    SequencerError::UserRejected {
                        message: err.message,
                    }
                } else {
                    provider_unavailable(err)
                };
                session.record_failure(&err);
                return Err(err);
            }
        };

        let Some(account) = accounts.first().copied() else {
            let err = SequencerError::ProviderUnavailable {
                message: "wallet returned no accounts".to_string(),
            };
            session.record_failure(&err);
            return Err(err);
        };

        let active_chain = match self.wallet.active_chain().await {
            Ok(chain_id) => Some(chain_id),
            Err(err) => {
                tracing::warn!(error = %err, "Could not read active chain after connecting");
                None
            }
        };

        session.set_connected(account, active_chain);
        session.record_success(active_chain, Step::Connect, format!("connected {account}"));
        tracing::info!(account = %account, active_chain = ?active_chain, "Wallet connected");

        Ok(ConnectOutcome::Connected(account))
    }

    /// Make `chain_id` the wallet's active chain. An unknown chain is
    /// registered once and the switch retried once. Waits for any
    /// submission holding the chain lease.
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id()))]
    pub async fn ensure_chain(
        &self,
        session: &mut Session,
        chain_id: u64,
    ) -> Result<(), SequencerError> {
        let _lease = self.chain_lease.lock().await;
        self.ensure_chain_leased(session, chain_id).await
    }

    /// Caller holds the chain lease
    async fn ensure_chain_leased(
        &self,
        session: &mut Session,
        chain_id: u64,
    ) -> Result<(), SequencerError> {
        let result = self.switch_chain(session, chain_id).await;
        match &result {
            Ok(switched) => {
                session.set_active_chain(chain_id);
                let detail = if *switched {
                    "switched chain"
                } else {
                    "chain already active"
                };
                session.record_success(Some(chain_id), Step::SwitchChain, detail);
            }
            Err(err) => session.record_failure(err),
        }
        result.map(|_| ())
    }

    /// Returns whether a switch was needed
    async fn switch_chain(
        &self,
        session: &mut Session,
        chain_id: u64,
    ) -> Result<bool, SequencerError> {
        let context = self.chains.get_chain(chain_id)?.context();

        match self.wallet.active_chain().await {
            Ok(active) if active == chain_id => return Ok(false),
            Ok(_) => {}
            Err(err) if err.is_disconnected() => return Err(provider_unavailable(err)),
            Err(err) => tracing::debug!(error = %err, "Active chain unknown, switching anyway"),
        }

        let rejected = || SequencerError::ChainSwitchRejected {
            chain_id,
            chain_name: context.name.clone(),
        };
        let unsupported = |err: WalletError| SequencerError::ChainUnsupported {
            chain_id,
            chain_name: context.name.clone(),
            message: err.to_string(),
        };

        let err = match self.wallet.switch_chain(chain_id).await {
            Ok(()) => {
                tracing::info!(chain_id, chain_name = %context.name, "Switched wallet chain");
                return Ok(true);
            }
            Err(err) => err,
        };

        if err.is_user_rejection() {
            return Err(rejected());
        }
        if err.is_disconnected() {
            return Err(provider_unavailable(err));
        }
        if !err.is_unknown_chain() {
            return Err(unsupported(err));
        }

        tracing::info!(
            chain_id,
            chain_name = %context.name,
            "Wallet does not know chain, registering it"
        );

        if let Err(err) = self.wallet.add_chain(&context.add_chain_parameters()).await {
            let err = if err.is_user_rejection() {
                rejected()
            } else {
                unsupported(err)
            };
            session.record_failure_at(Step::AddChain, &err);
            return Err(err);
        }
        session.record_success(Some(chain_id), Step::AddChain, "chain registered");

        match self.wallet.switch_chain(chain_id).await {
            Ok(()) => {
                tracing::info!(chain_id, chain_name = %context.name, "Switched wallet chain");
                Ok(true)
            }
            Err(err) if err.is_user_rejection() => Err(rejected()),
            Err(err) => Err(unsupported(err)),
        }
    }

    /// Look up a configured chain, logging the failure to the session
    fn chain(
        &self,
        session: &mut Session,
        chain_id: u64,
    ) -> Result<&CS::Chain, SequencerError> {
        self.chains.get_chain(chain_id).inspect_err(|err| {
            session.record_failure(err);
        })
    }

    /// Derive the smart account for the session's owner on `chain_id`.
    #[tracing::instrument(skip(self, session, request), fields(session_id = %session.id()))]
    pub async fn create_smart_account(
        &self,
        session: &mut Session,
        chain_id: u64,
        request: &DerivationRequest,
    ) -> Result<SmartAccountHandle, SequencerError> {
        let context = self.chain(session, chain_id)?.context();

        let handle = match self.factory.derive_account(context, request).await {
            Ok(handle) => handle,
            Err(error) => {
                let err = SequencerError::AccountDerivationFailed {
                    chain_id,
                    chain_name: context.name.clone(),
                    error,
                };
                session.record_failure(&err);
                return Err(err);
            }
        };

        if let Some(other) = session
            .accounts()
            .find(|other| other.chain_id != chain_id && other.address != handle.address)
        {
            tracing::warn!(
                chain_id,
                address = %handle.address,
                other_chain_id = other.chain_id,
                other_address = %other.address,
                "Smart account address differs across chains"
            );
        }

        tracing::info!(
            chain_id,
            address = %handle.address,
            implementation = ?handle.implementation,
            "Smart account derived"
        );
        session.record_success(
            Some(chain_id),
            Step::DeriveAccount,
            format!("smart account {}", handle.address),
        );
        session.insert_account(handle.clone());

        Ok(handle)
    }

    /// Fee parameters for `chain_id`, falling back to the configured values
    /// when the bundler cannot answer. Only fails for unknown chains.
    pub async fn fetch_gas_parameters(
        &self,
        session: &mut Session,
        chain_id: u64,
    ) -> Result<GasParameters, SequencerError> {
        let chain = self.chain(session, chain_id)?;
        let result = chain.bundler().gas_parameters().await;
        Ok(self.apply_gas(session, chain_id, result))
    }

    /// Fetch fee parameters for several chains concurrently
    pub async fn fetch_gas_parameters_all(
        &self,
        session: &mut Session,
        chain_ids: &[u64],
    ) -> Result<BTreeMap<u64, GasParameters>, SequencerError> {
        let mut chains = Vec::with_capacity(chain_ids.len());
        for chain_id in chain_ids {
            chains.push(self.chain(session, *chain_id)?);
        }

        let results = join_all(chains.iter().map(|chain| chain.bundler().gas_parameters())).await;

        Ok(chain_ids
            .iter()
            .zip(results)
            .map(|(chain_id, result)| (*chain_id, self.apply_gas(session, *chain_id, result)))
            .collect())
    }

    fn apply_gas(
        &self,
        session: &mut Session,
        chain_id: u64,
        result: Result<GasParameters, BundlerError>,
    ) -> GasParameters {
        let gas = match result {
            Ok(gas) => {
                tracing::debug!(chain_id, ?gas, "Fetched gas parameters");
                session.record_success(Some(chain_id), Step::FetchGas, "bundler gas prices");
                gas
            }
            Err(err) => {
                let fallback = self.config.fallback_gas;
                if err.is_unsupported_method() {
                    tracing::info!(
                        chain_id,
                        ?fallback,
                        "Bundler has no gas price endpoint, using fallback"
                    );
                } else {
                    tracing::warn!(
                        chain_id,
                        error = %err,
                        ?fallback,
                        "Gas price lookup failed, using fallback"
                    );
                }
                session.record_success(
                    Some(chain_id),
                    Step::FetchGas,
                    format!("fallback gas prices: {err}"),
                );
                fallback
            }
        };
        session.cache_gas(chain_id, gas);
        gas
    }

    /// Poll a bundler operation until terminal, moving the tracked
    /// operation through `pending` into its terminal status. Status lookup
    /// failures are retried within the attempt budget; the only error is an
    /// unknown chain.
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id(), operation_id = %id))]
    pub async fn poll_status(
        &self,
        session: &mut Session,
        chain_id: u64,
        id: &OperationId,
    ) -> Result<StatusRecord, SequencerError> {
        let chain = self.chain(session, chain_id)?;
        let mut records = self
            .poll_all(session, vec![self.poller(chain.bundler(), chain_id, id)])
            .await;
        Ok(records
            .pop()
            .unwrap_or_else(|| StatusRecord::timeout(self.config.poll.max_attempts)))
    }

    fn poller<Src: StatusSource>(
        &self,
        source: Src,
        chain_id: u64,
        id: &OperationId,
    ) -> StatusPoller<'_, Src, S> {
        StatusPoller::new(
            source,
            self.sleeper.as_ref(),
            self.config.poll,
            chain_id,
            id.clone(),
        )
    }

    /// Run every poller concurrently and apply their updates to the session
    /// as they arrive. Records come back in poller order.
    async fn poll_all<Src: StatusSource>(
        &self,
        session: &mut Session,
        pollers: Vec<StatusPoller<'_, Src, S>>,
    ) -> Vec<StatusRecord> {
        let mut records: Vec<Option<StatusRecord>> = vec![None; pollers.len()];

        let mut updates = stream::select_all(pollers.iter().enumerate().map(|(index, poller)| {
            poller
                .updates()
                .map(move |update| (index, update))
                .boxed()
        }));

        while let Some((index, update)) = updates.next().await {
            let poller = &pollers[index];
            poller.trace(&update);
            match update {
                PollUpdate::Pending { .. } => {
                    if session.mark_pending(poller.operation_id()) {
                        session.record_success(
                            Some(poller.chain_id()),
                            Step::Poll,
                            OperationStatus::Pending.to_string(),
                        );
                    }
                }
                PollUpdate::Inconclusive { .. } => {}
                PollUpdate::Finished(record) => {
                    session.settle_operation(poller.operation_id(), &record);
                    session.record_success(
                        Some(poller.chain_id()),
                        Step::Poll,
                        record.status.to_string(),
                    );
                    records[index] = Some(record);
                }
            }
        }

        records
            .into_iter()
            .zip(&pollers)
            .map(|(record, poller)| {
                record.unwrap_or_else(|| StatusRecord::timeout(poller.config().max_attempts))
            })
            .collect()
    }

    pub fn reset(&self, session: &mut Session) {
        tracing::info!(session_id = %session.id(), "Resetting session");
        session.reset();
    }
}

fn provider_unavailable(err: WalletError) -> SequencerError {
    SequencerError::ProviderUnavailable {
        message: err.to_string(),
    }
}
