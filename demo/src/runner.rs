use std::sync::Arc;

use multichain_aa_core::{Erc4337Bundler, LocalKeyWallet};
use multichain_aa_types::{AccountImplementation, OwnerMaterial};
use multichain_core::{
    chain::{BundlerChain, ChainRegistry},
    factory::DerivationRequest,
};
use multichain_eip7702_core::{DelegatedAccount, constants::DEFAULT_DELEGATION_CONTRACT};
use multichain_sequencer::{MultiChainResult, MultiChainSequencer, Session};

use crate::{config::DemoConfig, factory::AccountFactoryRouter};

pub type DemoChains = ChainRegistry<BundlerChain<Erc4337Bundler>>;

pub fn build_chains(config: &DemoConfig) -> DemoChains {
    ChainRegistry::new(config.chains.iter().map(|context| {
        BundlerChain::new(context.clone(), Erc4337Bundler::new(context.clone()))
    }))
}

/// Run the configured scenario end to end with a local key: connect, derive
/// accounts, delegate when needed, submit to every chain and wait.
pub async fn run(config: &DemoConfig) -> anyhow::Result<MultiChainResult> {
    let chains = Arc::new(build_chains(config));
    let first_chain = config
        .chains
        .first()
        .map(|chain| chain.chain_id)
        .ok_or_else(|| anyhow::anyhow!("no chains configured"))?;

    let wallet = Arc::new(
        LocalKeyWallet::from_private_key(&config.wallet.private_key, first_chain)?
            .with_known_chains(config.chains.iter().map(|chain| chain.chain_id)),
    );
    tracing::info!(owner = %wallet.address(), "Local wallet loaded");

    let factory = Arc::new(AccountFactoryRouter::from_config(&config.account));
    let sequencer = MultiChainSequencer::new(wallet.clone(), chains, factory)
        .with_config(config.sequencer.sequencer_config());

    let mut session = Session::new();
    sequencer.connect(&mut session).await?;

    let request = DerivationRequest {
        owner: OwnerMaterial::eoa(wallet.address()),
        deploy_salt: config.account.salt,
        implementation: config.account.implementation,
    };

    for scenario in &config.scenario.requests {
        if config.account.implementation == AccountImplementation::Stateless7702 {
            let context = config
                .chains
                .iter()
                .find(|chain| chain.chain_id == scenario.chain_id)
                .ok_or_else(|| anyhow::anyhow!("chain {} is not configured", scenario.chain_id))?;
            let delegation_contract = config
                .account
                .delegation_contract
                .unwrap_or(DEFAULT_DELEGATION_CONTRACT);

            let account = DelegatedAccount::new(wallet.address(), context.clone());
            if let Some(tx_hash) = account
                .ensure_delegated(wallet.signer(), delegation_contract)
                .await?
            {
                tracing::info!(
                    chain_id = scenario.chain_id,
                    link = %context.transaction_link(tx_hash),
                    "EOA delegated"
                );
            }
        }

        let handle = sequencer
            .create_smart_account(&mut session, scenario.chain_id, &request)
            .await?;
        tracing::info!(
            chain_id = handle.chain_id,
            address = %handle.address,
            "Smart account ready"
        );
    }

    if session.addresses_match() == Some(false) {
        tracing::warn!("Smart account addresses differ between chains");
    }

    let policy = config.signing_policy();
    tracing::info!(?policy, chains = config.scenario.requests.len(), "Submitting");

    let result = sequencer
        .submit_multi_chain(&mut session, &config.scenario.chain_requests(), policy)
        .await?;

    tracing::debug!(state = ?session.state(), "Session finished");
    Ok(result)
}
