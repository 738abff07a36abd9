use std::collections::BTreeMap;

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{bundler::Bundler, error::SequencerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

impl NativeCurrency {
    pub fn ether() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// Static description of one chain, loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContext {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: Url,
    pub bundler_url: Url,
    pub explorer_url: Url,
    #[serde(default = "NativeCurrency::ether")]
    pub native_currency: NativeCurrency,
}

/// Parameters for `wallet_addEthereumChain` (EIP-3085).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParameters {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainContext {
    pub fn add_chain_parameters(&self) -> AddChainParameters {
        AddChainParameters {
            chain_id: format!("{:#x}", self.chain_id),
            chain_name: self.name.clone(),
            native_currency: self.native_currency.clone(),
            rpc_urls: vec![self.rpc_url.to_string()],
            block_explorer_urls: vec![trimmed(&self.explorer_url)],
        }
    }

    pub fn transaction_link(&self, tx_hash: B256) -> String {
        format!("{}/tx/{tx_hash}", trimmed(&self.explorer_url))
    }

    pub fn address_link(&self, address: alloy::primitives::Address) -> String {
        format!("{}/address/{address}", trimmed(&self.explorer_url))
    }
}

fn trimmed(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}

pub trait Chain: Send + Sync {
    type Bundler: Bundler;

    fn context(&self) -> &ChainContext;
    fn bundler(&self) -> &Self::Bundler;

    fn chain_id(&self) -> u64 {
        self.context().chain_id
    }

    fn name(&self) -> &str {
        &self.context().name
    }
}

/// A chain descriptor paired with its bundler.
#[derive(Debug, Clone)]
pub struct BundlerChain<B> {
    pub context: ChainContext,
    pub bundler: B,
}

impl<B> BundlerChain<B> {
    pub fn new(context: ChainContext, bundler: B) -> Self {
        Self { context, bundler }
    }
}

impl<B: Bundler> Chain for BundlerChain<B> {
    type Bundler = B;

    fn context(&self) -> &ChainContext {
        &self.context
    }

    fn bundler(&self) -> &B {
        &self.bundler
    }
}

pub trait ChainService: Send + Sync {
    type Chain: Chain;

    fn get_chain(&self, chain_id: u64) -> Result<&Self::Chain, SequencerError>;
    fn chain_ids(&self) -> Vec<u64>;
}

/// In-memory set of configured chains keyed by chain id.
#[derive(Debug, Clone)]
pub struct ChainRegistry<C> {
    chains: BTreeMap<u64, C>,
}

impl<C: Chain> ChainRegistry<C> {
    pub fn new(chains: impl IntoIterator<Item = C>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.chain_id(), chain))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl<C: Chain> ChainService for ChainRegistry<C> {
    type Chain = C;

    fn get_chain(&self, chain_id: u64) -> Result<&C, SequencerError> {
        self.chains
            .get(&chain_id)
            .ok_or(SequencerError::UnknownChain { chain_id })
    }

    fn chain_ids(&self) -> Vec<u64> {
        self.chains.keys().copied().collect()
    }
}
