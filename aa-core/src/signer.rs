use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use alloy::{
    primitives::{Address, Bytes},
    signers::{SignerSync, local::PrivateKeySigner},
};
use multichain_core::{
    chain::AddChainParameters,
    wallet::{SigningRequest, WalletError, WalletProvider},
};

/// JSON-RPC "invalid params"
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug)]
struct WalletState {
    active_chain: u64,
    known_chains: BTreeSet<u64>,
}

/// A software-key wallet that behaves like an EIP-1193 provider: it tracks
/// an active chain, refuses to switch to chains it was never told about,
/// and signs operation hashes as EIP-191 personal messages.
#[derive(Debug)]
pub struct LocalKeyWallet {
    signer: PrivateKeySigner,
    state: Mutex<WalletState>,
}

impl LocalKeyWallet {
    pub fn new(signer: PrivateKeySigner, active_chain: u64) -> Self {
        Self {
            signer,
            state: Mutex::new(WalletState {
                active_chain,
                known_chains: BTreeSet::from([active_chain]),
            }),
        }
    }

    pub fn from_private_key(key: &str, active_chain: u64) -> Result<Self, WalletError> {
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|err| WalletError::new(INVALID_PARAMS, format!("invalid private key: {err}")))?;
        Ok(Self::new(signer, active_chain))
    }

    /// Chains the wallet can switch to without registration
    pub fn with_known_chains(self, chains: impl IntoIterator<Item = u64>) -> Self {
        self.state().known_chains.extend(chains);
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WalletProvider for LocalKeyWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(vec![self.address()])
    }

    async fn active_chain(&self) -> Result<u64, WalletError> {
        Ok(self.state().active_chain)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let mut state = self.state();
        if !state.known_chains.contains(&chain_id) {
            return Err(WalletError::unrecognized_chain(chain_id));
        }
        state.active_chain = chain_id;
        tracing::debug!(chain_id, "Local wallet switched chain");
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParameters) -> Result<(), WalletError> {
        let chain_id = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16)
            .map_err(|err| {
                WalletError::new(
                    INVALID_PARAMS,
                    format!("invalid chain id {}: {err}", params.chain_id),
                )
            })?;
        self.state().known_chains.insert(chain_id);
        tracing::debug!(chain_id, chain_name = %params.chain_name, "Local wallet added chain");
        Ok(())
    }

    async fn sign_operation(&self, request: &SigningRequest) -> Result<Bytes, WalletError> {
        if request.owner != self.address() {
            return Err(WalletError::new(
                multichain_core::wallet::codes::UNAUTHORIZED,
                format!("{} is not controlled by this wallet", request.owner),
            ));
        }

        let signature = self
            .signer
            .sign_message_sync(request.operation_hash.as_slice())
            .map_err(|err| WalletError::new(INVALID_PARAMS, err.to_string()))?;

        Ok(Bytes::from(signature.as_bytes()))
    }
}
