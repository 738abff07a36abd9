use std::time::Duration;

use alloy::{
    eips::eip7702::{Authorization, SignedAuthorization},
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder, TransactionBuilder7702},
    primitives::{Address, B256, Bytes, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    signers::{SignerSync, local::PrivateKeySigner},
};
use multichain_core::{
    chain::ChainContext,
    error::{AlloyRpcErrorToBundlerError, BundlerError},
};
use serde::{Deserialize, Serialize};

use crate::constants::{EIP_7702_DELEGATION_CODE_LENGTH, EIP_7702_DELEGATION_PREFIX};

const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationError {
    #[error(transparent)]
    Rpc { error: BundlerError },

    #[error("failed to sign authorization: {message}")]
    Signing { message: String },

    #[error("signer {signer} does not control {eoa}")]
    SignerMismatch { signer: Address, eoa: Address },

    #[error("authorization transaction {tx_hash} on chain {chain_id} was not confirmed: {message}")]
    #[serde(rename_all = "camelCase")]
    Confirmation {
        chain_id: u64,
        tx_hash: B256,
        message: String,
    },

    #[error("authorization transaction {tx_hash} on chain {chain_id} reverted")]
    #[serde(rename_all = "camelCase")]
    Reverted { chain_id: u64, tx_hash: B256 },
}

/// Target of an EIP-7702 delegation designator (`0xef0100 ‖ address`), if
/// `code` is one.
pub fn delegation_target(code: &[u8]) -> Option<Address> {
    if code.len() != EIP_7702_DELEGATION_CODE_LENGTH
        || !code.starts_with(&EIP_7702_DELEGATION_PREFIX)
    {
        return None;
    }
    Some(Address::from_slice(&code[3..EIP_7702_DELEGATION_CODE_LENGTH]))
}

/// An EOA on one chain that may carry an EIP-7702 delegation
#[derive(Debug, Clone)]
pub struct DelegatedAccount {
    pub eoa_address: Address,
    context: ChainContext,
    provider: RootProvider,
}

impl DelegatedAccount {
    pub fn new(eoa_address: Address, context: ChainContext) -> Self {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(context.rpc_url.clone());
        Self {
            eoa_address,
            context,
            provider,
        }
    }

    pub fn address(&self) -> Address {
        self.eoa_address
    }

    /// Current delegation target of the EOA
    pub async fn delegation(&self) -> Result<Option<Address>, DelegationError> {
        let code = self
            .provider
            .get_code_at(self.eoa_address)
            .await
            .map_err(|err| DelegationError::Rpc {
                error: err.to_node_error(&self.context),
            })?;

        let target = delegation_target(&code);
        tracing::debug!(
            eoa_address = ?self.eoa_address,
            code_length = code.len(),
            target = ?target,
            "Checked EIP-7702 delegation"
        );
        Ok(target)
    }

    /// Whether the EOA delegates to `delegation_contract`, or to anything
    /// when `None`.
    pub async fn is_delegated_to(
        &self,
        delegation_contract: Option<Address>,
    ) -> Result<bool, DelegationError> {
        let target = self.delegation().await?;
        Ok(match (target, delegation_contract) {
            (Some(target), Some(expected)) => target == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    pub async fn get_nonce(&self) -> Result<u64, DelegationError> {
        self.provider
            .get_transaction_count(self.eoa_address)
            .await
            .map_err(|err| DelegationError::Rpc {
                error: err.to_node_error(&self.context),
            })
    }

    /// Sign an authorization for `delegation_contract`. When the EOA sends
    /// the authorization itself the transaction consumes one nonce first, so
    /// the authorization must carry the next one.
    pub async fn sign_authorization(
        &self,
        signer: &PrivateKeySigner,
        delegation_contract: Address,
        executor_is_self: bool,
    ) -> Result<SignedAuthorization, DelegationError> {
        if signer.address() != self.eoa_address {
            return Err(DelegationError::SignerMismatch {
                signer: signer.address(),
                eoa: self.eoa_address,
            });
        }

        let nonce = self.get_nonce().await?;
        let nonce = if executor_is_self { nonce + 1 } else { nonce };

        let authorization = Authorization {
            chain_id: U256::from(self.context.chain_id),
            address: delegation_contract,
            nonce,
        };
        let signature = signer
            .sign_hash_sync(&authorization.signature_hash())
            .map_err(|err| DelegationError::Signing {
                message: err.to_string(),
            })?;

        tracing::debug!(
            chain_id = self.context.chain_id,
            eoa_address = ?self.eoa_address,
            delegation_contract = ?delegation_contract,
            nonce,
            "Signed EIP-7702 authorization"
        );

        Ok(authorization.into_signed(signature))
    }

    /// Send a type-4 transaction carrying `authorization` from the EOA and
    /// wait for its receipt.
    pub async fn submit_authorization(
        &self,
        signer: &PrivateKeySigner,
        authorization: SignedAuthorization,
    ) -> Result<B256, DelegationError> {
        let chain_id = self.context.chain_id;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.context.rpc_url.clone());

        let tx = TransactionRequest::default()
            .with_from(self.eoa_address)
            .with_to(Address::ZERO)
            .with_input(Bytes::new())
            .with_authorization_list(vec![authorization]);

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|err| DelegationError::Rpc {
                error: err.to_node_error(&self.context),
            })?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(chain_id, tx_hash = %tx_hash, "Authorization transaction submitted");

        let receipt = pending
            .with_timeout(Some(CONFIRMATION_TIMEOUT))
            .get_receipt()
            .await
            .map_err(|err| DelegationError::Confirmation {
                chain_id,
                tx_hash,
                message: err.to_string(),
            })?;

        if !receipt.status() {
            return Err(DelegationError::Reverted { chain_id, tx_hash });
        }

        tracing::info!(chain_id, tx_hash = %tx_hash, "Authorization transaction confirmed");
        Ok(tx_hash)
    }

    /// Delegate the EOA to `delegation_contract` unless it already is.
    /// Returns the authorization transaction hash when one was sent.
    pub async fn ensure_delegated(
        &self,
        signer: &PrivateKeySigner,
        delegation_contract: Address,
    ) -> Result<Option<B256>, DelegationError> {
        if self.is_delegated_to(Some(delegation_contract)).await? {
            tracing::debug!(
                eoa_address = ?self.eoa_address,
                "EOA already delegated, skipping authorization"
            );
            return Ok(None);
        }

        let authorization = self
            .sign_authorization(signer, delegation_contract, true)
            .await?;
        self.submit_authorization(signer, authorization)
            .await
            .map(Some)
    }
}
