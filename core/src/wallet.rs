use alloy::primitives::{Address, B256, Bytes};
use multichain_aa_types::{Call, OperationId, StatusSnapshot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::AddChainParameters;

/// EIP-1193 provider error codes
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("wallet error {code}: {message}")]
pub struct WalletError {
    pub code: i64,
    pub message: String,
}

impl WalletError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(codes::USER_REJECTED, "User rejected the request.")
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            codes::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID {chain_id:#x}."),
        )
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::new(
            codes::UNSUPPORTED_METHOD,
            format!("The provider does not support {method}."),
        )
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == codes::USER_REJECTED
    }

    pub fn is_unknown_chain(&self) -> bool {
        self.code == codes::UNRECOGNIZED_CHAIN
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self.code, codes::DISCONNECTED | codes::CHAIN_DISCONNECTED)
    }

    pub fn is_unsupported_method(&self) -> bool {
        self.code == codes::UNSUPPORTED_METHOD
    }
}

/// What a wallet is asked to sign for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningRequest {
    pub chain_id: u64,
    pub account: Address,
    pub owner: Address,
    pub operation_hash: B256,
}

/// EIP-5792 `wallet_sendCalls` payload for one chain. The wallet executes
/// the calls from `from` with its own batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCallsRequest {
    pub chain_id: u64,
    pub from: Address,
    pub calls: Vec<Call>,
    pub atomic_required: bool,
}

/// EIP-5792 batch status codes
pub mod batch_status {
    pub const PENDING: u16 = 100;
    pub const CONFIRMED: u16 = 200;
    pub const OFFCHAIN_FAILURE: u16 = 400;
    pub const REVERTED: u16 = 500;
    pub const PARTIALLY_REVERTED: u16 = 600;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: Option<u128>,
}

/// `wallet_getCallsStatus` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsStatus {
    pub status: u16,
    #[serde(default)]
    pub receipts: Vec<CallsReceipt>,
}

impl CallsStatus {
    pub fn pending() -> Self {
        Self {
            status: batch_status::PENDING,
            receipts: Vec::new(),
        }
    }

    /// Map the status code onto the operation lifecycle. A confirmed batch
    /// without receipts is still reported as pending.
    pub fn snapshot(&self) -> StatusSnapshot {
        let last = self.receipts.last();
        let failed = |reason: String| StatusSnapshot::Failed {
            transaction_hash: last.map(|receipt| receipt.transaction_hash),
            block_number: last.and_then(|receipt| receipt.block_number),
            reason: Some(reason),
        };

        match self.status {
            100..=199 => StatusSnapshot::Pending,
            200..=299 => match last {
                Some(receipt) => StatusSnapshot::Confirmed {
                    transaction_hash: receipt.transaction_hash,
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                },
                None => StatusSnapshot::Pending,
            },
            400..=499 => StatusSnapshot::Failed {
                transaction_hash: None,
                block_number: None,
                reason: Some("batch was not included onchain".to_string()),
            },
            500..=599 => failed("batch reverted".to_string()),
            600..=699 => failed("batch partially reverted".to_string()),
            other => failed(format!("unknown batch status {other}")),
        }
    }
}

/// Whether a credential can sign for several chains at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SigningConcurrency {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialKind {
    InjectedWallet,
    WebAuthn,
    Embedded,
    LocalKey,
}

impl CredentialKind {
    /// Injected wallets and passkeys prompt the user one request at a time.
    pub fn signing_concurrency(&self) -> SigningConcurrency {
        match self {
            Self::InjectedWallet | Self::WebAuthn => SigningConcurrency::Sequential,
            Self::Embedded | Self::LocalKey => SigningConcurrency::Parallel,
        }
    }
}

/// An EIP-1193 style wallet.
pub trait WalletProvider: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    fn active_chain(&self) -> impl Future<Output = Result<u64, WalletError>> + Send;

    fn switch_chain(&self, chain_id: u64) -> impl Future<Output = Result<(), WalletError>> + Send;

    fn add_chain(
        &self,
        params: &AddChainParameters,
    ) -> impl Future<Output = Result<(), WalletError>> + Send;

    fn sign_operation(
        &self,
        request: &SigningRequest,
    ) -> impl Future<Output = Result<Bytes, WalletError>> + Send;

    /// `wallet_sendCalls`. Returns the batch id. Wallets without EIP-5792
    /// support answer 4200.
    fn send_calls(
        &self,
        _request: &BatchCallsRequest,
    ) -> impl Future<Output = Result<OperationId, WalletError>> + Send {
        std::future::ready(Err(WalletError::unsupported_method("wallet_sendCalls")))
    }

    /// `wallet_getCallsStatus`
    fn calls_status(
        &self,
        _id: &OperationId,
    ) -> impl Future<Output = Result<CallsStatus, WalletError>> + Send {
        std::future::ready(Err(WalletError::unsupported_method(
            "wallet_getCallsStatus",
        )))
    }
}
