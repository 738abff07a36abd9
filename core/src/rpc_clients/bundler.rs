use alloy::primitives::{Address, B256, Bytes, U64, U256};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::PackedUserOperation;
use alloy::transports::TransportResult;
use multichain_aa_types::GasParameters;
use serde::{Deserialize, Serialize};
use url::Url;

/// A JSON-RPC client for an ERC-4337 bundler
#[derive(Debug, Clone)]
pub struct BundlerClient {
    inner: RpcClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseropGasEstimation {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(default, alias = "paymasterVerificationGas")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, alias = "paymasterPostOpGas")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceTier {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl From<GasPriceTier> for GasParameters {
    fn from(tier: GasPriceTier) -> Self {
        GasParameters::new(
            tier.max_fee_per_gas.saturating_to(),
            tier.max_priority_fee_per_gas.saturating_to(),
        )
    }
}

/// Response of `pimlico_getUserOperationGasPrice`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserOpGasPrice {
    pub slow: GasPriceTier,
    pub standard: GasPriceTier,
    pub fast: GasPriceTier,
}

/// The subset of `eth_getUserOperationReceipt` we read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpReceipt {
    pub user_op_hash: B256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actual_gas_used: U256,
    pub receipt: UserOpTransactionReceipt,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpTransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
}

impl BundlerClient {
    pub fn new(url: Url) -> Self {
        Self {
            inner: RpcClient::new_http(url),
        }
    }

    /// Get a user operation receipt by hash. `None` while still pending.
    pub async fn get_user_op_receipt(
        &self,
        user_op_hash: &Bytes,
    ) -> TransportResult<Option<UserOpReceipt>> {
        self.inner
            .request("eth_getUserOperationReceipt", (user_op_hash,))
            .await
    }

    pub async fn estimate_user_op_gas(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<UseropGasEstimation> {
        self.inner
            .request("eth_estimateUserOperationGas", (user_op, entrypoint))
            .await
    }

    pub async fn send_user_op(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<Bytes> {
        self.inner
            .request("eth_sendUserOperation", (user_op, entrypoint))
            .await
    }

    pub async fn get_user_op_gas_price(&self) -> TransportResult<UserOpGasPrice> {
        self.inner
            .request("pimlico_getUserOperationGasPrice", ())
            .await
    }
}
