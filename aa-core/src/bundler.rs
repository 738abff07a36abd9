use alloy::{
    primitives::{Address, Bytes, U256, aliases::U192},
    providers::{ProviderBuilder, RootProvider},
    sol,
};
use multichain_aa_types::{
    Call, GasParameters, OperationId, PreparedOperation, SmartAccountHandle, StatusSnapshot,
};
use multichain_core::{
    bundler::Bundler,
    chain::ChainContext,
    constants::ENTRYPOINT_ADDRESS_V0_7,
    error::{AlloyRpcErrorToBundlerError, BundlerError, ContractErrorToBundlerError},
    rpc_clients::BundlerClient,
};

use crate::{
    smart_account::is_deployed,
    userop::{UserOpBuilder, apply_estimation},
};

sol! {
    #[sol(rpc)]
    contract EntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// [`Bundler`] backed by an ERC-4337 bundler and the chain's RPC node.
#[derive(Debug, Clone)]
pub struct Erc4337Bundler {
    context: ChainContext,
    provider: RootProvider,
    client: BundlerClient,
    entrypoint: Address,
}

impl Erc4337Bundler {
    pub fn new(context: ChainContext) -> Self {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(context.rpc_url.clone());
        let client = BundlerClient::new(context.bundler_url.clone());

        Self {
            context,
            provider,
            client,
            entrypoint: ENTRYPOINT_ADDRESS_V0_7,
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: Address) -> Self {
        self.entrypoint = entrypoint;
        self
    }

    pub fn context(&self) -> &ChainContext {
        &self.context
    }

    async fn nonce(&self, sender: Address) -> Result<U256, BundlerError> {
        EntryPoint::new(self.entrypoint, self.provider.clone())
            .getNonce(sender, U192::ZERO)
            .call()
            .await
            .map_err(|err| err.to_bundler_error(&self.context))
    }
}

impl Bundler for Erc4337Bundler {
    async fn gas_parameters(&self) -> Result<GasParameters, BundlerError> {
        let prices = self
            .client
            .get_user_op_gas_price()
            .await
            .map_err(|err| err.to_bundler_error(&self.context))?;

        Ok(prices.fast.into())
    }

    async fn prepare_operation(
        &self,
        account: &SmartAccountHandle,
        calls: &[Call],
        gas: GasParameters,
    ) -> Result<PreparedOperation, BundlerError> {
        let chain_id = self.context.chain_id;
        if calls.is_empty() {
            return Err(BundlerError::preparation(chain_id, "no calls to execute"));
        }

        let (deployed, nonce) = tokio::try_join!(
            is_deployed(&self.provider, &self.context, account.address),
            self.nonce(account.address),
        )?;

        tracing::debug!(
            chain_id,
            account = %account.address,
            deployed,
            nonce = %nonce,
            "Building user operation"
        );

        let op = UserOpBuilder::new(account, calls)
            .nonce(nonce)
            .deployed(deployed)
            .gas(gas)
            .build();

        let estimation = self
            .client
            .estimate_user_op_gas(&op, self.entrypoint)
            .await
            .map_err(|err| err.to_bundler_error(&self.context))?;

        tracing::debug!(chain_id, ?estimation, "User operation gas estimated");

        PreparedOperation::new(apply_estimation(op, &estimation), self.entrypoint, chain_id)
            .map_err(|err| BundlerError::preparation(chain_id, err.to_string()))
    }

    async fn send_operation(
        &self,
        prepared: &PreparedOperation,
        signature: Bytes,
    ) -> Result<OperationId, BundlerError> {
        let op = prepared.with_signature(signature);
        let hash = self
            .client
            .send_user_op(&op, prepared.entrypoint)
            .await
            .map_err(|err| err.to_bundler_error(&self.context))?;

        tracing::info!(
            chain_id = self.context.chain_id,
            user_op_hash = %hash,
            "User operation accepted by bundler"
        );

        Ok(OperationId::new(hash))
    }

    async fn operation_status(&self, id: &OperationId) -> Result<StatusSnapshot, BundlerError> {
        let receipt = self
            .client
            .get_user_op_receipt(id.as_bytes())
            .await
            .map_err(|err| err.to_bundler_error(&self.context))?;

        let Some(receipt) = receipt else {
            return Ok(StatusSnapshot::Pending);
        };

        let block_number = receipt.receipt.block_number.map(|block| block.to::<u64>());
        if receipt.success {
            Ok(StatusSnapshot::Confirmed {
                transaction_hash: receipt.receipt.transaction_hash,
                block_number,
                gas_used: Some(receipt.actual_gas_used.saturating_to()),
            })
        } else {
            Ok(StatusSnapshot::Failed {
                transaction_hash: Some(receipt.receipt.transaction_hash),
                block_number,
                reason: receipt.reason,
            })
        }
    }
}
