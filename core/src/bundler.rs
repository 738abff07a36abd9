use alloy::primitives::Bytes;
use multichain_aa_types::{
    Call, GasParameters, OperationId, PreparedOperation, SmartAccountHandle, StatusSnapshot,
};

use crate::error::BundlerError;

/// A per-chain relay that builds, accepts and tracks batched operations.
pub trait Bundler: Send + Sync {
    /// Recommended fee parameters for the next operation
    fn gas_parameters(&self) -> impl Future<Output = Result<GasParameters, BundlerError>> + Send;

    /// Build the unsigned operation for `calls` sent from `account`
    fn prepare_operation(
        &self,
        account: &SmartAccountHandle,
        calls: &[Call],
        gas: GasParameters,
    ) -> impl Future<Output = Result<PreparedOperation, BundlerError>> + Send;

    /// Submit a signed operation. Returns once the bundler accepted it.
    fn send_operation(
        &self,
        prepared: &PreparedOperation,
        signature: Bytes,
    ) -> impl Future<Output = Result<OperationId, BundlerError>> + Send;

    fn operation_status(
        &self,
        id: &OperationId,
    ) -> impl Future<Output = Result<StatusSnapshot, BundlerError>> + Send;
}
