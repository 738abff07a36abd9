use alloy::primitives::B256;
use multichain_aa_types::{AccountImplementation, OwnerMaterial, SmartAccountHandle};
use serde::{Deserialize, Serialize};

use crate::{chain::ChainContext, error::FactoryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationRequest {
    pub owner: OwnerMaterial,
    #[serde(default)]
    pub deploy_salt: B256,
    #[serde(default)]
    pub implementation: AccountImplementation,
}

/// Derives the smart account a given owner controls on a chain.
pub trait AccountFactory: Send + Sync {
    fn derive_account(
        &self,
        chain: &ChainContext,
        request: &DerivationRequest,
    ) -> impl Future<Output = Result<SmartAccountHandle, FactoryError>> + Send;
}
