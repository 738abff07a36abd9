use alloy::primitives::Address;
use multichain_aa_types::{AccountImplementation, OwnerMaterial, SmartAccountHandle};
use multichain_core::{
    chain::ChainContext,
    error::FactoryError,
    factory::{AccountFactory, DerivationRequest},
};

use crate::constants::DEFAULT_DELEGATION_CONTRACT;

/// Accounts that are the owner EOA itself, running the delegation
/// contract's code. Nothing is deployed, so there is no init code.
#[derive(Debug, Clone)]
pub struct Eip7702AccountFactory {
    pub delegation_contract: Address,
}

impl Default for Eip7702AccountFactory {
    fn default() -> Self {
        Self {
            delegation_contract: DEFAULT_DELEGATION_CONTRACT,
        }
    }
}

impl Eip7702AccountFactory {
    pub fn new(delegation_contract: Address) -> Self {
        Self {
            delegation_contract,
        }
    }

    pub fn derive(
        &self,
        chain_id: u64,
        request: &DerivationRequest,
    ) -> Result<SmartAccountHandle, FactoryError> {
        if request.implementation != AccountImplementation::Stateless7702 {
            return Err(FactoryError::UnsupportedImplementation {
                message: format!(
                    "{:?} accounts need a deploying factory",
                    request.implementation
                ),
            });
        }

        let OwnerMaterial::Eoa { address } = request.owner else {
            return Err(FactoryError::InvalidOwnerMaterial {
                message: "EIP-7702 delegation requires an EOA owner".to_string(),
            });
        };

        Ok(SmartAccountHandle {
            chain_id,
            address,
            owner: address,
            implementation: AccountImplementation::Stateless7702,
            deploy_salt: request.deploy_salt,
            factory: None,
            factory_data: None,
        })
    }
}

impl AccountFactory for Eip7702AccountFactory {
    fn derive_account(
        &self,
        chain: &ChainContext,
        request: &DerivationRequest,
    ) -> impl Future<Output = Result<SmartAccountHandle, FactoryError>> + Send {
        std::future::ready(self.derive(chain.chain_id, request))
    }
}
