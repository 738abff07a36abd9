use alloy::primitives::{Address, Bytes};
use multichain_aa_types::{AccountImplementation, OwnerMaterial, SmartAccountHandle};
use multichain_core::{
    chain::ChainContext,
    constants::{DEFAULT_FACTORY_ADDRESS_V0_7, DEFAULT_IMPLEMENTATION_ADDRESS_V0_7},
    error::FactoryError,
    factory::{AccountFactory, DerivationRequest},
};

use super::{init_calldata, utils};

/// Counterfactual factory for hybrid accounts. The predicted address only
/// depends on factory, implementation, owner and salt, so it is identical on
/// every chain where the factory is deployed at the same address.
#[derive(Debug, Clone)]
pub struct DefaultAccountFactory {
    pub factory_address: Address,
    pub implementation_address: Address,
}

impl Default for DefaultAccountFactory {
    fn default() -> Self {
        Self::v0_7()
    }
}

impl DefaultAccountFactory {
    pub fn v0_7() -> Self {
        Self {
            factory_address: DEFAULT_FACTORY_ADDRESS_V0_7,
            implementation_address: DEFAULT_IMPLEMENTATION_ADDRESS_V0_7,
        }
    }

    pub fn with_addresses(factory_address: Address, implementation_address: Address) -> Self {
        Self {
            factory_address,
            implementation_address,
        }
    }

    pub fn predict_address(&self, signer: &Address, salt_data: &Bytes) -> Address {
        let salt = utils::generate_salt(signer, salt_data);
        utils::predict_deterministic_address(
            self.implementation_address,
            salt,
            self.factory_address,
        )
    }

    /// Derive synchronously; nothing here touches the network.
    pub fn derive(
        &self,
        chain_id: u64,
        request: &DerivationRequest,
    ) -> Result<SmartAccountHandle, FactoryError> {
        if request.implementation != AccountImplementation::Hybrid {
            return Err(FactoryError::UnsupportedImplementation {
                message: format!(
                    "{:?} accounts are not deployed through a factory",
                    request.implementation
                ),
            });
        }

        if let OwnerMaterial::WebAuthn { public_key, .. } = &request.owner {
            if request.owner.coordinates().is_none() {
                return Err(FactoryError::InvalidOwnerMaterial {
                    message: format!(
                        "passkey public key must be 64 bytes, got {}",
                        public_key.len()
                    ),
                });
            }
        }

        let owner = request.owner.owner_address();
        let salt_data = utils::salt_data(&request.owner, request.deploy_salt);
        let address = self.predict_address(&owner, &salt_data);

        tracing::debug!(
            chain_id,
            owner = %owner,
            account = %address,
            "Predicted smart account address"
        );

        Ok(SmartAccountHandle {
            chain_id,
            address,
            owner,
            implementation: AccountImplementation::Hybrid,
            deploy_salt: request.deploy_salt,
            factory: Some(self.factory_address),
            factory_data: Some(init_calldata(owner, salt_data)),
        })
    }
}

impl AccountFactory for DefaultAccountFactory {
    fn derive_account(
        &self,
        chain: &ChainContext,
        request: &DerivationRequest,
    ) -> impl Future<Output = Result<SmartAccountHandle, FactoryError>> + Send {
        std::future::ready(self.derive(chain.chain_id, request))
    }
}
