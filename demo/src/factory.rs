use multichain_aa_core::DefaultAccountFactory;
use multichain_aa_types::{AccountImplementation, SmartAccountHandle};
use multichain_core::{
    chain::ChainContext,
    error::FactoryError,
    factory::{AccountFactory, DerivationRequest},
};
use multichain_eip7702_core::Eip7702AccountFactory;

use crate::config::AccountConfig;

/// Picks the factory for the requested account implementation.
#[derive(Debug, Clone, Default)]
pub struct AccountFactoryRouter {
    pub hybrid: DefaultAccountFactory,
    pub delegated: Eip7702AccountFactory,
}

impl AccountFactoryRouter {
    pub fn from_config(account: &AccountConfig) -> Self {
        let defaults = DefaultAccountFactory::v0_7();
        let hybrid = DefaultAccountFactory::with_addresses(
            account.factory_address.unwrap_or(defaults.factory_address),
            account
                .implementation_address
                .unwrap_or(defaults.implementation_address),
        );
        let delegated = account
            .delegation_contract
            .map(Eip7702AccountFactory::new)
            .unwrap_or_default();

        Self { hybrid, delegated }
    }
}

impl AccountFactory for AccountFactoryRouter {
    async fn derive_account(
        &self,
        chain: &ChainContext,
        request: &DerivationRequest,
    ) -> Result<SmartAccountHandle, FactoryError> {
        match request.implementation {
            AccountImplementation::Hybrid => self.hybrid.derive_account(chain, request).await,
            AccountImplementation::Stateless7702 => {
                self.delegated.derive_account(chain, request).await
            }
        }
    }
}
