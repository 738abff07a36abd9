use alloy::{
    hex,
    primitives::{Bytes, U256},
    rpc::types::PackedUserOperation,
};
use multichain_aa_types::{Call, GasParameters, SmartAccountHandle};
use multichain_core::rpc_clients::UseropGasEstimation;

use crate::smart_account::encode_calls;

/// Placeholder signature used for gas estimation, shaped like a real ECDSA
/// signature so validation gas is not underestimated.
pub const DUMMY_SIGNATURE: [u8; 65] = hex!(
    "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

/// Builds an EntryPoint v0.7 user operation for a smart account.
pub struct UserOpBuilder<'a> {
    account: &'a SmartAccountHandle,
    calls: &'a [Call],
    nonce: U256,
    is_deployed: bool,
    gas: GasParameters,
}

impl<'a> UserOpBuilder<'a> {
    pub fn new(account: &'a SmartAccountHandle, calls: &'a [Call]) -> Self {
        Self {
            account,
            calls,
            nonce: U256::ZERO,
            is_deployed: true,
            gas: GasParameters::fallback(),
        }
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn deployed(mut self, is_deployed: bool) -> Self {
        self.is_deployed = is_deployed;
        self
    }

    pub fn gas(mut self, gas: GasParameters) -> Self {
        self.gas = gas;
        self
    }

    /// Unsigned op carrying the dummy signature and zeroed gas limits
    pub fn build(&self) -> PackedUserOperation {
        let (factory, factory_data) = match self.account.init_code() {
            Some((factory, data)) if !self.is_deployed => (Some(factory), Some(data)),
            _ => (None, None),
        };

        PackedUserOperation {
            sender: self.account.address,
            nonce: self.nonce,
            factory,
            factory_data,
            call_data: encode_calls(self.calls),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::from(self.gas.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(self.gas.max_priority_fee_per_gas),
            paymaster: None,
            paymaster_data: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            signature: Bytes::from(DUMMY_SIGNATURE),
        }
    }
}

/// Copy bundler gas limits onto an op and clear the dummy signature
pub fn apply_estimation(
    op: PackedUserOperation,
    estimation: &UseropGasEstimation,
) -> PackedUserOperation {
    PackedUserOperation {
        call_gas_limit: estimation.call_gas_limit,
        verification_gas_limit: estimation.verification_gas_limit,
        pre_verification_gas: estimation.pre_verification_gas,
        signature: Bytes::new(),
        ..op
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, address};
    use multichain_aa_types::AccountImplementation;

    use super::*;

    fn handle() -> SmartAccountHandle {
        SmartAccountHandle {
            chain_id: 84532,
            address: address!("0xDA15403AF9690C74f30eCC9cCa686fCAD2C897f8"),
            owner: address!("0xbe2D2B388635D33b0C9C6d60dE9853716e4b51A3"),
            implementation: AccountImplementation::Hybrid,
            deploy_salt: B256::ZERO,
            factory: Some(address!("0x4bE0ddfebcA9A5A4a617dee4DeCe99E7c862dceb")),
            factory_data: Some(Bytes::from(vec![0x01, 0x02])),
        }
    }

    #[test]
    fn undeployed_account_carries_init_code() {
        let account = handle();
        let calls = [Call::transfer(Address::ZERO, U256::from(1))];

        let op = UserOpBuilder::new(&account, &calls).deployed(false).build();
        assert_eq!(op.factory, account.factory);
        assert_eq!(op.signature.len(), 65);

        let op = UserOpBuilder::new(&account, &calls).deployed(true).build();
        assert!(op.factory.is_none());
        assert!(op.factory_data.is_none());
    }

    #[test]
    fn estimation_replaces_limits() {
        let account = handle();
        let calls = [Call::transfer(Address::ZERO, U256::from(1))];
        let op = UserOpBuilder::new(&account, &calls)
            .nonce(U256::from(3))
            .gas(GasParameters::new(10, 1))
            .build();

        let op = apply_estimation(
            op,
            &UseropGasEstimation {
                call_gas_limit: U256::from(1),
                verification_gas_limit: U256::from(2),
                pre_verification_gas: U256::from(3),
                paymaster_verification_gas_limit: None,
                paymaster_post_op_gas_limit: None,
            },
        );
        assert_eq!(op.nonce, U256::from(3));
        assert_eq!(op.max_fee_per_gas, U256::from(10));
        assert_eq!(op.verification_gas_limit, U256::from(2));
        assert!(op.signature.is_empty());
    }
}
