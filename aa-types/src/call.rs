use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A single contract call inside a batched operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub target: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
}

impl Call {
    pub fn new(target: Address, value: U256, data: Bytes) -> Self {
        Self {
            target,
            value,
            data,
        }
    }

    /// A call that only moves value, with empty calldata
    pub fn transfer(target: Address, value: U256) -> Self {
        Self::new(target, value, Bytes::new())
    }
}

/// EIP-1559 fee parameters, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasParameters {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl GasParameters {
    pub const GWEI: u128 = 1_000_000_000;

    pub fn new(max_fee_per_gas: u128, max_priority_fee_per_gas: u128) -> Self {
        Self {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }

    /// Fallback values used when a bundler cannot be asked for fees:
    /// 3 gwei max fee, 1.5 gwei priority fee.
    pub fn fallback() -> Self {
        Self::new(3 * Self::GWEI, 3 * Self::GWEI / 2)
    }
}

impl Default for GasParameters {
    fn default() -> Self {
        Self::fallback()
    }
}
