use alloy::primitives::{Address, B256, Bytes, keccak256};
use serde::{Deserialize, Serialize};

/// Uncompressed P-256 public key without the 0x04 prefix: X ‖ Y
pub const WEBAUTHN_PUBLIC_KEY_LEN: usize = 64;

/// Key material that owns a smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OwnerMaterial {
    /// A plain EOA owner: injected wallet, embedded wallet or local key
    Eoa { address: Address },
    /// A WebAuthn passkey
    #[serde(rename_all = "camelCase")]
    WebAuthn { key_id: String, public_key: Bytes },
}

impl OwnerMaterial {
    pub fn eoa(address: Address) -> Self {
        Self::Eoa { address }
    }

    /// Owner address for this material. For a passkey this is the last
    /// 20 bytes of keccak256 over the 64-byte public key.
    pub fn owner_address(&self) -> Address {
        match self {
            Self::Eoa { address } => *address,
            Self::WebAuthn { public_key, .. } => Address::from_word(keccak256(public_key)),
        }
    }

    /// X and Y coordinates of a passkey. `None` for EOA owners or a
    /// malformed key.
    pub fn coordinates(&self) -> Option<(B256, B256)> {
        match self {
            Self::WebAuthn { public_key, .. } if public_key.len() == WEBAUTHN_PUBLIC_KEY_LEN => {
                let x = B256::from_slice(&public_key[..32]);
                let y = B256::from_slice(&public_key[32..]);
                Some((x, y))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AccountImplementation {
    /// Factory-deployed ERC-4337 account, counterfactual until first use
    #[default]
    Hybrid,
    /// The owner EOA itself, delegated to a stateless implementation via EIP-7702
    Stateless7702,
}

/// A derived smart account on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccountHandle {
    pub chain_id: u64,
    pub address: Address,
    pub owner: Address,
    pub implementation: AccountImplementation,
    pub deploy_salt: B256,
    /// Factory and calldata to deploy the account; absent for 7702 accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
}

impl SmartAccountHandle {
    pub fn init_code(&self) -> Option<(Address, Bytes)> {
        match (self.factory, &self.factory_data) {
            (Some(factory), Some(data)) => Some((factory, data.clone())),
            _ => None,
        }
    }
}
