use alloy::{
    core::sol_types::SolValue,
    primitives::{Address, B256, Bytes, ChainId, U256, keccak256},
    rpc::types::PackedUserOperation,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserOpError {
    #[error("{field} does not fit in 128 bits")]
    FieldTooLarge { field: String },
}

/// A user operation ready to be signed: the unsigned op and its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedOperation {
    pub chain_id: u64,
    pub entrypoint: Address,
    pub user_op: PackedUserOperation,
    pub hash: B256,
}

impl PreparedOperation {
    pub fn new(
        user_op: PackedUserOperation,
        entrypoint: Address,
        chain_id: u64,
    ) -> Result<Self, UserOpError> {
        let hash = compute_user_op_v07_hash(&user_op, entrypoint, chain_id)?;
        Ok(Self {
            chain_id,
            entrypoint,
            user_op,
            hash,
        })
    }

    pub fn with_signature(&self, signature: Bytes) -> PackedUserOperation {
        PackedUserOperation {
            signature,
            ..self.user_op.clone()
        }
    }
}

fn to_u128(value: U256, field: &str) -> Result<u128, UserOpError> {
    value.try_into().map_err(|_| UserOpError::FieldTooLarge {
        field: field.to_string(),
    })
}

/// Two u128 values packed into one word, high half first
fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut word = [0u8; 32];
    word[0..16].copy_from_slice(&high.to_be_bytes());
    word[16..32].copy_from_slice(&low.to_be_bytes());
    B256::from(word)
}

/// `factory ‖ factoryData`, or empty for an already deployed sender
pub fn init_code(op: &PackedUserOperation) -> Bytes {
    match op.factory {
        Some(factory) if factory != Address::ZERO => [
            &factory[..],
            &op.factory_data.clone().unwrap_or_default()[..],
        ]
        .concat()
        .into(),
        Some(_) => op.factory_data.clone().unwrap_or_default(),
        None => Bytes::default(),
    }
}

fn paymaster_and_data(op: &PackedUserOperation) -> Result<Bytes, UserOpError> {
    let Some(paymaster) = op.paymaster else {
        return Ok(Bytes::default());
    };
    if paymaster == Address::ZERO {
        return Ok(op.paymaster_data.clone().unwrap_or_default());
    }

    let verification = to_u128(
        op.paymaster_verification_gas_limit.unwrap_or_default(),
        "paymaster_verification_gas_limit",
    )?;
    let post_op = to_u128(
        op.paymaster_post_op_gas_limit.unwrap_or_default(),
        "paymaster_post_op_gas_limit",
    )?;

    Ok([
        &paymaster[..],
        &verification.to_be_bytes()[..],
        &post_op.to_be_bytes()[..],
        &op.paymaster_data.clone().unwrap_or_default()[..],
    ]
    .concat()
    .into())
}

/// EntryPoint v0.7 user operation hash
pub fn compute_user_op_v07_hash(
    op: &PackedUserOperation,
    entrypoint: Address,
    chain_id: ChainId,
) -> Result<B256, UserOpError> {
    let account_gas_limits = pack_u128_pair(
        to_u128(op.verification_gas_limit, "verification_gas_limit")?,
        to_u128(op.call_gas_limit, "call_gas_limit")?,
    );
    let gas_fees = pack_u128_pair(
        to_u128(op.max_priority_fee_per_gas, "max_priority_fee_per_gas")?,
        to_u128(op.max_fee_per_gas, "max_fee_per_gas")?,
    );

    let inner = (
        op.sender,
        op.nonce,
        keccak256(init_code(op)),
        keccak256(&op.call_data),
        account_gas_limits,
        op.pre_verification_gas,
        gas_fees,
        keccak256(paymaster_and_data(op)?),
    )
        .abi_encode();

    let outer = (keccak256(&inner), entrypoint, U256::from(chain_id)).abi_encode();
    Ok(keccak256(&outer))
}
