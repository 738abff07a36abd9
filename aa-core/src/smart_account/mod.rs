use alloy::{
    primitives::{Address, Bytes},
    providers::Provider,
    sol,
    sol_types::SolCall,
};
use multichain_aa_types::Call;
use multichain_core::{
    chain::ChainContext,
    error::{AlloyRpcErrorToBundlerError, BundlerError},
};

sol! {
    function execute(address _target, uint256 _value, bytes _calldata);
}

sol! {
    function executeBatch(address[] _target, uint256[] _value, bytes[] _calldata);
}

/// Account calldata for a batch. A single call uses `execute`.
pub fn encode_calls(calls: &[Call]) -> Bytes {
    match calls {
        [call] => encode_execute(call),
        _ => encode_execute_batch(calls),
    }
}

pub fn encode_execute(call: &Call) -> Bytes {
    executeCall {
        _target: call.target,
        _value: call.value,
        _calldata: call.data.clone(),
    }
    .abi_encode()
    .into()
}

pub fn encode_execute_batch(calls: &[Call]) -> Bytes {
    executeBatchCall {
        _target: calls.iter().map(|call| call.target).collect(),
        _value: calls.iter().map(|call| call.value).collect(),
        _calldata: calls.iter().map(|call| call.data.clone()).collect(),
    }
    .abi_encode()
    .into()
}

/// Whether any code lives at `address`
pub async fn is_deployed(
    provider: &impl Provider,
    chain: &ChainContext,
    address: Address,
) -> Result<bool, BundlerError> {
    let code = provider
        .get_code_at(address)
        .await
        .map_err(|err| err.to_node_error(chain))?;

    Ok(!code.is_empty())
}
