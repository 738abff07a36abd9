use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::SolCall,
};

mod default;
pub mod utils;

pub use default::*;

sol! {
    function createAccount(address admin, bytes salt) returns (address);
}

/// Calldata for `factory.createAccount(admin, salt)`, used as 4337 factory data
pub fn init_calldata(admin: Address, salt_data: Bytes) -> Bytes {
    createAccountCall {
        admin,
        salt: salt_data,
    }
    .abi_encode()
    .into()
}
