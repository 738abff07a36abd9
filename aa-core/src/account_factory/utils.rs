use alloy::{
    primitives::{Address, B256, Bytes, bytes, keccak256},
    sol_types::SolValue,
};
use multichain_aa_types::OwnerMaterial;

pub fn generate_salt(admin: &Address, data: &Bytes) -> B256 {
    keccak256((admin, data).abi_encode_params())
}

/// Salt data passed to the factory for an owner. EOA owners use the raw
/// deployment salt, empty when zero. Passkey owners also bind the key id and
/// both public key coordinates, so two passkeys never collide.
pub fn salt_data(owner: &OwnerMaterial, deploy_salt: B256) -> Bytes {
    match owner {
        OwnerMaterial::Eoa { .. } if deploy_salt.is_zero() => Bytes::new(),
        OwnerMaterial::Eoa { .. } => Bytes::copy_from_slice(deploy_salt.as_slice()),
        OwnerMaterial::WebAuthn { key_id, .. } => {
            let (x, y) = owner.coordinates().unwrap_or_default();
            (key_id.clone(), x, y, deploy_salt).abi_encode_params().into()
        }
    }
}

/// CREATE2 address of an OpenZeppelin minimal proxy pointing at
/// `implementation`, deployed by `deployer` with `salt`.
pub fn predict_deterministic_address(
    implementation: Address,
    salt: B256,
    deployer: Address,
) -> Address {
    let code_prefix = bytes!("0x3d602d80600a3d3981f3363d3d373d3d3d363d73");
    let code_suffix = bytes!("0x5af43d82803e903d91602b57fd5bf3");

    let mut init_code = Vec::with_capacity(55);
    init_code.extend_from_slice(&code_prefix);
    init_code.extend_from_slice(implementation.as_slice());
    init_code.extend_from_slice(&code_suffix);

    deployer.create2(salt, keccak256(&init_code))
}
