use alloy::primitives::{Address, address};

/// EIP-7702 delegation designator prefix
pub const EIP_7702_DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// Delegation designator length: prefix + address
pub const EIP_7702_DELEGATION_CODE_LENGTH: usize = 23;

/// Stateless DeleGator implementation used as the default delegation target
pub const DEFAULT_DELEGATION_CONTRACT: Address =
    address!("0x63c0c19a282a1B52b07dD5a65b58948A07DAE32B");
