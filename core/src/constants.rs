use std::time::Duration;

use alloy::primitives::{Address, address};

/// EntryPoint v0.7
pub const ENTRYPOINT_ADDRESS_V0_7: Address =
    address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

pub const DEFAULT_FACTORY_ADDRESS_V0_7: Address =
    address!("0x4bE0ddfebcA9A5A4a617dee4DeCe99E7c862dceb");

pub const DEFAULT_IMPLEMENTATION_ADDRESS_V0_7: Address =
    address!("0x94eC38a5d2EDA5A543Ab4c08D998338D4082beb2");

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub const FALLBACK_MAX_FEE_PER_GAS: u128 = 3_000_000_000;
pub const FALLBACK_MAX_PRIORITY_FEE_PER_GAS: u128 = 1_500_000_000;
