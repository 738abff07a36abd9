pub mod bundler;
pub mod chain;
pub mod constants;
pub mod error;
pub mod factory;
pub mod rpc_clients;
pub mod wallet;

pub use multichain_aa_types as types;
