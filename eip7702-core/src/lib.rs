pub mod constants;
pub mod delegated_account;
pub mod factory;

pub use delegated_account::{DelegatedAccount, DelegationError, delegation_target};
pub use factory::Eip7702AccountFactory;
