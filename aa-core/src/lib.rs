pub mod account_factory;
pub mod bundler;
pub mod signer;
pub mod smart_account;
pub mod userop;

pub use account_factory::DefaultAccountFactory;
pub use bundler::Erc4337Bundler;
pub use signer::LocalKeyWallet;
