mod bundler;

pub use bundler::{BundlerClient, GasPriceTier, UserOpGasPrice, UserOpReceipt, UseropGasEstimation};
