pub mod config;
pub mod factory;
pub mod runner;

pub use config::{DemoConfig, LogFormat};
pub use factory::AccountFactoryRouter;
pub use runner::{build_chains, run};
