use std::{env, path::Path, time::Duration};

use alloy::primitives::{Address, B256};
use config::{Config, ConfigError, File, builder::DefaultState};
use multichain_aa_types::{AccountImplementation, Call, GasParameters};
use multichain_core::{
    chain::ChainContext,
    constants::{
        DEFAULT_POLL_ERROR_BACKOFF, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS,
        FALLBACK_MAX_FEE_PER_GAS, FALLBACK_MAX_PRIORITY_FEE_PER_GAS,
    },
    wallet::{CredentialKind, SigningConcurrency},
};
use multichain_sequencer::{ChainRequest, PollConfig, SequencerConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    pub chains: Vec<ChainContext>,
    #[serde(default)]
    pub sequencer: SequencerSettings,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub account: AccountConfig,
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequencerSettings {
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_error_backoff_ms: u64,
    pub fallback_max_fee_per_gas: u64,
    pub fallback_max_priority_fee_per_gas: u64,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            poll_max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            poll_error_backoff_ms: DEFAULT_POLL_ERROR_BACKOFF.as_millis() as u64,
            fallback_max_fee_per_gas: FALLBACK_MAX_FEE_PER_GAS as u64,
            fallback_max_priority_fee_per_gas: FALLBACK_MAX_PRIORITY_FEE_PER_GAS as u64,
        }
    }
}

impl SequencerSettings {
    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            poll: PollConfig {
                interval: Duration::from_millis(self.poll_interval_ms),
                max_attempts: self.poll_max_attempts,
                error_backoff: Duration::from_millis(self.poll_error_backoff_ms),
            },
            fallback_gas: GasParameters::new(
                self.fallback_max_fee_per_gas.into(),
                self.fallback_max_priority_fee_per_gas.into(),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: String,
    #[serde(default = "local_key")]
    pub credential: CredentialKind,
}

fn local_key() -> CredentialKind {
    CredentialKind::LocalKey
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub implementation: AccountImplementation,
    pub salt: B256,
    pub factory_address: Option<Address>,
    pub implementation_address: Option<Address>,
    pub delegation_contract: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub requests: Vec<ScenarioRequest>,
    /// Overrides the signing concurrency implied by the wallet credential
    #[serde(default)]
    pub policy: Option<SigningConcurrency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRequest {
    pub chain_id: u64,
    pub calls: Vec<Call>,
}

impl ScenarioConfig {
    pub fn chain_requests(&self) -> Vec<ChainRequest> {
        self.requests
            .iter()
            .map(|request| ChainRequest::new(request.chain_id, request.calls.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Load `configuration/demo_base.yaml`, then the file for `APP_ENVIRONMENT`,
/// then `APP__`-prefixed environment variables.
pub fn get_config() -> Result<DemoConfig, ConfigError> {
    let base_path = env::current_dir()
        .map_err(|e| ConfigError::Message(format!("cannot determine current directory: {e}")))?;

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Message)?;

    load_config(&base_path.join("configuration"), environment)
}

pub fn load_config(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<DemoConfig, ConfigError> {
    let environment_filename = format!("demo_{}.yaml", environment.as_str());

    let builder = Config::builder()
        .add_source(File::from(configuration_directory.join("demo_base.yaml")))
        .add_source(
            File::from(configuration_directory.join(environment_filename)).required(false),
        );
    build(builder)
}

fn build(builder: config::ConfigBuilder<DefaultState>) -> Result<DemoConfig, ConfigError> {
    let config = builder
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    let demo: DemoConfig = config.try_deserialize()?;
    validate(&demo)?;
    Ok(demo)
}

fn validate(demo: &DemoConfig) -> Result<(), ConfigError> {
    if demo.chains.is_empty() {
        return Err(ConfigError::Message("at least one chain is required".into()));
    }
    for request in &demo.scenario.requests {
        if !demo
            .chains
            .iter()
            .any(|chain| chain.chain_id == request.chain_id)
        {
            return Err(ConfigError::Message(format!(
                "scenario references chain {} which is not configured",
                request.chain_id
            )));
        }
    }
    Ok(())
}

impl DemoConfig {
    pub fn signing_policy(&self) -> SigningConcurrency {
        self.scenario
            .policy
            .unwrap_or_else(|| self.wallet.credential.signing_concurrency())
    }
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local`, `development`, or `production`."
            )),
        }
    }
}
