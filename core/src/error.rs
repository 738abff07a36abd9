use std::fmt;

use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use multichain_aa_types::PendingOperation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainContext;

/// JSON-RPC error code for "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// A local pre-processing step failed.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    #[error("serialization error: {message}")]
    SerError { message: String },

    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

impl fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

pub fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

/// Failure talking to a chain's bundler or RPC node.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundlerError {
    #[error("bundler error on chain {chain_id} at {rpc_url}: {message}")]
    Rpc {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("failed to build operation on chain {chain_id}: {message}")]
    Preparation { chain_id: u64, message: String },
}

impl BundlerError {
    pub fn preparation(chain_id: u64, message: impl Into<String>) -> Self {
        Self::Preparation {
            chain_id,
            message: message.into(),
        }
    }

    /// Network-level failures and 5xx/429 responses. A JSON-RPC error
    /// response from a healthy server is not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc { kind, .. } => match kind {
                RpcErrorKind::NullResp | RpcErrorKind::OtherTransportError { .. } => true,
                RpcErrorKind::TransportHttpError { status, .. } => {
                    *status == 429 || *status >= 500
                }
                _ => false,
            },
            Self::Preparation { .. } => false,
        }
    }

    pub fn is_unsupported_method(&self) -> bool {
        matches!(
            self,
            Self::Rpc {
                kind: RpcErrorKind::ErrorResp(RpcErrorResponse {
                    code: METHOD_NOT_FOUND,
                    ..
                }),
                ..
            } | Self::Rpc {
                kind: RpcErrorKind::UnsupportedFeature { .. },
                ..
            }
        )
    }
}

pub trait AlloyRpcErrorToBundlerError {
    fn to_bundler_error(&self, chain: &ChainContext) -> BundlerError;
    fn to_node_error(&self, chain: &ChainContext) -> BundlerError;
}

impl AlloyRpcErrorToBundlerError for AlloyRpcError<TransportErrorKind> {
    fn to_bundler_error(&self, chain: &ChainContext) -> BundlerError {
        BundlerError::Rpc {
            chain_id: chain.chain_id,
            rpc_url: chain.bundler_url.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }

    fn to_node_error(&self, chain: &ChainContext) -> BundlerError {
        BundlerError::Rpc {
            chain_id: chain.chain_id,
            rpc_url: chain.rpc_url.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

pub trait ContractErrorToBundlerError {
    fn to_bundler_error(self, chain: &ChainContext) -> BundlerError;
}

impl ContractErrorToBundlerError for alloy::contract::Error {
    fn to_bundler_error(self, chain: &ChainContext) -> BundlerError {
        match self {
            alloy::contract::Error::TransportError(err) => err.to_node_error(chain),
            other => BundlerError::preparation(chain.chain_id, other.to_string()),
        }
    }
}

/// Failure deriving a smart account.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactoryError {
    #[error("invalid owner material: {message}")]
    InvalidOwnerMaterial { message: String },

    #[error("unsupported account implementation: {message}")]
    UnsupportedImplementation { message: String },

    #[error("account lookup failed on chain {chain_id}: {message}")]
    Lookup { chain_id: u64, message: String },
}

/// The step of a flow an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Connect,
    SwitchChain,
    AddChain,
    DeriveAccount,
    FetchGas,
    Prepare,
    Sign,
    Send,
    Poll,
    Validate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Connect => "connect",
            Step::SwitchChain => "switchChain",
            Step::AddChain => "addChain",
            Step::DeriveAccount => "deriveAccount",
            Step::FetchGas => "fetchGas",
            Step::Prepare => "prepare",
            Step::Sign => "sign",
            Step::Send => "send",
            Step::Poll => "poll",
            Step::Validate => "validate",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum SequencerError {
    #[error("wallet provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("user rejected the connection request: {message}")]
    UserRejected { message: String },

    #[error("user rejected switching to {chain_name} ({chain_id})")]
    #[serde(rename_all = "camelCase")]
    ChainSwitchRejected { chain_id: u64, chain_name: String },

    #[error("wallet cannot switch to {chain_name} ({chain_id}): {message}")]
    #[serde(rename_all = "camelCase")]
    ChainUnsupported {
        chain_id: u64,
        chain_name: String,
        message: String,
    },

    #[error("failed to derive smart account on {chain_name} ({chain_id}): {error}")]
    #[serde(rename_all = "camelCase")]
    AccountDerivationFailed {
        chain_id: u64,
        chain_name: String,
        error: FactoryError,
    },

    #[error("user rejected signing on {chain_name} ({chain_id}): {message}")]
    #[serde(rename_all = "camelCase")]
    SubmissionRejected {
        chain_id: u64,
        chain_name: String,
        message: String,
    },

    #[error("submission on {chain_name} ({chain_id}) failed at {stage}: {message}")]
    #[serde(rename_all = "camelCase")]
    SubmissionFailed {
        chain_id: u64,
        chain_name: String,
        stage: Step,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bundler_error: Option<BundlerError>,
    },

    #[error(
        "multi-chain submission stopped on {chain_name} ({chain_id}) at {step} after {} accepted operations: {inner_error}",
        .submitted.len()
    )]
    #[serde(rename_all = "camelCase")]
    PartialSubmissionFailure {
        chain_id: u64,
        chain_name: String,
        step: Step,
        submitted: Vec<PendingOperation>,
        #[source]
        inner_error: Box<SequencerError>,
    },

    #[error("session is not connected to a wallet")]
    NotConnected,

    #[error("chain {chain_id} is not configured")]
    #[serde(rename_all = "camelCase")]
    UnknownChain { chain_id: u64 },

    #[error("no smart account for {chain_name} ({chain_id})")]
    #[serde(rename_all = "camelCase")]
    AccountMissing { chain_id: u64, chain_name: String },

    #[error("wallet is on chain {active_chain_id}, expected {chain_name} ({chain_id})")]
    #[serde(rename_all = "camelCase")]
    WrongActiveChain {
        chain_id: u64,
        chain_name: String,
        active_chain_id: u64,
    },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl SequencerError {
    /// Chain the error is attributed to, if any
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Self::ChainSwitchRejected { chain_id, .. }
            | Self::ChainUnsupported { chain_id, .. }
            | Self::AccountDerivationFailed { chain_id, .. }
            | Self::SubmissionRejected { chain_id, .. }
            | Self::SubmissionFailed { chain_id, .. }
            | Self::PartialSubmissionFailure { chain_id, .. }
            | Self::UnknownChain { chain_id }
            | Self::AccountMissing { chain_id, .. }
            | Self::WrongActiveChain { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }

    pub fn step(&self) -> Step {
        match self {
            Self::ProviderUnavailable { .. } | Self::UserRejected { .. } | Self::NotConnected => {
                Step::Connect
            }
            Self::ChainSwitchRejected { .. } | Self::ChainUnsupported { .. } => Step::SwitchChain,
            Self::AccountDerivationFailed { .. } => Step::DeriveAccount,
            Self::SubmissionRejected { .. } => Step::Sign,
            Self::SubmissionFailed { stage, .. } => *stage,
            Self::PartialSubmissionFailure { step, .. } => *step,
            Self::UnknownChain { .. }
            | Self::AccountMissing { .. }
            | Self::WrongActiveChain { .. }
            | Self::InvalidRequest { .. } => Step::Validate,
        }
    }

    pub fn submission_failed(chain: &ChainContext, stage: Step, err: BundlerError) -> Self {
        Self::SubmissionFailed {
            chain_id: chain.chain_id,
            chain_name: chain.name.clone(),
            stage,
            message: err.to_string(),
            bundler_error: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(kind: RpcErrorKind) -> BundlerError {
        BundlerError::Rpc {
            chain_id: 1,
            rpc_url: "http://localhost".into(),
            message: "boom".into(),
            kind,
        }
    }

    #[test]
    fn classifies_transient_errors() {
        assert!(rpc(RpcErrorKind::TransportHttpError {
            status: 503,
            body: String::new()
        })
        .is_transient());
        assert!(rpc(RpcErrorKind::TransportHttpError {
            status: 429,
            body: String::new()
        })
        .is_transient());
        assert!(!rpc(RpcErrorKind::TransportHttpError {
            status: 400,
            body: String::new()
        })
        .is_transient());
        assert!(!BundlerError::preparation(1, "bad").is_transient());
    }

    #[test]
    fn detects_unsupported_method() {
        let err = rpc(RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: METHOD_NOT_FOUND,
            message: "method not found".into(),
            data: None,
        }));
        assert!(err.is_unsupported_method());
        assert!(!err.is_transient());
    }

    #[test]
    fn partial_failure_serializes_with_chain_and_step() {
        let inner = SequencerError::SubmissionRejected {
            chain_id: 84532,
            chain_name: "Base Sepolia".into(),
            message: "denied".into(),
        };
        let err = SequencerError::PartialSubmissionFailure {
            chain_id: 84532,
            chain_name: "Base Sepolia".into(),
            step: inner.step(),
            submitted: vec![],
            inner_error: Box::new(inner),
        };

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "PARTIAL_SUBMISSION_FAILURE");
        assert_eq!(json["chainId"], 84532);
        assert_eq!(json["step"], "sign");
        assert_eq!(json["innerError"]["type"], "SUBMISSION_REJECTED");
        assert_eq!(err.step(), Step::Sign);
        assert_eq!(err.chain_id(), Some(84532));
    }
}
