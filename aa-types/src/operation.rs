use std::fmt;

use alloy::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

/// Opaque handle returned by a bundler when an operation is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Bytes);

impl OperationId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl From<B256> for OperationId {
    fn from(hash: B256) -> Self {
        Self(Bytes::copy_from_slice(hash.as_slice()))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Submitted,
    Pending,
    Confirmed,
    Failed,
    Timeout,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Timeout)
    }

    /// `submitted -> pending -> {confirmed | failed | timeout}`. A submitted
    /// operation may also settle directly, and pending may repeat.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        match (self, next) {
            (Submitted, Pending) => true,
            (Pending, Pending) => true,
            (Submitted | Pending, Confirmed | Failed | Timeout) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("invalid status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: OperationStatus,
    pub to: OperationStatus,
}

/// An operation accepted by a bundler and not yet observed as terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: OperationId,
    pub chain_id: u64,
    pub chain_name: String,
    pub call_count: usize,
    pub status: OperationStatus,
}

impl PendingOperation {
    pub fn submitted(
        id: OperationId,
        chain_id: u64,
        chain_name: impl Into<String>,
        call_count: usize,
    ) -> Self {
        Self {
            id,
            chain_id,
            chain_name: chain_name.into(),
            call_count,
            status: OperationStatus::Submitted,
        }
    }

    pub fn advance(&mut self, next: OperationStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Apply the terminal status from a finished poll
    pub fn settle(&mut self, record: &StatusRecord) -> Result<(), InvalidTransition> {
        self.advance(record.status)
    }
}

/// One observation of an operation's status from a bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusSnapshot {
    Pending,
    #[serde(rename_all = "camelCase")]
    Confirmed {
        transaction_hash: B256,
        block_number: Option<u64>,
        gas_used: Option<u128>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        transaction_hash: Option<B256>,
        block_number: Option<u64>,
        reason: Option<String>,
    },
}

impl StatusSnapshot {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Terminal result of status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: OperationStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusRecord {
    /// Synthetic record for a poll budget that ran out
    pub fn timeout(attempts: u32) -> Self {
        Self {
            status: OperationStatus::Timeout,
            attempts,
            transaction_hash: None,
            block_number: None,
            gas_used: None,
            reason: Some(format!("no terminal status after {attempts} attempts")),
        }
    }

    /// Build a record from a terminal snapshot. Returns `None` for pending.
    pub fn from_snapshot(snapshot: StatusSnapshot, attempts: u32) -> Option<Self> {
        match snapshot {
            StatusSnapshot::Pending => None,
            StatusSnapshot::Confirmed {
                transaction_hash,
                block_number,
                gas_used,
            } => Some(Self {
                status: OperationStatus::Confirmed,
                attempts,
                transaction_hash: Some(transaction_hash),
                block_number,
                gas_used,
                reason: None,
            }),
            StatusSnapshot::Failed {
                transaction_hash,
                block_number,
                reason,
            } => Some(Self {
                status: OperationStatus::Failed,
                attempts,
                transaction_hash,
                block_number,
                gas_used: None,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_op() -> PendingOperation {
        PendingOperation::submitted(OperationId::new(vec![1u8, 2, 3]), 1, "test", 2)
    }

    #[test]
    fn follows_submitted_pending_confirmed() {
        let mut op = pending_op();
        op.advance(OperationStatus::Pending).unwrap();
        op.advance(OperationStatus::Pending).unwrap();
        op.advance(OperationStatus::Confirmed).unwrap();
        assert!(op.status.is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            OperationStatus::Confirmed,
            OperationStatus::Failed,
            OperationStatus::Timeout,
        ] {
            let mut op = pending_op();
            op.advance(terminal).unwrap();
            let err = op.advance(OperationStatus::Pending).unwrap_err();
            assert_eq!(err.from, terminal);
            assert_eq!(op.status, terminal);
        }
    }

    #[test]
    fn cannot_go_back_to_submitted() {
        let mut op = pending_op();
        op.advance(OperationStatus::Pending).unwrap();
        assert!(op.advance(OperationStatus::Submitted).is_err());
    }

    #[test]
    fn pending_snapshot_is_not_a_record() {
        assert!(StatusRecord::from_snapshot(StatusSnapshot::Pending, 3).is_none());
        let record = StatusRecord::from_snapshot(
            StatusSnapshot::Failed {
                transaction_hash: None,
                block_number: None,
                reason: Some("reverted".into()),
            },
            4,
        )
        .unwrap();
        assert_eq!(record.status, OperationStatus::Failed);
        assert_eq!(record.attempts, 4);
    }

    #[test]
    fn timeout_record() {
        let record = StatusRecord::timeout(30);
        assert_eq!(record.status, OperationStatus::Timeout);
        assert_eq!(record.attempts, 30);
        assert!(record.transaction_hash.is_none());
    }
}
