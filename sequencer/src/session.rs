use std::collections::BTreeMap;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use multichain_aa_types::{
    GasParameters, OperationId, OperationStatus, PendingOperation, SmartAccountHandle,
    StatusRecord,
};
use multichain_core::error::{SequencerError, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum LogOutcome {
    Succeeded { detail: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogEntry {
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    pub step: Step,
    #[serde(flatten)]
    pub outcome: LogOutcome,
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: Uuid,
    pub is_connected: bool,
    pub account: Option<Address>,
    pub active_chain: Option<u64>,
    pub smart_accounts: BTreeMap<u64, Address>,
    pub addresses_match: Option<bool>,
    pub pending_operations: usize,
}

/// State of one caller flow. Every sequencer operation takes it by `&mut`;
/// nothing here outlives the process.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    connected_account: Option<Address>,
    active_chain: Option<u64>,
    accounts: BTreeMap<u64, SmartAccountHandle>,
    gas: BTreeMap<u64, GasParameters>,
    operations: Vec<PendingOperation>,
    log: Vec<OperationLogEntry>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            connected_account: None,
            active_chain: None,
            accounts: BTreeMap::new(),
            gas: BTreeMap::new(),
            operations: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_connected(&self) -> bool {
        self.connected_account.is_some()
    }

    pub fn connected_account(&self) -> Option<Address> {
        self.connected_account
    }

    pub fn active_chain(&self) -> Option<u64> {
        self.active_chain
    }

    pub fn account(&self, chain_id: u64) -> Option<&SmartAccountHandle> {
        self.accounts.get(&chain_id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &SmartAccountHandle> {
        self.accounts.values()
    }

    pub fn gas_parameters(&self, chain_id: u64) -> Option<GasParameters> {
        self.gas.get(&chain_id).copied()
    }

    pub fn operations(&self) -> &[PendingOperation] {
        &self.operations
    }

    pub fn operation(&self, id: &OperationId) -> Option<&PendingOperation> {
        self.operations.iter().find(|op| &op.id == id)
    }

    pub fn log(&self) -> &[OperationLogEntry] {
        &self.log
    }

    /// `None` with fewer than two accounts, otherwise whether every chain
    /// resolved to the same smart-account address.
    pub fn addresses_match(&self) -> Option<bool> {
        let mut addresses = self.accounts.values().map(|handle| handle.address);
        let first = addresses.next()?;
        if self.accounts.len() < 2 {
            return None;
        }
        Some(addresses.all(|address| address == first))
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            session_id: self.id,
            is_connected: self.is_connected(),
            account: self.connected_account,
            active_chain: self.active_chain,
            smart_accounts: self
                .accounts
                .iter()
                .map(|(chain_id, handle)| (*chain_id, handle.address))
                .collect(),
            addresses_match: self.addresses_match(),
            pending_operations: self
                .operations
                .iter()
                .filter(|op| !op.status.is_terminal())
                .count(),
        }
    }

    /// Back to the initial empty state under a fresh id
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply a terminal poll result to the tracked operation. Unknown ids and
    /// already-terminal operations are left untouched.
    pub fn settle_operation(&mut self, id: &OperationId, record: &StatusRecord) {
        let Some(op) = self.operations.iter_mut().find(|op| &op.id == id) else {
            return;
        };
        if let Err(err) = op.settle(record) {
            tracing::warn!(operation_id = %id, error = %err, "Ignoring status update");
        }
    }

    /// Move a submitted operation to `pending`. Returns whether it changed.
    pub(crate) fn mark_pending(&mut self, id: &OperationId) -> bool {
        let Some(op) = self.operations.iter_mut().find(|op| &op.id == id) else {
            return false;
        };
        if op.status != OperationStatus::Submitted {
            return false;
        }
        op.advance(OperationStatus::Pending).is_ok()
    }

    pub(crate) fn set_connected(&mut self, account: Address, active_chain: Option<u64>) {
        self.connected_account = Some(account);
        self.active_chain = active_chain;
    }

    pub(crate) fn set_active_chain(&mut self, chain_id: u64) {
        self.active_chain = Some(chain_id);
    }

    pub(crate) fn insert_account(&mut self, handle: SmartAccountHandle) {
        self.accounts.insert(handle.chain_id, handle);
    }

    pub(crate) fn cache_gas(&mut self, chain_id: u64, gas: GasParameters) {
        self.gas.insert(chain_id, gas);
    }

    pub(crate) fn track(&mut self, op: PendingOperation) {
        self.operations.push(op);
    }

    pub(crate) fn record_success(
        &mut self,
        chain_id: Option<u64>,
        step: Step,
        detail: impl Into<String>,
    ) {
        self.log.push(OperationLogEntry {
            at: Utc::now(),
            chain_id,
            step,
            outcome: LogOutcome::Succeeded {
                detail: detail.into(),
            },
        });
    }

    pub(crate) fn record_failure(&mut self, error: &SequencerError) {
        self.record_failure_at(error.step(), error);
    }

    pub(crate) fn record_failure_at(&mut self, step: Step, error: &SequencerError) {
        self.log.push(OperationLogEntry {
            at: Utc::now(),
            chain_id: error.chain_id(),
            step,
            outcome: LogOutcome::Failed {
                error: error.to_string(),
            },
        });
    }
}
