use multichain_aa_types::{OperationId, OperationStatus, StatusRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOperationResult {
    pub chain_id: u64,
    pub chain_name: String,
    pub operation_id: OperationId,
    pub call_count: usize,
    pub status: StatusRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
}

/// Aggregate outcome of a multi-chain submission, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChainResult {
    pub chains: Vec<ChainOperationResult>,
    pub total_chains: usize,
    pub total_calls: usize,
}

impl MultiChainResult {
    pub fn new(chains: Vec<ChainOperationResult>) -> Self {
        Self {
            total_chains: chains.len(),
            total_calls: chains.iter().map(|chain| chain.call_count).sum(),
            chains,
        }
    }

    pub fn all_confirmed(&self) -> bool {
        self.chains
            .iter()
            .all(|chain| chain.status.status == OperationStatus::Confirmed)
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainOperationResult> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }
}
