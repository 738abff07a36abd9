#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::rpc::types::PackedUserOperation;
use multichain_aa_types::{
    AccountImplementation, Call, GasParameters, OperationId, OwnerMaterial, PreparedOperation,
    SmartAccountHandle, StatusSnapshot,
};
use multichain_core::bundler::Bundler;
use multichain_core::chain::{
    AddChainParameters, BundlerChain, ChainContext, ChainRegistry, NativeCurrency,
};
use multichain_core::error::{
    BundlerError, FactoryError, METHOD_NOT_FOUND, RpcErrorKind, RpcErrorResponse,
};
use multichain_core::factory::{AccountFactory, DerivationRequest};
use multichain_core::wallet::{
    BatchCallsRequest, CallsReceipt, CallsStatus, SigningRequest, WalletError, WalletProvider,
    batch_status, codes,
};
use multichain_sequencer::{MultiChainSequencer, Sleeper};
use url::Url;

pub const SEPOLIA: u64 = 11155111;
pub const BASE_SEPOLIA: u64 = 84532;
pub const OPTIMISM_SEPOLIA: u64 = 11155420;

pub const OWNER: Address = Address::repeat_byte(0x0e);
pub const SMART_ACCOUNT: Address = Address::repeat_byte(0xaa);

// Setup tracing for tests
pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "multichain_sequencer=debug,multichain_core=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn context(chain_id: u64, name: &str) -> ChainContext {
    ChainContext {
        chain_id,
        name: name.to_string(),
        rpc_url: Url::parse(&format!("http://localhost:8545/{chain_id}")).unwrap(),
        bundler_url: Url::parse(&format!("http://localhost:4337/{chain_id}")).unwrap(),
        explorer_url: Url::parse("https://sepolia.etherscan.io/").unwrap(),
        native_currency: NativeCurrency::ether(),
    }
}

pub fn calls(count: usize) -> Vec<Call> {
    (0..count)
        .map(|i| Call::transfer(Address::repeat_byte(i as u8 + 1), U256::from(1_000 + i)))
        .collect()
}

pub fn confirmed(tx: u8) -> StatusSnapshot {
    StatusSnapshot::Confirmed {
        transaction_hash: B256::repeat_byte(tx),
        block_number: Some(100),
        gas_used: Some(90_000),
    }
}

pub fn transport_error(chain_id: u64) -> BundlerError {
    BundlerError::Rpc {
        chain_id,
        rpc_url: "http://localhost:4337".to_string(),
        message: "connection reset".to_string(),
        kind: RpcErrorKind::TransportHttpError {
            status: 503,
            body: String::new(),
        },
    }
}

// --- Wallet ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    RequestAccounts,
    ActiveChain,
    SwitchChain(u64),
    AddChain(u64),
    SignStarted(u64),
    SignFinished(u64),
    SendCalls(u64),
    CallsStatus,
}

#[derive(Debug)]
struct WalletState {
    accounts: Vec<Address>,
    active_chain: u64,
    known_chains: BTreeSet<u64>,
    reject_connect: bool,
    reject_switch: BTreeSet<u64>,
    reject_sign: BTreeSet<u64>,
    /// `wallet_addEthereumChain` succeeds but the chain stays unknown
    ignore_added_chains: bool,
    reject_add_chain: bool,
    batching: bool,
    batch_statuses: VecDeque<Result<CallsStatus, WalletError>>,
    batches_sent: u32,
}

/// Scriptable wallet that records every request and detects overlapping
/// signing prompts.
pub struct MockWallet {
    state: Mutex<WalletState>,
    calls: Mutex<Vec<WalletCall>>,
    signing: AtomicUsize,
    overlapped: AtomicBool,
    sign_delay: Duration,
    available: bool,
}

impl MockWallet {
    pub fn new(active_chain: u64, known_chains: impl IntoIterator<Item = u64>) -> Self {
        Self {
            state: Mutex::new(WalletState {
                accounts: vec![OWNER],
                active_chain,
                known_chains: known_chains.into_iter().collect(),
                reject_connect: false,
                reject_switch: BTreeSet::new(),
                reject_sign: BTreeSet::new(),
                ignore_added_chains: false,
                reject_add_chain: false,
                batching: true,
                batch_statuses: VecDeque::new(),
                batches_sent: 0,
            }),
            calls: Mutex::new(Vec::new()),
            signing: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            sign_delay: Duration::from_millis(50),
            available: true,
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn rejecting_connect(self) -> Self {
        self.state.lock().unwrap().reject_connect = true;
        self
    }

    pub fn rejecting_switch(self, chain_id: u64) -> Self {
        self.state.lock().unwrap().reject_switch.insert(chain_id);
        self
    }

    pub fn rejecting_sign(self, chain_id: u64) -> Self {
        self.state.lock().unwrap().reject_sign.insert(chain_id);
        self
    }

    pub fn ignoring_added_chains(self) -> Self {
        self.state.lock().unwrap().ignore_added_chains = true;
        self
    }

    pub fn rejecting_add_chain(self) -> Self {
        self.state.lock().unwrap().reject_add_chain = true;
        self
    }

    /// Answers `wallet_sendCalls` with 4200
    pub fn without_batching(self) -> Self {
        self.state.lock().unwrap().batching = false;
        self
    }

    /// Scripted `wallet_getCallsStatus` answers. Once they run out every
    /// batch is reported confirmed.
    pub fn then_batch(self, answer: Result<CallsStatus, WalletError>) -> Self {
        self.state.lock().unwrap().batch_statuses.push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&WalletCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn signed_chains(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WalletCall::SignStarted(chain_id) => Some(chain_id),
                _ => None,
            })
            .collect()
    }

    pub fn signing_overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> u64 {
        self.state.lock().unwrap().active_chain
    }

    fn record(&self, call: WalletCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WalletProvider for MockWallet {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.record(WalletCall::RequestAccounts);
        let state = self.state.lock().unwrap();
        if state.reject_connect {
            return Err(WalletError::user_rejected());
        }
        Ok(state.accounts.clone())
    }

    async fn active_chain(&self) -> Result<u64, WalletError> {
        self.record(WalletCall::ActiveChain);
        Ok(self.state.lock().unwrap().active_chain)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.record(WalletCall::SwitchChain(chain_id));
        let mut state = self.state.lock().unwrap();
        if state.reject_switch.contains(&chain_id) {
            return Err(WalletError::user_rejected());
        }
        if !state.known_chains.contains(&chain_id) {
            return Err(WalletError::unrecognized_chain(chain_id));
        }
        state.active_chain = chain_id;
        Ok(())
    }

    async fn add_chain(&self, params: &AddChainParameters) -> Result<(), WalletError> {
        let chain_id = u64::from_str_radix(params.chain_id.trim_start_matches("0x"), 16)
            .map_err(|_| WalletError::new(-32602, "bad chain id"))?;
        self.record(WalletCall::AddChain(chain_id));
        let mut state = self.state.lock().unwrap();
        if state.reject_add_chain {
            return Err(WalletError::user_rejected());
        }
        if !state.ignore_added_chains {
            state.known_chains.insert(chain_id);
        }
        Ok(())
    }

    async fn sign_operation(&self, request: &SigningRequest) -> Result<Bytes, WalletError> {
        self.record(WalletCall::SignStarted(request.chain_id));
        if self.signing.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        tokio::time::sleep(self.sign_delay).await;

        self.signing.fetch_sub(1, Ordering::SeqCst);
        self.record(WalletCall::SignFinished(request.chain_id));

        if self
            .state
            .lock()
            .unwrap()
            .reject_sign
            .contains(&request.chain_id)
        {
            return Err(WalletError::new(codes::USER_REJECTED, "User denied signature"));
        }
        Ok(Bytes::from(vec![0x11; 65]))
    }

    async fn send_calls(&self, request: &BatchCallsRequest) -> Result<OperationId, WalletError> {
        self.record(WalletCall::SendCalls(request.chain_id));
        if self.signing.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        tokio::time::sleep(self.sign_delay).await;
        self.signing.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if !state.batching {
            return Err(WalletError::unsupported_method("wallet_sendCalls"));
        }
        if state.active_chain != request.chain_id {
            return Err(WalletError::new(
                -32602,
                format!("wallet is on chain {}", state.active_chain),
            ));
        }
        if state.reject_sign.contains(&request.chain_id) {
            return Err(WalletError::user_rejected());
        }
        state.batches_sent += 1;
        Ok(OperationId::new(vec![
            request.chain_id as u8,
            request.calls.len() as u8,
            state.batches_sent as u8,
        ]))
    }

    async fn calls_status(&self, _id: &OperationId) -> Result<CallsStatus, WalletError> {
        self.record(WalletCall::CallsStatus);
        match self.state.lock().unwrap().batch_statuses.pop_front() {
            Some(answer) => answer,
            None => Ok(CallsStatus {
                status: batch_status::CONFIRMED,
                receipts: vec![CallsReceipt {
                    transaction_hash: B256::repeat_byte(0x5c),
                    block_number: Some(200),
                    gas_used: Some(60_000),
                }],
            }),
        }
    }
}

// --- Bundler ---

/// Bundler double with scripted status answers. Once the script runs out
/// every status request answers with `fallback_status`.
pub struct MockBundler {
    chain_id: u64,
    gas: Option<GasParameters>,
    statuses: Mutex<VecDeque<Result<StatusSnapshot, BundlerError>>>,
    fallback_status: StatusSnapshot,
    pub prepared: Mutex<Vec<(usize, GasParameters)>>,
    pub sent: AtomicU32,
    pub status_requests: AtomicU32,
}

impl MockBundler {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas: Some(GasParameters::new(10 * GasParameters::GWEI, GasParameters::GWEI)),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: confirmed(chain_id as u8),
            prepared: Mutex::new(Vec::new()),
            sent: AtomicU32::new(0),
            status_requests: AtomicU32::new(0),
        }
    }

    pub fn without_gas_prices(mut self) -> Self {
        self.gas = None;
        self
    }

    pub fn always(mut self, status: StatusSnapshot) -> Self {
        self.fallback_status = status;
        self
    }

    pub fn then(self, answer: Result<StatusSnapshot, BundlerError>) -> Self {
        self.statuses.lock().unwrap().push_back(answer);
        self
    }

    pub fn status_requests(&self) -> u32 {
        self.status_requests.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> u32 {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn prepared(&self) -> Vec<(usize, GasParameters)> {
        self.prepared.lock().unwrap().clone()
    }
}

impl Bundler for MockBundler {
    async fn gas_parameters(&self) -> Result<GasParameters, BundlerError> {
        self.gas.ok_or_else(|| BundlerError::Rpc {
            chain_id: self.chain_id,
            rpc_url: "http://localhost:4337".to_string(),
            message: "Method not found".to_string(),
            kind: RpcErrorKind::ErrorResp(RpcErrorResponse {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
                data: None,
            }),
        })
    }

    async fn prepare_operation(
        &self,
        account: &SmartAccountHandle,
        calls: &[Call],
        gas: GasParameters,
    ) -> Result<PreparedOperation, BundlerError> {
        let nonce = {
            let mut prepared = self.prepared.lock().unwrap();
            prepared.push((calls.len(), gas));
            prepared.len()
        };
        let op = PackedUserOperation {
            sender: account.address,
            nonce: U256::from(nonce),
            factory: None,
            factory_data: None,
            call_data: Bytes::from(vec![calls.len() as u8]),
            call_gas_limit: U256::from(100_000),
            verification_gas_limit: U256::from(100_000),
            pre_verification_gas: U256::from(50_000),
            max_fee_per_gas: U256::from(gas.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(gas.max_priority_fee_per_gas),
            paymaster: None,
            paymaster_data: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            signature: Bytes::new(),
        };
        PreparedOperation::new(op, Address::repeat_byte(0x77), self.chain_id)
            .map_err(|err| BundlerError::preparation(self.chain_id, err.to_string()))
    }

    async fn send_operation(
        &self,
        prepared: &PreparedOperation,
        _signature: Bytes,
    ) -> Result<OperationId, BundlerError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(OperationId::from(prepared.hash))
    }

    async fn operation_status(&self, _id: &OperationId) -> Result<StatusSnapshot, BundlerError> {
        self.status_requests.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(self.fallback_status.clone()),
        }
    }
}

// --- Factory ---

/// Resolves every owner to the same account unless told otherwise per chain.
#[derive(Default)]
pub struct MockFactory {
    overrides: BTreeMap<u64, Address>,
    failing: BTreeSet<u64>,
}

impl MockFactory {
    pub fn diverging_on(mut self, chain_id: u64, address: Address) -> Self {
        self.overrides.insert(chain_id, address);
        self
    }

    pub fn failing_on(mut self, chain_id: u64) -> Self {
        self.failing.insert(chain_id);
        self
    }
}

impl AccountFactory for MockFactory {
    async fn derive_account(
        &self,
        chain: &ChainContext,
        request: &DerivationRequest,
    ) -> Result<SmartAccountHandle, FactoryError> {
        if self.failing.contains(&chain.chain_id) {
            return Err(FactoryError::Lookup {
                chain_id: chain.chain_id,
                message: "factory not deployed".to_string(),
            });
        }
        let owner = request.owner.owner_address();
        Ok(SmartAccountHandle {
            chain_id: chain.chain_id,
            address: self
                .overrides
                .get(&chain.chain_id)
                .copied()
                .unwrap_or(SMART_ACCOUNT),
            owner,
            implementation: request.implementation,
            deploy_salt: request.deploy_salt,
            factory: None,
            factory_data: None,
        })
    }
}

pub fn eoa_request() -> DerivationRequest {
    DerivationRequest {
        owner: OwnerMaterial::eoa(OWNER),
        deploy_salt: B256::ZERO,
        implementation: AccountImplementation::Hybrid,
    }
}

// --- Sleeper ---

/// Records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.slept.lock().unwrap().push(duration);
        std::future::ready(())
    }
}

// --- Wiring ---

pub type TestChains = ChainRegistry<BundlerChain<MockBundler>>;

pub fn registry(bundlers: impl IntoIterator<Item = (ChainContext, MockBundler)>) -> TestChains {
    ChainRegistry::new(
        bundlers
            .into_iter()
            .map(|(context, bundler)| BundlerChain::new(context, bundler)),
    )
}

pub fn two_chains() -> TestChains {
    registry([
        (context(SEPOLIA, "Sepolia"), MockBundler::new(SEPOLIA)),
        (
            context(BASE_SEPOLIA, "Base Sepolia"),
            MockBundler::new(BASE_SEPOLIA),
        ),
    ])
}

pub type TestSequencer = MultiChainSequencer<MockWallet, TestChains, MockFactory, RecordingSleeper>;

pub fn sequencer(
    wallet: Arc<MockWallet>,
    chains: TestChains,
    factory: MockFactory,
) -> (TestSequencer, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let sequencer = MultiChainSequencer::new(wallet, Arc::new(chains), Arc::new(factory))
        .with_sleeper(sleeper.clone());
    (sequencer, sleeper)
}
