pub mod poller;
pub mod result;
pub mod sequencer;
pub mod session;

pub use poller::{
    PollConfig, PollUpdate, Sleeper, StatusError, StatusPoller, StatusSource, TokioSleeper,
    WalletCalls,
};
pub use result::{ChainOperationResult, MultiChainResult};
pub use sequencer::{ChainRequest, ConnectOutcome, MultiChainSequencer, SequencerConfig};
pub use session::{LogOutcome, OperationLogEntry, Session, SessionState};
