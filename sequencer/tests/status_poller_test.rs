mod fixtures;
use fixtures::*;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use multichain_aa_types::{OperationId, OperationStatus, StatusSnapshot};
use multichain_core::chain::{Chain, ChainService};
use multichain_core::error::{SequencerError, Step};
use multichain_sequencer::{
    LogOutcome, MultiChainSequencer, PollConfig, PollUpdate, Session, StatusPoller, TokioSleeper,
};

fn operation_id() -> OperationId {
    OperationId::new(vec![0xab; 32])
}

#[tokio::test(start_paused = true)]
async fn always_pending_times_out_after_thirty_polls() {
    setup_tracing();

    let bundler = MockBundler::new(SEPOLIA).always(StatusSnapshot::Pending);
    let poller = StatusPoller::new(
        &bundler,
        &TokioSleeper,
        PollConfig::default(),
        SEPOLIA,
        operation_id(),
    );

    let started = tokio::time::Instant::now();
    let record = poller.wait_for_terminal().await;
    let elapsed = started.elapsed();

    assert_eq!(record.status, OperationStatus::Timeout);
    assert_eq!(record.attempts, 30);
    assert_eq!(bundler.status_requests(), 30);
    assert!(elapsed <= Duration::from_secs(60), "took {elapsed:?}");
    assert!(elapsed >= Duration::from_secs(58), "took {elapsed:?}");
}

#[tokio::test]
async fn no_delay_after_the_last_attempt() {
    let bundler = MockBundler::new(SEPOLIA).always(StatusSnapshot::Pending);
    let sleeper = RecordingSleeper::default();
    let poller = StatusPoller::new(
        &bundler,
        &sleeper,
        PollConfig::default(),
        SEPOLIA,
        operation_id(),
    );

    poller.wait_for_terminal().await;

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 29);
    assert!(delays.iter().all(|delay| *delay == Duration::from_secs(2)));
    assert_eq!(sleeper.total(), Duration::from_secs(58));
}

#[tokio::test]
async fn terminal_status_returns_without_further_polling() {
    let bundler = MockBundler::new(SEPOLIA)
        .then(Ok(StatusSnapshot::Pending))
        .then(Ok(confirmed(7)))
        .always(StatusSnapshot::Pending);
    let sleeper = RecordingSleeper::default();
    let poller = StatusPoller::new(
        &bundler,
        &sleeper,
        PollConfig::default(),
        SEPOLIA,
        operation_id(),
    );

    let record = poller.wait_for_terminal().await;

    assert_eq!(record.status, OperationStatus::Confirmed);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.gas_used, Some(90_000));
    assert_eq!(bundler.status_requests(), 2);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
}

#[tokio::test]
async fn failed_operations_are_terminal() {
    let bundler = MockBundler::new(SEPOLIA).then(Ok(StatusSnapshot::Failed {
        transaction_hash: None,
        block_number: None,
        reason: Some("AA23 reverted".to_string()),
    }));
    let sleeper = RecordingSleeper::default();
    let poller = StatusPoller::new(
        &bundler,
        &sleeper,
        PollConfig::default(),
        SEPOLIA,
        operation_id(),
    );

    let record = poller.wait_for_terminal().await;

    assert_eq!(record.status, OperationStatus::Failed);
    assert_eq!(record.reason.as_deref(), Some("AA23 reverted"));
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn status_errors_back_off_and_count_as_attempts() {
    setup_tracing();

    let bundler = MockBundler::new(SEPOLIA)
        .then(Err(transport_error(SEPOLIA)))
        .then(Ok(StatusSnapshot::Pending))
        .then(Ok(confirmed(3)));
    let sleeper = RecordingSleeper::default();
    let poller = StatusPoller::new(
        &bundler,
        &sleeper,
        PollConfig::default(),
        SEPOLIA,
        operation_id(),
    );

    let updates: Vec<PollUpdate> = poller.updates().collect().await;

    assert_eq!(updates.len(), 3);
    assert!(matches!(
        updates[0],
        PollUpdate::Inconclusive { attempt: 1, .. }
    ));
    assert!(matches!(updates[1], PollUpdate::Pending { attempt: 2 }));
    let PollUpdate::Finished(record) = &updates[2] else {
        panic!("expected a terminal update, got {:?}", updates[2]);
    };
    assert_eq!(record.status, OperationStatus::Confirmed);
    assert_eq!(record.attempts, 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(5), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn errors_until_exhaustion_still_time_out() {
    let mut bundler = MockBundler::new(SEPOLIA);
    for _ in 0..3 {
        bundler = bundler.then(Err(transport_error(SEPOLIA)));
    }
    let sleeper = RecordingSleeper::default();
    let config = PollConfig {
        max_attempts: 3,
        ..PollConfig::default()
    };
    let poller = StatusPoller::new(&bundler, &sleeper, config, SEPOLIA, operation_id());

    let record = poller.wait_for_terminal().await;

    assert_eq!(record.status, OperationStatus::Timeout);
    assert_eq!(record.attempts, 3);
    assert_eq!(bundler.status_requests(), 3);
    assert_eq!(sleeper.total(), Duration::from_secs(10));
}

#[tokio::test]
async fn zero_budget_times_out_without_polling() {
    let bundler = MockBundler::new(SEPOLIA);
    let sleeper = RecordingSleeper::default();
    let config = PollConfig {
        max_attempts: 0,
        ..PollConfig::default()
    };
    let poller = StatusPoller::new(&bundler, &sleeper, config, SEPOLIA, operation_id());

    let record = poller.wait_for_terminal().await;

    assert_eq!(record.status, OperationStatus::Timeout);
    assert_eq!(record.attempts, 0);
    assert_eq!(bundler.status_requests(), 0);
}

#[tokio::test]
async fn sequencer_polls_through_the_chain_bundler() {
    let chains = registry([(
        context(SEPOLIA, "Sepolia"),
        MockBundler::new(SEPOLIA)
            .then(Ok(StatusSnapshot::Pending))
            .then(Ok(confirmed(9))),
    )]);
    let wallet = Arc::new(MockWallet::new(SEPOLIA, [SEPOLIA]));
    let (sequencer, sleeper) = sequencer(wallet, chains, MockFactory::default());
    let mut session = Session::new();

    let record = sequencer
        .poll_status(&mut session, SEPOLIA, &operation_id())
        .await
        .unwrap();

    assert_eq!(record.status, OperationStatus::Confirmed);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    let bundler = sequencer.chains().get_chain(SEPOLIA).unwrap().bundler();
    assert_eq!(bundler.status_requests(), 2);
}

fn poll_details(session: &Session) -> Vec<String> {
    session
        .log()
        .iter()
        .filter(|entry| entry.step == Step::Poll)
        .filter_map(|entry| match &entry.outcome {
            LogOutcome::Succeeded { detail } => Some(detail.clone()),
            LogOutcome::Failed { .. } => None,
        })
        .collect()
}

async fn submitted_on_sepolia(
    bundler: MockBundler,
) -> (TestSequencer, Session, multichain_aa_types::PendingOperation) {
    let wallet = Arc::new(MockWallet::new(SEPOLIA, [SEPOLIA]));
    let (sequencer, _) = sequencer(
        wallet,
        registry([(context(SEPOLIA, "Sepolia"), bundler)]),
        MockFactory::default(),
    );
    let mut session = Session::new();
    sequencer.connect(&mut session).await.unwrap();
    sequencer
        .create_smart_account(&mut session, SEPOLIA, &eoa_request())
        .await
        .unwrap();
    let op = sequencer
        .switch_and_submit(&mut session, SEPOLIA, &calls(2))
        .await
        .unwrap();
    (sequencer, session, op)
}

#[tokio::test]
async fn polling_moves_the_tracked_operation_through_pending() {
    setup_tracing();

    let (sequencer, mut session, op) = submitted_on_sepolia(
        MockBundler::new(SEPOLIA)
            .then(Ok(StatusSnapshot::Pending))
            .then(Err(transport_error(SEPOLIA)))
            .then(Ok(StatusSnapshot::Pending))
            .then(Ok(confirmed(4))),
    )
    .await;
    assert_eq!(
        session.operation(&op.id).map(|op| op.status),
        Some(OperationStatus::Submitted)
    );

    let record = sequencer
        .poll_status(&mut session, SEPOLIA, &op.id)
        .await
        .unwrap();

    assert_eq!(record.status, OperationStatus::Confirmed);
    assert_eq!(
        session.operation(&op.id).map(|op| op.status),
        Some(OperationStatus::Confirmed)
    );
    assert_eq!(session.state().pending_operations, 0);
    assert_eq!(poll_details(&session), vec!["pending", "confirmed"]);
}

#[tokio::test]
async fn exhausted_poll_settles_the_operation_as_timeout() {
    let (sequencer, mut session, op) =
        submitted_on_sepolia(MockBundler::new(SEPOLIA).always(StatusSnapshot::Pending)).await;

    let record = sequencer
        .poll_status(&mut session, SEPOLIA, &op.id)
        .await
        .unwrap();

    assert_eq!(record.status, OperationStatus::Timeout);
    assert_eq!(record.attempts, 30);
    assert_eq!(
        session.operation(&op.id).map(|op| op.status),
        Some(OperationStatus::Timeout)
    );
    assert_eq!(session.state().pending_operations, 0);
    assert_eq!(poll_details(&session), vec!["pending", "timeout"]);
}

#[tokio::test]
async fn polling_an_unknown_chain_fails() {
    let wallet = Arc::new(MockWallet::new(SEPOLIA, [SEPOLIA]));
    let sequencer = MultiChainSequencer::new(
        wallet,
        Arc::new(two_chains()),
        Arc::new(MockFactory::default()),
    );
    let mut session = Session::new();

    let err = sequencer
        .poll_status(&mut session, 1, &operation_id())
        .await
        .unwrap_err();

    assert!(matches!(err, SequencerError::UnknownChain { chain_id: 1 }));
    let entry = session.log().last().unwrap();
    assert_eq!(entry.chain_id, Some(1));
    assert!(matches!(entry.outcome, LogOutcome::Failed { .. }));
}
