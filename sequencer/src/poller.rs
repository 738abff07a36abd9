use std::time::Duration;

use futures::{Stream, StreamExt, pin_mut, stream};
use multichain_aa_types::{OperationId, StatusRecord, StatusSnapshot};
use multichain_core::{
    bundler::Bundler,
    constants::{DEFAULT_POLL_ERROR_BACKOFF, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS},
    error::BundlerError,
    wallet::{WalletError, WalletProvider},
};
use thiserror::Error;

/// Source of delays between polls. Tests substitute a recording fake.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Clone, Error)]
pub enum StatusError {
    #[error(transparent)]
    Bundler(#[from] BundlerError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

impl StatusError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Bundler(err) => err.is_transient(),
            Self::Wallet(err) => err.is_disconnected(),
        }
    }
}

/// Where the status of a submitted operation is read from.
pub trait StatusSource: Send + Sync {
    fn status(
        &self,
        id: &OperationId,
    ) -> impl Future<Output = Result<StatusSnapshot, StatusError>> + Send;
}

impl<B: Bundler> StatusSource for &B {
    async fn status(&self, id: &OperationId) -> Result<StatusSnapshot, StatusError> {
        Ok(self.operation_status(id).await?)
    }
}

/// Batches sent with `wallet_sendCalls`, tracked through `wallet_getCallsStatus`.
pub struct WalletCalls<'a, W>(pub &'a W);

impl<W: WalletProvider> StatusSource for WalletCalls<'_, W> {
    async fn status(&self, id: &OperationId) -> Result<StatusSnapshot, StatusError> {
        let status = self.0.calls_status(id).await?;
        Ok(status.snapshot())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Delay after a failed status request, in place of `interval`
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
            error_backoff: DEFAULT_POLL_ERROR_BACKOFF,
        }
    }
}

/// One step of a status poll.
#[derive(Debug, Clone)]
pub enum PollUpdate {
    /// The bundler answered, the operation is not terminal yet
    Pending { attempt: u32 },
    /// The status request failed. Counts as an attempt, never surfaces as an error.
    Inconclusive { attempt: u32, error: StatusError },
    /// Terminal: observed status, or a synthetic timeout
    Finished(StatusRecord),
}

enum Cursor {
    Poll { attempt: u32, delay: Option<Duration> },
    Exhausted { attempts: u32 },
    Done,
}

/// Polls one operation until it reaches a terminal status or the attempt
/// budget runs out. There is no delay after the last attempt.
pub struct StatusPoller<'a, Src, S> {
    source: Src,
    sleeper: &'a S,
    config: PollConfig,
    chain_id: u64,
    id: OperationId,
}

impl<'a, Src: StatusSource, S: Sleeper> StatusPoller<'a, Src, S> {
    pub fn new(
        source: Src,
        sleeper: &'a S,
        config: PollConfig,
        chain_id: u64,
        id: OperationId,
    ) -> Self {
        Self {
            source,
            sleeper,
            config,
            chain_id,
            id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn operation_id(&self) -> &OperationId {
        &self.id
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Lazy stream of poll steps. Ends right after the first `Finished`.
    pub fn updates(&self) -> impl Stream<Item = PollUpdate> + Send + '_ {
        let initial = if self.config.max_attempts == 0 {
            Cursor::Exhausted { attempts: 0 }
        } else {
            Cursor::Poll {
                attempt: 0,
                delay: None,
            }
        };

        stream::unfold(initial, move |cursor| async move {
            let (attempt, delay) = match cursor {
                Cursor::Done => return None,
                Cursor::Exhausted { attempts } => {
                    return Some((
                        PollUpdate::Finished(StatusRecord::timeout(attempts)),
                        Cursor::Done,
                    ));
                }
                Cursor::Poll { attempt, delay } => (attempt, delay),
            };

            if let Some(delay) = delay {
                self.sleeper.sleep(delay).await;
            }
            let attempt = attempt + 1;

            let (update, next_delay) = match self.source.status(&self.id).await {
                Ok(snapshot) => match StatusRecord::from_snapshot(snapshot, attempt) {
                    Some(record) => return Some((PollUpdate::Finished(record), Cursor::Done)),
                    None => (PollUpdate::Pending { attempt }, self.config.interval),
                },
                Err(error) => (
                    PollUpdate::Inconclusive { attempt, error },
                    self.config.error_backoff,
                ),
            };

            let next = if attempt >= self.config.max_attempts {
                Cursor::Exhausted { attempts: attempt }
            } else {
                Cursor::Poll {
                    attempt,
                    delay: Some(next_delay),
                }
            };
            Some((update, next))
        })
    }

    /// Drive the poll to completion
    pub async fn wait_for_terminal(&self) -> StatusRecord {
        let updates = self.updates();
        pin_mut!(updates);

        while let Some(update) = updates.next().await {
            self.trace(&update);
            if let PollUpdate::Finished(record) = update {
                return record;
            }
        }

        StatusRecord::timeout(self.config.max_attempts)
    }

    pub fn trace(&self, update: &PollUpdate) {
        match update {
            PollUpdate::Pending { attempt } => {
                tracing::debug!(
                    chain_id = self.chain_id,
                    operation_id = %self.id,
                    attempt,
                    "Operation still pending"
                );
            }
            PollUpdate::Inconclusive { attempt, error } => {
                tracing::warn!(
                    chain_id = self.chain_id,
                    operation_id = %self.id,
                    attempt,
                    transient = error.is_transient(),
                    error = %error,
                    "Status check failed, backing off"
                );
            }
            PollUpdate::Finished(record) => {
                tracing::info!(
                    chain_id = self.chain_id,
                    operation_id = %self.id,
                    status = %record.status,
                    attempts = record.attempts,
                    "Operation reached terminal status"
                );
            }
        }
    }
}
