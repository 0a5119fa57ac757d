//! Operation polling with a pluggable wait strategy.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, CloudClient};
use crate::resource::{Operation, OperationStatus, Resource};

/// Interval between polls when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Why a wait ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitSignal {
    /// The interval elapsed; poll again.
    Elapsed,
    /// The caller asked to stop waiting.
    Cancelled,
}

/// Future returned by [`WaitStrategy::pause`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = WaitSignal> + Send + 'a>>;

/// Decides how long to wait between polls and when to give up.
pub trait WaitStrategy: Send + Sync {
    /// Total time after which polling stops with [`PollOutcome::TimedOut`].
    fn timeout(&self) -> Option<Duration>;

    /// Waits for one interval.
    fn pause(&self) -> WaitFuture<'_>;
}

/// Constant-interval waits on the tokio timer.
#[derive(Clone, Debug)]
pub struct FixedInterval {
    interval: Duration,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl FixedInterval {
    /// Waits `interval` between polls, with no timeout.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    /// Gives up after `timeout` of total polling.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stops waiting as soon as `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl WaitStrategy for FixedInterval {
    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn pause(&self) -> WaitFuture<'_> {
        Box::pin(async move {
            let Some(token) = &self.cancel else {
                sleep(self.interval).await;
                return WaitSignal::Elapsed;
            };
            tokio::select! {
                () = token.cancelled() => WaitSignal::Cancelled,
                () = sleep(self.interval) => WaitSignal::Elapsed,
            }
        })
    }
}

/// Terminal results of [`Poller::await_completion`] and [`Poller::await_status`].
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The operation finished successfully. `resource` is the target as read
    /// afterwards, or `None` when the operation removed it or the read was
    /// skipped.
    Done {
        /// Final state of the target resource.
        resource: Option<Resource>,
        /// Number of polls issued.
        polls: u32,
    },
    /// The provider reported the operation as failed.
    Errored {
        /// Provider message.
        reason: String,
    },
    /// The timeout expired first. The remote operation keeps running.
    TimedOut {
        /// Time spent polling.
        waited: Duration,
    },
    /// The wait strategy was cancelled. The remote operation keeps running.
    Cancelled,
}

/// Errors raised while polling.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError {
    /// Raised when the client cannot read the operation or its target.
    #[error("failed to poll operation {operation}: {source}")]
    Client {
        /// Operation identifier.
        operation: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
}

/// Waits for operations to reach a terminal state.
#[derive(Clone, Debug)]
pub struct Poller<C, W> {
    client: C,
    wait: W,
}

impl<C, W> Poller<C, W>
where
    C: CloudClient,
    W: WaitStrategy,
{
    /// Creates a poller.
    #[must_use]
    pub const fn new(client: C, wait: W) -> Self {
        Self { client, wait }
    }

    /// Polls `operation` until it is DONE or ERROR, the timeout expires, or the
    /// wait is cancelled, then reads the target back when it is DONE. The
    /// first poll is issued immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Client`] when the client fails to answer.
    pub async fn await_completion(&self, operation: &Operation) -> Result<PollOutcome, PollError> {
        match self.await_status(operation).await? {
            PollOutcome::Done { polls, .. } => {
                let target = &operation.target;
                let resource = self
                    .client
                    .get(target.kind, &target.name)
                    .await
                    .map_err(|source| client_error(operation, source))?;
                Ok(PollOutcome::Done { resource, polls })
            }
            outcome => Ok(outcome),
        }
    }

    /// Like [`Poller::await_completion`] but returns as soon as DONE is
    /// observed, without reading the target. `Done` carries no resource.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Client`] when the client fails to answer.
    pub async fn await_status(&self, operation: &Operation) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            let state = self
                .client
                .poll_operation(operation)
                .await
                .map_err(|source| client_error(operation, source))?;
            polls = polls.saturating_add(1);
            debug!(
                operation = %operation.id,
                target = %operation.target,
                status = %state.status,
                polls,
                "polled operation"
            );

            match state.status {
                OperationStatus::Done => {
                    return Ok(PollOutcome::Done {
                        resource: None,
                        polls,
                    });
                }
                OperationStatus::Error => {
                    let reason = state
                        .error
                        .unwrap_or_else(|| String::from("operation reported an error"));
                    return Ok(PollOutcome::Errored { reason });
                }
                OperationStatus::Pending | OperationStatus::Running => {}
            }

            if let Some(limit) = self.wait.timeout()
                && started.elapsed() >= limit
            {
                return Ok(PollOutcome::TimedOut {
                    waited: started.elapsed(),
                });
            }

            if self.wait.pause().await == WaitSignal::Cancelled {
                return Ok(PollOutcome::Cancelled);
            }
        }
    }
}

fn client_error(operation: &Operation, source: ClientError) -> PollError {
    PollError::Client {
        operation: operation.id.clone(),
        source,
    }
}
