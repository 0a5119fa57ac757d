//! Fatal setup steps shared by the workflows.
//!
//! A setup step ensures one resource and waits for it to be usable. Unlike a
//! clone target, any failure aborts the surrounding workflow.

use std::time::Duration;

use thiserror::Error;

use crate::client::{ClientError, CloudClient};
use crate::poll::{PollError, PollOutcome, Poller, WaitStrategy};
use crate::provision::{EnsureOutcome, ProvisionError, Provisioner};
use crate::resource::{Operation, Resource, ResourceRef, ResourceSpec};

/// Errors raised by a setup step.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StepError {
    /// The existence check or create request failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// The operation finished with an error.
    #[error("{target} failed: {reason}")]
    Errored {
        /// Resource the operation acted on.
        target: ResourceRef,
        /// Provider message.
        reason: String,
    },
    /// The operation did not finish before the timeout.
    #[error("{target} did not finish within {:.0} seconds", waited.as_secs_f64())]
    TimedOut {
        /// Resource the operation acted on.
        target: ResourceRef,
        /// Time spent polling.
        waited: Duration,
    },
    /// Polling was cancelled.
    #[error("stopped waiting for {target}")]
    Cancelled {
        /// Resource the operation acted on.
        target: ResourceRef,
    },
    /// The operation could not be polled.
    #[error(transparent)]
    Poll(#[from] PollError),
    /// An existing resource could not be read back.
    #[error("failed to read {target}: {source}")]
    Lookup {
        /// Resource being read.
        target: ResourceRef,
        /// Client failure.
        #[source]
        source: ClientError,
    },
}

/// Result of a successful setup step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Whether this run created the resource.
    pub created: bool,
    /// The resource as last read, when the provider returned it.
    pub resource: Option<Resource>,
}

/// Runs setup steps against one client and wait strategy.
#[derive(Clone, Debug)]
pub struct StepRunner<C, W> {
    provisioner: Provisioner<C>,
    poller: Poller<C, W>,
}

impl<C, W> StepRunner<C, W>
where
    C: CloudClient + Clone,
    W: WaitStrategy,
{
    /// Creates a runner.
    #[must_use]
    pub fn new(client: C, wait: W) -> Self {
        Self {
            provisioner: Provisioner::new(client.clone()),
            poller: Poller::new(client, wait),
        }
    }

    /// Underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        self.provisioner.client()
    }

    /// Ensures the resource exists without waiting for a create to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Provision`] when the check or create fails.
    pub async fn submit(&self, spec: &ResourceSpec) -> Result<EnsureOutcome, StepError> {
        Ok(self.provisioner.ensure(spec).await?)
    }

    /// Ensures the resource exists and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`StepError`] when the resource cannot be created or read.
    pub async fn ensure_ready(&self, spec: &ResourceSpec) -> Result<StepOutcome, StepError> {
        match self.submit(spec).await? {
            EnsureOutcome::AlreadyExists => {
                let resource = self
                    .client()
                    .get(spec.kind(), spec.name())
                    .await
                    .map_err(|source| StepError::Lookup {
                        target: spec.reference(),
                        source,
                    })?;
                Ok(StepOutcome {
                    created: false,
                    resource,
                })
            }
            EnsureOutcome::Created(operation) => {
                let resource = self.await_operation(&operation).await?;
                Ok(StepOutcome {
                    created: true,
                    resource,
                })
            }
        }
    }

    /// Waits for an operation and returns its target as read afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StepError`] unless the operation completes successfully.
    pub async fn await_operation(&self, operation: &Operation) -> Result<Option<Resource>, StepError> {
        let target = operation.target.clone();
        match self.poller.await_completion(operation).await? {
            PollOutcome::Done { resource, .. } => Ok(resource),
            PollOutcome::Errored { reason } => Err(StepError::Errored { target, reason }),
            PollOutcome::TimedOut { waited } => Err(StepError::TimedOut { target, waited }),
            PollOutcome::Cancelled => Err(StepError::Cancelled { target }),
        }
    }
}
