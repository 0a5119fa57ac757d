//! Deletes named instances and verifies none remain.
//!
//! Each named instance that exists is deleted and its operation awaited before
//! the next one starts. Absent names are skipped. A final listing fails the
//! teardown if any named instance is still present.

use thiserror::Error;
use tracing::{info, warn};

use crate::client::{ClientError, CloudClient};
use crate::poll::WaitStrategy;
use crate::resource::ResourceKind;
use crate::step::{StepError, StepRunner};

/// Summary of teardown work.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownSummary {
    /// Instances deleted by this run, in order.
    pub deleted: Vec<String>,
    /// Named instances that did not exist.
    pub absent: Vec<String>,
}

/// Errors returned by a teardown.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TeardownError {
    /// Raised when no instance names were given.
    #[error("no instances named for teardown")]
    NoTargets,
    /// Raised when a lookup, delete request or listing fails.
    #[error("teardown of '{name}' failed: {source}")]
    Client {
        /// Instance being handled, or `*` for the final listing.
        name: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
    /// Raised when a delete operation does not complete successfully.
    #[error(transparent)]
    Wait(#[from] StepError),
    /// Raised when named instances remain after deletion.
    #[error("instances remain after teardown: {}", remaining.join(", "))]
    NotClean {
        /// Names still listed.
        remaining: Vec<String>,
    },
}

/// Deletes instances through one client and wait strategy.
#[derive(Clone, Debug)]
pub struct Teardown<C, W> {
    steps: StepRunner<C, W>,
}

impl<C, W> Teardown<C, W>
where
    C: CloudClient + Clone,
    W: WaitStrategy,
{
    /// Creates a teardown runner.
    #[must_use]
    pub fn new(client: C, wait: W) -> Self {
        Self {
            steps: StepRunner::new(client, wait),
        }
    }

    /// Deletes every named instance that exists, then verifies.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError`] when a client call or delete operation
    /// fails, or when any named instance is still listed afterwards.
    pub async fn execute<T: AsRef<str>>(&self, names: &[T]) -> Result<TeardownSummary, TeardownError> {
        if names.is_empty() {
            return Err(TeardownError::NoTargets);
        }

        let client = self.steps.client();
        let mut summary = TeardownSummary::default();
        for name in names.iter().map(|name| name.as_ref()) {
            let found = client
                .get(ResourceKind::Instance, name)
                .await
                .map_err(|source| client_error(name, source))?;
            if found.is_none() {
                info!(name, "instance '{name}' does not exist, skipping");
                summary.absent.push(name.to_owned());
                continue;
            }

            let operation = match client.delete(ResourceKind::Instance, name).await {
                Ok(operation) => operation,
                Err(ClientError::NotFound { .. }) => {
                    warn!(name, "instance '{name}' disappeared before deletion");
                    summary.absent.push(name.to_owned());
                    continue;
                }
                Err(source) => return Err(client_error(name, source)),
            };
            info!(name, operation = %operation.id, "deleting instance '{name}'");
            self.steps.await_operation(&operation).await?;
            info!(name, "instance '{name}' deleted");
            summary.deleted.push(name.to_owned());
        }

        let listed = client
            .list(ResourceKind::Instance)
            .await
            .map_err(|source| client_error("*", source))?;
        let remaining: Vec<String> = names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| listed.iter().any(|resource| resource.name == *name))
            .map(str::to_owned)
            .collect();
        if !remaining.is_empty() {
            return Err(TeardownError::NotClean { remaining });
        }
        Ok(summary)
    }
}

fn client_error(name: &str, source: ClientError) -> TeardownError {
    TeardownError::Client {
        name: name.to_owned(),
        source,
    }
}
