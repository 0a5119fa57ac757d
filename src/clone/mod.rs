//! Snapshot cloning with per-target timing.
//!
//! [`CloneOrchestrator::run`] walks an ordered list of target names. Each
//! target is either skipped because it already exists, or provisioned from the
//! base snapshot and polled to completion. Successful targets contribute a
//! [`TimingRecord`]; failures are logged and the batch moves on.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::client::CloudClient;
use crate::poll::{PollError, PollOutcome, Poller, WaitStrategy};
use crate::provision::{EnsureOutcome, ProvisionError, Provisioner};
use crate::resource::{ResourceSpec, SpecError};

mod report;
pub mod workflow;

pub use report::{
    DEFAULT_REPORT_PATH, REPORT_TITLE, ReportError, TimingRecord, TimingReport,
};

/// Produces the instance spec for one clone target.
pub trait CloneSpecFactory: Send + Sync {
    /// Builds the spec for `target`, booting from `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when the target name or body is invalid.
    fn clone_spec(&self, snapshot: &str, target: &str) -> Result<ResourceSpec, SpecError>;
}

impl<F> CloneSpecFactory for F
where
    F: Fn(&str, &str) -> Result<ResourceSpec, SpecError> + Send + Sync,
{
    fn clone_spec(&self, snapshot: &str, target: &str) -> Result<ResourceSpec, SpecError> {
        self(snapshot, target)
    }
}

/// Why a clone target failed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CloneFailure {
    /// The target spec could not be built.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// The existence check or create request failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// The create operation finished with an error.
    #[error("operation failed: {reason}")]
    Errored {
        /// Provider message.
        reason: String,
    },
    /// The create operation did not finish before the timeout.
    #[error("timed out after {:.2} seconds", waited.as_secs_f64())]
    TimedOut {
        /// Time spent polling.
        waited: Duration,
    },
    /// Polling was cancelled.
    #[error("wait cancelled")]
    Cancelled,
    /// The operation could not be polled.
    #[error(transparent)]
    Poll(#[from] PollError),
}

/// Final state of one clone target.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetOutcome {
    /// The target already existed and was left untouched.
    Exists,
    /// The target was created; the record holds the elapsed time.
    Timed(TimingRecord),
    /// The target could not be created.
    Failed(CloneFailure),
}

/// Outcome of one target, keyed by name.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetResult {
    /// Target instance name.
    pub name: String,
    /// What happened to it.
    pub outcome: TargetOutcome,
}

/// Result of a whole orchestration run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CloneRun {
    results: Vec<TargetResult>,
    report: TimingReport,
}

impl CloneRun {
    /// Per-target outcomes in processing order.
    #[must_use]
    pub fn results(&self) -> &[TargetResult] {
        &self.results
    }

    /// Timings of successful clones in processing order.
    #[must_use]
    pub const fn report(&self) -> &TimingReport {
        &self.report
    }

    /// Consumes the run, returning the timing report.
    #[must_use]
    pub fn into_report(self) -> TimingReport {
        self.report
    }

    /// Outcome for a named target.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&TargetOutcome> {
        self.results
            .iter()
            .find(|result| result.name == name)
            .map(|result| &result.outcome)
    }

    /// Targets that failed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &CloneFailure)> {
        self.results.iter().filter_map(|result| match &result.outcome {
            TargetOutcome::Failed(failure) => Some((result.name.as_str(), failure)),
            TargetOutcome::Exists | TargetOutcome::Timed(_) => None,
        })
    }

    fn push(&mut self, name: &str, outcome: TargetOutcome) {
        if let TargetOutcome::Timed(record) = &outcome {
            self.report.push(record.clone());
        }
        self.results.push(TargetResult {
            name: name.to_owned(),
            outcome,
        });
    }
}

/// Provisions clone targets from a snapshot one at a time.
#[derive(Clone, Debug)]
pub struct CloneOrchestrator<C, W, F> {
    provisioner: Provisioner<C>,
    poller: Poller<C, W>,
    factory: F,
}

impl<C, W, F> CloneOrchestrator<C, W, F>
where
    C: CloudClient + Clone,
    W: WaitStrategy,
    F: CloneSpecFactory,
{
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(client: C, wait: W, factory: F) -> Self {
        Self {
            provisioner: Provisioner::new(client.clone()),
            poller: Poller::new(client, wait),
            factory,
        }
    }

    /// Provisions every target in order from `snapshot`.
    pub async fn run<T: AsRef<str>>(&self, snapshot: &str, targets: &[T]) -> CloneRun {
        let mut run = CloneRun::default();
        for target in targets {
            let name = target.as_ref();
            let outcome = match self.clone_target(snapshot, name).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    log_failure(name, &failure);
                    TargetOutcome::Failed(failure)
                }
            };
            run.push(name, outcome);
        }
        run
    }

    async fn clone_target(&self, snapshot: &str, name: &str) -> Result<TargetOutcome, CloneFailure> {
        let spec = self.factory.clone_spec(snapshot, name)?;
        let operation = match self.provisioner.ensure(&spec).await? {
            EnsureOutcome::AlreadyExists => return Ok(TargetOutcome::Exists),
            EnsureOutcome::Created(operation) => operation,
        };
        let started = Instant::now();

        match self.poller.await_status(&operation).await? {
            PollOutcome::Done { .. } => {
                let record = TimingRecord::new(name, started.elapsed());
                info!(
                    name,
                    elapsed_secs = record.elapsed_seconds(),
                    "instance '{name}' created in {:.2} seconds",
                    record.elapsed_seconds()
                );
                Ok(TargetOutcome::Timed(record))
            }
            PollOutcome::Errored { reason } => Err(CloneFailure::Errored { reason }),
            PollOutcome::TimedOut { waited } => Err(CloneFailure::TimedOut { waited }),
            PollOutcome::Cancelled => Err(CloneFailure::Cancelled),
        }
    }
}

fn log_failure(name: &str, failure: &CloneFailure) {
    match failure {
        CloneFailure::TimedOut { waited } => warn!(
            name,
            waited_secs = waited.as_secs_f64(),
            "instance '{name}' did not finish in time; the operation may still complete"
        ),
        CloneFailure::Cancelled => warn!(name, "stopped waiting for instance '{name}'"),
        CloneFailure::Spec(_)
        | CloneFailure::Provision(_)
        | CloneFailure::Errored { .. }
        | CloneFailure::Poll(_) => {
            error!(name, error = %failure, "failed to create instance '{name}': {failure}");
        }
    }
}
