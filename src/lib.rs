//! Core library for the snapfleet Compute Engine automation tool.
//!
//! The crate provisions cloud resources idempotently: every create is preceded
//! by an existence check, and asynchronous operations are polled to a
//! terminal state through a pluggable wait strategy. On top of that core sit
//! the workflows the `snapfleet` binary exposes: deploying a web VM,
//! snapshotting and cloning it with per-clone timing, starting a launcher VM,
//! and tearing instances down.

pub mod client;
pub mod clone;
pub mod compute;
pub mod config;
pub mod deploy;
pub mod inventory;
pub mod launch;
pub mod poll;
pub mod provision;
pub mod resource;
pub mod startup;
pub mod step;
pub mod teardown;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;

pub use client::{ClientError, ClientFuture, CloudClient};
pub use clone::workflow::{CloneConfig, ClonePlan, CloneWorkflow, CloneWorkflowError};
pub use clone::{
    CloneFailure, CloneOrchestrator, CloneRun, CloneSpecFactory, TargetOutcome, TimingRecord,
    TimingReport,
};
pub use compute::ComputeClient;
pub use config::{ComputeConfig, ConfigError};
pub use deploy::{DeployConfig, DeployError, DeployOrchestrator, DeployOutcome, DeployPlan};
pub use launch::{LaunchConfig, LaunchError, LaunchOrchestrator, LaunchOutcome, LaunchPlan};
pub use poll::{FixedInterval, PollError, PollOutcome, Poller, WaitStrategy};
pub use provision::{EnsureOutcome, ProvisionError, Provisioner};
pub use resource::{
    Operation, OperationState, OperationStatus, Resource, ResourceKind, ResourceRef,
    ResourceSpec, SpecError,
};
pub use teardown::{Teardown, TeardownError, TeardownSummary};
