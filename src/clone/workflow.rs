//! Snapshot-and-clone workflow: base snapshot, clone batch, timing report.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::{CloneOrchestrator, CloneRun, DEFAULT_REPORT_PATH, ReportError};
use crate::client::CloudClient;
use crate::compute::{CloneTemplate, snapshot_spec};
use crate::config::{APP_NAME, ComputeConfig, ConfigError};
use crate::deploy::DEFAULT_APP_PORT;
use crate::poll::WaitStrategy;
use crate::resource::SpecError;
use crate::startup::clone_restart_script;
use crate::step::{StepError, StepRunner};

/// Default comma-separated clone targets.
pub const DEFAULT_TARGETS: &str = "flask-clone-1,flask-clone-2,flask-clone-3";

/// Clone workflow settings layered via `OrthoConfig`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SNAPFLEET_CLONE",
    discovery(
        app_name = "snapfleet",
        env_var = "SNAPFLEET_CONFIG_PATH",
        config_file_name = "snapfleet.toml",
        dotfile_name = ".snapfleet.toml",
        project_file_name = "snapfleet.toml"
    )
)]
pub struct CloneConfig {
    /// Instance whose boot disk is snapshotted.
    #[ortho_config(default = "flask-vm".to_owned())]
    pub source_instance: String,
    /// Disk to snapshot; defaults to the source instance name, which is the
    /// boot disk name Compute Engine assigns.
    pub source_disk: Option<String>,
    /// Snapshot name; defaults to `base-snapshot-<source_instance>`.
    pub snapshot_name: Option<String>,
    /// Comma-separated clone names, processed in order.
    #[ortho_config(default = DEFAULT_TARGETS.to_owned())]
    pub targets: String,
    /// Machine type of each clone.
    #[ortho_config(default = "e2-medium".to_owned())]
    pub machine_type: String,
    /// Network tag applied to each clone.
    #[ortho_config(default = "allow-5000".to_owned())]
    pub network_tag: String,
    /// Port the restarted app listens on; match the deployed firewall port.
    #[ortho_config(default = DEFAULT_APP_PORT)]
    pub app_port: u16,
    /// Where the timing report is written.
    #[ortho_config(default = DEFAULT_REPORT_PATH.to_owned())]
    pub report_path: String,
}

impl CloneConfig {
    /// Loads clone configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CloneWorkflowError::Config`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, CloneWorkflowError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| CloneWorkflowError::Config(err.to_string()))
    }

    /// Snapshot name to create or reuse.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.snapshot_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("base-snapshot-{}", self.source_instance.trim()))
    }

    /// Disk the snapshot is taken from.
    #[must_use]
    pub fn disk(&self) -> String {
        self.source_disk
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.source_instance.trim().to_owned())
    }

    /// Target names in order, with blanks dropped.
    #[must_use]
    pub fn target_names(&self) -> Vec<String> {
        split_targets(&self.targets)
    }
}

/// Splits a comma-separated target list, trimming entries and dropping blanks.
#[must_use]
pub fn split_targets(targets: &str) -> Vec<String> {
    targets
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Errors raised by the clone workflow.
#[derive(Debug, Error)]
pub enum CloneWorkflowError {
    /// Raised when configuration cannot be loaded or is unusable.
    #[error("clone configuration error: {0}")]
    Config(String),
    /// Raised when the target list is empty.
    #[error("no clone targets configured")]
    NoTargets,
    /// Raised when the snapshot name is invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Raised when the base snapshot cannot be set up.
    #[error("snapshot setup failed: {0}")]
    Snapshot(#[source] StepError),
    /// Raised when the timing report cannot be written.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl From<ConfigError> for CloneWorkflowError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

/// Resolved inputs for one clone workflow run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClonePlan {
    project: String,
    zone: String,
    snapshot: String,
    disk: String,
    targets: Vec<String>,
    template: CloneTemplate,
    report_path: Utf8PathBuf,
}

impl ClonePlan {
    /// Builds a plan from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CloneWorkflowError`] when the project is missing, the target
    /// list is empty, or the app port is 0. Malformed target names are not
    /// rejected here; each one fails on its own during the run.
    pub fn from_config(compute: &ComputeConfig, clone: &CloneConfig) -> Result<Self, CloneWorkflowError> {
        let project = compute.project_id()?.to_owned();
        let targets = clone.target_names();
        if targets.is_empty() {
            return Err(CloneWorkflowError::NoTargets);
        }
        if clone.app_port == 0 {
            return Err(CloneWorkflowError::Config(String::from("app_port must not be 0")));
        }
        let template = CloneTemplate::new(&project, &compute.zone, &clone.machine_type, &compute.network)
            .network_tag(&clone.network_tag)
            .startup_script(clone_restart_script(clone.app_port));
        Ok(Self {
            project,
            zone: compute.zone.clone(),
            snapshot: clone.snapshot(),
            disk: clone.disk(),
            targets,
            template,
            report_path: Utf8PathBuf::from(clone.report_path.trim()),
        })
    }

    /// Snapshot name.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    /// Target names in order.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Report location.
    #[must_use]
    pub fn report_path(&self) -> &Utf8PathBuf {
        &self.report_path
    }
}

/// Runs the snapshot-and-clone workflow.
#[derive(Clone, Debug)]
pub struct CloneWorkflow<C, W> {
    steps: StepRunner<C, W>,
    client: C,
    wait: W,
}

impl<C, W> CloneWorkflow<C, W>
where
    C: CloudClient + Clone,
    W: WaitStrategy + Clone,
{
    /// Creates a workflow.
    #[must_use]
    pub fn new(client: C, wait: W) -> Self {
        Self {
            steps: StepRunner::new(client.clone(), wait.clone()),
            client,
            wait,
        }
    }

    /// Ensures the base snapshot, clones every target, then writes the report.
    ///
    /// Clone failures are recorded in the returned run; only snapshot and
    /// report failures abort the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`CloneWorkflowError`] when the snapshot cannot be set up or
    /// the report cannot be written.
    pub async fn execute(&self, plan: &ClonePlan) -> Result<CloneRun, CloneWorkflowError> {
        let spec = snapshot_spec(&plan.snapshot, &plan.project, &plan.zone, &plan.disk)?;
        let snapshot = self
            .steps
            .ensure_ready(&spec)
            .await
            .map_err(CloneWorkflowError::Snapshot)?;
        if snapshot.created {
            info!(name = %plan.snapshot, "snapshot '{}' created successfully", plan.snapshot);
        }

        let orchestrator =
            CloneOrchestrator::new(self.client.clone(), self.wait.clone(), plan.template.clone());
        let run = orchestrator.run(&plan.snapshot, &plan.targets).await;

        run.report().write_to(&plan.report_path)?;
        info!(
            path = %plan.report_path,
            records = run.report().len(),
            "timing report written to {}",
            plan.report_path
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clone::{REPORT_TITLE, TargetOutcome};
    use crate::clone::CloneSpecFactory;
    use crate::compute::STARTUP_SCRIPT_KEY;
    use crate::poll::FixedInterval;
    use crate::resource::ResourceKind;
    use crate::test_helpers::EnvGuard;
    use crate::test_support::{CloudCall, FakeCloud, ScriptedOperation};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn compute() -> ComputeConfig {
        ComputeConfig {
            project: Some(String::from("demo-project")),
            zone: String::from("us-west1-b"),
            access_token: None,
            network: String::from("global/networks/default"),
            image_project: String::from("ubuntu-os-cloud"),
            image_family: String::from("ubuntu-2204-lts"),
            api_base: String::from("https://compute.googleapis.com/compute/v1"),
            poll_interval_secs: 2,
            operation_timeout_secs: None,
        }
    }

    fn clone_config(report_path: &str) -> CloneConfig {
        CloneConfig {
            source_instance: String::from("flask-vm"),
            source_disk: None,
            snapshot_name: None,
            targets: String::from(DEFAULT_TARGETS),
            machine_type: String::from("e2-medium"),
            network_tag: String::from("allow-5000"),
            app_port: DEFAULT_APP_PORT,
            report_path: report_path.to_owned(),
        }
    }

    fn report_in(dir: &TempDir) -> String {
        dir.path()
            .join("TIMING.md")
            .to_str()
            .expect("utf8 path")
            .to_owned()
    }

    fn workflow(cloud: &FakeCloud) -> CloneWorkflow<FakeCloud, FixedInterval> {
        CloneWorkflow::new(cloud.clone(), FixedInterval::new(Duration::from_millis(1)))
    }

    #[rstest]
    #[case(" a, ,b ,c,", &["a", "b", "c"])]
    #[case("", &[])]
    #[case("solo", &["solo"])]
    fn split_targets_trims_and_drops_blanks(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(split_targets(input), expected);
    }

    #[test]
    fn snapshot_and_disk_default_from_source_instance() {
        let config = clone_config("TIMING.md");
        assert_eq!(config.snapshot(), "base-snapshot-flask-vm");
        assert_eq!(config.disk(), "flask-vm");
    }

    #[rstest]
    fn empty_targets_are_rejected(compute: ComputeConfig) {
        let mut config = clone_config("TIMING.md");
        config.targets = String::from(" , ");
        assert!(matches!(
            ClonePlan::from_config(&compute, &config),
            Err(CloneWorkflowError::NoTargets)
        ));
    }

    #[rstest]
    fn clone_startup_script_uses_configured_port(compute: ComputeConfig) {
        let mut config = clone_config("TIMING.md");
        config.app_port = 8080;
        config.network_tag = String::from("allow-8080");
        let plan = ClonePlan::from_config(&compute, &config).expect("plan");

        let spec = plan
            .template
            .clone_spec("base-snapshot-flask-vm", "flask-clone-1")
            .expect("spec");

        let items = spec
            .body()
            .pointer("/metadata/items")
            .and_then(|value| value.as_array().cloned())
            .expect("metadata items");
        let script = items
            .iter()
            .find(|item| item.get("key").and_then(|key| key.as_str()) == Some(STARTUP_SCRIPT_KEY))
            .and_then(|item| item.get("value").and_then(|value| value.as_str()))
            .expect("startup script");
        assert!(script.contains("flask run -h 0.0.0.0 -p 8080"), "{script}");
        assert!(!script.contains("-p 5000"), "{script}");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn app_port_reads_from_environment() {
        let _guard = EnvGuard::set_var("SNAPFLEET_CLONE_APP_PORT", "8080").await;

        let loaded = CloneConfig::load_without_cli_args().expect("load");

        assert_eq!(loaded.app_port, 8080);
        assert_eq!(loaded.target_names(), split_targets(DEFAULT_TARGETS));
    }

    #[rstest]
    fn zero_app_port_is_rejected(compute: ComputeConfig) {
        let mut config = clone_config("TIMING.md");
        config.app_port = 0;
        assert!(matches!(
            ClonePlan::from_config(&compute, &config),
            Err(CloneWorkflowError::Config(_))
        ));
    }

    #[rstest]
    fn missing_project_is_a_config_error(mut compute: ComputeConfig) {
        compute.project = None;
        assert!(matches!(
            ClonePlan::from_config(&compute, &clone_config("TIMING.md")),
            Err(CloneWorkflowError::Config(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn snapshots_clones_and_writes_report(compute: ComputeConfig) {
        let dir = TempDir::new().expect("tempdir");
        let cloud = FakeCloud::new();
        cloud.insert_existing(ResourceKind::Instance, "flask-clone-2");
        let plan = ClonePlan::from_config(&compute, &clone_config(&report_in(&dir))).expect("plan");

        let run = workflow(&cloud).execute(&plan).await.expect("workflow");

        assert!(cloud.contains(ResourceKind::Snapshot, "base-snapshot-flask-vm"));
        assert_eq!(run.outcome("flask-clone-2"), Some(&TargetOutcome::Exists));
        assert_eq!(run.report().names(), vec!["flask-clone-1", "flask-clone-3"]);
        let written = std::fs::read_to_string(plan.report_path()).expect("report");
        assert!(written.starts_with(REPORT_TITLE));
        assert!(written.contains("- flask-clone-1: "));
        assert!(!written.contains("flask-clone-2"));
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_target_fails_alone(compute: ComputeConfig) {
        let dir = TempDir::new().expect("tempdir");
        let cloud = FakeCloud::new();
        let mut config = clone_config(&report_in(&dir));
        config.targets = String::from("good-1,Bad_Name,good-2");
        let plan = ClonePlan::from_config(&compute, &config).expect("plan");

        let run = workflow(&cloud).execute(&plan).await.expect("workflow");

        assert_eq!(run.report().names(), vec!["good-1", "good-2"]);
        assert_eq!(run.failures().count(), 1);
        assert!(matches!(run.outcome("Bad_Name"), Some(TargetOutcome::Failed(_))));
        assert_eq!(cloud.count(&CloudCall::create(ResourceKind::Instance, "Bad_Name")), 0);
        let written = std::fs::read_to_string(plan.report_path()).expect("report");
        assert!(written.contains("- good-1: "));
        assert!(written.contains("- good-2: "));
        assert!(!written.contains("Bad_Name"));
    }

    #[rstest]
    #[tokio::test]
    async fn snapshot_failure_aborts_before_cloning(compute: ComputeConfig) {
        let dir = TempDir::new().expect("tempdir");
        let cloud = FakeCloud::new();
        cloud.script_create(
            ResourceKind::Snapshot,
            "base-snapshot-flask-vm",
            ScriptedOperation::error_after(1, "disk not found"),
        );
        let plan = ClonePlan::from_config(&compute, &clone_config(&report_in(&dir))).expect("plan");

        let err = workflow(&cloud)
            .execute(&plan)
            .await
            .expect_err("workflow should fail");

        assert!(matches!(err, CloneWorkflowError::Snapshot(_)), "{err}");
        assert_eq!(
            cloud.count(&CloudCall::get(ResourceKind::Instance, "flask-clone-1")),
            0
        );
        assert!(!plan.report_path().exists());
    }
}
