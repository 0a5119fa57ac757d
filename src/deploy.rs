//! Web VM deployment: a firewall rule plus an instance running the web app.
//!
//! Both resources are set up idempotently. Either step failing aborts the
//! deployment. The outcome carries the instance's external address so callers
//! can print the app URL.

use std::ffi::OsString;
use std::net::IpAddr;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::CloudClient;
use crate::compute::{
    BootSource, FirewallTemplate, InstanceTemplate, STARTUP_SCRIPT_KEY,
};
use crate::config::{APP_NAME, ComputeConfig};
use crate::poll::WaitStrategy;
use crate::resource::SpecError;
use crate::startup::{ScriptError, resolve_script, web_app_script};
use crate::step::{StepError, StepRunner};

/// Port the bundled web app listens on.
pub const DEFAULT_APP_PORT: u16 = 5000;

/// Deployment settings layered via `OrthoConfig`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SNAPFLEET_DEPLOY",
    discovery(
        app_name = "snapfleet",
        env_var = "SNAPFLEET_CONFIG_PATH",
        config_file_name = "snapfleet.toml",
        dotfile_name = ".snapfleet.toml",
        project_file_name = "snapfleet.toml"
    )
)]
pub struct DeployConfig {
    /// Name of the web VM.
    #[ortho_config(default = "flask-vm".to_owned())]
    pub instance_name: String,
    /// Machine type of the web VM.
    #[ortho_config(default = "f1-micro".to_owned())]
    pub machine_type: String,
    /// Name of the firewall rule opening the app port.
    #[ortho_config(default = "allow-5000".to_owned())]
    pub firewall_name: String,
    /// Network tag linking the VM to the firewall rule.
    #[ortho_config(default = "allow-5000".to_owned())]
    pub network_tag: String,
    /// Port the app listens on.
    #[ortho_config(default = 5000)]
    pub app_port: u16,
    /// Inline startup script replacing the bundled one.
    pub startup_script: Option<String>,
    /// File holding a startup script replacing the bundled one.
    pub startup_script_file: Option<String>,
}

impl DeployConfig {
    /// Loads deploy configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Config`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, DeployError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| DeployError::Config(err.to_string()))
    }
}

/// Errors raised while deploying.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when configuration cannot be loaded or is unusable.
    #[error("deploy configuration error: {0}")]
    Config(String),
    /// Raised when the startup script cannot be resolved.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Raised when a resource spec is invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Raised when the firewall rule cannot be set up.
    #[error("firewall setup failed: {0}")]
    Firewall(#[source] StepError),
    /// Raised when the web VM cannot be set up.
    #[error("instance setup failed: {0}")]
    Instance(#[source] StepError),
}

/// Resolved inputs for one deployment.
#[derive(Clone, Debug, PartialEq)]
pub struct DeployPlan {
    firewall_name: String,
    firewall: FirewallTemplate,
    instance_name: String,
    instance: InstanceTemplate,
    app_port: u16,
}

impl DeployPlan {
    /// Builds a plan from loaded configuration, resolving the startup script.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the script sources conflict or cannot be
    /// read.
    pub fn from_config(compute: &ComputeConfig, deploy: &DeployConfig) -> Result<Self, DeployError> {
        if deploy.app_port == 0 {
            return Err(DeployError::Config(String::from("app_port must not be 0")));
        }
        let script = resolve_script(
            deploy.startup_script.as_deref(),
            deploy.startup_script_file.as_deref(),
        )?
        .unwrap_or_else(|| web_app_script(deploy.app_port));

        let instance = InstanceTemplate::new(
            &compute.zone,
            &deploy.machine_type,
            &compute.network,
            BootSource::Image(compute.image_source()),
        )
        .tag(&deploy.network_tag)
        .metadata(STARTUP_SCRIPT_KEY, script);

        Ok(Self {
            firewall_name: deploy.firewall_name.clone(),
            firewall: FirewallTemplate::new(&compute.network, deploy.app_port, &deploy.network_tag),
            instance_name: deploy.instance_name.clone(),
            instance,
            app_port: deploy.app_port,
        })
    }

    /// Name of the web VM.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }
}

/// Result of a deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOutcome {
    /// Whether the firewall rule was created by this run.
    pub firewall_created: bool,
    /// Whether the VM was created by this run.
    pub instance_created: bool,
    /// External address of the VM, when it has one.
    pub external_ip: Option<IpAddr>,
    /// Port the app listens on.
    pub app_port: u16,
}

impl DeployOutcome {
    /// URL of the web app.
    #[must_use]
    pub fn app_url(&self) -> Option<String> {
        self.external_ip
            .map(|address| format!("http://{address}:{}", self.app_port))
    }
}

/// Runs deployments.
#[derive(Clone, Debug)]
pub struct DeployOrchestrator<C, W> {
    steps: StepRunner<C, W>,
}

impl<C, W> DeployOrchestrator<C, W>
where
    C: CloudClient + Clone,
    W: WaitStrategy,
{
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(client: C, wait: W) -> Self {
        Self {
            steps: StepRunner::new(client, wait),
        }
    }

    /// Sets up the firewall rule, then the web VM.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when either step fails.
    pub async fn execute(&self, plan: &DeployPlan) -> Result<DeployOutcome, DeployError> {
        let firewall_spec = plan.firewall.spec(&plan.firewall_name)?;
        let firewall = self
            .steps
            .ensure_ready(&firewall_spec)
            .await
            .map_err(DeployError::Firewall)?;
        if firewall.created {
            info!(name = %plan.firewall_name, "firewall '{}' created", plan.firewall_name);
        }

        let instance_spec = plan.instance.spec(&plan.instance_name)?;
        let instance = self
            .steps
            .ensure_ready(&instance_spec)
            .await
            .map_err(DeployError::Instance)?;
        if instance.created {
            info!(name = %plan.instance_name, "instance '{}' created", plan.instance_name);
        }

        let external_ip = instance.resource.as_ref().and_then(|vm| vm.external_ip());
        if external_ip.is_none() {
            warn!(name = %plan.instance_name, "instance '{}' has no external address", plan.instance_name);
        }

        Ok(DeployOutcome {
            firewall_created: firewall.created,
            instance_created: instance.created,
            external_ip,
            app_port: plan.app_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::poll::FixedInterval;
    use crate::resource::ResourceKind;
    use crate::test_support::{CloudCall, FakeCloud, ScriptedOperation};
    use rstest::{fixture, rstest};

    #[fixture]
    fn compute() -> ComputeConfig {
        ComputeConfig {
            project: Some(String::from("demo-project")),
            zone: String::from("us-west1-b"),
            access_token: Some(String::from("token")),
            network: String::from("global/networks/default"),
            image_project: String::from("ubuntu-os-cloud"),
            image_family: String::from("ubuntu-2204-lts"),
            api_base: String::from("https://compute.googleapis.com/compute/v1"),
            poll_interval_secs: 2,
            operation_timeout_secs: None,
        }
    }

    #[fixture]
    fn deploy() -> DeployConfig {
        DeployConfig {
            instance_name: String::from("flask-vm"),
            machine_type: String::from("f1-micro"),
            firewall_name: String::from("allow-5000"),
            network_tag: String::from("allow-5000"),
            app_port: DEFAULT_APP_PORT,
            startup_script: None,
            startup_script_file: None,
        }
    }

    fn orchestrator(cloud: &FakeCloud) -> DeployOrchestrator<FakeCloud, FixedInterval> {
        DeployOrchestrator::new(cloud.clone(), FixedInterval::new(Duration::from_millis(1)))
    }

    #[rstest]
    #[tokio::test]
    async fn deploy_creates_firewall_then_instance(compute: ComputeConfig, deploy: DeployConfig) {
        let cloud = FakeCloud::new();
        let plan = DeployPlan::from_config(&compute, &deploy).expect("plan");

        let outcome = orchestrator(&cloud).execute(&plan).await.expect("deploy");

        assert!(outcome.firewall_created && outcome.instance_created);
        assert_eq!(outcome.app_url().as_deref(), Some("http://192.0.2.1:5000"));
        let creates: Vec<CloudCall> = cloud
            .calls()
            .into_iter()
            .filter(|call| matches!(call, CloudCall::Create(_)))
            .collect();
        assert_eq!(
            creates,
            vec![
                CloudCall::create(ResourceKind::Firewall, "allow-5000"),
                CloudCall::create(ResourceKind::Instance, "flask-vm"),
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn second_deploy_creates_nothing(compute: ComputeConfig, deploy: DeployConfig) {
        let cloud = FakeCloud::new();
        let plan = DeployPlan::from_config(&compute, &deploy).expect("plan");
        orchestrator(&cloud).execute(&plan).await.expect("first deploy");

        let outcome = orchestrator(&cloud).execute(&plan).await.expect("second deploy");

        assert!(!outcome.firewall_created && !outcome.instance_created);
        assert_eq!(cloud.create_calls(), 2);
        assert!(outcome.app_url().is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn firewall_failure_stops_before_instance(compute: ComputeConfig, deploy: DeployConfig) {
        let cloud = FakeCloud::new();
        cloud.reject_create(ResourceKind::Firewall, "allow-5000", "permission denied");
        let plan = DeployPlan::from_config(&compute, &deploy).expect("plan");

        let err = orchestrator(&cloud)
            .execute(&plan)
            .await
            .expect_err("deploy should fail");

        assert!(matches!(err, DeployError::Firewall(_)), "{err}");
        assert_eq!(cloud.count(&CloudCall::get(ResourceKind::Instance, "flask-vm")), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn instance_error_is_fatal(compute: ComputeConfig, deploy: DeployConfig) {
        let cloud = FakeCloud::new();
        cloud.script_create(
            ResourceKind::Instance,
            "flask-vm",
            ScriptedOperation::error_after(2, "ZONE_RESOURCE_POOL_EXHAUSTED"),
        );
        let plan = DeployPlan::from_config(&compute, &deploy).expect("plan");

        let err = orchestrator(&cloud)
            .execute(&plan)
            .await
            .expect_err("deploy should fail");

        assert!(matches!(err, DeployError::Instance(StepError::Errored { .. })), "{err}");
    }

    #[rstest]
    fn conflicting_script_sources_are_rejected(compute: ComputeConfig, mut deploy: DeployConfig) {
        deploy.startup_script = Some(String::from("#!/bin/bash\n"));
        deploy.startup_script_file = Some(String::from("/tmp/script.sh"));

        let err = DeployPlan::from_config(&compute, &deploy).expect_err("plan should fail");

        assert!(matches!(err, DeployError::Script(ScriptError::BothProvided)));
    }

    #[rstest]
    fn inline_script_replaces_bundled_script(compute: ComputeConfig, mut deploy: DeployConfig) {
        deploy.startup_script = Some(String::from("#!/bin/bash\necho custom\n"));

        let plan = DeployPlan::from_config(&compute, &deploy).expect("plan");
        let body = plan.instance.spec("flask-vm").expect("spec").body();

        assert_eq!(body["metadata"]["items"][0]["value"], "#!/bin/bash\necho custom\n");
    }
}
