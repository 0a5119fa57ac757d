//! Launcher VM: an instance whose startup script provisions further VMs.
//!
//! The payload program and optional service credentials travel through
//! instance metadata. The launcher's startup script fetches them from the
//! metadata server and runs the payload with the project and zone exported.

use std::ffi::OsString;
use std::net::IpAddr;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::client::CloudClient;
use crate::compute::{
    BootSource, CLOUD_PLATFORM_SCOPE, InstanceTemplate, STARTUP_SCRIPT_KEY,
};
use crate::config::{APP_NAME, ComputeConfig, ConfigError};
use crate::poll::WaitStrategy;
use crate::provision::EnsureOutcome;
use crate::resource::SpecError;
use crate::startup::{
    CREDENTIALS_KEY, LauncherScript, PAYLOAD_KEY, PROJECT_KEY, ScriptError, ZONE_KEY, read_file,
};
use crate::step::{StepError, StepRunner};

/// Launcher settings layered via `OrthoConfig`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SNAPFLEET_LAUNCH",
    discovery(
        app_name = "snapfleet",
        env_var = "SNAPFLEET_CONFIG_PATH",
        config_file_name = "snapfleet.toml",
        dotfile_name = ".snapfleet.toml",
        project_file_name = "snapfleet.toml"
    )
)]
pub struct LaunchConfig {
    /// Name of the launcher VM.
    #[ortho_config(default = "vm1-launcher".to_owned())]
    pub launcher_name: String,
    /// Machine type of the launcher VM.
    #[ortho_config(default = "n1-standard-1".to_owned())]
    pub machine_type: String,
    /// Program the launcher runs.
    pub payload_file: Option<String>,
    /// Service account key made available to the payload.
    pub credentials_file: Option<String>,
    /// Command that runs the payload, such as `python3`.
    pub payload_interpreter: Option<String>,
    /// Whether to wait for the launcher's create operation.
    #[ortho_config(default = true)]
    pub wait: bool,
}

impl LaunchConfig {
    /// Loads launcher configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Config`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, LaunchError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| LaunchError::Config(err.to_string()))
    }

    /// Returns the payload path.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Config`] naming the environment variable and
    /// TOML key when the path is unset or blank.
    pub fn payload_path(&self) -> Result<&str, LaunchError> {
        self.payload_file
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .ok_or_else(|| {
                LaunchError::Config(String::from(
                    "missing payload file: set SNAPFLEET_LAUNCH_PAYLOAD_FILE or add \
                     payload_file to snapfleet.toml",
                ))
            })
    }
}

/// Errors raised while starting the launcher.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Raised when configuration cannot be loaded or is unusable.
    #[error("launch configuration error: {0}")]
    Config(String),
    /// Raised when the payload or credentials cannot be read.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Raised when the launcher spec is invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Raised when the launcher VM cannot be set up.
    #[error("launcher setup failed: {0}")]
    Launcher(#[source] StepError),
}

impl From<ConfigError> for LaunchError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

/// Resolved inputs for one launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPlan {
    launcher_name: String,
    template: InstanceTemplate,
    wait: bool,
}

impl LaunchPlan {
    /// Reads the payload and credentials and assembles the launcher template.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the project or payload is missing, or a
    /// file cannot be read.
    pub fn from_config(compute: &ComputeConfig, launch: &LaunchConfig) -> Result<Self, LaunchError> {
        let project = compute.project_id()?;
        let payload = read_file(launch.payload_path()?)?;
        let credentials = launch
            .credentials_file
            .as_deref()
            .map(read_file)
            .transpose()?;

        let mut script = LauncherScript::new().with_credentials(credentials.is_some());
        if let Some(interpreter) = launch.payload_interpreter.as_deref() {
            script = script.interpreter(interpreter);
        }

        let mut template = InstanceTemplate::new(
            &compute.zone,
            &launch.machine_type,
            &compute.network,
            BootSource::Image(compute.image_source()),
        )
        .metadata(STARTUP_SCRIPT_KEY, script.render())
        .metadata(PROJECT_KEY, project)
        .metadata(ZONE_KEY, &compute.zone)
        .metadata(PAYLOAD_KEY, payload)
        .service_scope(CLOUD_PLATFORM_SCOPE);
        if let Some(key) = credentials {
            template = template.metadata(CREDENTIALS_KEY, key);
        }

        Ok(Self {
            launcher_name: launch.launcher_name.clone(),
            template,
            wait: launch.wait,
        })
    }

    /// Name of the launcher VM.
    #[must_use]
    pub fn launcher_name(&self) -> &str {
        &self.launcher_name
    }
}

/// Result of a launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchOutcome {
    /// Whether this run created the launcher.
    pub created: bool,
    /// Whether the create operation was awaited.
    pub awaited: bool,
    /// External address of the launcher, when known.
    pub external_ip: Option<IpAddr>,
}

/// Starts launcher VMs.
#[derive(Clone, Debug)]
pub struct LaunchOrchestrator<C, W> {
    steps: StepRunner<C, W>,
}

impl<C, W> LaunchOrchestrator<C, W>
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

    /// Ensures the launcher exists, waiting for it when the plan asks to.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] when the launcher cannot be created or its
    /// operation does not complete.
    pub async fn execute(&self, plan: &LaunchPlan) -> Result<LaunchOutcome, LaunchError> {
        let spec = plan.template.spec(&plan.launcher_name)?;
        if !plan.wait {
            let submitted = self.steps.submit(&spec).await.map_err(LaunchError::Launcher)?;
            let created = matches!(submitted, EnsureOutcome::Created(_));
            info!(name = %plan.launcher_name, created, "launcher submitted without waiting");
            return Ok(LaunchOutcome {
                created,
                awaited: false,
                external_ip: None,
            });
        }

        let step = self
            .steps
            .ensure_ready(&spec)
            .await
            .map_err(LaunchError::Launcher)?;
        if step.created {
            info!(name = %plan.launcher_name, "launcher '{}' created", plan.launcher_name);
        } else {
            info!(name = %plan.launcher_name, "launcher '{}' already exists", plan.launcher_name);
        }
        Ok(LaunchOutcome {
            created: step.created,
            awaited: true,
            external_ip: step.resource.as_ref().and_then(|found| found.external_ip()),
        })
    }
}
