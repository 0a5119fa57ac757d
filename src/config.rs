//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::FixedInterval;

/// Application name used for configuration discovery.
pub const APP_NAME: &str = "snapfleet";

/// Compute Engine connection settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GCE",
    discovery(
        app_name = "snapfleet",
        env_var = "SNAPFLEET_CONFIG_PATH",
        config_file_name = "snapfleet.toml",
        dotfile_name = ".snapfleet.toml",
        project_file_name = "snapfleet.toml"
    )
)]
pub struct ComputeConfig {
    /// Project that owns every resource. Required.
    pub project: Option<String>,
    /// Zone for instances and disks. Defaults to `us-west1-b`.
    #[ortho_config(default = "us-west1-b".to_owned())]
    pub zone: String,
    /// OAuth bearer token sent with every request. Required; obtaining and
    /// refreshing it happens outside this tool.
    pub access_token: Option<String>,
    /// VPC network attached to new instances.
    #[ortho_config(default = "global/networks/default".to_owned())]
    pub network: String,
    /// Project publishing the boot image family.
    #[ortho_config(default = "ubuntu-os-cloud".to_owned())]
    pub image_project: String,
    /// Boot image family; the newest image in the family is used.
    #[ortho_config(default = "ubuntu-2204-lts".to_owned())]
    pub image_family: String,
    /// Base URL of the Compute Engine v1 REST API.
    #[ortho_config(default = "https://compute.googleapis.com/compute/v1".to_owned())]
    pub api_base: String,
    /// Seconds between operation polls.
    #[ortho_config(default = 2)]
    pub poll_interval_secs: u64,
    /// Optional limit on how long a single operation is polled.
    pub operation_timeout_secs: Option<u64>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to snapfleet.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const PROJECT: FieldMetadata = FieldMetadata::new("Compute Engine project", "GCE_PROJECT", "project");
const ACCESS_TOKEN: FieldMetadata =
    FieldMetadata::new("OAuth access token", "GCE_ACCESS_TOKEN", "access_token");
const ZONE: FieldMetadata = FieldMetadata::new("zone", "GCE_ZONE", "zone");
const API_BASE: FieldMetadata = FieldMetadata::new("API base URL", "GCE_API_BASE", "api_base");
const IMAGE_PROJECT: FieldMetadata =
    FieldMetadata::new("image project", "GCE_IMAGE_PROJECT", "image_project");
const IMAGE_FAMILY: FieldMetadata =
    FieldMetadata::new("image family", "GCE_IMAGE_FAMILY", "image_family");
const NETWORK: FieldMetadata = FieldMetadata::new("network", "GCE_NETWORK", "network");

fn require<'a>(value: Option<&'a str>, metadata: &FieldMetadata) -> Result<&'a str, ConfigError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(metadata.missing()),
    }
}

impl ComputeConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages name the
    /// environment variable and TOML key for each missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty and
    /// [`ConfigError::Invalid`] when the poll interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(self.project.as_deref(), &PROJECT)?;
        require(self.access_token.as_deref(), &ACCESS_TOKEN)?;
        self.validate_scope()
    }

    /// Validates everything except the credentials, for runs that never reach
    /// the real API.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a non-credential field is unusable.
    pub fn validate_scope(&self) -> Result<(), ConfigError> {
        require(Some(self.zone.as_str()), &ZONE)?;
        require(Some(self.api_base.as_str()), &API_BASE)?;
        require(Some(self.image_project.as_str()), &IMAGE_PROJECT)?;
        require(Some(self.image_family.as_str()), &IMAGE_FAMILY)?;
        require(Some(self.network.as_str()), &NETWORK)?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_interval_secs must be at least 1",
            )));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(String::from(
                "operation_timeout_secs must be at least 1 when set",
            )));
        }
        Ok(())
    }

    /// Configured project.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no project is set.
    pub fn project_id(&self) -> Result<&str, ConfigError> {
        require(self.project.as_deref(), &PROJECT)
    }

    /// Configured access token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no token is set.
    pub fn token(&self) -> Result<&str, ConfigError> {
        require(self.access_token.as_deref(), &ACCESS_TOKEN)
    }

    /// Interval between operation polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Optional total polling limit per operation.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// Wait strategy built from the poll settings.
    #[must_use]
    pub fn wait_strategy(&self) -> FixedInterval {
        FixedInterval::new(self.poll_interval()).with_timeout(self.operation_timeout())
    }

    /// Source image URL resolving to the newest image of the configured family.
    #[must_use]
    pub fn image_source(&self) -> String {
        format!(
            "projects/{}/global/images/family/{}",
            self.image_project, self.image_family
        )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
