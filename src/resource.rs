//! Resource model shared by the provisioning core and cloud clients.
//!
//! A [`ResourceSpec`] describes a desired resource by kind and name together
//! with an opaque JSON parameter object that only the client interprets. An
//! [`Operation`] is the asynchronous handle returned when the provider accepts
//! a mutating request.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum length of a provider resource name.
pub const MAX_NAME_LEN: usize = 63;

/// Opaque key-value configuration carried by a [`ResourceSpec`].
pub type Parameters = Map<String, Value>;

/// Resource kinds the provisioning core understands.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    /// Ingress or egress firewall rule.
    Firewall,
    /// Virtual machine instance.
    Instance,
    /// Persistent disk.
    Disk,
    /// Disk snapshot.
    Snapshot,
}

impl ResourceKind {
    /// Every supported kind, in declaration order.
    pub const ALL: [Self; 4] = [Self::Firewall, Self::Instance, Self::Disk, Self::Snapshot];

    /// Lowercase label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Firewall => "firewall",
            Self::Instance => "instance",
            Self::Disk => "disk",
            Self::Snapshot => "snapshot",
        }
    }

    /// Name of the provider collection holding resources of this kind.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Firewall => "firewalls",
            Self::Instance => "instances",
            Self::Disk => "disks",
            Self::Snapshot => "snapshots",
        }
    }

    /// Whether resources of this kind live in a zone rather than globally.
    #[must_use]
    pub const fn is_zonal(self) -> bool {
        matches!(self, Self::Instance | Self::Disk)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Errors raised while building a [`ResourceSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when the resource name is empty or whitespace.
    #[error("{kind} name must not be empty")]
    EmptyName {
        /// Kind of the rejected spec.
        kind: ResourceKind,
    },
    /// Raised when the name breaks the provider naming rule.
    #[error(
        "{kind} name '{name}' is invalid: use 1-63 lowercase letters, digits or hyphens, \
         starting with a letter and not ending with a hyphen"
    )]
    InvalidName {
        /// Kind of the rejected spec.
        kind: ResourceKind,
        /// Name as supplied.
        name: String,
    },
    /// Raised when the parameter body does not serialise to a JSON object.
    #[error("{kind} parameters must be a JSON object: {message}")]
    Parameters {
        /// Kind of the rejected spec.
        kind: ResourceKind,
        /// Serialiser or shape error.
        message: String,
    },
}

/// Desired state of a single resource. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSpec {
    kind: ResourceKind,
    name: String,
    parameters: Parameters,
}

impl ResourceSpec {
    /// Starts a builder for a spec of the given kind.
    #[must_use]
    pub fn builder(kind: ResourceKind) -> ResourceSpecBuilder {
        ResourceSpecBuilder::new(kind)
    }

    /// Builds a spec whose parameters are the serialised form of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when the name is invalid or `body` does not
    /// serialise to a JSON object.
    pub fn from_body<T: Serialize>(
        kind: ResourceKind,
        name: impl Into<String>,
        body: &T,
    ) -> Result<Self, SpecError> {
        let value = serde_json::to_value(body).map_err(|err| SpecError::Parameters {
            kind,
            message: err.to_string(),
        })?;
        let Value::Object(parameters) = value else {
            return Err(SpecError::Parameters {
                kind,
                message: String::from("body serialised to a non-object value"),
            });
        };
        Self::builder(kind).name(name).parameters(parameters).build()
    }

    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Resource name, unique per kind and scope.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider-specific parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Reference to the resource this spec describes.
    #[must_use]
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.name.clone())
    }

    /// Request body: the parameters with `name` set to the spec name.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = self.parameters.clone();
        body.insert(String::from("name"), Value::String(self.name.clone()));
        Value::Object(body)
    }
}

/// Builder for [`ResourceSpec`] that trims and validates the name on build.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSpecBuilder {
    kind: ResourceKind,
    name: String,
    parameters: Parameters,
}

impl ResourceSpecBuilder {
    /// Creates an empty builder for the given kind.
    #[must_use]
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            name: String::new(),
            parameters: Parameters::new(),
        }
    }

    /// Sets the resource name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets a single parameter, replacing any previous value for the key.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Merges a parameter object into the builder.
    #[must_use]
    pub fn parameters(mut self, values: Parameters) -> Self {
        self.parameters.extend(values);
        self
    }

    /// Builds and validates the spec.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::EmptyName`] or [`SpecError::InvalidName`] when the
    /// name is unusable.
    pub fn build(self) -> Result<ResourceSpec, SpecError> {
        let name = self.name.trim().to_owned();
        validate_name(self.kind, &name)?;
        Ok(ResourceSpec {
            kind: self.kind,
            name,
            parameters: self.parameters,
        })
    }
}

/// Validates a provider resource name.
///
/// # Errors
///
/// Returns [`SpecError`] describing the first rule the name breaks.
pub fn validate_name(kind: ResourceKind, name: &str) -> Result<(), SpecError> {
    if name.is_empty() {
        return Err(SpecError::EmptyName { kind });
    }
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|ch| ch.is_ascii_lowercase());
    let body_ok = name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !starts_with_letter || !body_ok || name.ends_with('-') || name.len() > MAX_NAME_LEN {
        return Err(SpecError::InvalidName {
            kind,
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Identifies a resource by kind and name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceRef {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
}

impl ResourceRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} '{}'", self.kind, self.name)
    }
}

/// A resource as reported by the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
    /// Provider lifecycle status when the kind has one (for example `RUNNING`).
    pub status: Option<String>,
    /// Full provider representation.
    pub raw: Value,
}

impl Resource {
    /// Builds a resource from a provider JSON body, reading `name` and
    /// `status` from it.
    #[must_use]
    pub fn from_raw(kind: ResourceKind, raw: Value) -> Self {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let status = raw.get("status").and_then(Value::as_str).map(str::to_owned);
        Self {
            kind,
            name,
            status,
            raw,
        }
    }

    /// First external NAT address of the first network interface.
    #[must_use]
    pub fn external_ip(&self) -> Option<IpAddr> {
        self.raw
            .pointer("/networkInterfaces/0/accessConfigs/0/natIP")
            .and_then(Value::as_str)
            .and_then(|address| IpAddr::from_str(address).ok())
    }
}

/// Lifecycle states of an [`Operation`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationStatus {
    /// Accepted but not yet started.
    Pending,
    /// In progress.
    Running,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Error,
}

impl OperationStatus {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Upper-case label matching the provider vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Asynchronous handle for a provider-side mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    /// Provider operation identifier.
    pub id: String,
    /// Status observed when the handle was created or last refreshed.
    pub status: OperationStatus,
    /// Resource the operation acts on.
    pub target: ResourceRef,
}

/// Result of polling an [`Operation`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationState {
    /// Current status.
    pub status: OperationStatus,
    /// Provider error message when the status is [`OperationStatus::Error`].
    pub error: Option<String>,
}

impl OperationState {
    /// A non-error state with the given status.
    #[must_use]
    pub const fn with_status(status: OperationStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// An error state carrying the provider message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Error,
            error: Some(message.into()),
        }
    }
}
