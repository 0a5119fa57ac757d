//! Idempotent resource provisioning.
//!
//! [`Provisioner::ensure`] checks for an existing resource before issuing a
//! create so that repeated runs never duplicate work. The check and the create
//! are not atomic; a same-name conflict reported by the provider is folded
//! into [`EnsureOutcome::AlreadyExists`].

use thiserror::Error;
use tracing::{info, warn};

use crate::client::{ClientError, CloudClient};
use crate::resource::{Operation, ResourceKind, ResourceSpec};

/// Successful outcomes of [`Provisioner::ensure`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnsureOutcome {
    /// The resource was already present; nothing was submitted.
    AlreadyExists,
    /// A create request was accepted and is running asynchronously.
    Created(Operation),
}

/// Errors raised while ensuring a resource.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the existence check fails.
    #[error("failed to look up {kind} '{name}': {source}")]
    Lookup {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
    /// Raised when the provider rejects the create request synchronously.
    #[error("failed to create {kind} '{name}': {source}")]
    Rejected {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: String,
        /// Client failure.
        #[source]
        source: ClientError,
    },
}

/// Creates resources only when they are absent.
#[derive(Clone, Debug)]
pub struct Provisioner<C> {
    client: C,
}

impl<C: CloudClient> Provisioner<C> {
    /// Creates a provisioner over the given client.
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// Ensures the resource described by `spec` exists.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Lookup`] when the existence check fails and
    /// [`ProvisionError::Rejected`] when the create request is refused.
    pub async fn ensure(&self, spec: &ResourceSpec) -> Result<EnsureOutcome, ProvisionError> {
        let kind = spec.kind();
        let name = spec.name();

        let existing = self
            .client
            .get(kind, name)
            .await
            .map_err(|source| ProvisionError::Lookup {
                kind,
                name: name.to_owned(),
                source,
            })?;
        if existing.is_some() {
            info!(%kind, name, "{kind} '{name}' already exists, skipping creation");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!(%kind, name, "{kind} '{name}' does not exist, creating it");
        match self.client.create(spec).await {
            Ok(operation) => {
                info!(%kind, name, operation = %operation.id, "{kind} '{name}' creation started");
                Ok(EnsureOutcome::Created(operation))
            }
            Err(err) if err.is_already_exists() => {
                warn!(%kind, name, "{kind} '{name}' appeared before the create landed");
                Ok(EnsureOutcome::AlreadyExists)
            }
            Err(source) => Err(ProvisionError::Rejected {
                kind,
                name: name.to_owned(),
                source,
            }),
        }
    }
}
