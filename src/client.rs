//! Cloud resource client abstraction consumed by the provisioning core.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::resource::{Operation, OperationState, Resource, ResourceKind, ResourceSpec};

/// Errors raised by cloud clients.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// Raised when a resource or operation does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of the missing resource.
        kind: ResourceKind,
        /// Name of the missing resource or operation.
        name: String,
    },
    /// Raised when a create conflicts with an existing resource of the same
    /// name.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of the conflicting resource.
        kind: ResourceKind,
        /// Name of the conflicting resource.
        name: String,
    },
    /// Raised when the provider synchronously refuses a request (malformed
    /// body, quota exceeded, permission denied).
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code or provider equivalent.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the request could not be delivered or the response not read.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying transport message.
        message: String,
    },
    /// Raised when a response body cannot be decoded.
    #[error("failed to decode provider response: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },
}

impl ClientError {
    /// Whether the error reports a same-name conflict.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Future returned by client operations.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Minimal capability set of a cloud resource API.
///
/// Implementations are bound to a single scope (project and zone) chosen at
/// construction, so calls carry only kinds and names.
pub trait CloudClient: Send + Sync {
    /// Looks up a resource, returning `None` when it does not exist.
    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Option<Resource>>;

    /// Submits a create request and returns the operation handle.
    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> ClientFuture<'a, Operation>;

    /// Reads the current state of an operation.
    fn poll_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, OperationState>;

    /// Lists every resource of a kind within the client's scope.
    fn list(&self, kind: ResourceKind) -> ClientFuture<'_, Vec<Resource>>;

    /// Submits a delete request and returns the operation handle.
    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Operation>;
}

impl<C: CloudClient + ?Sized> CloudClient for &C {
    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Option<Resource>> {
        (**self).get(kind, name)
    }

    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> ClientFuture<'a, Operation> {
        (**self).create(spec)
    }

    fn poll_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, OperationState> {
        (**self).poll_operation(operation)
    }

    fn list(&self, kind: ResourceKind) -> ClientFuture<'_, Vec<Resource>> {
        (**self).list(kind)
    }

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Operation> {
        (**self).delete(kind, name)
    }
}
