//! Compute Engine v1 implementation of [`CloudClient`].
//!
//! The client talks to the REST API directly with `reqwest`, authenticating
//! with a bearer token taken from [`ComputeConfig`]. Firewalls and snapshots
//! are global resources; instances and disks live in the configured zone.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::client::{ClientError, ClientFuture, CloudClient};
use crate::config::{ComputeConfig, ConfigError};
use crate::resource::{
    Operation, OperationState, Resource, ResourceKind, ResourceRef, ResourceSpec,
};

mod body;
mod error;
mod types;

pub use body::{
    BootSource, CLOUD_PLATFORM_SCOPE, CloneTemplate, FirewallTemplate, InstanceTemplate,
    STARTUP_SCRIPT_KEY, disk_url, snapshot_spec, snapshot_url,
};
use error::{classify_failure, decode, transport};
use types::{ListPage, ProjectId, WireOperation, Zone};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_PAGE_SIZE: &str = "500";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Compute Engine REST client bound to one project and zone.
#[derive(Clone)]
pub struct ComputeClient {
    http: reqwest::Client,
    api_base: String,
    project: ProjectId,
    zone: Zone,
    access_token: String,
}

impl fmt::Debug for ComputeClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ComputeClient")
            .field("api_base", &self.api_base)
            .field("project", &self.project)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl ComputeClient {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the project, token or API base is missing.
    pub fn new(config: &ComputeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            http: HTTP_CLIENT.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            project: ProjectId::from(config.project_id()?),
            zone: Zone::from(config.zone.as_str()),
            access_token: config.token()?.to_owned(),
        })
    }

    /// Project every request is scoped to.
    #[must_use]
    pub fn project(&self) -> &str {
        self.project.as_str()
    }

    /// Zone for zonal resources.
    #[must_use]
    pub fn zone(&self) -> &str {
        self.zone.as_str()
    }

    fn scope_url(&self, kind: ResourceKind) -> String {
        if kind.is_zonal() {
            format!("{}/projects/{}/zones/{}", self.api_base, self.project, self.zone)
        } else {
            format!("{}/projects/{}/global", self.api_base, self.project)
        }
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.scope_url(kind), kind.collection())
    }

    fn resource_url(&self, kind: ResourceKind, name: &str) -> String {
        format!("{}/{name}", self.collection_url(kind))
    }

    fn operation_url(&self, operation: &Operation) -> String {
        format!(
            "{}/operations/{}",
            self.scope_url(operation.target.kind),
            operation.id
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| transport(&err))
    }

    async fn read<T: DeserializeOwned>(
        response: Response,
        target: &ResourceRef,
    ) -> Result<T, ClientError> {
        let status = response.status();
        let text = response.text().await.map_err(|err| transport(&err))?;
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text, target));
        }
        serde_json::from_str(&text).map_err(|err| decode(&err))
    }

    fn operation(wire: WireOperation, target: ResourceRef) -> Operation {
        let state = wire.state();
        Operation {
            id: wire.name,
            status: state.status,
            target,
        }
    }

    async fn get_resource(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Resource>, ClientError> {
        let target = ResourceRef::new(kind, name);
        let response = self
            .send(self.http.get(self.resource_url(kind, name)))
            .await?;
        match Self::read(response, &target).await {
            Ok(raw) => Ok(Some(Resource::from_raw(kind, raw))),
            Err(ClientError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert(&self, spec: &ResourceSpec) -> Result<Operation, ClientError> {
        let target = spec.reference();
        let request_id = Uuid::new_v4().to_string();
        debug!(%target, request_id = %request_id, "submitting insert");
        let response = self
            .send(
                self.http
                    .post(self.collection_url(spec.kind()))
                    .query(&[("requestId", request_id.as_str())])
                    .json(&spec.body()),
            )
            .await?;
        let wire: WireOperation = Self::read(response, &target).await?;
        Ok(Self::operation(wire, target))
    }

    async fn fetch_operation(&self, operation: &Operation) -> Result<OperationState, ClientError> {
        let response = self
            .send(self.http.get(self.operation_url(operation)))
            .await?;
        let target = ResourceRef::new(operation.target.kind, operation.id.clone());
        let wire: WireOperation = Self::read(response, &target).await?;
        Ok(wire.state())
    }

    async fn list_all(&self, kind: ResourceKind) -> Result<Vec<Resource>, ClientError> {
        let target = ResourceRef::new(kind, kind.collection());
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(self.collection_url(kind))
                .query(&[("maxResults", LIST_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ListPage = Self::read(self.send(request).await?, &target).await?;
            resources.extend(
                page.items
                    .into_iter()
                    .map(|raw| Resource::from_raw(kind, raw)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(resources),
            }
        }
    }

    async fn remove(&self, kind: ResourceKind, name: &str) -> Result<Operation, ClientError> {
        let target = ResourceRef::new(kind, name);
        let request_id = Uuid::new_v4().to_string();
        let response = self
            .send(
                self.http
                    .delete(self.resource_url(kind, name))
                    .query(&[("requestId", request_id.as_str())]),
            )
            .await?;
        let wire: WireOperation = Self::read(response, &target).await?;
        Ok(Self::operation(wire, target))
    }
}

impl CloudClient for ComputeClient {
    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Option<Resource>> {
        Box::pin(self.get_resource(kind, name))
    }

    fn create<'a>(&'a self, spec: &'a ResourceSpec) -> ClientFuture<'a, Operation> {
        Box::pin(self.insert(spec))
    }

    fn poll_operation<'a>(&'a self, operation: &'a Operation) -> ClientFuture<'a, OperationState> {
        Box::pin(self.fetch_operation(operation))
    }

    fn list(&self, kind: ResourceKind) -> ClientFuture<'_, Vec<Resource>> {
        Box::pin(self.list_all(kind))
    }

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Operation> {
        Box::pin(self.remove(kind, name))
    }
}

#[cfg(test)]
mod tests;
