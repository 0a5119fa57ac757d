//! Request bodies for firewalls, instances and snapshots.

use serde::Serialize;

use crate::clone::CloneSpecFactory;
use crate::resource::{ResourceKind, ResourceSpec, SpecError};

/// OAuth scope granting a VM's service account full API access.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Metadata key the guest agent runs at boot.
pub const STARTUP_SCRIPT_KEY: &str = "startup-script";

const DEFAULT_SERVICE_ACCOUNT: &str = "default";
const ANY_SOURCE: &str = "0.0.0.0/0";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirewallBody<'a> {
    network: &'a str,
    direction: &'static str,
    allowed: [AllowedPorts; 1],
    source_ranges: [&'static str; 1],
    target_tags: [&'a str; 1],
}

#[derive(Serialize)]
struct AllowedPorts {
    #[serde(rename = "IPProtocol")]
    ip_protocol: &'static str,
    ports: [String; 1],
}

/// Ingress rule opening one TCP port to instances carrying a network tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirewallTemplate {
    network: String,
    port: u16,
    target_tag: String,
}

impl FirewallTemplate {
    /// Creates a template for `network`.
    #[must_use]
    pub fn new(network: impl Into<String>, port: u16, target_tag: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            port,
            target_tag: target_tag.into(),
        }
    }

    /// Builds the firewall spec.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when `name` is invalid.
    pub fn spec(&self, name: &str) -> Result<ResourceSpec, SpecError> {
        let body = FirewallBody {
            network: &self.network,
            direction: "INGRESS",
            allowed: [AllowedPorts {
                ip_protocol: "tcp",
                ports: [self.port.to_string()],
            }],
            source_ranges: [ANY_SOURCE],
            target_tags: [self.target_tag.as_str()],
        };
        ResourceSpec::from_body(ResourceKind::Firewall, name, &body)
    }
}

/// Where the boot disk of a new instance comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootSource {
    /// Image or image family URL.
    Image(String),
    /// Snapshot URL.
    Snapshot(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceBody<'a> {
    machine_type: String,
    disks: [AttachedDisk<'a>; 1],
    network_interfaces: [NetworkInterface<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Tags<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    service_accounts: Vec<ServiceAccount<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachedDisk<'a> {
    boot: bool,
    auto_delete: bool,
    #[serde(rename = "type")]
    disk_type: &'static str,
    initialize_params: InitializeParams<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source_image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_snapshot: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface<'a> {
    network: &'a str,
    access_configs: [AccessConfig; 1],
}

#[derive(Serialize)]
struct AccessConfig {
    #[serde(rename = "type")]
    config_type: &'static str,
    name: &'static str,
}

#[derive(Serialize)]
struct Tags<'a> {
    items: &'a [String],
}

#[derive(Serialize)]
struct Metadata<'a> {
    items: Vec<MetadataEntry<'a>>,
}

#[derive(Serialize)]
struct MetadataEntry<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct ServiceAccount<'a> {
    email: &'static str,
    scopes: &'a [String],
}

/// Description of a VM with a single persistent boot disk and an external
/// NAT address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceTemplate {
    zone: String,
    machine_type: String,
    network: String,
    boot: BootSource,
    tags: Vec<String>,
    metadata: Vec<(String, String)>,
    service_scopes: Vec<String>,
}

impl InstanceTemplate {
    /// Creates a template for `machine_type` in `zone`.
    #[must_use]
    pub fn new(
        zone: impl Into<String>,
        machine_type: impl Into<String>,
        network: impl Into<String>,
        boot: BootSource,
    ) -> Self {
        Self {
            zone: zone.into(),
            machine_type: machine_type.into(),
            network: network.into(),
            boot,
            tags: Vec::new(),
            metadata: Vec::new(),
            service_scopes: Vec::new(),
        }
    }

    /// Adds a network tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets a metadata entry, replacing an earlier value for the same key.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.metadata.iter_mut().find(|(existing, _)| *existing == key) {
            entry.1 = value;
        } else {
            self.metadata.push((key, value));
        }
        self
    }

    /// Attaches the default service account with the given OAuth scope.
    #[must_use]
    pub fn service_scope(mut self, scope: impl Into<String>) -> Self {
        self.service_scopes.push(scope.into());
        self
    }

    /// Partial machine type URL.
    #[must_use]
    pub fn machine_type_url(&self) -> String {
        format!("zones/{}/machineTypes/{}", self.zone, self.machine_type)
    }

    /// Builds the instance spec.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when `name` is invalid.
    pub fn spec(&self, name: &str) -> Result<ResourceSpec, SpecError> {
        let initialize_params = match &self.boot {
            BootSource::Image(image) => InitializeParams {
                source_image: Some(image.as_str()),
                source_snapshot: None,
            },
            BootSource::Snapshot(snapshot) => InitializeParams {
                source_image: None,
                source_snapshot: Some(snapshot.as_str()),
            },
        };
        let body = InstanceBody {
            machine_type: self.machine_type_url(),
            disks: [AttachedDisk {
                boot: true,
                auto_delete: true,
                disk_type: "PERSISTENT",
                initialize_params,
            }],
            network_interfaces: [NetworkInterface {
                network: &self.network,
                access_configs: [AccessConfig {
                    config_type: "ONE_TO_ONE_NAT",
                    name: "External NAT",
                }],
            }],
            tags: (!self.tags.is_empty()).then_some(Tags { items: &self.tags }),
            metadata: (!self.metadata.is_empty()).then(|| Metadata {
                items: self
                    .metadata
                    .iter()
                    .map(|(key, value)| MetadataEntry { key, value })
                    .collect(),
            }),
            service_accounts: if self.service_scopes.is_empty() {
                Vec::new()
            } else {
                vec![ServiceAccount {
                    email: DEFAULT_SERVICE_ACCOUNT,
                    scopes: &self.service_scopes,
                }]
            },
        };
        ResourceSpec::from_body(ResourceKind::Instance, name, &body)
    }
}

/// Full snapshot URL within `project`.
#[must_use]
pub fn snapshot_url(project: &str, snapshot: &str) -> String {
    format!("projects/{project}/global/snapshots/{snapshot}")
}

/// Full disk URL within `project` and `zone`.
#[must_use]
pub fn disk_url(project: &str, zone: &str, disk: &str) -> String {
    format!("projects/{project}/zones/{zone}/disks/{disk}")
}

/// Builds a snapshot spec capturing `disk`.
///
/// # Errors
///
/// Returns [`SpecError`] when `name` is invalid.
pub fn snapshot_spec(
    name: &str,
    project: &str,
    zone: &str,
    disk: &str,
) -> Result<ResourceSpec, SpecError> {
    ResourceSpec::builder(ResourceKind::Snapshot)
        .name(name)
        .parameter("sourceDisk", disk_url(project, zone, disk))
        .build()
}

/// Builds clone instances that boot from a snapshot in one project.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneTemplate {
    project: String,
    zone: String,
    machine_type: String,
    network: String,
    network_tag: String,
    startup_script: String,
}

impl CloneTemplate {
    /// Creates a clone template.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        zone: impl Into<String>,
        machine_type: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            machine_type: machine_type.into(),
            network: network.into(),
            network_tag: String::new(),
            startup_script: String::new(),
        }
    }

    /// Tags each clone so firewall rules apply.
    #[must_use]
    pub fn network_tag(mut self, tag: impl Into<String>) -> Self {
        self.network_tag = tag.into();
        self
    }

    /// Startup script run on each clone.
    #[must_use]
    pub fn startup_script(mut self, script: impl Into<String>) -> Self {
        self.startup_script = script.into();
        self
    }
}

impl CloneSpecFactory for CloneTemplate {
    fn clone_spec(&self, snapshot: &str, target: &str) -> Result<ResourceSpec, SpecError> {
        let mut template = InstanceTemplate::new(
            &self.zone,
            &self.machine_type,
            &self.network,
            BootSource::Snapshot(snapshot_url(&self.project, snapshot)),
        );
        if !self.network_tag.trim().is_empty() {
            template = template.tag(&self.network_tag);
        }
        if !self.startup_script.trim().is_empty() {
            template = template.metadata(STARTUP_SCRIPT_KEY, &self.startup_script);
        }
        template.spec(target)
    }
}
