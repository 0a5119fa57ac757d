//! Unit tests for the Compute Engine client.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::clone::CloneSpecFactory;
use crate::resource::OperationStatus;

#[fixture]
fn config() -> ComputeConfig {
    ComputeConfig {
        project: Some(String::from("demo-project")),
        zone: String::from("us-west1-b"),
        access_token: Some(String::from("secret-token")),
        network: String::from("global/networks/default"),
        image_project: String::from("ubuntu-os-cloud"),
        image_family: String::from("ubuntu-2204-lts"),
        api_base: String::from("https://compute.example.test/compute/v1/"),
        poll_interval_secs: 2,
        operation_timeout_secs: None,
    }
}

#[fixture]
fn client(config: ComputeConfig) -> ComputeClient {
    ComputeClient::new(&config).expect("client")
}

#[rstest]
fn new_requires_credentials(mut config: ComputeConfig) {
    config.access_token = None;
    assert!(matches!(
        ComputeClient::new(&config),
        Err(ConfigError::MissingField(_))
    ));
}

#[rstest]
fn debug_output_hides_token(client: ComputeClient) {
    let rendered = format!("{client:?}");
    assert!(!rendered.contains("secret-token"), "{rendered}");
    assert!(rendered.contains("demo-project"), "{rendered}");
}

#[rstest]
#[case(
    ResourceKind::Firewall,
    "https://compute.example.test/compute/v1/projects/demo-project/global/firewalls/allow-5000"
)]
#[case(
    ResourceKind::Snapshot,
    "https://compute.example.test/compute/v1/projects/demo-project/global/snapshots/allow-5000"
)]
#[case(
    ResourceKind::Instance,
    "https://compute.example.test/compute/v1/projects/demo-project/zones/us-west1-b/instances/allow-5000"
)]
#[case(
    ResourceKind::Disk,
    "https://compute.example.test/compute/v1/projects/demo-project/zones/us-west1-b/disks/allow-5000"
)]
fn resource_urls_follow_resource_scope(
    client: ComputeClient,
    #[case] kind: ResourceKind,
    #[case] expected: &str,
) {
    assert_eq!(client.resource_url(kind, "allow-5000"), expected);
}

#[rstest]
#[case(ResourceKind::Instance, "zones/us-west1-b/operations/operation-42")]
#[case(ResourceKind::Snapshot, "global/operations/operation-42")]
fn operation_urls_match_target_scope(
    client: ComputeClient,
    #[case] kind: ResourceKind,
    #[case] suffix: &str,
) {
    let operation = Operation {
        id: String::from("operation-42"),
        status: OperationStatus::Running,
        target: ResourceRef::new(kind, "x"),
    };
    let url = client.operation_url(&operation);
    assert!(url.ends_with(suffix), "{url}");
    assert!(url.contains("/projects/demo-project/"), "{url}");
}

fn target() -> ResourceRef {
    ResourceRef::new(ResourceKind::Instance, "flask-vm")
}

#[test]
fn not_found_status_maps_to_not_found() {
    let err = classify_failure(404, "", &target());
    assert_eq!(
        err,
        ClientError::NotFound {
            kind: ResourceKind::Instance,
            name: String::from("flask-vm")
        }
    );
}

#[rstest]
#[case(409, "{}")]
#[case(
    400,
    r#"{"error":{"code":400,"message":"exists","errors":[{"reason":"alreadyExists","message":"exists"}]}}"#
)]
fn conflicts_map_to_already_exists(#[case] status: u16, #[case] body: &str) {
    assert!(classify_failure(status, body, &target()).is_already_exists());
}

#[test]
fn rejection_carries_provider_message() {
    let body = r#"{"error":{"code":403,"message":"Quota 'CPUS' exceeded.","errors":[{"reason":"quotaExceeded"}]}}"#;
    assert_eq!(
        classify_failure(403, body, &target()),
        ClientError::Rejected {
            status: 403,
            message: String::from("Quota 'CPUS' exceeded.")
        }
    );
}

#[test]
fn rejection_without_json_uses_raw_body() {
    assert_eq!(
        classify_failure(502, " upstream unavailable ", &target()),
        ClientError::Rejected {
            status: 502,
            message: String::from("upstream unavailable")
        }
    );
}

fn wire(value: Value) -> WireOperation {
    serde_json::from_value(value).expect("wire operation")
}

#[rstest]
#[case("PENDING", OperationStatus::Pending)]
#[case("RUNNING", OperationStatus::Running)]
#[case("DONE", OperationStatus::Done)]
fn operation_statuses_map_directly(#[case] status: &str, #[case] expected: OperationStatus) {
    let state = wire(json!({"name": "op", "status": status})).state();
    assert_eq!(state, OperationState::with_status(expected));
}

#[test]
fn done_with_error_block_is_error() {
    let state = wire(json!({
        "name": "op",
        "status": "DONE",
        "error": {"errors": [{"code": "ZONE_RESOURCE_POOL_EXHAUSTED", "message": "no capacity"}]}
    }))
    .state();
    assert_eq!(
        state,
        OperationState::failed("ZONE_RESOURCE_POOL_EXHAUSTED: no capacity")
    );
}

#[test]
fn list_page_without_items_is_empty() {
    let page: ListPage = serde_json::from_value(json!({"kind": "compute#instanceList"}))
        .expect("page");
    assert!(page.items.is_empty());
    assert!(page.next_page_token.is_none());
}

#[test]
fn firewall_body_opens_port_for_tag() {
    let spec = FirewallTemplate::new("global/networks/default", 5000, "allow-5000")
        .spec("allow-5000")
        .expect("spec");
    assert_eq!(
        spec.body(),
        json!({
            "name": "allow-5000",
            "network": "global/networks/default",
            "direction": "INGRESS",
            "allowed": [{"IPProtocol": "tcp", "ports": ["5000"]}],
            "sourceRanges": ["0.0.0.0/0"],
            "targetTags": ["allow-5000"]
        })
    );
}

#[test]
fn instance_body_boots_from_image_with_metadata() {
    let spec = InstanceTemplate::new(
        "us-west1-b",
        "f1-micro",
        "global/networks/default",
        BootSource::Image(String::from(
            "projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts",
        )),
    )
    .tag("allow-5000")
    .metadata(STARTUP_SCRIPT_KEY, "#!/bin/bash\necho hi\n")
    .service_scope(CLOUD_PLATFORM_SCOPE)
    .spec("flask-vm")
    .expect("spec");

    let body = spec.body();
    assert_eq!(body["machineType"], "zones/us-west1-b/machineTypes/f1-micro");
    assert_eq!(
        body["disks"][0]["initializeParams"],
        json!({"sourceImage": "projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts"})
    );
    assert_eq!(body["disks"][0]["type"], "PERSISTENT");
    assert_eq!(
        body["networkInterfaces"][0]["accessConfigs"][0],
        json!({"type": "ONE_TO_ONE_NAT", "name": "External NAT"})
    );
    assert_eq!(body["tags"], json!({"items": ["allow-5000"]}));
    assert_eq!(body["metadata"]["items"][0]["key"], STARTUP_SCRIPT_KEY);
    assert_eq!(body["serviceAccounts"][0]["email"], "default");
}

#[test]
fn instance_body_omits_empty_sections() {
    let body = InstanceTemplate::new("z", "e2-medium", "n", BootSource::Image(String::from("i")))
        .spec("vm")
        .expect("spec")
        .body();
    assert!(body.get("tags").is_none());
    assert!(body.get("metadata").is_none());
    assert!(body.get("serviceAccounts").is_none());
}

#[test]
fn clone_template_boots_from_project_snapshot() {
    let template = CloneTemplate::new("demo-project", "us-west1-b", "e2-medium", "global/networks/default")
        .network_tag("allow-5000")
        .startup_script("#!/bin/bash\n");

    let spec = template
        .clone_spec("base-snapshot-flask-vm", "flask-clone-1")
        .expect("spec");

    assert_eq!(spec.kind(), ResourceKind::Instance);
    assert_eq!(spec.name(), "flask-clone-1");
    assert_eq!(
        spec.body()["disks"][0]["initializeParams"]["sourceSnapshot"],
        "projects/demo-project/global/snapshots/base-snapshot-flask-vm"
    );
    assert_eq!(spec.body()["tags"]["items"][0], "allow-5000");
}

#[test]
fn snapshot_spec_points_at_zonal_disk() {
    let spec = snapshot_spec("base-snapshot-flask-vm", "demo-project", "us-west1-b", "flask-vm")
        .expect("spec");
    assert_eq!(
        spec.body(),
        json!({
            "name": "base-snapshot-flask-vm",
            "sourceDisk": "projects/demo-project/zones/us-west1-b/disks/flask-vm"
        })
    );
}
