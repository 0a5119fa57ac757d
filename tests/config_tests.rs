//! Integration tests for configuration validation and plan building.

#[path = "common/test_constants.rs"]
mod test_constants;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use rstest::*;
use snapfleet::startup::ScriptError;
use snapfleet::{
    CloneConfig, ClonePlan, ComputeConfig, DeployConfig, DeployError, DeployPlan, LaunchConfig,
    LaunchPlan, config::ConfigError,
};
use tempfile::TempDir;

use test_constants::{DEFAULT_TARGETS, DEFAULT_ZONE, DEMO_PROJECT};

#[fixture]
fn valid_config() -> ComputeConfig {
    ComputeConfig {
        project: Some(String::from(DEMO_PROJECT)),
        zone: String::from(DEFAULT_ZONE),
        access_token: Some(String::from("ya29.example")),
        network: String::from("global/networks/default"),
        image_project: String::from("ubuntu-os-cloud"),
        image_family: String::from("ubuntu-2204-lts"),
        api_base: String::from("https://compute.googleapis.com/compute/v1"),
        poll_interval_secs: 2,
        operation_timeout_secs: None,
    }
}

fn deploy_config() -> DeployConfig {
    DeployConfig {
        instance_name: String::from("flask-vm"),
        machine_type: String::from("f1-micro"),
        firewall_name: String::from("allow-5000"),
        network_tag: String::from("allow-5000"),
        app_port: 5000,
        startup_script: None,
        startup_script_file: None,
    }
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> String {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write(name, content)
        .unwrap_or_else(|err| panic!("write {name}: {err}"));
    root.join(name).into_string()
}

/// Every required field yields a message naming its environment variable,
/// TOML key and configuration file.
#[rstest]
#[case::project(|cfg: &mut ComputeConfig| cfg.project = None, "GCE_PROJECT", "project")]
#[case::token(|cfg: &mut ComputeConfig| cfg.access_token = Some(String::new()), "GCE_ACCESS_TOKEN", "access_token")]
#[case::zone(|cfg: &mut ComputeConfig| cfg.zone.clear(), "GCE_ZONE", "zone")]
#[case::api_base(|cfg: &mut ComputeConfig| cfg.api_base.clear(), "GCE_API_BASE", "api_base")]
#[case::image_project(|cfg: &mut ComputeConfig| cfg.image_project.clear(), "GCE_IMAGE_PROJECT", "image_project")]
#[case::image_family(|cfg: &mut ComputeConfig| cfg.image_family.clear(), "GCE_IMAGE_FAMILY", "image_family")]
#[case::network(|cfg: &mut ComputeConfig| cfg.network.clear(), "GCE_NETWORK", "network")]
fn validation_errors_are_actionable(
    mut valid_config: ComputeConfig,
    #[case] mutate: fn(&mut ComputeConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    mutate(&mut valid_config);
    let error = valid_config.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error}");
    };
    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
    assert!(message.contains("snapfleet.toml"), "error should mention file: {message}");
}

#[rstest]
fn deploy_reads_startup_script_from_file(valid_config: ComputeConfig) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_file(&dir, "boot.sh", "#!/bin/bash\necho custom\n");
    let config = DeployConfig {
        startup_script_file: Some(path),
        ..deploy_config()
    };

    let plan = DeployPlan::from_config(&valid_config, &config)
        .unwrap_or_else(|err| panic!("plan should build: {err}"));

    assert_eq!(plan.instance_name(), "flask-vm");
}

#[rstest]
fn deploy_rejects_whitespace_script_file(valid_config: ComputeConfig) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_file(&dir, "empty.sh", "  \n\t");
    let config = DeployConfig {
        startup_script_file: Some(path.clone()),
        ..deploy_config()
    };

    let err = DeployPlan::from_config(&valid_config, &config).expect_err("empty script");

    let DeployError::Script(ScriptError::FileEmpty { path: reported }) = err else {
        panic!("expected FileEmpty, got {err}");
    };
    assert_eq!(reported, path);
}

#[rstest]
fn clone_plan_uses_default_targets(valid_config: ComputeConfig) {
    let config = CloneConfig {
        source_instance: String::from("flask-vm"),
        source_disk: None,
        snapshot_name: None,
        targets: DEFAULT_TARGETS.join(","),
        machine_type: String::from("e2-medium"),
        network_tag: String::from("allow-5000"),
        app_port: 5000,
        report_path: String::from("TIMING.md"),
    };

    let plan = ClonePlan::from_config(&valid_config, &config)
        .unwrap_or_else(|err| panic!("plan should build: {err}"));

    assert_eq!(plan.snapshot(), "base-snapshot-flask-vm");
    assert_eq!(plan.targets(), DEFAULT_TARGETS);
}

#[rstest]
fn clone_plan_keeps_malformed_targets_for_the_run(valid_config: ComputeConfig) {
    let config = CloneConfig {
        source_instance: String::from("flask-vm"),
        source_disk: None,
        snapshot_name: None,
        targets: String::from("flask-clone-1,Not_Valid"),
        machine_type: String::from("e2-medium"),
        network_tag: String::from("allow-5000"),
        app_port: 5000,
        report_path: String::from("TIMING.md"),
    };

    let plan = ClonePlan::from_config(&valid_config, &config)
        .unwrap_or_else(|err| panic!("plan should build: {err}"));

    assert_eq!(plan.targets(), ["flask-clone-1", "Not_Valid"]);
}

#[rstest]
fn launch_reports_missing_payload_path(valid_config: ComputeConfig) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let missing = dir.path().join("absent.py");
    let config = LaunchConfig {
        launcher_name: String::from("vm1-launcher"),
        machine_type: String::from("n1-standard-1"),
        payload_file: Some(missing.to_string_lossy().into_owned()),
        credentials_file: None,
        payload_interpreter: None,
        wait: true,
    };

    let err = LaunchPlan::from_config(&valid_config, &config).expect_err("missing payload");
    assert!(err.to_string().contains("absent.py"), "{err}");
}
