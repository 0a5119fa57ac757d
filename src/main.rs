//! Binary entry point for the snapfleet CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use snapfleet::clone::workflow::{CloneConfig, CloneWorkflow, CloneWorkflowError, ClonePlan};
use snapfleet::inventory::{instance_names, render_names};
use snapfleet::poll::FixedInterval;
use snapfleet::resource::ResourceKind;
use snapfleet::test_support::FakeCloud;
use snapfleet::{
    ClientError, CloudClient, ComputeClient, ComputeConfig, ConfigError, DeployConfig,
    DeployError, DeployOrchestrator, DeployPlan, LaunchConfig, LaunchError, LaunchOrchestrator,
    LaunchPlan, Teardown, TeardownError,
};

mod cli;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, CloneCommand, DeployCommand, LaunchCommand, TeardownCommand};

const LOG_ENV: &str = "SNAPFLEET_LOG";
const FAKE_CLOUD_ENV: &str = "SNAPFLEET_FAKE_CLOUD";
const FAKE_EXISTING_ENV: &str = "SNAPFLEET_FAKE_EXISTING";
const FAKE_PROJECT: &str = "snapfleet-fake";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cloud request failed: {0}")]
    Client(#[from] ClientError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Clone(#[from] CloneWorkflowError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stdout)
        .try_init()
        .ok();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mut compute = ComputeConfig::load_without_cli_args()?;
    compute.validate_scope()?;
    let wait = compute.wait_strategy();

    if let Some(cloud) = fake_cloud_from_env() {
        compute.project.get_or_insert_with(|| FAKE_PROJECT.to_owned());
        warn!("{FAKE_CLOUD_ENV} is set; using an in-memory cloud");
        return run(cli, &compute, &cloud, wait).await;
    }

    let client = ComputeClient::new(&compute)?;
    run(cli, &compute, &client, wait).await
}

async fn run<C>(cli: Cli, compute: &ComputeConfig, client: C, wait: FixedInterval) -> Result<(), CliError>
where
    C: CloudClient + Clone,
{
    match cli {
        Cli::Deploy(command) => {
            let config = apply_deploy_overrides(DeployConfig::load_without_cli_args()?, command);
            let plan = DeployPlan::from_config(compute, &config)?;
            let outcome = DeployOrchestrator::new(client.clone(), wait)
                .execute(&plan)
                .await?;
            if let Some(url) = outcome.app_url() {
                writeln!(io::stdout(), "Visit {url} to see the web app").ok();
            }
        }
        Cli::Clone(command) => {
            let config = apply_clone_overrides(CloneConfig::load_without_cli_args()?, command);
            let plan = ClonePlan::from_config(compute, &config)?;
            let clone_run = CloneWorkflow::new(client.clone(), wait).execute(&plan).await?;
            let failed = clone_run.failures().count();
            if failed > 0 {
                warn!(failed, "{failed} clone target(s) failed");
            }
        }
        Cli::Launch(command) => {
            let config = apply_launch_overrides(LaunchConfig::load_without_cli_args()?, command);
            let plan = LaunchPlan::from_config(compute, &config)?;
            let outcome = LaunchOrchestrator::new(client.clone(), wait)
                .execute(&plan)
                .await?;
            if let Some(address) = outcome.external_ip {
                info!(%address, "launcher '{}' is running", plan.launcher_name());
            }
        }
        Cli::Teardown(command) => {
            let names = teardown_names(command)?;
            let summary = Teardown::new(client.clone(), wait).execute(&names).await?;
            info!(
                deleted = summary.deleted.len(),
                absent = summary.absent.len(),
                "teardown complete"
            );
        }
        Cli::List => {}
    }

    let names = instance_names(&client).await?;
    write!(io::stdout(), "{}", render_names(&names)).ok();
    Ok(())
}

fn apply_deploy_overrides(mut config: DeployConfig, command: DeployCommand) -> DeployConfig {
    if let Some(name) = command.instance_name {
        config.instance_name = name;
    }
    if let Some(machine_type) = command.machine_type {
        config.machine_type = machine_type;
    }
    if let Some(port) = command.app_port {
        config.app_port = port;
    }
    if command.startup_script.is_some() || command.startup_script_file.is_some() {
        config.startup_script = command.startup_script;
        config.startup_script_file = command.startup_script_file;
    }
    config
}

fn apply_clone_overrides(mut config: CloneConfig, command: CloneCommand) -> CloneConfig {
    if let Some(source) = command.source_instance {
        config.source_instance = source;
    }
    if command.snapshot_name.is_some() {
        config.snapshot_name = command.snapshot_name;
    }
    if let Some(targets) = command.targets {
        config.targets = targets;
    }
    if let Some(machine_type) = command.machine_type {
        config.machine_type = machine_type;
    }
    if let Some(port) = command.app_port {
        config.app_port = port;
    }
    if let Some(path) = command.report_path {
        config.report_path = path;
    }
    config
}

fn apply_launch_overrides(mut config: LaunchConfig, command: LaunchCommand) -> LaunchConfig {
    if let Some(name) = command.launcher_name {
        config.launcher_name = name;
    }
    if command.payload_file.is_some() {
        config.payload_file = command.payload_file;
    }
    if command.credentials_file.is_some() {
        config.credentials_file = command.credentials_file;
    }
    if command.interpreter.is_some() {
        config.payload_interpreter = command.interpreter;
    }
    if command.no_wait {
        config.wait = false;
    }
    config
}

fn teardown_names(command: TeardownCommand) -> Result<Vec<String>, CliError> {
    if !command.names.is_empty() {
        return Ok(command.names);
    }
    Ok(CloneConfig::load_without_cli_args()?.target_names())
}

fn fake_cloud_from_env() -> Option<FakeCloud> {
    let enabled = env::var(FAKE_CLOUD_ENV).ok()?;
    if !matches!(enabled.trim(), "1" | "true") {
        return None;
    }
    let cloud = FakeCloud::new();
    if let Ok(existing) = env::var(FAKE_EXISTING_ENV) {
        for name in existing.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            cloud.insert_existing(ResourceKind::Instance, name);
        }
    }
    Some(cloud)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
