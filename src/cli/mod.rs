//! Command-line interface definitions for the `snapfleet` binary.
//!
//! The parser structures live here so both the binary and the build script
//! can use them; the build script renders the manual page from them.

use clap::Parser;

/// Top-level CLI for the `snapfleet` binary.
#[derive(Debug, Parser)]
#[command(
    name = "snapfleet",
    about = "Deploy a web VM on Compute Engine, snapshot it, and time its clones",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create the firewall rule and the web VM.
    #[command(name = "deploy", about = "Create the firewall rule and the web VM")]
    Deploy(DeployCommand),
    /// Snapshot the web VM and clone it into new instances.
    #[command(
        name = "clone",
        about = "Snapshot the web VM, clone it, and write a timing report"
    )]
    Clone(CloneCommand),
    /// Start a launcher VM that provisions another VM.
    #[command(name = "launch", about = "Start a launcher VM that provisions another VM")]
    Launch(LaunchCommand),
    /// Delete named instances.
    #[command(name = "teardown", about = "Delete named instances and verify they are gone")]
    Teardown(TeardownCommand),
    /// List instances in the configured project and zone.
    #[command(name = "list", about = "List instances in the configured zone")]
    List,
}

/// Arguments for `snapfleet deploy`.
#[derive(Debug, Default, Parser)]
pub(crate) struct DeployCommand {
    /// Override the web VM name.
    #[arg(long, value_name = "NAME")]
    pub(crate) instance_name: Option<String>,
    /// Override the web VM machine type.
    #[arg(long, value_name = "TYPE")]
    pub(crate) machine_type: Option<String>,
    /// Override the port the app listens on and the firewall opens.
    #[arg(long, value_name = "PORT")]
    pub(crate) app_port: Option<u16>,
    /// Provide the startup script inline, replacing the bundled one.
    #[arg(long, value_name = "SCRIPT", conflicts_with = "startup_script_file")]
    pub(crate) startup_script: Option<String>,
    /// Provide the startup script from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "startup_script")]
    pub(crate) startup_script_file: Option<String>,
}

/// Arguments for `snapfleet clone`.
#[derive(Debug, Default, Parser)]
pub(crate) struct CloneCommand {
    /// Instance whose boot disk is snapshotted.
    #[arg(long, value_name = "NAME")]
    pub(crate) source_instance: Option<String>,
    /// Override the snapshot name.
    #[arg(long, value_name = "NAME")]
    pub(crate) snapshot_name: Option<String>,
    /// Comma-separated clone names, created in order.
    #[arg(long, value_name = "NAMES")]
    pub(crate) targets: Option<String>,
    /// Override the clone machine type.
    #[arg(long, value_name = "TYPE")]
    pub(crate) machine_type: Option<String>,
    /// Override the port the restarted app listens on.
    #[arg(long, value_name = "PORT")]
    pub(crate) app_port: Option<u16>,
    /// Where to write the timing report.
    #[arg(long, value_name = "PATH")]
    pub(crate) report_path: Option<String>,
}

/// Arguments for `snapfleet launch`.
#[derive(Debug, Default, Parser)]
pub(crate) struct LaunchCommand {
    /// Override the launcher VM name.
    #[arg(long, value_name = "NAME")]
    pub(crate) launcher_name: Option<String>,
    /// Program the launcher runs.
    #[arg(long, value_name = "PATH")]
    pub(crate) payload_file: Option<String>,
    /// Service account key passed to the payload.
    #[arg(long, value_name = "PATH")]
    pub(crate) credentials_file: Option<String>,
    /// Command that runs the payload, such as `python3`.
    #[arg(long, value_name = "COMMAND")]
    pub(crate) interpreter: Option<String>,
    /// Return once the launcher is requested instead of waiting for it.
    #[arg(long)]
    pub(crate) no_wait: bool,
}

/// Arguments for `snapfleet teardown`.
#[derive(Debug, Default, Parser)]
pub(crate) struct TeardownCommand {
    /// Instances to delete; defaults to the configured clone targets.
    #[arg(value_name = "NAME")]
    pub(crate) names: Vec<String>,
}
