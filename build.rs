//! Renders the `snapfleet` man pages into `OUT_DIR`: `snapfleet.1` for the
//! top-level command and `snapfleet-<subcommand>.1` for each workflow.

use std::env;
use std::io::{Write, stdout};

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

const BIN_NAME: &str = "snapfleet";

fn render(command: Command) -> std::io::Result<Vec<u8>> {
    let mut page = Vec::new();
    Man::new(command).render(&mut page)?;
    Ok(page)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cargo = stdout();
    writeln!(cargo, "cargo:rerun-if-changed=build.rs")?;
    writeln!(cargo, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = Utf8PathBuf::from(env::var("OUT_DIR")?);
    let pages = Dir::open_ambient_dir(&out_dir, ambient_authority())?;

    let mut command = Cli::command().name(BIN_NAME);
    command.build();
    pages.write(format!("{BIN_NAME}.1"), render(command.clone())?)?;

    // `build` gives each subcommand the display name `snapfleet-<name>`.
    for subcommand in command.get_subcommands() {
        let page = render(subcommand.clone())?;
        pages.write(format!("{BIN_NAME}-{}.1", subcommand.get_name()), page)?;
    }

    Ok(())
}
