use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use kube_compare::{cli::Cli, telemetry};

fn main() -> Result<ExitCode> {
	let cli = Cli::parse();
	let _guard = telemetry::init(cli.log_level, cli.log_format)?;
	kube_compare::cli::run(cli, std::io::stdout())
}
