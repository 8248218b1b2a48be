//! Command line entry point.

use std::{io::Write, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::{
	config::Settings,
	engine::{Engine, RunSummary},
	k8s::client::{ClusterConnection, ClusterTarget},
	report,
	storage::DiffStorage,
	telemetry::LogFormat,
};

/// Exit status when critical differences were found.
pub const EXIT_DIFFERENCES: u8 = 16;

/// Exit status of a run interrupted before it finished, as for SIGINT.
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	#[default]
	Text,
	Json,
}

#[derive(Debug, Parser)]
#[command(name = "kube-compare")]
#[command(about = "Compare the configuration of two Kubernetes clusters", long_about = None)]
#[command(version = env!("KUBE_COMPARE_VERSION"))]
pub struct Cli {
	/// Settings file (YAML)
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Kubeconfig context of the first cluster
	#[arg(long = "context-1")]
	pub context_1: String,

	/// Kubeconfig context of the second cluster
	#[arg(long = "context-2")]
	pub context_2: String,

	/// Kubeconfig file of the first cluster (default: KUBECONFIG or ~/.kube/config)
	#[arg(long = "kubeconfig-1")]
	pub kubeconfig_1: Option<PathBuf>,

	/// Kubeconfig file of the second cluster
	#[arg(long = "kubeconfig-2")]
	pub kubeconfig_2: Option<PathBuf>,

	/// Namespace to compare; repeatable, overrides the settings file
	#[arg(short = 'n', long = "namespace")]
	pub namespaces: Vec<String>,

	#[arg(long, value_enum, default_value_t)]
	pub output: OutputFormat,

	/// Log level (trace, debug, info, warn, error); defaults to RUST_LOG or info
	#[arg(long)]
	pub log_level: Option<Level>,

	#[arg(long, value_enum, default_value_t)]
	pub log_format: LogFormat,

	/// Exit with 0 even when differences are found
	#[arg(short = 'z', long)]
	pub exit_zero: bool,
}

impl Cli {
	/// Settings file merged with command line overrides.
	pub fn settings(&self) -> Result<Settings> {
		let mut settings = match &self.config {
			Some(path) if path.exists() => Settings::load_from_file(path)?,
			Some(path) => {
				tracing::warn!(path = %path.display(), "settings file not found, using defaults");
				Settings::default()
			}
			None => Settings::default(),
		};
		if !self.namespaces.is_empty() {
			settings.namespaces = self.namespaces.clone();
		}
		Ok(settings)
	}

	fn targets(&self) -> (ClusterTarget, ClusterTarget) {
		(
			ClusterTarget {
				kubeconfig: self.kubeconfig_1.clone(),
				context: Some(self.context_1.clone()),
			},
			ClusterTarget {
				kubeconfig: self.kubeconfig_2.clone(),
				context: Some(self.context_2.clone()),
			},
		)
	}
}

/// Exit status for a finished run.
///
/// `exit_zero` silences differences and failed kinds, never a cancelled run.
pub fn exit_status(storage: &DiffStorage, summary: &RunSummary, exit_zero: bool) -> Result<u8> {
	if summary.cancelled {
		return Ok(EXIT_CANCELLED);
	}
	if exit_zero {
		return Ok(0);
	}
	if !summary.failures.is_empty() {
		return Ok(1);
	}
	if storage.has_critical()? {
		return Ok(EXIT_DIFFERENCES);
	}
	Ok(0)
}

/// Run a comparison and write the report to `writer`.
pub fn run<W: Write>(cli: Cli, writer: W) -> Result<ExitCode> {
	// Settings errors reject the run before any cluster is contacted.
	let settings = cli.settings()?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(cli, settings, writer))
}

async fn run_async<W: Write>(cli: Cli, settings: Settings, mut writer: W) -> Result<ExitCode> {
	let (first_target, second_target) = cli.targets();
	let (first, second) = tokio::try_join!(
		async {
			ClusterConnection::connect(&first_target)
				.await
				.with_context(|| format!("connecting to cluster 1 ({})", cli.context_1))
		},
		async {
			ClusterConnection::connect(&second_target)
				.await
				.with_context(|| format!("connecting to cluster 2 ({})", cli.context_2))
		},
	)?;

	let cancel = CancellationToken::new();
	tokio::spawn({
		let cancel = cancel.clone();
		async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::warn!("interrupted, stopping the comparison");
				cancel.cancel();
			}
		}
	});

	let first_name = first.describe();
	let second_name = second.describe();
	let engine = Engine::new(first, second, Arc::new(settings), cancel);
	let summary = engine.run().await.context("comparing clusters")?;

	let storage = engine.storage();
	let rendered = match cli.output {
		OutputFormat::Text => report::render_text(storage, &summary, &first_name, &second_name)?,
		OutputFormat::Json => report::render_json(storage)?,
	};
	writeln!(writer, "{}", rendered.trim_end()).context("writing report")?;

	exit_status(storage, &summary, cli.exit_zero).map(ExitCode::from)
}
