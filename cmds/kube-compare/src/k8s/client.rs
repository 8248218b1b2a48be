//! Kubernetes cluster connection management.

use std::{path::PathBuf, time::Duration};

use k8s_openapi::{apimachinery::pkg::version::Info, NamespaceResourceScope};
use kube::{
	api::Api,
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config, Resource,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error("kubeconfig has no current-context and no context was given")]
	NoContext,

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// Where to find one of the two compared clusters.
#[derive(Debug, Clone, Default)]
pub struct ClusterTarget {
	/// Kubeconfig file; `$KUBECONFIG` / `~/.kube/config` when unset.
	pub kubeconfig: Option<PathBuf>,
	/// Context name; the kubeconfig's current context when unset.
	pub context: Option<String>,
}

/// Represents a connection to a Kubernetes cluster.
///
/// Cloning is cheap: the underlying client is reference counted.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	/// Human-readable identifier for the cluster (context name).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect to the cluster described by `target`.
	#[instrument(skip_all, fields(context = ?target.context))]
	pub async fn connect(target: &ClusterTarget) -> Result<Self, ConnectionError> {
		let kubeconfig = match &target.kubeconfig {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, target.context.as_deref()).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all, fields(context = ?context))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let context_name = match context {
			Some(name) => {
				if !kubeconfig.contexts.iter().any(|c| c.name == name) {
					return Err(ConnectionError::ContextNotFound(name.to_string()));
				}
				name.to_string()
			}
			None => kubeconfig
				.current_context
				.clone()
				.ok_or(ConnectionError::NoContext)?,
		};

		tracing::debug!(context = %context_name, "using context");

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: Some(context_name.clone()),
				..Default::default()
			},
		)
		.await?;

		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;
		tracing::info!(
			context = %context_name,
			version = %server_version.git_version,
			"connected to cluster"
		);

		Ok(Self {
			client,
			server_version,
			cluster_identifier: context_name,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Context name and server version, as shown in the report header.
	pub fn describe(&self) -> String {
		format!(
			"{}, {}",
			self.cluster_identifier, self.server_version.git_version
		)
	}

	/// Get the cluster identifier (context name).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}

	/// Typed API handle for a namespaced resource.
	pub fn api<K>(&self, namespace: &str) -> Api<K>
	where
		K: Resource<Scope = NamespaceResourceScope>,
		<K as Resource>::DynamicType: Default,
	{
		Api::namespaced(self.client.clone(), namespace)
	}
}
