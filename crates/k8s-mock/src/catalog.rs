//! Resources the mock server knows how to serve.

/// A namespaced API resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockApiResource {
	pub api_version: &'static str,
	pub kind: &'static str,
	pub plural: &'static str,
}

const fn resource(
	api_version: &'static str,
	kind: &'static str,
	plural: &'static str,
) -> MockApiResource {
	MockApiResource {
		api_version,
		kind,
		plural,
	}
}

pub const RESOURCES: &[MockApiResource] = &[
	resource("v1", "Pod", "pods"),
	resource("v1", "Service", "services"),
	resource("v1", "ConfigMap", "configmaps"),
	resource("v1", "Secret", "secrets"),
	resource("apps/v1", "Deployment", "deployments"),
	resource("apps/v1", "StatefulSet", "statefulsets"),
	resource("apps/v1", "DaemonSet", "daemonsets"),
	resource("batch/v1", "Job", "jobs"),
	resource("batch/v1", "CronJob", "cronjobs"),
	resource("networking.k8s.io/v1", "Ingress", "ingresses"),
	resource("networking.k8s.io/v1beta1", "Ingress", "ingresses"),
	resource("extensions/v1beta1", "Ingress", "ingresses"),
];

impl MockApiResource {
	pub fn by_kind(api_version: &str, kind: &str) -> Option<&'static Self> {
		RESOURCES
			.iter()
			.find(|r| r.api_version == api_version && r.kind == kind)
	}

	pub fn by_plural(api_version: &str, plural: &str) -> Option<&'static Self> {
		RESOURCES
			.iter()
			.find(|r| r.api_version == api_version && r.plural == plural)
	}

	/// Collection path of this resource in `namespace`.
	pub fn collection_path(&self, namespace: &str) -> String {
		let prefix = if self.api_version.contains('/') {
			"apis"
		} else {
			"api"
		};
		format!(
			"/{prefix}/{}/namespaces/{namespace}/{}",
			self.api_version, self.plural
		)
	}
}

/// A request path split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
	pub resource: &'static MockApiResource,
	pub namespace: String,
	/// `None` for collection requests.
	pub name: Option<String>,
}

impl ResourcePath {
	/// Parse `/api/v1/namespaces/{ns}/{plural}[/{name}]` or the `/apis/{group}/{version}/...`
	/// equivalent. Paths of unknown resources yield `None`.
	pub fn parse(path: &str) -> Option<Self> {
		let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
		let (api_version, rest) = match segments.as_slice() {
			["api", version, rest @ ..] => ((*version).to_string(), rest),
			["apis", group, version, rest @ ..] => (format!("{group}/{version}"), rest),
			_ => return None,
		};
		let (namespace, plural, name) = match rest {
			["namespaces", namespace, plural] => (namespace, plural, None),
			["namespaces", namespace, plural, name] => (namespace, plural, Some(*name)),
			_ => return None,
		};
		Some(Self {
			resource: MockApiResource::by_plural(&api_version, plural)?,
			namespace: (*namespace).to_string(),
			name: name.map(String::from),
		})
	}

	pub fn collection_path(&self) -> String {
		self.resource.collection_path(&self.namespace)
	}
}
