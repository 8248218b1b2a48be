//! HTTP-based mock Kubernetes server using wiremock.
//!
//! The server answers `GET` for single objects and for collections of the
//! resources in [`crate::catalog`]. Collections honour `limit`/`continue`
//! pagination and equality-based label and field selectors. Continuation
//! tokens are plain offsets into the name-ordered collection.

use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
	time::Duration,
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use crate::{
	catalog::{MockApiResource, ResourcePath},
	helpers::{field_value, label_value, Selector},
};

/// Objects keyed by collection path, then by name.
type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Resources to serve as raw manifests. The API path is derived from
	/// apiVersion, kind and namespace (`default` when unset).
	#[builder(default)]
	resources: Vec<Value>,
	/// Collection paths, such as `/api/v1/namespaces/default/secrets`, that
	/// answer every request under them with `500`.
	#[builder(default)]
	failing_paths: Vec<String>,
	/// Collection paths whose responses are held back by `slow_response_delay`.
	#[builder(default)]
	slow_paths: Vec<String>,
	#[builder(default = Duration::from_millis(200))]
	slow_response_delay: Duration,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

struct State {
	collections: Collections,
	failing_paths: Vec<String>,
	slow_paths: Vec<String>,
	slow_response_delay: Duration,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut collections = Collections::new();
		for manifest in self.resources {
			let Some((collection, name)) = object_key(&manifest) else {
				warn!(%manifest, "ignoring manifest of unknown kind");
				continue;
			};
			trace!(%collection, %name, "Registered resource");
			collections
				.entry(collection)
				.or_default()
				.insert(name, manifest);
		}

		let state = Arc::new(State {
			collections,
			failing_paths: self.failing_paths,
			slow_paths: self.slow_paths,
			slow_response_delay: self.slow_response_delay,
		});

		mount_version(&server).await;
		mount_resources(&server, state).await;

		RunningHttpMockK8sServer { server }
	}
}

/// Collection path and name of a manifest.
fn object_key(manifest: &Value) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?;
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str)
		.unwrap_or("default");

	let resource = MockApiResource::by_kind(api_version, kind)?;
	Some((resource.collection_path(namespace), name.to_string()))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Number of requests received for `path`, query string excluded.
	pub async fn request_count(&self, path: &str) -> usize {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.filter(|request| request.url.path() == path)
			.count()
	}
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_resources(server: &MockServer, state: Arc<State>) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/apis?/"))
		.respond_with(move |req: &Request| state.respond(req))
		.mount(server)
		.await;
}

impl State {
	fn respond(&self, req: &Request) -> ResponseTemplate {
		let request_path = req.url.path().trim_end_matches('/');
		let response = self.serve(request_path, req);
		if covers(&self.slow_paths, request_path) {
			return response.set_delay(self.slow_response_delay);
		}
		response
	}

	fn serve(&self, request_path: &str, req: &Request) -> ResponseTemplate {
		if covers(&self.failing_paths, request_path) {
			return status(500, "InternalError", "injected failure");
		}

		let Some(parsed) = ResourcePath::parse(request_path) else {
			return status(404, "NotFound", "the server could not find the requested resource");
		};
		let collection = self.collections.get(&parsed.collection_path());

		match &parsed.name {
			Some(name) => match collection.and_then(|objects| objects.get(name)) {
				Some(object) => ResponseTemplate::new(200).set_body_json(object),
				None => status(
					404,
					"NotFound",
					&format!("{} \"{name}\" not found", parsed.resource.plural),
				),
			},
			None => list(parsed.resource, collection, req),
		}
	}

}

/// Whether `request_path` is one of `paths` or lies below one of them.
fn covers(paths: &[String], request_path: &str) -> bool {
	paths.iter().any(|prefix| {
		request_path == prefix
			|| request_path
				.strip_prefix(prefix.as_str())
				.is_some_and(|rest| rest.starts_with('/'))
	})
}

/// One page of a collection.
fn list(
	resource: &MockApiResource,
	collection: Option<&BTreeMap<String, Value>>,
	req: &Request,
) -> ResponseTemplate {
	let query: HashMap<String, String> = req.url.query_pairs().into_owned().collect();
	let selector = |key: &str| query.get(key).map(|raw| Selector::parse(raw)).transpose();
	let (fields, labels) = match (selector("fieldSelector"), selector("labelSelector")) {
		(Ok(fields), Ok(labels)) => (fields.unwrap_or_default(), labels.unwrap_or_default()),
		(Err(message), _) | (_, Err(message)) => return status(400, "BadRequest", &message),
	};

	let matching: Vec<&Value> = collection
		.into_iter()
		.flat_map(BTreeMap::values)
		.filter(|object| fields.matches(|path| field_value(object, path)))
		.filter(|object| labels.matches(|key| label_value(object, key)))
		.collect();

	let offset = match query.get("continue").map(|token| token.parse::<usize>()) {
		None => 0,
		Some(Ok(offset)) if offset <= matching.len() => offset,
		Some(_) => return status(410, "Expired", "the provided continue parameter is too old"),
	};
	let limit = query
		.get("limit")
		.and_then(|limit| limit.parse::<usize>().ok())
		.filter(|limit| *limit > 0)
		.unwrap_or(usize::MAX);
	let end = offset.saturating_add(limit).min(matching.len());
	let items = &matching[offset..end];

	let mut metadata = json!({ "resourceVersion": "1" });
	if end < matching.len() {
		metadata["continue"] = json!(end.to_string());
	}
	trace!(kind = resource.kind, offset, returned = items.len(), "Serving list page");

	ResponseTemplate::new(200).set_body_json(json!({
		"kind": format!("{}List", resource.kind),
		"apiVersion": resource.api_version,
		"metadata": metadata,
		"items": items,
	}))
}

fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}
