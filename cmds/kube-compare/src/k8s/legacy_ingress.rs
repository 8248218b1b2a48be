//! `v1beta1` Ingress support.
//!
//! Older clusters serve Ingresses only from `extensions/v1beta1` or
//! `networking.k8s.io/v1beta1`. Those objects are read as dynamic objects and
//! converted into the `networking.k8s.io/v1` shape, so the comparator only
//! ever sees one representation.

use k8s_openapi::{
	api::{
		core::v1::TypedLocalObjectReference,
		networking::v1::{
			HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
			IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
		},
	},
	apimachinery::pkg::util::intstr::IntOrString,
};
use kube::{
	api::{Api, ApiResource, DynamicObject, GroupVersionKind},
	Client,
};
use serde::{Deserialize, Serialize};

use super::source::{ObjectSource, Page, PageRequest, SourceError};

/// Which Ingress API the clusters are read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IngressApiVersion {
	#[default]
	#[serde(rename = "networking.k8s.io/v1")]
	NetworkingV1,
	#[serde(rename = "networking.k8s.io/v1beta1")]
	NetworkingV1beta1,
	#[serde(rename = "extensions/v1beta1")]
	ExtensionsV1beta1,
}

impl IngressApiVersion {
	fn legacy_resource(self) -> Option<ApiResource> {
		let group = match self {
			IngressApiVersion::NetworkingV1 => return None,
			IngressApiVersion::NetworkingV1beta1 => "networking.k8s.io",
			IngressApiVersion::ExtensionsV1beta1 => "extensions",
		};
		let gvk = GroupVersionKind::gvk(group, "v1beta1", "Ingress");
		Some(ApiResource::from_gvk_with_plural(&gvk, "ingresses"))
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyIngressSpec {
	backend: Option<LegacyBackend>,
	ingress_class_name: Option<String>,
	rules: Option<Vec<LegacyRule>>,
	tls: Option<Vec<IngressTLS>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyBackend {
	service_name: Option<String>,
	service_port: Option<IntOrString>,
	resource: Option<TypedLocalObjectReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LegacyRule {
	host: Option<String>,
	http: Option<LegacyHttp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LegacyHttp {
	#[serde(default)]
	paths: Vec<LegacyPath>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPath {
	path: Option<String>,
	path_type: Option<String>,
	#[serde(default)]
	backend: LegacyBackend,
}

impl From<LegacyBackend> for IngressBackend {
	fn from(backend: LegacyBackend) -> Self {
		let service = backend.service_name.map(|name| IngressServiceBackend {
			name,
			port: backend.service_port.map(|port| match port {
				IntOrString::Int(number) => ServiceBackendPort {
					number: Some(number),
					name: None,
				},
				IntOrString::String(name) => ServiceBackendPort {
					number: None,
					name: Some(name),
				},
			}),
		});
		IngressBackend {
			service,
			resource: backend.resource,
		}
	}
}

impl From<LegacyIngressSpec> for IngressSpec {
	fn from(spec: LegacyIngressSpec) -> Self {
		IngressSpec {
			default_backend: spec.backend.map(Into::into),
			ingress_class_name: spec.ingress_class_name,
			rules: spec.rules.map(|rules| {
				rules
					.into_iter()
					.map(|rule| IngressRule {
						host: rule.host,
						http: rule.http.map(|http| HTTPIngressRuleValue {
							paths: http
								.paths
								.into_iter()
								.map(|path| HTTPIngressPath {
									path: path.path,
									// v1beta1 defaulted to ImplementationSpecific
									path_type: path
										.path_type
										.unwrap_or_else(|| "ImplementationSpecific".to_string()),
									backend: path.backend.into(),
								})
								.collect(),
						}),
					})
					.collect()
			}),
			tls: spec.tls,
		}
	}
}

/// Convert a `v1beta1` Ingress read as a dynamic object into the `v1` shape.
pub fn to_v1(object: DynamicObject) -> Result<Ingress, SourceError> {
	let name = object.metadata.name.clone().unwrap_or_default();
	let spec = match object.data.get("spec") {
		Some(spec) => Some(
			serde_json::from_value::<LegacyIngressSpec>(spec.clone())
				.map_err(|source| SourceError::Decode { name, source })?
				.into(),
		),
		None => None,
	};
	Ok(Ingress {
		metadata: object.metadata,
		spec,
		status: None,
	})
}

/// Ingress source that always yields the `v1` shape.
pub enum IngressSource {
	V1(Api<Ingress>),
	Legacy(Api<DynamicObject>),
}

impl IngressSource {
	pub fn new(client: Client, namespace: &str, version: IngressApiVersion) -> Self {
		match version.legacy_resource() {
			Some(resource) => {
				IngressSource::Legacy(Api::namespaced_with(client, namespace, &resource))
			}
			None => IngressSource::V1(Api::namespaced(client, namespace)),
		}
	}
}

impl ObjectSource<Ingress> for IngressSource {
	async fn list_page(&self, request: &PageRequest<'_>) -> Result<Page<Ingress>, SourceError> {
		match self {
			IngressSource::V1(api) => api.list_page(request).await,
			IngressSource::Legacy(api) => {
				let page = api.list_page(request).await?;
				Ok(Page {
					items: page
						.items
						.into_iter()
						.map(to_v1)
						.collect::<Result<_, _>>()?,
					continue_token: page.continue_token,
				})
			}
		}
	}

	async fn fetch(&self, name: &str) -> Result<Option<Ingress>, SourceError> {
		match self {
			IngressSource::V1(api) => ObjectSource::fetch(api, name).await,
			IngressSource::Legacy(api) => ObjectSource::fetch(api, name).await?.map(to_v1).transpose(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn legacy(spec: serde_json::Value) -> DynamicObject {
		serde_json::from_value(serde_json::json!({
			"apiVersion": "networking.k8s.io/v1beta1",
			"kind": "Ingress",
			"metadata": { "name": "web", "namespace": "default" },
			"spec": spec,
		}))
		.unwrap()
	}

	#[test]
	fn test_to_v1_converts_backends() {
		let ingress = to_v1(legacy(serde_json::json!({
			"backend": { "serviceName": "fallback", "servicePort": 80 },
			"rules": [{
				"host": "example.com",
				"http": { "paths": [{
					"path": "/api",
					"backend": { "serviceName": "api", "servicePort": "http" }
				}]}
			}],
			"tls": [{ "hosts": ["example.com"], "secretName": "tls" }]
		})))
		.unwrap();

		let spec = ingress.spec.unwrap();
		assert_eq!(
			spec.default_backend,
			Some(IngressBackend {
				service: Some(IngressServiceBackend {
					name: "fallback".to_string(),
					port: Some(ServiceBackendPort {
						number: Some(80),
						name: None,
					}),
				}),
				resource: None,
			})
		);

		let rules = spec.rules.unwrap();
		let path = &rules[0].http.as_ref().unwrap().paths[0];
		assert_eq!(path.path.as_deref(), Some("/api"));
		assert_eq!(path.path_type, "ImplementationSpecific");
		assert_eq!(
			path.backend.service.as_ref().unwrap().port,
			Some(ServiceBackendPort {
				number: None,
				name: Some("http".to_string()),
			})
		);
		assert_eq!(
			spec.tls.unwrap()[0].secret_name.as_deref(),
			Some("tls")
		);
		assert_eq!(ingress.metadata.name.as_deref(), Some("web"));
	}

	#[test]
	fn test_to_v1_without_spec() {
		let object: DynamicObject = serde_json::from_value(serde_json::json!({
			"apiVersion": "extensions/v1beta1",
			"kind": "Ingress",
			"metadata": { "name": "bare" },
		}))
		.unwrap();
		assert_eq!(to_v1(object).unwrap().spec, None);
	}

	#[test]
	fn test_to_v1_rejects_malformed_spec() {
		let result = to_v1(legacy(serde_json::json!({ "rules": "not-a-list" })));
		assert!(matches!(result, Err(SourceError::Decode { name, .. }) if name == "web"));
	}
}
