//! Container environment variables.
//!
//! Values that come from ConfigMaps or Secrets are looked up in each cluster
//! and compared by content, not by the name of the referenced object.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{
	ConfigMap, Container, EnvVar, EnvVarSource, ObjectFieldSelector, ResourceFieldSelector,
	Secret,
};

use super::{differ, ensure_count, ensure_same, PairContext, ResolveError, Side, Verdict};
use crate::k8s::source::ObjectSource;

/// The effective value of an env var.
#[derive(Debug, Clone, PartialEq)]
enum Resolved {
	/// Literal or dereferenced value; `None` for an absent optional reference.
	Value {
		bytes: Option<Vec<u8>>,
		/// Came from a Secret and must not be printed.
		sensitive: bool,
	},
	Field(ObjectFieldSelector),
	Resource(ResourceFieldSelector),
}

impl Resolved {
	fn literal(value: Option<&str>) -> Self {
		Resolved::Value {
			bytes: value.map(|v| v.as_bytes().to_vec()),
			sensitive: false,
		}
	}

	fn same_as(&self, other: &Resolved) -> bool {
		match (self, other) {
			(Resolved::Value { bytes: a, .. }, Resolved::Value { bytes: b, .. }) => a == b,
			(a, b) => a == b,
		}
	}

	fn is_sensitive(&self) -> bool {
		matches!(self, Resolved::Value { sensitive: true, .. })
	}

	fn describe(&self) -> String {
		match self {
			Resolved::Value { bytes: None, .. } => "<unset>".to_string(),
			Resolved::Value { bytes: Some(bytes), .. } => {
				format!("\"{}\"", String::from_utf8_lossy(bytes))
			}
			Resolved::Field(field) => format!("fieldRef {}", field.field_path),
			Resolved::Resource(resource) => format!("resourceFieldRef {}", resource.resource),
		}
	}
}

/// Looks up referenced objects in one cluster, caching them per object name.
struct EnvResolver<'a> {
	ctx: &'a PairContext,
	side: Side,
	config_maps: HashMap<String, Option<ConfigMap>>,
	secrets: HashMap<String, Option<Secret>>,
}

impl<'a> EnvResolver<'a> {
	fn new(ctx: &'a PairContext, side: Side) -> Self {
		Self {
			ctx,
			side,
			config_maps: HashMap::new(),
			secrets: HashMap::new(),
		}
	}

	async fn config_map(&mut self, name: &str) -> Result<Option<&ConfigMap>, ResolveError> {
		if !self.config_maps.contains_key(name) {
			let api = self
				.ctx
				.cluster(self.side)
				.api::<ConfigMap>(&self.ctx.namespace);
			let fetched = api.fetch(name).await.map_err(|source| ResolveError::Fetch {
				kind: "ConfigMap",
				name: name.to_string(),
				side: self.side,
				source,
			})?;
			self.config_maps.insert(name.to_string(), fetched);
		}
		Ok(self.config_maps.get(name).and_then(Option::as_ref))
	}

	async fn secret(&mut self, name: &str) -> Result<Option<&Secret>, ResolveError> {
		if !self.secrets.contains_key(name) {
			let api = self.ctx.cluster(self.side).api::<Secret>(&self.ctx.namespace);
			let fetched = api.fetch(name).await.map_err(|source| ResolveError::Fetch {
				kind: "Secret",
				name: name.to_string(),
				side: self.side,
				source,
			})?;
			self.secrets.insert(name.to_string(), fetched);
		}
		Ok(self.secrets.get(name).and_then(Option::as_ref))
	}

	async fn resolve(&mut self, var: &EnvVar) -> Result<Resolved, ResolveError> {
		let Some(source) = &var.value_from else {
			return Ok(Resolved::literal(var.value.as_deref()));
		};
		self.resolve_source(source).await
	}

	async fn resolve_source(&mut self, source: &EnvVarSource) -> Result<Resolved, ResolveError> {
		let side = self.side;

		if let Some(selector) = &source.config_map_key_ref {
			let optional = selector.optional.unwrap_or(false);
			let value = match self.config_map(&selector.name).await? {
				Some(config_map) => config_map
					.data
					.as_ref()
					.and_then(|data| data.get(&selector.key))
					.map(|v| v.as_bytes().to_vec())
					.or_else(|| {
						config_map
							.binary_data
							.as_ref()
							.and_then(|data| data.get(&selector.key))
							.map(|v| v.0.clone())
					}),
				None if optional => None,
				None => {
					return Err(ResolveError::MissingObject {
						kind: "ConfigMap",
						name: selector.name.clone(),
						side,
					})
				}
			};
			if value.is_none() && !optional {
				return Err(ResolveError::MissingKey {
					kind: "ConfigMap",
					name: selector.name.clone(),
					key: selector.key.clone(),
					side,
				});
			}
			return Ok(Resolved::Value {
				bytes: value,
				sensitive: false,
			});
		}

		if let Some(selector) = &source.secret_key_ref {
			let optional = selector.optional.unwrap_or(false);
			let value = match self.secret(&selector.name).await? {
				Some(secret) => secret
					.data
					.as_ref()
					.and_then(|data| data.get(&selector.key))
					.map(|v| v.0.clone())
					.or_else(|| {
						secret
							.string_data
							.as_ref()
							.and_then(|data| data.get(&selector.key))
							.map(|v| v.as_bytes().to_vec())
					}),
				None if optional => None,
				None => {
					return Err(ResolveError::MissingObject {
						kind: "Secret",
						name: selector.name.clone(),
						side,
					})
				}
			};
			if value.is_none() && !optional {
				return Err(ResolveError::MissingKey {
					kind: "Secret",
					name: selector.name.clone(),
					key: selector.key.clone(),
					side,
				});
			}
			return Ok(Resolved::Value {
				bytes: value,
				sensitive: true,
			});
		}

		if let Some(field) = &source.field_ref {
			return Ok(Resolved::Field(field.clone()));
		}
		if let Some(resource) = &source.resource_field_ref {
			return Ok(Resolved::Resource(resource.clone()));
		}
		Ok(Resolved::literal(None))
	}
}

/// Compare the env lists of two containers at the same position.
pub async fn compare_env(ctx: &PairContext, first: &Container, second: &Container) -> Verdict {
	let container = &first.name;
	let first_env = first.env.as_deref().unwrap_or_default();
	let second_env = second.env.as_deref().unwrap_or_default();

	ensure_count(
		&format!("container \"{container}\" env"),
		first_env.len(),
		second_env.len(),
	)?;

	let mut first_resolver = EnvResolver::new(ctx, Side::First);
	let mut second_resolver = EnvResolver::new(ctx, Side::Second);

	for (index, (a, b)) in first_env.iter().zip(second_env).enumerate() {
		ensure_same(
			&format!("container \"{container}\" env #{index} name"),
			&a.name,
			&b.name,
		)?;

		let (resolved_a, resolved_b) =
			tokio::try_join!(first_resolver.resolve(a), second_resolver.resolve(b))?;
		if !resolved_a.same_as(&resolved_b) {
			let name = &a.name;
			return Err(if resolved_a.is_sensitive() || resolved_b.is_sensitive() {
				differ(format!(
					"container \"{container}\" env \"{name}\" resolves to different secret values"
				))
			} else {
				differ(format!(
					"container \"{container}\" env \"{name}\" differs: {} vs {}",
					resolved_a.describe(),
					resolved_b.describe()
				))
			});
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_literal_equals_dereferenced_value() {
		let literal = Resolved::literal(Some("debug"));
		let from_secret = Resolved::Value {
			bytes: Some(b"debug".to_vec()),
			sensitive: true,
		};
		assert!(literal.same_as(&from_secret));
		assert!(from_secret.is_sensitive());
	}

	#[test]
	fn test_field_refs_compare_structurally() {
		let pod_name = Resolved::Field(ObjectFieldSelector {
			api_version: None,
			field_path: "metadata.name".to_string(),
		});
		let pod_ip = Resolved::Field(ObjectFieldSelector {
			api_version: None,
			field_path: "status.podIP".to_string(),
		});
		assert!(pod_name.same_as(&pod_name.clone()));
		assert!(!pod_name.same_as(&pod_ip));
		assert!(!pod_name.same_as(&Resolved::literal(Some("metadata.name"))));
		assert_eq!(pod_ip.describe(), "fieldRef status.podIP");
	}

	#[test]
	fn test_describe_values() {
		assert_eq!(Resolved::literal(None).describe(), "<unset>");
		assert_eq!(Resolved::literal(Some("1")).describe(), "\"1\"");
	}
}
