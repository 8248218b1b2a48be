//! Label and field selector evaluation.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
	Equals(String, String),
	NotEquals(String, String),
	Exists(String),
	NotExists(String),
}

/// An equality-based selector, `a=b,c!=d,e,!f`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector(Vec<Requirement>);

impl Selector {
	pub fn parse(raw: &str) -> Result<Self, String> {
		raw.split(',')
			.map(str::trim)
			.filter(|term| !term.is_empty())
			.map(|term| {
				let requirement = if let Some((key, value)) = term.split_once("!=") {
					Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
				} else if let Some((key, value)) = term.split_once("==") {
					Requirement::Equals(key.trim().to_string(), value.trim().to_string())
				} else if let Some((key, value)) = term.split_once('=') {
					Requirement::Equals(key.trim().to_string(), value.trim().to_string())
				} else if let Some(key) = term.strip_prefix('!') {
					Requirement::NotExists(key.trim().to_string())
				} else {
					Requirement::Exists(term.to_string())
				};
				match &requirement {
					Requirement::Equals(key, _)
					| Requirement::NotEquals(key, _)
					| Requirement::Exists(key)
					| Requirement::NotExists(key)
						if key.is_empty() || key.contains(char::is_whitespace) =>
					{
						Err(format!("unsupported selector term `{term}`"))
					}
					_ => Ok(requirement),
				}
			})
			.collect::<Result<_, _>>()
			.map(Selector)
	}

	/// Whether every requirement holds, reading values through `lookup`.
	pub fn matches(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
		self.0.iter().all(|requirement| match requirement {
			Requirement::Equals(key, value) => lookup(key).as_ref() == Some(value),
			Requirement::NotEquals(key, value) => lookup(key).as_ref() != Some(value),
			Requirement::Exists(key) => lookup(key).is_some(),
			Requirement::NotExists(key) => lookup(key).is_none(),
		})
	}
}

/// Value of a dotted field path such as `status.phase`, rendered as a string.
pub fn field_value(object: &Value, path: &str) -> Option<String> {
	let value = path
		.split('.')
		.try_fold(object, |value, segment| value.get(segment))?;
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Null => None,
		other => Some(other.to_string()),
	}
}

pub fn label_value(object: &Value, key: &str) -> Option<String> {
	object
		.pointer("/metadata/labels")?
		.get(key)?
		.as_str()
		.map(String::from)
}
