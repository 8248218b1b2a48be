//! Structural comparators.
//!
//! Every comparator stops at the first difference it finds: the first
//! mismatch becomes the object's diff and the rest of the object is not
//! looked at. Lists are compared by length first and, only when the lengths
//! agree, element by element in order.
//!
//! Comparators return a [`Verdict`]; `Err` carries the reason comparison
//! stopped, which lets nested comparators bail out with `?`.

use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
	config::Settings,
	engine::collector::CollectError,
	k8s::{client::ClusterConnection, source::SourceError},
	storage::Severity,
};

pub mod containers;
pub mod controller;
pub mod data;
pub mod env;
pub mod ingress;
pub mod job;
pub mod metadata;
pub mod pods;
pub mod service;

/// One of the two compared clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	First,
	Second,
}

impl fmt::Display for Side {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Side::First => write!(f, "cluster 1"),
			Side::Second => write!(f, "cluster 2"),
		}
	}
}

/// A lookup made on behalf of a comparison that could not be completed.
#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("{kind} \"{name}\" referenced from env does not exist in {side}")]
	MissingObject {
		kind: &'static str,
		name: String,
		side: Side,
	},

	#[error("key \"{key}\" of {kind} \"{name}\" referenced from env does not exist in {side}")]
	MissingKey {
		kind: &'static str,
		name: String,
		key: String,
		side: Side,
	},

	#[error("fetching {kind} \"{name}\" from {side}")]
	Fetch {
		kind: &'static str,
		name: String,
		side: Side,
		#[source]
		source: SourceError,
	},

	#[error("listing pods from {side}")]
	Pods {
		side: Side,
		#[source]
		source: CollectError,
	},
}

/// Why a comparison stopped early.
#[derive(Debug, Error)]
pub enum Divergence {
	/// A structural difference; this is the object's diff.
	#[error("{message}")]
	Mismatch { severity: Severity, message: String },

	/// A lookup failed, so the objects could not be compared.
	#[error("comparison inconclusive")]
	Inconclusive(#[source] ResolveError),

	#[error("comparison cancelled")]
	Cancelled,
}

pub type Verdict = Result<(), Divergence>;

impl From<ResolveError> for Divergence {
	fn from(e: ResolveError) -> Self {
		match e {
			ResolveError::Pods {
				source: CollectError::Cancelled,
				..
			} => Divergence::Cancelled,
			e => Divergence::Inconclusive(e),
		}
	}
}

/// Everything a comparator may need besides the two objects.
#[derive(Debug, Clone)]
pub struct PairContext {
	pub first: ClusterConnection,
	pub second: ClusterConnection,
	pub namespace: String,
	pub settings: Arc<Settings>,
	pub cancel: CancellationToken,
}

impl PairContext {
	pub fn cluster(&self, side: Side) -> &ClusterConnection {
		match side {
			Side::First => &self.first,
			Side::Second => &self.second,
		}
	}
}

/// A critical mismatch.
pub(crate) fn differ(message: impl Into<String>) -> Divergence {
	Divergence::Mismatch {
		severity: Severity::Critical,
		message: message.into(),
	}
}

/// A non-critical mismatch, reported as a data point.
pub(crate) fn notice(message: impl Into<String>) -> Divergence {
	Divergence::Mismatch {
		severity: Severity::Warning,
		message: message.into(),
	}
}

pub(crate) fn ensure_count(what: &str, first: usize, second: usize) -> Verdict {
	if first == second {
		Ok(())
	} else {
		Err(differ(format!("{what} count differs: {first} vs {second}")))
	}
}

pub(crate) fn ensure_same<T>(what: &str, first: &T, second: &T) -> Verdict
where
	T: PartialEq + fmt::Display + ?Sized,
{
	if first == second {
		Ok(())
	} else {
		Err(differ(format!("{what} differs: {first} vs {second}")))
	}
}

/// Like [`ensure_same`] for optional scalars; unset renders as `<unset>`.
pub(crate) fn ensure_same_opt<T>(what: &str, first: Option<&T>, second: Option<&T>) -> Verdict
where
	T: PartialEq + fmt::Display + ?Sized,
{
	if first == second {
		Ok(())
	} else {
		Err(differ(format!(
			"{what} differs: {} vs {}",
			shown(first),
			shown(second)
		)))
	}
}

pub(crate) fn shown<T: fmt::Display + ?Sized>(value: Option<&T>) -> String {
	value.map_or_else(|| "<unset>".to_string(), ToString::to_string)
}

/// Pair up two optional values that must be present on both sides or on
/// neither.
pub(crate) fn both<'a, T>(
	what: &str,
	first: Option<&'a T>,
	second: Option<&'a T>,
) -> Result<Option<(&'a T, &'a T)>, Divergence> {
	match (first, second) {
		(Some(a), Some(b)) => Ok(Some((a, b))),
		(None, None) => Ok(None),
		(Some(_), None) => Err(differ(format!("{what} is set only in {}", Side::First))),
		(None, Some(_)) => Err(differ(format!("{what} is set only in {}", Side::Second))),
	}
}

/// Compare two string maps: size first, then every key and value.
pub(crate) fn compare_string_maps(
	what: &str,
	first: &BTreeMap<String, String>,
	second: &BTreeMap<String, String>,
) -> Verdict {
	ensure_count(what, first.len(), second.len())?;
	for (key, value) in first {
		match second.get(key) {
			None => {
				return Err(differ(format!(
					"{what} key \"{key}\" is missing in {}",
					Side::Second
				)))
			}
			Some(other) if other != value => {
				return Err(differ(format!(
					"{what} \"{key}\" differs: \"{value}\" vs \"{other}\""
				)))
			}
			Some(_) => {}
		}
	}
	Ok(())
}

/// Like [`compare_string_maps`] for values that must not be printed.
pub(crate) fn compare_hidden_maps<V: PartialEq>(
	what: &str,
	first: &BTreeMap<String, V>,
	second: &BTreeMap<String, V>,
) -> Verdict {
	ensure_count(what, first.len(), second.len())?;
	for (key, value) in first {
		match second.get(key) {
			None => {
				return Err(differ(format!(
					"{what} key \"{key}\" is missing in {}",
					Side::Second
				)))
			}
			Some(other) if other != value => {
				return Err(differ(format!("{what} \"{key}\" has different content")))
			}
			Some(_) => {}
		}
	}
	Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	/// Message of a mismatch verdict, panicking on anything else.
	pub(crate) fn message(verdict: Verdict) -> String {
		match verdict {
			Err(Divergence::Mismatch { message, .. }) => message,
			other => panic!("expected a mismatch, got {other:?}"),
		}
	}

	pub(crate) fn severity(verdict: Verdict) -> Severity {
		match verdict {
			Err(Divergence::Mismatch { severity, .. }) => severity,
			other => panic!("expected a mismatch, got {other:?}"),
		}
	}

	pub(crate) fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_compare_string_maps_equal() {
		assert!(compare_string_maps("label", &map(&[("a", "1")]), &map(&[("a", "1")])).is_ok());
	}

	#[test]
	fn test_compare_string_maps_size_first() {
		let verdict = compare_string_maps(
			"label",
			&map(&[("a", "1"), ("b", "2")]),
			&map(&[("a", "9")]),
		);
		assert_eq!(message(verdict), "label count differs: 2 vs 1");
	}

	#[test]
	fn test_compare_string_maps_missing_key() {
		let verdict = compare_string_maps("label", &map(&[("a", "1")]), &map(&[("b", "1")]));
		assert_eq!(message(verdict), "label key \"a\" is missing in cluster 2");
	}

	#[test]
	fn test_compare_string_maps_value() {
		let verdict = compare_string_maps("selector", &map(&[("a", "1")]), &map(&[("a", "2")]));
		assert_eq!(message(verdict), "selector \"a\" differs: \"1\" vs \"2\"");
	}

	#[test]
	fn test_compare_hidden_maps_never_prints_values() {
		let verdict = compare_hidden_maps("data", &map(&[("a", "secret")]), &map(&[("a", "other")]));
		assert_eq!(message(verdict), "data \"a\" has different content");
	}

	#[test]
	fn test_both_presence() {
		assert_eq!(
			message(both("replicas", Some(&1), None).map(|_| ())),
			"replicas is set only in cluster 1"
		);
		assert_eq!(
			message(both::<i32>("replicas", None, Some(&1)).map(|_| ())),
			"replicas is set only in cluster 2"
		);
		assert!(matches!(both::<i32>("replicas", None, None), Ok(None)));
	}

	#[test]
	fn test_ensure_same_opt_renders_unset() {
		assert_eq!(
			message(ensure_same_opt("image", Some("nginx:1"), None)),
			"image differs: nginx:1 vs <unset>"
		);
	}

	#[test]
	fn test_cancelled_pod_lookup_is_cancellation() {
		let divergence: Divergence = ResolveError::Pods {
			side: Side::First,
			source: CollectError::Cancelled,
		}
		.into();
		assert!(matches!(divergence, Divergence::Cancelled));
	}
}
