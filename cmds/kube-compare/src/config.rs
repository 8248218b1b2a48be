//! Run settings.
//!
//! Settings are read from a YAML file. Every section is optional; a missing
//! file yields the defaults. A file that fails to parse rejects the run before
//! any cluster is contacted.

use std::{
	collections::{BTreeMap, BTreeSet},
	fs,
	num::NonZeroU32,
	path::Path,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::k8s::{legacy_ingress::IngressApiVersion, Kind};

/// Page size used when neither the kind nor the run sets one.
pub const FALLBACK_BATCH_SIZE: u32 = 25;

/// How the exception lists are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum WorkMode {
	/// Compare everything except the listed objects.
	#[default]
	EverythingButNotExceptions,
	/// Compare only the listed objects.
	NothingButGivenList,
}

/// Root of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
	#[serde(default)]
	pub work_mode: WorkMode,

	/// Page size for list calls when the kind has no override.
	#[serde(default)]
	pub default_batch_size: Option<NonZeroU32>,

	/// Cap on concurrently running pair comparisons; unbounded when unset.
	#[serde(default)]
	pub max_concurrency: Option<usize>,

	#[serde(default = "default_namespaces")]
	pub namespaces: Vec<String>,

	#[serde(default)]
	pub ingress_api_version: IngressApiVersion,

	/// Per-kind overrides. Kinds without an entry are enabled with defaults.
	#[serde(default)]
	pub kinds: BTreeMap<Kind, KindSettings>,

	#[serde(default)]
	pub exceptions: ExceptionSettings,

	#[serde(default)]
	pub metadata: MetadataSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KindSettings {
	#[serde(default = "enabled")]
	pub enabled: bool,
	#[serde(default)]
	pub batch_size: Option<NonZeroU32>,
	/// Replaces the kind's built-in field selector.
	#[serde(default)]
	pub field_selector: Option<String>,
	#[serde(default)]
	pub label_selector: Option<String>,
}

impl Default for KindSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			batch_size: None,
			field_selector: None,
			label_selector: None,
		}
	}
}

/// Objects excluded from (or, in include mode, selected for) comparison.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExceptionSettings {
	/// Names matched in every kind.
	#[serde(default)]
	pub names: BTreeSet<String>,
	/// Names matched only in one kind.
	#[serde(default)]
	pub resources: BTreeMap<Kind, BTreeSet<String>>,
}

/// Metadata keys ignored when comparing labels and annotations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetadataSettings {
	#[serde(default)]
	pub skip_labels: BTreeSet<String>,
	#[serde(default = "default_skip_annotations")]
	pub skip_annotations: BTreeSet<String>,
}

impl Default for MetadataSettings {
	fn default() -> Self {
		Self {
			skip_labels: BTreeSet::new(),
			skip_annotations: default_skip_annotations(),
		}
	}
}

fn enabled() -> bool {
	true
}

fn default_namespaces() -> Vec<String> {
	vec!["default".to_string()]
}

fn default_skip_annotations() -> BTreeSet<String> {
	[
		"kubectl.kubernetes.io/last-applied-configuration",
		"deployment.kubernetes.io/revision",
	]
	.into_iter()
	.map(String::from)
	.collect()
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			work_mode: WorkMode::default(),
			default_batch_size: None,
			max_concurrency: None,
			namespaces: default_namespaces(),
			ingress_api_version: IngressApiVersion::default(),
			kinds: BTreeMap::new(),
			exceptions: ExceptionSettings::default(),
			metadata: MetadataSettings::default(),
		}
	}
}

impl Settings {
	/// Load settings from a YAML file.
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read settings file: {}", path.display()))?;
		Self::from_yaml(&content)
			.with_context(|| format!("failed to parse settings file: {}", path.display()))
	}

	pub fn from_yaml(content: &str) -> Result<Self> {
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		let settings: Settings = serde_yaml::from_str(content)?;
		if settings.max_concurrency == Some(0) {
			anyhow::bail!("maxConcurrency must be greater than zero");
		}
		if settings.namespaces.is_empty() {
			anyhow::bail!("at least one namespace must be given");
		}
		Ok(settings)
	}

	pub fn kind(&self, kind: Kind) -> KindSettings {
		self.kinds.get(&kind).cloned().unwrap_or_default()
	}

	pub fn is_enabled(&self, kind: Kind) -> bool {
		self.kinds.get(&kind).map_or(true, |k| k.enabled)
	}

	/// Kinds to compare, in comparison order.
	pub fn enabled_kinds(&self) -> impl Iterator<Item = Kind> + '_ {
		Kind::ALL.into_iter().filter(|kind| self.is_enabled(*kind))
	}

	/// Page size: kind override, then run default, then [`FALLBACK_BATCH_SIZE`].
	pub fn batch_size(&self, kind: Kind) -> u32 {
		self.kinds
			.get(&kind)
			.and_then(|k| k.batch_size)
			.or(self.default_batch_size)
			.map_or(FALLBACK_BATCH_SIZE, NonZeroU32::get)
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_empty_file_gives_defaults() {
		let settings = Settings::from_yaml("").unwrap();
		assert_eq!(settings.work_mode, WorkMode::EverythingButNotExceptions);
		assert_eq!(settings.namespaces, ["default"]);
		assert_eq!(settings.enabled_kinds().count(), Kind::ALL.len());
		assert!(settings
			.metadata
			.skip_annotations
			.contains("deployment.kubernetes.io/revision"));
	}

	#[test]
	fn test_full_file() {
		let settings = Settings::from_yaml(indoc! {"
			workMode: NothingButGivenList
			defaultBatchSize: 50
			maxConcurrency: 4
			namespaces: [prod, staging]
			ingressApiVersion: extensions/v1beta1
			kinds:
			  deployment:
			    batchSize: 10
			    labelSelector: tier=web
			  secret:
			    enabled: false
			exceptions:
			  names: [legacy]
			  resources:
			    configMap: [cluster-info]
			metadata:
			  skipLabels: [pod-template-hash]
			  skipAnnotations: []
		"})
		.unwrap();

		assert_eq!(settings.work_mode, WorkMode::NothingButGivenList);
		assert_eq!(settings.max_concurrency, Some(4));
		assert_eq!(settings.namespaces, ["prod", "staging"]);
		assert_eq!(
			settings.ingress_api_version,
			IngressApiVersion::ExtensionsV1beta1
		);
		assert!(!settings.is_enabled(Kind::Secret));
		assert!(settings.is_enabled(Kind::Service));
		assert_eq!(
			settings.kind(Kind::Deployment).label_selector.as_deref(),
			Some("tier=web")
		);
		assert!(settings.exceptions.names.contains("legacy"));
		assert!(settings.exceptions.resources[&Kind::ConfigMap].contains("cluster-info"));
		assert!(settings.metadata.skip_labels.contains("pod-template-hash"));
		assert!(settings.metadata.skip_annotations.is_empty());
	}

	#[rstest]
	#[case::kind_override("defaultBatchSize: 50\nkinds:\n  deployment:\n    batchSize: 10\n", 10)]
	#[case::global_default("defaultBatchSize: 50\n", 50)]
	#[case::fallback("workMode: EverythingButNotExceptions\n", FALLBACK_BATCH_SIZE)]
	fn test_batch_size_resolution(#[case] yaml: &str, #[case] expected: u32) {
		let settings = Settings::from_yaml(yaml).unwrap();
		assert_eq!(settings.batch_size(Kind::Deployment), expected);
	}

	#[rstest]
	#[case::zero_batch_size("defaultBatchSize: 0\n")]
	#[case::zero_kind_batch_size("kinds:\n  service:\n    batchSize: 0\n")]
	#[case::unknown_kind("kinds:\n  pod:\n    enabled: true\n")]
	#[case::unknown_exception_kind("exceptions:\n  resources:\n    pods: [a]\n")]
	#[case::unknown_work_mode("workMode: Sometimes\n")]
	#[case::unknown_key("colour: blue\n")]
	#[case::zero_concurrency("maxConcurrency: 0\n")]
	#[case::no_namespaces("namespaces: []\n")]
	fn test_invalid_settings_are_rejected(#[case] yaml: &str) {
		assert!(Settings::from_yaml(yaml).is_err());
	}
}
