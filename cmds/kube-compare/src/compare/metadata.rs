//! Labels and annotations.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{compare_hidden_maps, compare_string_maps, Verdict};
use crate::{config::MetadataSettings, k8s::Kind};

fn without_keys(
	map: Option<&BTreeMap<String, String>>,
	skip: &BTreeSet<String>,
) -> BTreeMap<String, String> {
	map.into_iter()
		.flatten()
		.filter(|(key, _)| !skip.contains(*key))
		.map(|(k, v)| (k.clone(), v.clone()))
		.collect()
}

/// Compare labels, then annotations, ignoring the configured keys.
///
/// Annotation values of Secrets are not printed: the last applied
/// configuration annotation carries the secret's data.
pub fn compare_metadata(
	kind: Kind,
	first: &ObjectMeta,
	second: &ObjectMeta,
	settings: &MetadataSettings,
) -> Verdict {
	compare_string_maps(
		"label",
		&without_keys(first.labels.as_ref(), &settings.skip_labels),
		&without_keys(second.labels.as_ref(), &settings.skip_labels),
	)?;
	let first = without_keys(first.annotations.as_ref(), &settings.skip_annotations);
	let second = without_keys(second.annotations.as_ref(), &settings.skip_annotations);
	if kind == Kind::Secret {
		compare_hidden_maps("annotation", &first, &second)
	} else {
		compare_string_maps("annotation", &first, &second)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::compare::tests::{map, message};

	fn meta(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> ObjectMeta {
		ObjectMeta {
			name: Some("web".to_string()),
			labels: (!labels.is_empty()).then(|| map(labels)),
			annotations: (!annotations.is_empty()).then(|| map(annotations)),
			..ObjectMeta::default()
		}
	}

	#[test]
	fn test_skipped_keys_are_ignored() {
		let settings = MetadataSettings {
			skip_labels: ["pod-template-hash".to_string()].into(),
			..MetadataSettings::default()
		};
		let first = meta(
			&[("app", "web"), ("pod-template-hash", "abc")],
			&[("deployment.kubernetes.io/revision", "3")],
		);
		let second = meta(&[("app", "web")], &[("deployment.kubernetes.io/revision", "7")]);
		assert!(compare_metadata(Kind::Deployment, &first, &second, &settings).is_ok());
	}

	#[test]
	fn test_labels_before_annotations() {
		let first = meta(&[("app", "web")], &[("owner", "a")]);
		let second = meta(&[("app", "api")], &[("owner", "b")]);
		assert_eq!(
			message(compare_metadata(Kind::Deployment, &first, &second, &MetadataSettings::default())),
			"label \"app\" differs: \"web\" vs \"api\""
		);
	}

	#[test]
	fn test_annotation_difference() {
		let first = meta(&[], &[("owner", "a")]);
		let second = meta(&[], &[]);
		assert_eq!(
			message(compare_metadata(Kind::Deployment, &first, &second, &MetadataSettings::default())),
			"annotation count differs: 1 vs 0"
		);
	}

	#[test]
	fn test_secret_annotations_are_not_printed() {
		let applied = "kubectl.kubernetes.io/last-applied-configuration";
		let first = meta(&[], &[(applied, r#"{"data":{"token":"c2VjcmV0"}}"#)]);
		let second = meta(&[], &[(applied, r#"{"data":{"token":"b3RoZXI="}}"#)]);
		let keep_all = MetadataSettings {
			skip_annotations: BTreeSet::new(),
			..MetadataSettings::default()
		};
		let verdict = compare_metadata(Kind::Secret, &first, &second, &keep_all);
		assert_eq!(
			message(verdict),
			format!("annotation \"{applied}\" has different content")
		);

		let verdict = compare_metadata(Kind::ConfigMap, &first, &second, &keep_all);
		assert!(message(verdict).contains("c2VjcmV0"));
	}

	#[test]
	fn test_missing_and_empty_labels_are_equal() {
		let first = ObjectMeta {
			labels: Some(BTreeMap::new()),
			..ObjectMeta::default()
		};
		assert!(compare_metadata(
			Kind::ConfigMap,
			&first,
			&ObjectMeta::default(),
			&MetadataSettings::default()
		)
		.is_ok());
	}
}
