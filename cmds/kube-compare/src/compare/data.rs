//! ConfigMap and Secret payloads.
//!
//! Binary and secret values are compared by content but never printed.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};

use super::{compare_hidden_maps, compare_string_maps, ensure_same_opt, Verdict};

pub fn compare_config_maps(first: &ConfigMap, second: &ConfigMap) -> Verdict {
	compare_string_maps(
		"data",
		first.data.as_ref().unwrap_or(&BTreeMap::new()),
		second.data.as_ref().unwrap_or(&BTreeMap::new()),
	)?;
	compare_hidden_maps(
		"binaryData",
		first.binary_data.as_ref().unwrap_or(&BTreeMap::new()),
		second.binary_data.as_ref().unwrap_or(&BTreeMap::new()),
	)
}

pub fn compare_secrets(first: &Secret, second: &Secret) -> Verdict {
	ensure_same_opt("type", first.type_.as_deref(), second.type_.as_deref())?;
	compare_hidden_maps(
		"data",
		first.data.as_ref().unwrap_or(&BTreeMap::new()),
		second.data.as_ref().unwrap_or(&BTreeMap::new()),
	)
}
