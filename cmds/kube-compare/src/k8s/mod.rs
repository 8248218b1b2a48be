//! Kubernetes access for the comparison engine.
//!
//! This module provides cluster connections, the paginated object source
//! abstraction over kube-rs, and the legacy Ingress adapter.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod legacy_ingress;
pub mod source;

/// Resource kinds the engine knows how to compare.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Kind {
	Deployment,
	StatefulSet,
	DaemonSet,
	Job,
	CronJob,
	Service,
	Ingress,
	ConfigMap,
	Secret,
}

impl Kind {
	/// All kinds, in the order they are compared.
	pub const ALL: [Kind; 9] = [
		Kind::Deployment,
		Kind::StatefulSet,
		Kind::DaemonSet,
		Kind::Job,
		Kind::CronJob,
		Kind::Service,
		Kind::Ingress,
		Kind::ConfigMap,
		Kind::Secret,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Kind::Deployment => "Deployment",
			Kind::StatefulSet => "StatefulSet",
			Kind::DaemonSet => "DaemonSet",
			Kind::Job => "Job",
			Kind::CronJob => "CronJob",
			Kind::Service => "Service",
			Kind::Ingress => "Ingress",
			Kind::ConfigMap => "ConfigMap",
			Kind::Secret => "Secret",
		}
	}
}

impl fmt::Display for Kind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
