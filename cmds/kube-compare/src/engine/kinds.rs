//! Per-kind capabilities.
//!
//! Each comparable kind is a zero-sized type implementing [`ResourceKind`].
//! The engine is generic over this trait, so collection, matching and the
//! fan-out are written once for all kinds.

use std::{fmt::Debug, future::Future};

use k8s_openapi::api::{
	apps::v1::{DaemonSet, Deployment, StatefulSet},
	batch::v1::{CronJob, Job},
	core::v1::{ConfigMap, Secret, Service},
	networking::v1::Ingress,
};
use kube::{api::Api, Resource};

use crate::{
	compare::{
		both,
		controller::{compare_pod_controllers, PodController},
		data, ingress, job, service, Divergence, PairContext, Verdict,
	},
	config::Settings,
	k8s::{client::ClusterConnection, legacy_ingress::IngressSource, source::ObjectSource, Kind},
};

pub trait ResourceKind: Send + Sync + 'static {
	const KIND: Kind;

	type Object: Resource + Clone + Debug + Send + Sync + 'static;
	type Source: ObjectSource<Self::Object>;

	/// Source of this kind's objects in one namespace of one cluster.
	fn source(conn: &ClusterConnection, namespace: &str, settings: &Settings) -> Self::Source;

	/// Field selector used when none is configured.
	fn default_field_selector() -> Option<&'static str> {
		None
	}

	/// A configured selector replaces the default one.
	fn field_selector(settings: &Settings) -> Option<String> {
		settings
			.kind(Self::KIND)
			.field_selector
			.or_else(|| Self::default_field_selector().map(String::from))
	}

	fn label_selector(settings: &Settings) -> Option<String> {
		settings.kind(Self::KIND).label_selector
	}

	/// Compare the specs of two objects with the same name. Metadata has
	/// already been compared by the caller.
	fn compare(
		ctx: &PairContext,
		first: &Self::Object,
		second: &Self::Object,
	) -> impl Future<Output = Verdict> + Send;
}

/// Both projections, or a mismatch when only one object has a spec.
fn controllers<'a>(
	first: Option<PodController<'a>>,
	second: Option<PodController<'a>>,
) -> Result<Option<(PodController<'a>, PodController<'a>)>, Divergence> {
	Ok(both("spec", first.as_ref(), second.as_ref())?.map(|(a, b)| (a.clone(), b.clone())))
}

pub struct Deployments;

impl ResourceKind for Deployments {
	const KIND: Kind = Kind::Deployment;
	type Object = Deployment;
	type Source = Api<Deployment>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(ctx: &PairContext, first: &Deployment, second: &Deployment) -> Verdict {
		let Some((a, b)) = controllers(
			PodController::from_deployment(first),
			PodController::from_deployment(second),
		)?
		else {
			return Ok(());
		};
		compare_pod_controllers(ctx, &a, &b).await
	}
}

pub struct StatefulSets;

impl ResourceKind for StatefulSets {
	const KIND: Kind = Kind::StatefulSet;
	type Object = StatefulSet;
	type Source = Api<StatefulSet>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(ctx: &PairContext, first: &StatefulSet, second: &StatefulSet) -> Verdict {
		let Some((a, b)) = controllers(
			PodController::from_stateful_set(first),
			PodController::from_stateful_set(second),
		)?
		else {
			return Ok(());
		};
		compare_pod_controllers(ctx, &a, &b).await
	}
}

pub struct DaemonSets;

impl ResourceKind for DaemonSets {
	const KIND: Kind = Kind::DaemonSet;
	type Object = DaemonSet;
	type Source = Api<DaemonSet>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(ctx: &PairContext, first: &DaemonSet, second: &DaemonSet) -> Verdict {
		let Some((a, b)) = controllers(
			PodController::from_daemon_set(first),
			PodController::from_daemon_set(second),
		)?
		else {
			return Ok(());
		};
		compare_pod_controllers(ctx, &a, &b).await
	}
}

pub struct Jobs;

impl ResourceKind for Jobs {
	const KIND: Kind = Kind::Job;
	type Object = Job;
	type Source = Api<Job>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(ctx: &PairContext, first: &Job, second: &Job) -> Verdict {
		job::compare_jobs(ctx, first, second).await
	}
}

pub struct CronJobs;

impl ResourceKind for CronJobs {
	const KIND: Kind = Kind::CronJob;
	type Object = CronJob;
	type Source = Api<CronJob>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(ctx: &PairContext, first: &CronJob, second: &CronJob) -> Verdict {
		job::compare_cron_jobs(ctx, first, second).await
	}
}

pub struct Services;

impl ResourceKind for Services {
	const KIND: Kind = Kind::Service;
	type Object = Service;
	type Source = Api<Service>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	async fn compare(_: &PairContext, first: &Service, second: &Service) -> Verdict {
		service::compare_services(first, second)
	}
}

pub struct Ingresses;

impl ResourceKind for Ingresses {
	const KIND: Kind = Kind::Ingress;
	type Object = Ingress;
	type Source = IngressSource;

	fn source(conn: &ClusterConnection, namespace: &str, settings: &Settings) -> Self::Source {
		IngressSource::new(conn.client().clone(), namespace, settings.ingress_api_version)
	}

	async fn compare(_: &PairContext, first: &Ingress, second: &Ingress) -> Verdict {
		ingress::compare_ingresses(first, second)
	}
}

pub struct ConfigMaps;

impl ResourceKind for ConfigMaps {
	const KIND: Kind = Kind::ConfigMap;
	type Object = ConfigMap;
	type Source = Api<ConfigMap>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	/// Every namespace gets its own copy of the cluster CA bundle.
	fn default_field_selector() -> Option<&'static str> {
		Some("metadata.name!=kube-root-ca.crt")
	}

	async fn compare(_: &PairContext, first: &ConfigMap, second: &ConfigMap) -> Verdict {
		data::compare_config_maps(first, second)
	}
}

pub struct Secrets;

impl ResourceKind for Secrets {
	const KIND: Kind = Kind::Secret;
	type Object = Secret;
	type Source = Api<Secret>;

	fn source(conn: &ClusterConnection, namespace: &str, _: &Settings) -> Self::Source {
		conn.api(namespace)
	}

	/// Service account tokens are generated per cluster.
	fn default_field_selector() -> Option<&'static str> {
		Some("type!=kubernetes.io/service-account-token")
	}

	async fn compare(_: &PairContext, first: &Secret, second: &Secret) -> Verdict {
		data::compare_secrets(first, second)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use rstest::rstest;

	use super::*;
	use crate::config::KindSettings;

	#[rstest]
	#[case(Kind::ConfigMap, ConfigMaps::field_selector(&Settings::default()), Some("metadata.name!=kube-root-ca.crt"))]
	#[case(Kind::Secret, Secrets::field_selector(&Settings::default()), Some("type!=kubernetes.io/service-account-token"))]
	#[case(Kind::Deployment, Deployments::field_selector(&Settings::default()), None)]
	fn test_default_field_selectors(
		#[case] kind: Kind,
		#[case] selector: Option<String>,
		#[case] expected: Option<&str>,
	) {
		assert_eq!(selector.as_deref(), expected, "{kind}");
	}

	#[test]
	fn test_configured_selectors_replace_defaults() {
		let settings = Settings {
			kinds: BTreeMap::from([(
				Kind::Secret,
				KindSettings {
					field_selector: Some("type=Opaque".to_string()),
					label_selector: Some("team=payments".to_string()),
					..KindSettings::default()
				},
			)]),
			..Settings::default()
		};
		assert_eq!(Secrets::field_selector(&settings).as_deref(), Some("type=Opaque"));
		assert_eq!(
			Secrets::label_selector(&settings).as_deref(),
			Some("team=payments")
		);
		assert_eq!(ConfigMaps::label_selector(&settings), None);
	}

	#[test]
	fn test_kinds_are_distinct() {
		let kinds = [
			Deployments::KIND,
			StatefulSets::KIND,
			DaemonSets::KIND,
			Jobs::KIND,
			CronJobs::KIND,
			Services::KIND,
			Ingresses::KIND,
			ConfigMaps::KIND,
			Secrets::KIND,
		];
		assert_eq!(kinds, Kind::ALL);
	}
}
