//! Pod-template-bearing controllers.
//!
//! Deployments, StatefulSets, DaemonSets, Jobs and CronJobs are all projected
//! into a [`PodController`] and compared by one algorithm: replicas, then the
//! label selector, then the pod template's containers.

use k8s_openapi::{
	api::{
		apps::v1::{DaemonSet, Deployment, StatefulSet},
		batch::v1::JobSpec,
		core::v1::PodTemplateSpec,
	},
	apimachinery::pkg::apis::meta::v1::LabelSelector,
};

use super::{both, containers::compare_containers, ensure_same, PairContext, Verdict};
use crate::k8s::Kind;

/// Kind-agnostic view of a controller, borrowing from the source object.
#[derive(Debug, Clone)]
pub struct PodController<'a> {
	pub kind: Kind,
	pub replicas: Option<i32>,
	pub selector: Option<&'a LabelSelector>,
	pub template: &'a PodTemplateSpec,
	/// Label selector used to find the controller's running pods; `None`
	/// skips the running pod checks.
	pub pod_selector: Option<String>,
}

impl<'a> PodController<'a> {
	pub fn from_deployment(deployment: &'a Deployment) -> Option<Self> {
		let spec = deployment.spec.as_ref()?;
		Some(Self {
			kind: Kind::Deployment,
			replicas: spec.replicas,
			selector: Some(&spec.selector),
			template: &spec.template,
			pod_selector: Some(selector_string(&spec.selector)),
		})
	}

	pub fn from_stateful_set(stateful_set: &'a StatefulSet) -> Option<Self> {
		let spec = stateful_set.spec.as_ref()?;
		Some(Self {
			kind: Kind::StatefulSet,
			replicas: spec.replicas,
			selector: Some(&spec.selector),
			template: &spec.template,
			pod_selector: Some(selector_string(&spec.selector)),
		})
	}

	pub fn from_daemon_set(daemon_set: &'a DaemonSet) -> Option<Self> {
		let spec = daemon_set.spec.as_ref()?;
		Some(Self {
			kind: Kind::DaemonSet,
			replicas: None,
			selector: Some(&spec.selector),
			template: &spec.template,
			pod_selector: Some(selector_string(&spec.selector)),
		})
	}

	/// Project a job spec.
	///
	/// The job's own selector carries a per-cluster controller uid, so it is
	/// not compared; pods are found through their `job-name` label instead.
	/// `pod_selector` is `None` for job templates of CronJobs, whose pods
	/// belong to individual runs.
	pub fn from_job_spec(kind: Kind, spec: &'a JobSpec, pod_selector: Option<String>) -> Self {
		Self {
			kind,
			replicas: None,
			selector: None,
			template: &spec.template,
			pod_selector,
		}
	}
}

/// Render a label selector the way `kubectl` accepts it: sorted
/// `key=value` terms followed by the match expressions, comma separated.
pub fn selector_string(selector: &LabelSelector) -> String {
	let labels = selector
		.match_labels
		.iter()
		.flatten()
		.map(|(key, value)| format!("{key}={value}"));

	let expressions = selector.match_expressions.iter().flatten().map(|req| {
		let values = req.values.as_deref().unwrap_or_default().join(",");
		match req.operator.as_str() {
			"In" => format!("{} in ({values})", req.key),
			"NotIn" => format!("{} notin ({values})", req.key),
			"Exists" => req.key.clone(),
			"DoesNotExist" => format!("!{}", req.key),
			other => format!("{} {other} ({values})", req.key),
		}
	});

	labels.chain(expressions).collect::<Vec<_>>().join(",")
}

/// Replicas and selector, the parts of a controller that need no lookups.
pub fn compare_controller_spec(first: &PodController<'_>, second: &PodController<'_>) -> Verdict {
	if let Some((a, b)) = both("replicas", first.replicas.as_ref(), second.replicas.as_ref())? {
		ensure_same("replicas", a, b)?;
	}
	if let Some((a, b)) = both("selector", first.selector, second.selector)? {
		ensure_same("selector", &selector_string(a), &selector_string(b))?;
	}
	Ok(())
}

/// Full controller comparison.
pub async fn compare_pod_controllers(
	ctx: &PairContext,
	first: &PodController<'_>,
	second: &PodController<'_>,
) -> Verdict {
	compare_controller_spec(first, second)?;
	compare_containers(ctx, first, second).await
}

#[cfg(test)]
pub(crate) mod tests {
	use k8s_openapi::{
		api::apps::v1::DeploymentSpec,
		apimachinery::pkg::apis::meta::v1::{LabelSelectorRequirement, ObjectMeta},
	};

	use super::*;
	use crate::compare::tests::{map, message};

	pub(crate) fn deployment(replicas: Option<i32>, labels: &[(&str, &str)]) -> Deployment {
		Deployment {
			metadata: ObjectMeta {
				name: Some("web".to_string()),
				..ObjectMeta::default()
			},
			spec: Some(DeploymentSpec {
				replicas,
				selector: LabelSelector {
					match_labels: Some(map(labels)),
					match_expressions: None,
				},
				template: PodTemplateSpec::default(),
				..DeploymentSpec::default()
			}),
			status: None,
		}
	}

	fn compare(first: &Deployment, second: &Deployment) -> Verdict {
		compare_controller_spec(
			&PodController::from_deployment(first).unwrap(),
			&PodController::from_deployment(second).unwrap(),
		)
	}

	#[test]
	fn test_equal_controllers() {
		let d = deployment(Some(3), &[("app", "web")]);
		assert!(compare(&d, &d.clone()).is_ok());
	}

	#[test]
	fn test_replica_count_differs() {
		assert_eq!(
			message(compare(
				&deployment(Some(3), &[("app", "web")]),
				&deployment(Some(2), &[("app", "api")]),
			)),
			"replicas differs: 3 vs 2"
		);
	}

	#[test]
	fn test_replicas_missing_on_one_side() {
		assert_eq!(
			message(compare(
				&deployment(None, &[("app", "web")]),
				&deployment(Some(1), &[("app", "web")]),
			)),
			"replicas is set only in cluster 2"
		);
	}

	#[test]
	fn test_selector_differs() {
		assert_eq!(
			message(compare(
				&deployment(Some(1), &[("app", "web"), ("tier", "a")]),
				&deployment(Some(1), &[("app", "web")]),
			)),
			"selector differs: app=web,tier=a vs app=web"
		);
	}

	#[test]
	fn test_selector_string_with_expressions() {
		let selector = LabelSelector {
			match_labels: Some(map(&[("b", "2"), ("a", "1")])),
			match_expressions: Some(vec![
				LabelSelectorRequirement {
					key: "env".to_string(),
					operator: "In".to_string(),
					values: Some(vec!["prod".to_string(), "stage".to_string()]),
				},
				LabelSelectorRequirement {
					key: "canary".to_string(),
					operator: "DoesNotExist".to_string(),
					values: None,
				},
			]),
		};
		assert_eq!(
			selector_string(&selector),
			"a=1,b=2,env in (prod,stage),!canary"
		);
	}

	#[test]
	fn test_daemon_sets_have_no_replicas() {
		let daemon_set = DaemonSet {
			spec: Some(Default::default()),
			..DaemonSet::default()
		};
		let controller = PodController::from_daemon_set(&daemon_set).unwrap();
		assert_eq!(controller.replicas, None);
		assert!(compare_controller_spec(&controller, &controller.clone()).is_ok());
	}
}
