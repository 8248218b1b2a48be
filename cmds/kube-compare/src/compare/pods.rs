//! Running pods of a controller.
//!
//! The pods behind a controller are listed from both clusters with the
//! controller's selector. Their counts must agree, every container must run
//! the image its template asks for, and all pods must run the same image id.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};

use super::{
	containers::containers, controller::PodController, differ, ensure_count, PairContext,
	ResolveError, Side, Verdict,
};
use crate::engine::collector::{list_all, CollectRequest};

const RUNNING: &str = "status.phase=Running";

async fn running_pods(
	ctx: &PairContext,
	side: Side,
	controller: &PodController<'_>,
	selector: &str,
) -> Result<Vec<Pod>, ResolveError> {
	let api = ctx.cluster(side).api::<Pod>(&ctx.namespace);
	let request = CollectRequest {
		kind: controller.kind,
		batch_size: ctx.settings.batch_size(controller.kind),
		field_selector: Some(RUNNING),
		label_selector: Some(selector),
	};
	list_all(&api, &request, &ctx.cancel)
		.await
		.map_err(|source| ResolveError::Pods { side, source })
}

/// A status image matches the template when it is identical or the
/// registry-qualified form of it.
pub(crate) fn image_matches(status_image: &str, template_image: &str) -> bool {
	status_image == template_image || status_image.ends_with(&format!("/{template_image}"))
}

/// Every container status must run the image of its template container.
fn check_images(side: Side, template: &[Container], pods: &[Pod]) -> Verdict {
	let images: BTreeMap<&str, &str> = template
		.iter()
		.filter_map(|c| Some((c.name.as_str(), c.image.as_deref()?)))
		.collect();

	for pod in pods {
		let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
		for status in container_statuses(pod) {
			let Some(expected) = images.get(status.name.as_str()) else {
				continue;
			};
			if !image_matches(&status.image, expected) {
				return Err(differ(format!(
					"pod \"{pod_name}\" container \"{}\" runs image {} instead of {expected} in {side}",
					status.name, status.image
				)));
			}
		}
	}
	Ok(())
}

fn container_statuses(pod: &Pod) -> impl Iterator<Item = &ContainerStatus> {
	pod.status
		.as_ref()
		.and_then(|status| status.container_statuses.as_ref())
		.into_iter()
		.flatten()
}

/// Image ids reported per container name; pods still pulling have none yet.
fn image_ids(pods: &[Pod]) -> BTreeMap<&str, BTreeSet<&str>> {
	let mut ids: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
	for status in pods.iter().flat_map(container_statuses) {
		if status.image_id.is_empty() {
			continue;
		}
		ids.entry(status.name.as_str())
			.or_default()
			.insert(status.image_id.as_str());
	}
	ids
}

/// Within each cluster one image id per container, then the same id in both.
fn check_image_ids(first: &[Pod], second: &[Pod]) -> Verdict {
	let first_ids = image_ids(first);
	let second_ids = image_ids(second);

	for (side, ids) in [(Side::First, &first_ids), (Side::Second, &second_ids)] {
		for (container, set) in ids {
			if set.len() > 1 {
				return Err(differ(format!(
					"container \"{container}\" runs {} different image ids in {side}",
					set.len()
				)));
			}
		}
	}

	for (container, a) in &first_ids {
		let Some(b) = second_ids.get(container) else {
			continue;
		};
		if a != b {
			let a = a.iter().next().copied().unwrap_or_default();
			let b = b.iter().next().copied().unwrap_or_default();
			return Err(differ(format!(
				"container \"{container}\" image id differs: {a} vs {b}"
			)));
		}
	}
	Ok(())
}

/// Compare the running pods of two controllers; skipped when the controller
/// has no pod selector.
pub async fn compare_running_pods(
	ctx: &PairContext,
	first: &PodController<'_>,
	second: &PodController<'_>,
) -> Verdict {
	let (Some(first_selector), Some(second_selector)) =
		(first.pod_selector.as_deref(), second.pod_selector.as_deref())
	else {
		return Ok(());
	};

	let (first_pods, second_pods) = tokio::try_join!(
		running_pods(ctx, Side::First, first, first_selector),
		running_pods(ctx, Side::Second, second, second_selector),
	)?;

	ensure_count("pod", first_pods.len(), second_pods.len())?;
	check_images(Side::First, containers(first.template), &first_pods)?;
	check_images(Side::Second, containers(second.template), &second_pods)?;
	check_image_ids(&first_pods, &second_pods)
}
