//! Container lists of pod templates.

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};

use super::{
	controller::PodController, ensure_count, ensure_same, ensure_same_opt, env::compare_env,
	pods::compare_running_pods, PairContext, Verdict,
};

pub(crate) fn containers(template: &PodTemplateSpec) -> &[Container] {
	template
		.spec
		.as_ref()
		.map_or(&[][..], |spec| spec.containers.as_slice())
}

/// Count, then name and image of every container, position by position.
pub fn compare_container_specs(first: &[Container], second: &[Container]) -> Verdict {
	ensure_count("container", first.len(), second.len())?;
	for (index, (a, b)) in first.iter().zip(second).enumerate() {
		ensure_same(&format!("container #{index} name"), &a.name, &b.name)?;
		ensure_same_opt(
			&format!("container \"{}\" image", a.name),
			a.image.as_deref(),
			b.image.as_deref(),
		)?;
	}
	Ok(())
}

/// Container specs, then environment, then the running pods.
pub async fn compare_containers(
	ctx: &PairContext,
	first: &PodController<'_>,
	second: &PodController<'_>,
) -> Verdict {
	let first_containers = containers(first.template);
	let second_containers = containers(second.template);

	compare_container_specs(first_containers, second_containers)?;

	for (a, b) in first_containers.iter().zip(second_containers) {
		compare_env(ctx, a, b).await?;
	}

	compare_running_pods(ctx, first, second).await
}
