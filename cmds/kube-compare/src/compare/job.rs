//! Jobs and CronJobs.

use k8s_openapi::api::batch::v1::{CronJob, Job, JobSpec};

use super::{
	both,
	controller::{compare_pod_controllers, PodController},
	ensure_same, ensure_same_opt, PairContext, Verdict,
};
use crate::k8s::Kind;

fn restart_policy(spec: &JobSpec) -> Option<&str> {
	spec.template.spec.as_ref()?.restart_policy.as_deref()
}

/// backoffLimit, then restart policy.
pub fn compare_job_fields(first: &JobSpec, second: &JobSpec) -> Verdict {
	if let Some((a, b)) = both(
		"backoffLimit",
		first.backoff_limit.as_ref(),
		second.backoff_limit.as_ref(),
	)? {
		ensure_same("backoffLimit", a, b)?;
	}
	ensure_same_opt(
		"restartPolicy",
		restart_policy(first),
		restart_policy(second),
	)
}

async fn compare_job_specs(
	ctx: &PairContext,
	kind: Kind,
	first: &JobSpec,
	second: &JobSpec,
	pod_selector: Option<String>,
) -> Verdict {
	compare_job_fields(first, second)?;
	compare_pod_controllers(
		ctx,
		&PodController::from_job_spec(kind, first, pod_selector.clone()),
		&PodController::from_job_spec(kind, second, pod_selector),
	)
	.await
}

/// Pods of a job are found through the `job-name` label the job controller
/// puts on them.
pub async fn compare_jobs(ctx: &PairContext, first: &Job, second: &Job) -> Verdict {
	let Some((a, b)) = both("spec", first.spec.as_ref(), second.spec.as_ref())? else {
		return Ok(());
	};
	let name = first.metadata.name.as_deref().unwrap_or_default();
	compare_job_specs(ctx, Kind::Job, a, b, Some(format!("job-name={name}"))).await
}

/// Schedule, then the job template. Running pods are not checked: they
/// belong to individual runs.
pub async fn compare_cron_jobs(ctx: &PairContext, first: &CronJob, second: &CronJob) -> Verdict {
	let Some((a, b)) = both("spec", first.spec.as_ref(), second.spec.as_ref())? else {
		return Ok(());
	};
	ensure_same("schedule", &a.schedule, &b.schedule)?;

	let Some((job_a, job_b)) = both(
		"jobTemplate spec",
		a.job_template.spec.as_ref(),
		b.job_template.spec.as_ref(),
	)?
	else {
		return Ok(());
	};
	compare_job_specs(ctx, Kind::CronJob, job_a, job_b, None).await
}
