//! Fan-out/fan-in task pool.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};

#[derive(Debug, Error)]
pub enum PoolError {
	#[error("comparison task panicked")]
	TaskPanicked(#[source] tokio::task::JoinError),

	#[error("internal error: concurrency semaphore unexpectedly closed")]
	SemaphoreClosed,
}

/// Run `task` once per item, each as its own tokio task, and wait for all of
/// them.
///
/// Tasks start immediately; with `limit` set, at most that many run at the
/// same time. Results come back in completion order, so callers must not rely
/// on their position.
pub async fn fan_out<I, T, F, Fut>(
	items: impl IntoIterator<Item = I>,
	limit: Option<usize>,
	task: F,
) -> Result<Vec<T>, PoolError>
where
	F: Fn(I) -> Fut,
	Fut: Future<Output = T> + Send + 'static,
	T: Send + 'static,
{
	let semaphore = limit.map(|permits| Arc::new(Semaphore::new(permits)));
	let mut join_set: JoinSet<Result<T, PoolError>> = JoinSet::new();

	for item in items {
		let fut = task(item);
		let sem = semaphore.clone();

		join_set.spawn(async move {
			let _permit = match sem {
				Some(sem) => Some(
					sem.acquire_owned()
						.await
						.map_err(|_| PoolError::SemaphoreClosed)?,
				),
				None => None,
			};
			Ok(fut.await)
		});
	}

	let mut results = Vec::with_capacity(join_set.len());
	while let Some(result) = join_set.join_next().await {
		results.push(result.map_err(PoolError::TaskPanicked)??);
	}
	Ok(results)
}

#[cfg(test)]
mod tests {
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration,
	};

	use super::*;

	#[tokio::test]
	async fn test_fan_out_runs_every_item() {
		let mut results = fan_out(0..10, None, |i| async move { i * 2 })
			.await
			.unwrap();
		results.sort_unstable();
		assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_fan_out_empty() {
		let results: Vec<u32> = fan_out(Vec::<u32>::new(), None, |i| async move { i })
			.await
			.unwrap();
		assert!(results.is_empty());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_fan_out_respects_limit() {
		let running = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));

		fan_out(0..16, Some(2), |_| {
			let running = running.clone();
			let peak = peak.clone();
			async move {
				let now = running.fetch_add(1, Ordering::SeqCst) + 1;
				peak.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(5)).await;
				running.fetch_sub(1, Ordering::SeqCst);
			}
		})
		.await
		.unwrap();

		assert!(peak.load(Ordering::SeqCst) <= 2);
	}

	#[tokio::test]
	async fn test_fan_out_reports_panics() {
		let result = fan_out([1, 2], None, |i| async move {
			assert!(i != 2, "boom");
			i
		})
		.await;
		assert!(matches!(result, Err(PoolError::TaskPanicked(_))));
	}
}
