//! The comparison engine.
//!
//! For every namespace and every enabled kind the engine collects the object
//! sets of both clusters concurrently, matches them by name and compares the
//! matched pairs on a task pool. Findings go to a shared [`DiffStorage`].
//!
//! A kind whose collection fails is reported in [`RunSummary::failures`] and
//! the run moves on to the next kind.

use std::{error::Error as StdError, fmt::Write as _, ops::ControlFlow, sync::Arc};

use kube::Resource;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use self::{
	collector::{collect, CollectError, CollectRequest},
	kinds::{
		ConfigMaps, CronJobs, DaemonSets, Deployments, Ingresses, Jobs, ResourceKind, Secrets,
		Services, StatefulSets,
	},
	matcher::{reconcile, MatchedPair},
	pool::{fan_out, PoolError},
	rules::EntityRules,
};
use crate::{
	compare::{metadata::compare_metadata, Divergence, PairContext, Side},
	config::Settings,
	k8s::{client::ClusterConnection, Kind},
	storage::{DiffStorage, ObjectIdentity, Severity, StorageError},
};

pub mod collector;
pub mod kinds;
pub mod matcher;
pub mod pool;
pub mod rules;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("collecting {kind} objects in {namespace} from {cluster}")]
	Collect {
		cluster: String,
		kind: Kind,
		namespace: String,
		#[source]
		source: CollectError,
	},

	#[error(transparent)]
	Pool(#[from] PoolError),

	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Counters for one kind in one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSummary {
	pub kind: Option<Kind>,
	pub namespace: String,
	/// Matched pairs that were compared.
	pub compared: usize,
	pub differing: usize,
	pub inconclusive: usize,
	pub only_first: usize,
	pub only_second: usize,
	/// Matched pairs left uncompared because the run was cancelled.
	pub cancelled: usize,
}

/// A kind that could not be compared in one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindFailure {
	pub kind: Kind,
	pub namespace: String,
	pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
	pub kinds: Vec<KindSummary>,
	pub failures: Vec<KindFailure>,
	/// The run was interrupted; results are partial.
	pub cancelled: bool,
}

impl RunSummary {
	/// Fold the outcome of one kind in. Kinds that could not be collected or
	/// whose comparison tasks failed become [`KindFailure`]s; storage errors
	/// end the run.
	fn absorb(
		&mut self,
		kind: Kind,
		namespace: &str,
		result: Result<KindSummary, EngineError>,
	) -> Result<ControlFlow<()>, EngineError> {
		match result {
			Ok(kind_summary) => self.kinds.push(kind_summary),
			Err(EngineError::Collect {
				source: CollectError::Cancelled,
				..
			}) => {
				self.cancelled = true;
				return Ok(ControlFlow::Break(()));
			}
			Err(err @ (EngineError::Collect { .. } | EngineError::Pool(_))) => {
				let error = error_chain(&err);
				tracing::warn!(%kind, %namespace, %error, "kind could not be compared");
				self.failures.push(KindFailure {
					kind,
					namespace: namespace.to_string(),
					error,
				});
			}
			Err(err @ EngineError::Storage(_)) => return Err(err),
		}
		Ok(ControlFlow::Continue(()))
	}

	/// All counters added up; `kind` of the total is `None`.
	pub fn totals(&self) -> KindSummary {
		self.kinds
			.iter()
			.fold(KindSummary::default(), |mut total, kind| {
				total.compared += kind.compared;
				total.differing += kind.differing;
				total.inconclusive += kind.inconclusive;
				total.only_first += kind.only_first;
				total.only_second += kind.only_second;
				total.cancelled += kind.cancelled;
				total
			})
	}
}

/// What happened to one matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOutcome {
	Equal,
	Differs,
	Inconclusive,
	Cancelled,
}

/// Render an error with its chain of causes, `outer: inner: ...`.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
	let mut out = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		let _ = write!(out, ": {cause}");
		source = cause.source();
	}
	out
}

/// Compares two clusters.
#[derive(Debug)]
pub struct Engine {
	first: ClusterConnection,
	second: ClusterConnection,
	settings: Arc<Settings>,
	rules: EntityRules,
	storage: Arc<DiffStorage>,
	cancel: CancellationToken,
}

impl Engine {
	pub fn new(
		first: ClusterConnection,
		second: ClusterConnection,
		settings: Arc<Settings>,
		cancel: CancellationToken,
	) -> Self {
		let rules = EntityRules::new(settings.work_mode, &settings.exceptions);
		Self {
			first,
			second,
			settings,
			rules,
			storage: Arc::new(DiffStorage::new()),
			cancel,
		}
	}

	/// Findings of the run. Readable once [`Engine::run`] has returned.
	pub fn storage(&self) -> &Arc<DiffStorage> {
		&self.storage
	}

	/// Compare every enabled kind in every configured namespace, then
	/// finalize the storage.
	///
	/// The storage is finalized on every path, so findings recorded before an
	/// error stay readable.
	#[instrument(skip_all, fields(first = %self.first.cluster_identifier(), second = %self.second.cluster_identifier()))]
	pub async fn run(&self) -> Result<RunSummary, EngineError> {
		let mut summary = RunSummary::default();
		let compared = self.compare_namespaces(&mut summary).await;
		self.storage.finalize();
		compared?;

		if self.cancel.is_cancelled() || summary.kinds.iter().any(|kind| kind.cancelled > 0) {
			summary.cancelled = true;
			tracing::warn!("run cancelled, results are partial");
		}
		Ok(summary)
	}

	async fn compare_namespaces(&self, summary: &mut RunSummary) -> Result<(), EngineError> {
		for namespace in &self.settings.namespaces {
			for kind in self.settings.enabled_kinds() {
				if self.cancel.is_cancelled() {
					return Ok(());
				}
				let result = self.compare_kind(kind, namespace).await;
				if summary.absorb(kind, namespace, result)?.is_break() {
					return Ok(());
				}
			}
		}
		Ok(())
	}

	async fn compare_kind(&self, kind: Kind, namespace: &str) -> Result<KindSummary, EngineError> {
		match kind {
			Kind::Deployment => self.compare_resources::<Deployments>(namespace).await,
			Kind::StatefulSet => self.compare_resources::<StatefulSets>(namespace).await,
			Kind::DaemonSet => self.compare_resources::<DaemonSets>(namespace).await,
			Kind::Job => self.compare_resources::<Jobs>(namespace).await,
			Kind::CronJob => self.compare_resources::<CronJobs>(namespace).await,
			Kind::Service => self.compare_resources::<Services>(namespace).await,
			Kind::Ingress => self.compare_resources::<Ingresses>(namespace).await,
			Kind::ConfigMap => self.compare_resources::<ConfigMaps>(namespace).await,
			Kind::Secret => self.compare_resources::<Secrets>(namespace).await,
		}
	}

	/// Collect, match and compare one kind in one namespace.
	#[instrument(skip_all, fields(kind = %K::KIND, namespace = %namespace))]
	async fn compare_resources<K: ResourceKind>(
		&self,
		namespace: &str,
	) -> Result<KindSummary, EngineError> {
		let settings = &self.settings;
		let field_selector = K::field_selector(settings);
		let label_selector = K::label_selector(settings);
		let request = CollectRequest {
			kind: K::KIND,
			batch_size: settings.batch_size(K::KIND),
			field_selector: field_selector.as_deref(),
			label_selector: label_selector.as_deref(),
		};

		let first_source = K::source(&self.first, namespace, settings);
		let second_source = K::source(&self.second, namespace, settings);
		let collect_error = |conn: &ClusterConnection| {
			let cluster = conn.cluster_identifier().to_string();
			move |source: CollectError| EngineError::Collect {
				cluster,
				kind: K::KIND,
				namespace: namespace.to_string(),
				source,
			}
		};

		let (mut left, mut right) = tokio::try_join!(
			async {
				collect(
					&first_source,
					self.first.cluster_identifier(),
					&self.rules,
					&request,
					&self.cancel,
				)
				.await
				.map_err(collect_error(&self.first))
			},
			async {
				collect(
					&second_source,
					self.second.cluster_identifier(),
					&self.rules,
					&request,
					&self.cancel,
				)
				.await
				.map_err(collect_error(&self.second))
			},
		)?;

		let reconciliation = reconcile(&mut left, &mut right);
		let mut summary = KindSummary {
			kind: Some(K::KIND),
			namespace: namespace.to_string(),
			only_first: reconciliation.only_left.len(),
			only_second: reconciliation.only_right.len(),
			..KindSummary::default()
		};

		if let Some((a, b)) = reconciliation.counts_differ {
			tracing::warn!(first = a, second = b, "object counts differ");
			self.storage.record(
				ObjectIdentity::kind_level(K::KIND, namespace),
				Severity::Warning,
				format!("{} count differs: {a} vs {b}", K::KIND),
			)?;
		}

		for (side, names) in [
			(Side::First, &reconciliation.only_left),
			(Side::Second, &reconciliation.only_right),
		] {
			for name in names {
				self.storage.record(
					ObjectIdentity::new(K::KIND, namespace, name),
					Severity::Critical,
					format!("\"{name}\" exists only in {side}"),
				)?;
			}
		}

		let ctx = PairContext {
			first: self.first.clone(),
			second: self.second.clone(),
			namespace: namespace.to_string(),
			settings: Arc::clone(&self.settings),
			cancel: self.cancel.clone(),
		};
		let outcomes = fan_out(reconciliation.pairs, settings.max_concurrency, |pair| {
			let ctx = ctx.clone();
			let storage = Arc::clone(&self.storage);
			async move { compare_pair::<K>(&ctx, &storage, pair).await }
		})
		.await?;

		for outcome in outcomes {
			match outcome? {
				PairOutcome::Equal => summary.compared += 1,
				PairOutcome::Differs => {
					summary.compared += 1;
					summary.differing += 1;
				}
				PairOutcome::Inconclusive => {
					summary.compared += 1;
					summary.inconclusive += 1;
				}
				PairOutcome::Cancelled => summary.cancelled += 1,
			}
		}

		tracing::info!(
			compared = summary.compared,
			differing = summary.differing,
			only_first = summary.only_first,
			only_second = summary.only_second,
			cancelled = summary.cancelled,
			"kind compared"
		);
		Ok(summary)
	}
}

/// Compare one matched pair and record the outcome.
#[instrument(skip_all, fields(kind = %K::KIND, namespace = %ctx.namespace, name = %pair.name))]
async fn compare_pair<K: ResourceKind>(
	ctx: &PairContext,
	storage: &DiffStorage,
	pair: MatchedPair<K::Object>,
) -> Result<PairOutcome, StorageError> {
	if ctx.cancel.is_cancelled() {
		return Ok(PairOutcome::Cancelled);
	}

	let metadata = compare_metadata(
		K::KIND,
		pair.left.meta(),
		pair.right.meta(),
		&ctx.settings.metadata,
	);
	let verdict = match metadata {
		Ok(()) => K::compare(ctx, &pair.left, &pair.right).await,
		mismatch => mismatch,
	};

	let identity = ObjectIdentity::new(K::KIND, ctx.namespace.as_str(), pair.name.as_str());
	match verdict {
		Ok(()) => Ok(PairOutcome::Equal),
		Err(Divergence::Mismatch { severity, message }) => {
			tracing::debug!(%severity, %message, "objects differ");
			storage.new_batch(identity)?.add(severity, message)?;
			Ok(PairOutcome::Differs)
		}
		Err(Divergence::Inconclusive(err)) => {
			let error = error_chain(&err);
			tracing::warn!(%error, "comparison inconclusive");
			storage.record(
				identity,
				Severity::Warning,
				format!("comparison inconclusive: {error}"),
			)?;
			Ok(PairOutcome::Inconclusive)
		}
		Err(Divergence::Cancelled) => Ok(PairOutcome::Cancelled),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::compare::ResolveError;

	#[test]
	fn test_error_chain_includes_causes() {
		let err = ResolveError::Pods {
			side: Side::Second,
			source: CollectError::Cancelled,
		};
		assert_eq!(
			error_chain(&err),
			"listing pods from cluster 2: collection cancelled"
		);
	}

	#[test]
	fn test_totals_add_up() {
		let summary = RunSummary {
			kinds: vec![
				KindSummary {
					kind: Some(Kind::Service),
					compared: 3,
					differing: 1,
					only_first: 2,
					..KindSummary::default()
				},
				KindSummary {
					kind: Some(Kind::Secret),
					compared: 4,
					inconclusive: 1,
					only_second: 1,
					..KindSummary::default()
				},
			],
			..RunSummary::default()
		};
		let totals = summary.totals();
		assert_eq!(totals.kind, None);
		assert_eq!(totals.compared, 7);
		assert_eq!(totals.differing, 1);
		assert_eq!(totals.inconclusive, 1);
		assert_eq!(totals.only_first, 2);
		assert_eq!(totals.only_second, 1);
	}

	#[test]
	fn test_failed_comparison_tasks_fail_only_their_kind() {
		let mut summary = RunSummary::default();
		let flow = summary
			.absorb(
				Kind::Service,
				"default",
				Err(EngineError::Pool(PoolError::SemaphoreClosed)),
			)
			.unwrap();
		assert!(flow.is_continue());
		assert_eq!(
			summary.failures,
			[KindFailure {
				kind: Kind::Service,
				namespace: "default".to_string(),
				error: "internal error: concurrency semaphore unexpectedly closed".to_string(),
			}]
		);

		let flow = summary
			.absorb(
				Kind::Secret,
				"default",
				Ok(KindSummary {
					kind: Some(Kind::Secret),
					compared: 2,
					..KindSummary::default()
				}),
			)
			.unwrap();
		assert!(flow.is_continue());
		assert_eq!(summary.totals().compared, 2);
		assert!(!summary.cancelled);
	}

	#[test]
	fn test_cancelled_collection_stops_the_run() {
		let mut summary = RunSummary::default();
		let flow = summary
			.absorb(
				Kind::ConfigMap,
				"default",
				Err(EngineError::Collect {
					cluster: "first".to_string(),
					kind: Kind::ConfigMap,
					namespace: "default".to_string(),
					source: CollectError::Cancelled,
				}),
			)
			.unwrap();
		assert!(flow.is_break());
		assert!(summary.cancelled);
		assert!(summary.failures.is_empty());
	}

	#[test]
	fn test_storage_errors_end_the_run() {
		let mut summary = RunSummary::default();
		let result = summary.absorb(
			Kind::ConfigMap,
			"default",
			Err(EngineError::Storage(StorageError::Finalized)),
		);
		assert!(matches!(
			result,
			Err(EngineError::Storage(StorageError::Finalized))
		));
		assert!(summary.failures.is_empty());
	}
}
