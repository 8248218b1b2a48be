//! Paginated collection of named object sets.

use kube::{Resource, ResourceExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{matcher::NamedObjectSet, rules::EntityRules};
use crate::{
	config::WorkMode,
	k8s::{
		source::{ObjectSource, PageRequest, SourceError},
		Kind,
	},
};

#[derive(Debug, Error)]
pub enum CollectError {
	#[error("collection cancelled")]
	Cancelled,

	#[error(transparent)]
	Source(#[from] SourceError),
}

/// What to collect from one source.
#[derive(Debug, Clone, Copy)]
pub struct CollectRequest<'a> {
	pub kind: Kind,
	pub batch_size: u32,
	pub field_selector: Option<&'a str>,
	pub label_selector: Option<&'a str>,
}

/// Walk every page of a listing, handing each item to `each`.
///
/// Returns the number of items seen. The cancellation token is checked
/// before every page request.
pub async fn paginate<K, S, F>(
	source: &S,
	request: &CollectRequest<'_>,
	cancel: &CancellationToken,
	mut each: F,
) -> Result<usize, CollectError>
where
	S: ObjectSource<K>,
	F: FnMut(K),
{
	let mut continue_token: Option<String> = None;
	let mut seen = 0;
	let mut pages = 0;

	loop {
		if cancel.is_cancelled() {
			return Err(CollectError::Cancelled);
		}

		let page = source
			.list_page(&PageRequest {
				limit: request.batch_size,
				continue_token: continue_token.as_deref(),
				field_selector: request.field_selector,
				label_selector: request.label_selector,
			})
			.await?;
		pages += 1;
		seen += page.items.len();
		tracing::debug!(kind = %request.kind, page = pages, items = page.items.len(), "received page");

		page.items.into_iter().for_each(&mut each);

		match page.continue_token {
			Some(token) => continue_token = Some(token),
			None => break,
		}
	}

	Ok(seen)
}

/// Collect every item of a listing without applying any rules.
pub async fn list_all<K, S>(
	source: &S,
	request: &CollectRequest<'_>,
	cancel: &CancellationToken,
) -> Result<Vec<K>, CollectError>
where
	S: ObjectSource<K>,
{
	let mut items = Vec::new();
	paginate(source, request, cancel, |item| items.push(item)).await?;
	Ok(items)
}

/// Build the named object set of one source.
///
/// In exclude mode every object is listed and skip-listed names are dropped.
/// In include mode only the listed names are fetched one by one; a name that
/// does not exist is logged and left out.
#[instrument(skip_all, fields(kind = %request.kind, cluster = %cluster))]
pub async fn collect<K, S>(
	source: &S,
	cluster: &str,
	rules: &EntityRules,
	request: &CollectRequest<'_>,
	cancel: &CancellationToken,
) -> Result<NamedObjectSet<K>, CollectError>
where
	S: ObjectSource<K>,
	K: Resource,
{
	match rules.mode() {
		WorkMode::EverythingButNotExceptions => collect_listed(source, rules, request, cancel).await,
		WorkMode::NothingButGivenList => {
			collect_named(source, cluster, rules, request.kind, cancel).await
		}
	}
}

async fn collect_listed<K, S>(
	source: &S,
	rules: &EntityRules,
	request: &CollectRequest<'_>,
	cancel: &CancellationToken,
) -> Result<NamedObjectSet<K>, CollectError>
where
	S: ObjectSource<K>,
	K: Resource,
{
	let kind = request.kind;
	let mut set = NamedObjectSet::new();

	paginate(source, request, cancel, |object: K| {
		let name = object.name_any();
		if rules.is_skipped_entity(kind, &name) {
			tracing::debug!(%kind, %name, "skipping object");
			return;
		}
		if !set.insert(name.clone(), object) {
			tracing::warn!(%kind, %name, "object listed twice across pages, keeping the first");
		}
	})
	.await?;

	Ok(set)
}

async fn collect_named<K, S>(
	source: &S,
	cluster: &str,
	rules: &EntityRules,
	kind: Kind,
	cancel: &CancellationToken,
) -> Result<NamedObjectSet<K>, CollectError>
where
	S: ObjectSource<K>,
	K: Resource,
{
	let mut set = NamedObjectSet::new();

	for name in rules.listed_names(kind) {
		if cancel.is_cancelled() {
			return Err(CollectError::Cancelled);
		}
		match source.fetch(name).await? {
			Some(object) => {
				set.insert(name.to_string(), object);
			}
			None => tracing::warn!(%kind, %name, %cluster, "listed object not found"),
		}
	}

	Ok(set)
}
