//! Paginated object sources.
//!
//! The engine never talks to the API server directly: it pulls pages and
//! single objects through [`ObjectSource`], which is implemented for
//! [`kube::Api`] and for adapters that normalize other API shapes.

use std::{fmt::Debug, future::Future};

use kube::{
	api::{Api, ListParams},
	Resource,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors returned by an object source.
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("listing objects")]
	List(#[source] Box<kube::Error>),

	#[error("fetching object {name}")]
	Get {
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("decoding object {name}")]
	Decode {
		name: String,
		#[source]
		source: serde_json::Error,
	},
}

/// One "list" call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest<'a> {
	pub limit: u32,
	/// Continuation token from the previous page; `None` for the first page.
	pub continue_token: Option<&'a str>,
	pub field_selector: Option<&'a str>,
	pub label_selector: Option<&'a str>,
}

/// One page of a list call.
#[derive(Debug, Clone)]
pub struct Page<K> {
	pub items: Vec<K>,
	/// Token for the next page; `None` once the listing is complete.
	pub continue_token: Option<String>,
}

/// A source of named objects of one kind in one namespace.
pub trait ObjectSource<K>: Send + Sync {
	/// List one page of objects.
	fn list_page(
		&self,
		request: &PageRequest<'_>,
	) -> impl Future<Output = Result<Page<K>, SourceError>> + Send;

	/// Get a single object by name, `None` when it does not exist.
	fn fetch(&self, name: &str) -> impl Future<Output = Result<Option<K>, SourceError>> + Send;
}

impl<K> ObjectSource<K> for Api<K>
where
	K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
	async fn list_page(&self, request: &PageRequest<'_>) -> Result<Page<K>, SourceError> {
		let params = list_params(request);
		let list = self
			.list(&params)
			.await
			.map_err(|e| SourceError::List(Box::new(e)))?;

		Ok(Page {
			continue_token: list.metadata.continue_.filter(|token| !token.is_empty()),
			items: list.items,
		})
	}

	async fn fetch(&self, name: &str) -> Result<Option<K>, SourceError> {
		self.get_opt(name).await.map_err(|e| SourceError::Get {
			name: name.to_string(),
			source: Box::new(e),
		})
	}
}

/// Translate a page request into kube list parameters.
pub(crate) fn list_params(request: &PageRequest<'_>) -> ListParams {
	let mut params = ListParams::default().limit(request.limit);
	if let Some(token) = request.continue_token {
		params = params.continue_token(token);
	}
	if let Some(fields) = request.field_selector {
		params = params.fields(fields);
	}
	if let Some(labels) = request.label_selector {
		params = params.labels(labels);
	}
	params
}
