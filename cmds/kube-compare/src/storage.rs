//! Diff aggregation.
//!
//! Structural differences are collected into one [`DiffBatch`] per compared
//! object. Batches live in a [`DiffStorage`] for the duration of a run; once
//! the run is finalized the storage becomes read-only.

use std::{
	collections::BTreeMap,
	fmt,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, PoisonError,
	},
};

use serde::Serialize;
use thiserror::Error;

use crate::k8s::Kind;

/// Errors raised when the storage is used out of order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
	#[error("diff storage is finalized, no more records can be added")]
	Finalized,

	#[error("diff storage must be finalized before it is read")]
	NotFinalized,
}

/// Identity of a comparable object, used as the aggregation key.
///
/// An empty `name` identifies the kind as a whole within a namespace; such
/// batches carry advisories about the object sets rather than one object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectIdentity {
	pub kind: Kind,
	pub namespace: String,
	pub name: String,
}

impl ObjectIdentity {
	pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			kind,
			namespace: namespace.into(),
			name: name.into(),
		}
	}

	/// Identity for records about a whole kind in a namespace.
	pub fn kind_level(kind: Kind, namespace: impl Into<String>) -> Self {
		Self::new(kind, namespace, "")
	}

	pub fn is_kind_level(&self) -> bool {
		self.name.is_empty()
	}
}

impl fmt::Display for ObjectIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_kind_level() {
			write!(f, "{}s in {}", self.kind, self.namespace)
		} else {
			write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	/// Informational difference, e.g. a service type.
	Warning,
	Critical,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Severity::Warning => write!(f, "warning"),
			Severity::Critical => write!(f, "critical"),
		}
	}
}

/// One recorded difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
	pub identity: ObjectIdentity,
	pub severity: Severity,
	pub message: String,
}

/// Ordered records for a single object.
///
/// A batch is appended to by the one task that owns its object, so the inner
/// lock is never contended.
#[derive(Debug)]
pub struct DiffBatch {
	identity: ObjectIdentity,
	records: Mutex<Vec<DiffRecord>>,
	finalized: Arc<AtomicBool>,
}

impl DiffBatch {
	pub fn identity(&self) -> &ObjectIdentity {
		&self.identity
	}

	/// Append a record.
	pub fn add(&self, severity: Severity, message: impl Into<String>) -> Result<(), StorageError> {
		if self.finalized.load(Ordering::Acquire) {
			return Err(StorageError::Finalized);
		}
		let record = DiffRecord {
			identity: self.identity.clone(),
			severity,
			message: message.into(),
		};
		self.records
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(record);
		Ok(())
	}

	/// Snapshot of the records in insertion order.
	pub fn diffs(&self) -> Vec<DiffRecord> {
		self.records
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	pub fn is_empty(&self) -> bool {
		self.records
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.is_empty()
	}
}

/// All batches of one run.
#[derive(Debug, Default)]
pub struct DiffStorage {
	batches: Mutex<BTreeMap<ObjectIdentity, Arc<DiffBatch>>>,
	finalized: Arc<AtomicBool>,
}

impl DiffStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Get the batch for `identity`, creating it on first access.
	pub fn new_batch(&self, identity: ObjectIdentity) -> Result<Arc<DiffBatch>, StorageError> {
		if self.is_finalized() {
			return Err(StorageError::Finalized);
		}
		let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
		let batch = batches.entry(identity).or_insert_with_key(|identity| {
			Arc::new(DiffBatch {
				identity: identity.clone(),
				records: Mutex::new(Vec::new()),
				finalized: Arc::clone(&self.finalized),
			})
		});
		Ok(Arc::clone(batch))
	}

	/// Shortcut for recording a single difference against `identity`.
	pub fn record(
		&self,
		identity: ObjectIdentity,
		severity: Severity,
		message: impl Into<String>,
	) -> Result<(), StorageError> {
		self.new_batch(identity)?.add(severity, message)
	}

	/// Close the run. Calling it again has no effect.
	pub fn finalize(&self) {
		self.finalized.store(true, Ordering::Release);
	}

	pub fn is_finalized(&self) -> bool {
		self.finalized.load(Ordering::Acquire)
	}

	/// Non-empty batches in identity order.
	pub fn batches(&self) -> Result<Vec<Arc<DiffBatch>>, StorageError> {
		if !self.is_finalized() {
			return Err(StorageError::NotFinalized);
		}
		Ok(self
			.batches
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.values()
			.filter(|batch| !batch.is_empty())
			.cloned()
			.collect())
	}

	/// Every record of the run, flattened in identity order.
	pub fn diffs(&self) -> Result<Vec<DiffRecord>, StorageError> {
		Ok(self
			.batches()?
			.iter()
			.flat_map(|batch| batch.diffs())
			.collect())
	}

	pub fn has_critical(&self) -> Result<bool, StorageError> {
		Ok(self
			.diffs()?
			.iter()
			.any(|record| record.severity == Severity::Critical))
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	fn identity(name: &str) -> ObjectIdentity {
		ObjectIdentity::new(Kind::Deployment, "default", name)
	}

	#[test]
	fn test_new_batch_is_idempotent() {
		let storage = DiffStorage::new();
		let first = storage.new_batch(identity("web")).unwrap();
		let second = storage.new_batch(identity("web")).unwrap();
		assert!(Arc::ptr_eq(&first, &second));

		first.add(Severity::Critical, "one").unwrap();
		second.add(Severity::Warning, "two").unwrap();
		storage.finalize();

		let batches = storage.batches().unwrap();
		assert_eq!(batches.len(), 1);
		let messages: Vec<_> = batches[0].diffs().into_iter().map(|r| r.message).collect();
		assert_eq!(messages, ["one", "two"]);
	}

	#[test]
	fn test_reads_require_finalize() {
		let storage = DiffStorage::new();
		storage
			.record(identity("web"), Severity::Critical, "differs")
			.unwrap();
		assert_matches!(storage.batches(), Err(StorageError::NotFinalized));

		storage.finalize();
		storage.finalize();
		assert_eq!(storage.diffs().unwrap().len(), 1);
	}

	#[test]
	fn test_no_records_after_finalize() {
		let storage = DiffStorage::new();
		let batch = storage.new_batch(identity("web")).unwrap();
		storage.finalize();

		assert_eq!(batch.add(Severity::Critical, "late"), Err(StorageError::Finalized));
		assert_matches!(storage.new_batch(identity("api")), Err(StorageError::Finalized));
		assert!(storage.diffs().unwrap().is_empty());
	}

	#[test]
	fn test_batches_are_ordered_by_identity() {
		let storage = DiffStorage::new();
		storage
			.record(identity("zeta"), Severity::Critical, "z")
			.unwrap();
		storage
			.record(
				ObjectIdentity::new(Kind::Service, "default", "alpha"),
				Severity::Warning,
				"a",
			)
			.unwrap();
		storage
			.record(identity("alpha"), Severity::Critical, "d")
			.unwrap();
		storage.finalize();

		let names: Vec<_> = storage
			.diffs()
			.unwrap()
			.into_iter()
			.map(|r| format!("{}", r.identity))
			.collect();
		assert_eq!(
			names,
			[
				"Deployment default/alpha",
				"Deployment default/zeta",
				"Service default/alpha",
			]
		);
		assert!(storage.has_critical().unwrap());
	}

	#[test]
	fn test_kind_level_identity_display() {
		let identity = ObjectIdentity::kind_level(Kind::ConfigMap, "prod");
		assert!(identity.is_kind_level());
		assert_eq!(identity.to_string(), "ConfigMaps in prod");
	}
}
