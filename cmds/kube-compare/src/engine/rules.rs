//! Skip and include rules.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
	config::{ExceptionSettings, WorkMode},
	k8s::Kind,
};

/// Decides which objects take part in a comparison.
///
/// Names are matched exactly. Kind-agnostic names apply to every kind,
/// kind-scoped names only to theirs.
#[derive(Debug, Clone, Default)]
pub struct EntityRules {
	mode: WorkMode,
	names: HashSet<String>,
	resources: HashMap<Kind, HashSet<String>>,
}

impl EntityRules {
	pub fn new(mode: WorkMode, exceptions: &ExceptionSettings) -> Self {
		Self {
			mode,
			names: exceptions.names.iter().cloned().collect(),
			resources: exceptions
				.resources
				.iter()
				.map(|(kind, names)| (*kind, names.iter().cloned().collect()))
				.collect(),
		}
	}

	pub fn mode(&self) -> WorkMode {
		self.mode
	}

	fn is_listed(&self, kind: Kind, name: &str) -> bool {
		self.names.contains(name)
			|| self
				.resources
				.get(&kind)
				.is_some_and(|names| names.contains(name))
	}

	/// Whether `name` of `kind` is left out of the comparison.
	pub fn is_skipped_entity(&self, kind: Kind, name: &str) -> bool {
		match self.mode {
			WorkMode::EverythingButNotExceptions => self.is_listed(kind, name),
			WorkMode::NothingButGivenList => !self.is_listed(kind, name),
		}
	}

	/// Names to point-get for `kind` in include mode, sorted.
	pub fn listed_names(&self, kind: Kind) -> BTreeSet<&str> {
		self.names
			.iter()
			.chain(self.resources.get(&kind).into_iter().flatten())
			.map(String::as_str)
			.collect()
	}
}
