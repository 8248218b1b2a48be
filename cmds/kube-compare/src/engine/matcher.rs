//! Name-based reconciliation of two object sets.

use std::{collections::HashMap, sync::Arc};

/// Objects of one kind from one source, addressable by name.
///
/// Entries are kept in an arena in collection order; the "already matched"
/// flag lives next to each entry and is only written by [`reconcile`], which
/// runs before any comparison task is started.
#[derive(Debug)]
pub struct NamedObjectSet<K> {
	entries: Vec<Entry<K>>,
	index: HashMap<String, usize>,
}

#[derive(Debug)]
struct Entry<K> {
	name: String,
	object: Arc<K>,
	matched: bool,
}

impl<K> Default for NamedObjectSet<K> {
	fn default() -> Self {
		Self {
			entries: Vec::new(),
			index: HashMap::new(),
		}
	}
}

impl<K> NamedObjectSet<K> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add an object. Returns false, leaving the set unchanged, when the
	/// name is already present.
	pub fn insert(&mut self, name: String, object: K) -> bool {
		if self.index.contains_key(&name) {
			return false;
		}
		self.index.insert(name.clone(), self.entries.len());
		self.entries.push(Entry {
			name,
			object: Arc::new(object),
			matched: false,
		});
		true
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.index.contains_key(name)
	}

	pub fn get(&self, name: &str) -> Option<&Arc<K>> {
		self.index.get(name).map(|&i| &self.entries[i].object)
	}

	/// Names in collection order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().map(|e| e.name.as_str())
	}
}

/// Two objects sharing a name, one per source.
#[derive(Debug)]
pub struct MatchedPair<K> {
	pub name: String,
	pub left: Arc<K>,
	pub right: Arc<K>,
}

impl<K> Clone for MatchedPair<K> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			left: Arc::clone(&self.left),
			right: Arc::clone(&self.right),
		}
	}
}

/// Outcome of aligning two object sets.
#[derive(Debug)]
pub struct Reconciliation<K> {
	pub pairs: Vec<MatchedPair<K>>,
	pub only_left: Vec<String>,
	pub only_right: Vec<String>,
	/// Set sizes when they differ. Advisory only.
	pub counts_differ: Option<(usize, usize)>,
}

/// Align two object sets by name.
///
/// Every name ends up in exactly one of `pairs`, `only_left` or `only_right`.
/// Pairs follow the left set's order, the only-in lists their own set's order.
pub fn reconcile<K>(
	left: &mut NamedObjectSet<K>,
	right: &mut NamedObjectSet<K>,
) -> Reconciliation<K> {
	let counts_differ = (left.len() != right.len()).then_some((left.len(), right.len()));

	let mut pairs = Vec::new();
	let mut only_left = Vec::new();

	for entry in &mut left.entries {
		match right.index.get(&entry.name) {
			Some(&i) => {
				let other = &mut right.entries[i];
				debug_assert!(!other.matched, "name matched twice");
				entry.matched = true;
				other.matched = true;
				pairs.push(MatchedPair {
					name: entry.name.clone(),
					left: Arc::clone(&entry.object),
					right: Arc::clone(&other.object),
				});
			}
			None => only_left.push(entry.name.clone()),
		}
	}

	let only_right = right
		.entries
		.iter()
		.filter(|entry| !entry.matched)
		.map(|entry| entry.name.clone())
		.collect();

	Reconciliation {
		pairs,
		only_left,
		only_right,
		counts_differ,
	}
}
