//! Sequence diffing.
//!
//! [`diff_sequence`] turns one ordered sequence into another with an edit script of
//! [`DiffOp`]s that can be replayed front to back.
//! This is a greedy linear scan, **not** a minimal edit distance:
//! Each target position is settled exactly once, and an item is only ever moved towards the front.
//!
//! [`diff_entries`] and [`diff_lists`] are the unordered comparisons used for attributes, styles, listeners and classes.

use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// One step of an edit script produced by [`diff_sequence`].
///
/// `index` always refers to the *working* sequence as left by the preceding steps.
/// `original_index` refers to the untouched input sequence, so that a consumer can find the item's live counterpart.
/// It is [`None`] only for items that were added by the same script, which are never moved or matched again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp<T> {
	Add { index: usize, item: T },
	Remove { index: usize, item: T, original_index: Option<usize> },
	Move { from: usize, index: usize, item: T, original_index: Option<usize> },
	Noop { index: usize, item: T, original_index: Option<usize> },
}

impl<T> DiffOp<T> {
	#[must_use]
	pub fn index(&self) -> usize {
		match *self {
			DiffOp::Add { index, .. } | DiffOp::Remove { index, .. } | DiffOp::Move { index, .. } | DiffOp::Noop { index, .. } => index,
		}
	}

	/// Replaces the item, keeping the bookkeeping.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DiffOp<U> {
		match self {
			DiffOp::Add { index, item } => DiffOp::Add { index, item: f(item) },
			DiffOp::Remove { index, item, original_index } => DiffOp::Remove { index, item: f(item), original_index },
			DiffOp::Move { from, index, item, original_index } => DiffOp::Move { from, index, item: f(item), original_index },
			DiffOp::Noop { index, item, original_index } => DiffOp::Noop { index, item: f(item), original_index },
		}
	}

	#[must_use]
	pub fn item(&self) -> &T {
		match self {
			DiffOp::Add { item, .. } | DiffOp::Remove { item, .. } | DiffOp::Move { item, .. } | DiffOp::Noop { item, .. } => item,
		}
	}
}

/// The working copy of the old sequence, with each item's position in the original.
#[derive(Debug)]
pub struct IndexedItems<T> {
	items: Vec<T>,
	original_indices: Vec<Option<usize>>,
}

impl<T: Clone> IndexedItems<T> {
	#[must_use]
	pub fn new(items: &[T]) -> Self {
		Self {
			items: items.to_vec(),
			original_indices: (0..items.len()).map(Some).collect(),
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.items.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	#[must_use]
	pub fn items(&self) -> &[T] {
		&self.items
	}

	fn is_removal(&self, index: usize, target: &[T], equals: &impl Fn(&T, &T) -> bool) -> bool {
		match self.items.get(index) {
			Some(item) => !target.iter().any(|wanted| equals(wanted, item)),
			None => false,
		}
	}

	fn is_noop(&self, index: usize, wanted: &T, equals: &impl Fn(&T, &T) -> bool) -> bool {
		self.items.get(index).map_or(false, |item| equals(item, wanted))
	}

	/// Leftmost match at or after `from`, so duplicates resolve first-wins.
	fn find_from(&self, wanted: &T, from: usize, equals: &impl Fn(&T, &T) -> bool) -> Option<usize> {
		self.items.iter().skip(from).position(|item| equals(item, wanted)).map(|offset| from + offset)
	}

	fn remove(&mut self, index: usize) -> DiffOp<T> {
		let item = self.items.remove(index);
		let original_index = self.original_indices.remove(index);
		DiffOp::Remove { index, item, original_index }
	}

	fn noop(&self, index: usize) -> DiffOp<T> {
		DiffOp::Noop {
			index,
			item: self.items[index].clone(),
			original_index: self.original_indices[index],
		}
	}

	fn add(&mut self, item: T, index: usize) -> DiffOp<T> {
		self.items.insert(index, item.clone());
		self.original_indices.insert(index, None);
		DiffOp::Add { index, item }
	}

	fn relocate(&mut self, from: usize, index: usize) -> DiffOp<T> {
		let item = self.items.remove(from);
		let original_index = self.original_indices.remove(from);
		self.items.insert(index, item.clone());
		self.original_indices.insert(index, original_index);
		DiffOp::Move { from, index, item, original_index }
	}

	fn remove_from(&mut self, index: usize) -> Vec<DiffOp<T>> {
		let mut removed = Vec::with_capacity(self.len().saturating_sub(index));
		while self.len() > index {
			removed.push(self.remove(index));
		}
		removed
	}
}

/// Computes the edit script that turns `old` into `new`.
///
/// For each target position `i`, in order:
///
/// 1. the working item at `i` is removed if it occurs nowhere in `new` (and `i` is retried),
/// 2. it is kept if it matches `new[i]`,
/// 3. `new[i]` is added if it isn't found in the working copy at or after `i`,
/// 4. otherwise the first such match is moved to `i`.
///
/// Anything left past `new.len()` is then removed front to back.
pub fn diff_sequence<T: Clone>(old: &[T], new: &[T], equals: impl Fn(&T, &T) -> bool) -> Vec<DiffOp<T>> {
	let mut working = IndexedItems::new(old);
	let mut script = Vec::with_capacity(old.len().max(new.len()));

	let mut index = 0;
	while index < new.len() {
		if working.is_removal(index, new, &equals) {
			script.push(working.remove(index));
			continue;
		}

		let wanted = &new[index];
		if working.is_noop(index, wanted, &equals) {
			script.push(working.noop(index));
		} else {
			match working.find_from(wanted, index, &equals) {
				None => script.push(working.add(wanted.clone(), index)),
				Some(from) => script.push(working.relocate(from, index)),
			}
		}
		index += 1;
	}

	script.extend(working.remove_from(new.len()));
	script
}

/// Keys that appeared, disappeared or changed value between two mappings.
#[derive(Debug)]
pub struct EntryDiff<'a, K: ?Sized> {
	pub added: Vec<&'a K>,
	pub removed: Vec<&'a K>,
	pub updated: Vec<&'a K>,
}

/// Compares two mappings by key.
///
/// `added` and `updated` follow `new`'s iteration order, `removed` follows `old`'s.
pub fn diff_entries<'a, K, V: 'a>(
	old: impl IntoIterator<Item = (&'a K, &'a V)>,
	new: impl IntoIterator<Item = (&'a K, &'a V)>,
	same: impl Fn(&V, &V) -> bool,
) -> EntryDiff<'a, K>
where
	K: ?Sized + Hash + Eq + 'a,
{
	let old: Vec<(&K, &V)> = old.into_iter().collect();
	let old_lookup: HashMap<&K, &V> = old.iter().copied().collect();

	let mut diff = EntryDiff {
		added: vec![],
		removed: vec![],
		updated: vec![],
	};

	let mut seen = HashSet::new();
	for (key, value) in new {
		seen.insert(key);
		match old_lookup.get(key) {
			None => diff.added.push(key),
			Some(previous) if !same(previous, value) => diff.updated.push(key),
			Some(_) => (),
		}
	}
	diff.removed = old.into_iter().map(|(key, _)| key).filter(|key| !seen.contains(key)).collect();
	diff
}

/// Items of `new` missing from `old`, and items of `old` missing from `new`.
pub fn diff_lists<'a, T: PartialEq>(old: &'a [T], new: &'a [T]) -> (Vec<&'a T>, Vec<&'a T>) {
	let added = new.iter().filter(|item| !old.contains(item)).collect();
	let removed = old.iter().filter(|item| !new.contains(item)).collect();
	(added, removed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reorder_with_duplicates() {
		let script = diff_sequence(&['A', 'A', 'B', 'C'], &['C', 'K', 'A', 'B'], |a, b| a == b);
		assert_eq!(
			script,
			vec![
				DiffOp::Move { from: 3, index: 0, item: 'C', original_index: Some(3) },
				DiffOp::Add { index: 1, item: 'K' },
				DiffOp::Noop { index: 2, item: 'A', original_index: Some(0) },
				DiffOp::Move { from: 4, index: 3, item: 'B', original_index: Some(2) },
				DiffOp::Remove { index: 4, item: 'A', original_index: Some(1) },
			]
		);
	}

	#[test]
	fn removal_retries_the_same_position() {
		let script = diff_sequence(&['X', 'A', 'Y', 'B'], &['A', 'B'], |a, b| a == b);
		assert_eq!(
			script,
			vec![
				DiffOp::Remove { index: 0, item: 'X', original_index: Some(0) },
				DiffOp::Noop { index: 0, item: 'A', original_index: Some(1) },
				DiffOp::Remove { index: 1, item: 'Y', original_index: Some(2) },
				DiffOp::Noop { index: 1, item: 'B', original_index: Some(3) },
			]
		);
	}

	#[test]
	fn empty_sides() {
		assert!(diff_sequence::<u8>(&[], &[], |a, b| a == b).is_empty());
		assert_eq!(
			diff_sequence(&[], &[1, 2], |a, b| a == b),
			vec![DiffOp::Add { index: 0, item: 1 }, DiffOp::Add { index: 1, item: 2 }]
		);
		assert_eq!(
			diff_sequence(&[1, 2], &[], |a, b| a == b),
			vec![
				DiffOp::Remove { index: 0, item: 1, original_index: Some(0) },
				DiffOp::Remove { index: 0, item: 2, original_index: Some(1) },
			]
		);
	}

	#[test]
	fn entries() {
		let old = [("a", 1), ("b", 2), ("c", 3)];
		let new = [("b", 2), ("c", 4), ("d", 5)];
		let diff = diff_entries(old.iter().map(|(k, v)| (k, v)), new.iter().map(|(k, v)| (k, v)), |a, b| a == b);
		assert_eq!(diff.added, vec![&"d"]);
		assert_eq!(diff.removed, vec![&"a"]);
		assert_eq!(diff.updated, vec![&"c"]);
	}

	#[test]
	fn lists() {
		let (added, removed) = diff_lists(&["a", "b"], &["b", "c"]);
		assert_eq!(added, vec![&"c"]);
		assert_eq!(removed, vec![&"a"]);
	}
}
