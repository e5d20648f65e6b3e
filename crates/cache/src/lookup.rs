use std::hash::Hash;

use lru::LruCache;

use crate::{AsyncValueCache, Phase};

/// Address-keyed caches held in recency order and bounded to a small working set.
///
/// Entries with a retrieval in flight are never evicted, so the set may briefly exceed
/// its bound while lookups are pending. [`Self::trim`] brings it back once they settle.
pub struct LookupCache<K: Hash + Eq, T, W> {
	entries: LruCache<K, AsyncValueCache<T, W>>,
	bound: usize,
	keep_stale: bool,
}

impl<K: Hash + Eq + Clone, T, W> LookupCache<K, T, W> {
	pub fn new(bound: usize) -> Self {
		Self {
			entries: LruCache::unbounded(),
			bound,
			keep_stale: false,
		}
	}

	#[must_use]
	pub fn with_stale(mut self, keep: bool) -> Self {
		self.keep_stale = keep;
		self
	}

	pub fn bound(&self) -> usize {
		self.bound
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, key: &K) -> bool {
		self.entries.contains(key)
	}

	pub fn pending_len(&self) -> usize {
		self.entries.iter().filter(|(_, cache)| cache.is_pending()).count()
	}

	/// Returns the cache for `key`, creating it as most recently used. Creation trims
	/// the set, never evicting `key` itself.
	pub fn entry(&mut self, key: K) -> (&mut AsyncValueCache<T, W>, Vec<(K, AsyncValueCache<T, W>)>) {
		let keep = self.keep_stale;
		let mut evicted = Vec::new();
		if !self.entries.contains(&key) {
			self.entries.put(key.clone(), AsyncValueCache::new().with_stale(keep));
			evicted = self.trim_except(Some(&key));
		}
		let cache = self.entries.get_or_insert_mut(key, || AsyncValueCache::new().with_stale(keep));
		(cache, evicted)
	}

	/// Promotes `key` to most recently used.
	pub fn get_mut(&mut self, key: &K) -> Option<&mut AsyncValueCache<T, W>> {
		self.entries.get_mut(key)
	}

	/// Access without touching recency.
	pub fn peek(&self, key: &K) -> Option<&AsyncValueCache<T, W>> {
		self.entries.peek(key)
	}

	pub fn peek_mut(&mut self, key: &K) -> Option<&mut AsyncValueCache<T, W>> {
		self.entries.peek_mut(key)
	}

	/// Evicts least recently used idle entries until the set fits its bound.
	pub fn trim(&mut self) -> Vec<(K, AsyncValueCache<T, W>)> {
		self.trim_except(None)
	}

	/// Evicts the least recently used entry that has no retrieval in flight.
	pub fn evict_one(&mut self) -> Option<(K, AsyncValueCache<T, W>)> {
		self.evict_except(None)
	}

	fn trim_except(&mut self, keep: Option<&K>) -> Vec<(K, AsyncValueCache<T, W>)> {
		let mut evicted = Vec::new();
		while self.entries.len() > self.bound {
			match self.evict_except(keep) {
				Some(entry) => evicted.push(entry),
				None => break,
			}
		}
		evicted
	}

	fn evict_except(&mut self, keep: Option<&K>) -> Option<(K, AsyncValueCache<T, W>)> {
		let victim = self
			.entries
			.iter()
			.rev()
			.find(|(key, cache)| cache.phase() != Phase::Pending && keep != Some(*key))
			.map(|(key, _)| key.clone())?;
		let cache = self.entries.pop(&victim)?;
		Some((victim, cache))
	}

	/// Removes every idle entry. Pending entries stay.
	pub fn drain_idle(&mut self) -> Vec<(K, AsyncValueCache<T, W>)> {
		let idle: Vec<K> = self
			.entries
			.iter()
			.filter(|(_, cache)| cache.phase() != Phase::Pending)
			.map(|(key, _)| key.clone())
			.collect();
		idle.into_iter()
			.filter_map(|key| self.entries.pop(&key).map(|cache| (key, cache)))
			.collect()
	}

	/// Removes everything, pending included.
	pub fn drain_all(&mut self) -> Vec<(K, AsyncValueCache<T, W>)> {
		let mut all = Vec::with_capacity(self.entries.len());
		while let Some(entry) = self.entries.pop_lru() {
			all.push(entry);
		}
		all
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut AsyncValueCache<T, W>)> {
		self.entries.iter_mut()
	}
}
