use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use remora_proto::CommandToken;

use crate::{AsyncValueCache, CacheControl, CacheError, Phase, Transition, Waiters};

#[derive(Debug, Clone)]
struct Member<E> {
	entity: E,
	/// Consecutive commits this key was absent from.
	misses: u8,
}

/// Outcome of committing a fresh snapshot.
#[must_use = "waiters must be posted and disposed entities torn down"]
#[derive(Debug)]
pub struct Commit<E, W> {
	pub cancelled: Option<CommandToken>,
	pub waiters: Waiters<W>,
	/// Entities that left the set for good. The owner disposes them.
	pub disposed: Vec<E>,
}

/// A cache whose value is an ordered map key -> entity, recomputed by diffing.
///
/// The set remembers every entity it ever handed out (`known`) until the entity is
/// retired, so a key that reappears is mapped back to the same entity. A key absent
/// from one commit is parked in the retired pool; absent from a second consecutive
/// commit, or pushed out of a pool larger than `pool_margin`, its entity is returned
/// for disposal.
#[derive(Debug)]
pub struct KeyedChildSet<K, E, W> {
	cache: AsyncValueCache<IndexMap<K, E>, W>,
	known: IndexMap<K, Member<E>>,
	retired: IndexSet<K>,
	pool_margin: usize,
}

impl<K, E, W> KeyedChildSet<K, E, W>
where
	K: Hash + Eq + Clone,
	E: Clone,
{
	pub fn new(pool_margin: usize) -> Self {
		Self {
			cache: AsyncValueCache::new(),
			known: IndexMap::new(),
			retired: IndexSet::new(),
			pool_margin,
		}
	}

	#[must_use]
	pub fn with_stale(mut self, keep: bool) -> Self {
		self.cache = self.cache.with_stale(keep);
		self
	}

	pub fn cache(&self) -> &AsyncValueCache<IndexMap<K, E>, W> {
		&self.cache
	}

	pub fn data(&self) -> Option<&IndexMap<K, E>> {
		self.cache.data()
	}

	pub fn last_known(&self) -> Option<&IndexMap<K, E>> {
		self.cache.last_known()
	}

	pub fn phase(&self) -> Phase {
		self.cache.phase()
	}

	/// Whether a completion for `token` would be accepted.
	pub fn is_current(&self, token: CommandToken) -> bool {
		self.cache.outstanding() == Some(token)
	}

	/// Entity previously handed out for `key`, current or retired.
	pub fn lookup(&self, key: &K) -> Option<&E> {
		self.known.get(key).map(|member| &member.entity)
	}

	/// Every entity the set still tracks, including retired ones.
	pub fn entities(&self) -> impl Iterator<Item = &E> {
		self.known.values().map(|member| &member.entity)
	}

	pub fn retired_len(&self) -> usize {
		self.retired.len()
	}

	/// Commits the completion of `token`. `None` if the completion is stale; the caller
	/// should check [`Self::is_current`] before building `entries`.
	pub fn commit(&mut self, token: CommandToken, entries: IndexMap<K, E>) -> Option<Commit<E, W>> {
		if !self.is_current(token) {
			tracing::debug!(%token, "child_set.stale_commit");
			return None;
		}
		let disposed = self.track(&entries);
		let waiters = self.cache.complete(token, Ok(entries))?;
		Some(Commit {
			cancelled: None,
			waiters,
			disposed,
		})
	}

	/// Commits a snapshot computed without a command (derived sets, emulated entries).
	pub fn set_snapshot(&mut self, entries: IndexMap<K, E>) -> Commit<E, W> {
		if self.cache.is_disposed() {
			return Commit {
				cancelled: None,
				waiters: Waiters::new(),
				disposed: Vec::new(),
			};
		}
		let disposed = self.track(&entries);
		let Transition { cancelled, waiters } = self.cache.set(Ok(entries));
		Commit { cancelled, waiters, disposed }
	}

	/// Settles the completion of `token` to an error. Tracked entities are kept.
	pub fn fail(&mut self, token: CommandToken, error: CacheError) -> Option<Waiters<W>> {
		self.cache.complete(token, Err(error))
	}

	/// Adopts an entity created outside a commit (event or identity resolution).
	///
	/// It joins the current snapshot when one is valid.
	pub fn insert(&mut self, key: K, entity: E) {
		self.retired.shift_remove(&key);
		self.known.insert(
			key.clone(),
			Member {
				entity: entity.clone(),
				misses: 0,
			},
		);
		if let Some(current) = self.cache.data_mut() {
			current.insert(key, entity);
		}
	}

	/// Drops `key` after its entity was disposed elsewhere.
	pub fn forget(&mut self, key: &K) -> Option<E> {
		self.retired.shift_remove(key);
		if let Some(current) = self.cache.data_mut() {
			current.shift_remove(key);
		}
		self.known.shift_remove(key).map(|member| member.entity)
	}

	/// Resets and forgets every entity. The owner disposes the returned entities.
	pub fn clear(&mut self) -> (Transition<W>, Vec<E>) {
		let transition = self.cache.reset();
		self.retired.clear();
		let entities = self.known.drain(..).map(|(_, member)| member.entity).collect();
		(transition, entities)
	}

	fn track(&mut self, entries: &IndexMap<K, E>) -> Vec<E> {
		for (key, entity) in entries {
			self.retired.shift_remove(key);
			self.known.insert(
				key.clone(),
				Member {
					entity: entity.clone(),
					misses: 0,
				},
			);
		}

		let mut disposed = Vec::new();
		let absent: Vec<K> = self.known.keys().filter(|key| !entries.contains_key(*key)).cloned().collect();
		for key in absent {
			let Some(member) = self.known.get_mut(&key) else { continue };
			member.misses = member.misses.saturating_add(1);
			if member.misses >= 2 {
				self.retired.shift_remove(&key);
				if let Some(member) = self.known.shift_remove(&key) {
					disposed.push(member.entity);
				}
			} else {
				self.retired.insert(key);
			}
		}

		while self.retired.len() > self.pool_margin {
			let Some(oldest) = self.retired.shift_remove_index(0) else { break };
			if let Some(member) = self.known.shift_remove(&oldest) {
				disposed.push(member.entity);
			}
		}
		disposed
	}
}

impl<K, E, W: PartialEq> CacheControl<W> for KeyedChildSet<K, E, W> {
	fn phase(&self) -> Phase {
		self.cache.phase()
	}

	fn add_waiter(&mut self, waiter: W) -> bool {
		self.cache.add_waiter(waiter)
	}

	fn mark_suspended(&mut self) {
		self.cache.mark_suspended();
	}

	fn mark_issued(&mut self, token: CommandToken) {
		self.cache.mark_issued(token);
	}

	fn outstanding(&self) -> Option<CommandToken> {
		self.cache.outstanding()
	}

	fn error(&self) -> Option<&CacheError> {
		self.cache.error()
	}

	fn fail(&mut self, error: CacheError) -> Transition<W> {
		self.cache.set(Err(error))
	}

	fn reset(&mut self) -> Transition<W> {
		self.cache.reset()
	}

	/// Disposes the cache and stops tracking entities. The owner must have collected
	/// [`KeyedChildSet::entities`] beforehand.
	fn dispose(&mut self) -> Transition<W> {
		self.known.clear();
		self.retired.clear();
		self.cache.dispose()
	}
}
