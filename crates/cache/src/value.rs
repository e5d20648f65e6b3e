use std::mem;

use remora_proto::CommandToken;
use smallvec::SmallVec;

use crate::CacheError;

/// Continuations registered on a cache that has not settled yet.
pub type Waiters<W> = SmallVec<[W; 2]>;

/// Raw state of an [`AsyncValueCache`].
#[derive(Debug)]
pub enum CacheState<T> {
	Empty,
	/// Retrieval running. `None` means it is suspended on another cache and no command
	/// is outstanding.
	Pending(Option<CommandToken>),
	Valid(Result<T, CacheError>),
}

/// Coarse state, shared by every cache shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	Empty,
	Pending,
	Valid,
}

/// Side effects of a state change the owner must carry out.
///
/// `cancelled` is a command whose completion is no longer wanted. `waiters` must be
/// posted to the dispatch queue, never run inline.
#[must_use = "waiters must be posted and cancelled commands released"]
#[derive(Debug)]
pub struct Transition<W> {
	pub cancelled: Option<CommandToken>,
	pub waiters: Waiters<W>,
}

impl<W> Transition<W> {
	pub fn none() -> Self {
		Self {
			cancelled: None,
			waiters: SmallVec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.cancelled.is_none() && self.waiters.is_empty()
	}
}

/// A memoized value obtained through at most one asynchronous retrieval at a time.
///
/// `W` is the caller's continuation type. Waiters compare with `PartialEq` so the same
/// dependent is never registered twice.
#[derive(Debug)]
pub struct AsyncValueCache<T, W> {
	state: CacheState<T>,
	waiters: Waiters<W>,
	stale: Option<T>,
	keep_stale: bool,
	disposed: bool,
}

impl<T, W> Default for AsyncValueCache<T, W> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T, W> AsyncValueCache<T, W> {
	pub fn new() -> Self {
		Self {
			state: CacheState::Empty,
			waiters: SmallVec::new(),
			stale: None,
			keep_stale: false,
			disposed: false,
		}
	}

	/// Keeps the last settled value across resets, readable through [`Self::last_known`].
	#[must_use]
	pub fn with_stale(mut self, keep: bool) -> Self {
		self.keep_stale = keep;
		self
	}

	pub fn state(&self) -> &CacheState<T> {
		&self.state
	}

	pub fn phase(&self) -> Phase {
		match self.state {
			CacheState::Empty => Phase::Empty,
			CacheState::Pending(_) => Phase::Pending,
			CacheState::Valid(_) => Phase::Valid,
		}
	}

	pub fn is_valid(&self) -> bool {
		matches!(self.state, CacheState::Valid(_))
	}

	pub fn is_pending(&self) -> bool {
		matches!(self.state, CacheState::Pending(_))
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed
	}

	pub fn outstanding(&self) -> Option<CommandToken> {
		match self.state {
			CacheState::Pending(token) => token,
			_ => None,
		}
	}

	/// Settled value. `None` unless `Valid(Ok)`.
	pub fn data(&self) -> Option<&T> {
		match &self.state {
			CacheState::Valid(Ok(value)) => Some(value),
			_ => None,
		}
	}

	pub fn data_mut(&mut self) -> Option<&mut T> {
		match &mut self.state {
			CacheState::Valid(Ok(value)) => Some(value),
			_ => None,
		}
	}

	/// Settled error. `None` unless `Valid(Err)`.
	pub fn error(&self) -> Option<&CacheError> {
		match &self.state {
			CacheState::Valid(Err(err)) => Some(err),
			_ => None,
		}
	}

	pub fn result(&self) -> Option<Result<&T, &CacheError>> {
		match &self.state {
			CacheState::Valid(result) => Some(result.as_ref()),
			_ => None,
		}
	}

	/// Current value, or the value retained from before the last reset.
	pub fn last_known(&self) -> Option<&T> {
		self.data().or(self.stale.as_ref())
	}

	pub fn waiter_count(&self) -> usize {
		self.waiters.len()
	}

	/// Marks a retrieval as started but parked on another cache.
	pub fn mark_suspended(&mut self) {
		if self.disposed || self.is_valid() {
			return;
		}
		self.state = CacheState::Pending(None);
	}

	/// Records `token` as the one outstanding command. Replaces a previous token, whose
	/// completion becomes stale.
	pub fn mark_issued(&mut self, token: CommandToken) {
		if self.disposed || self.is_valid() {
			return;
		}
		self.state = CacheState::Pending(Some(token));
	}

	/// Commits the completion of `token`. Returns the released waiters, or `None` if the
	/// completion is stale and was discarded.
	pub fn complete(&mut self, token: CommandToken, result: Result<T, CacheError>) -> Option<Waiters<W>> {
		if self.disposed || self.outstanding() != Some(token) {
			tracing::debug!(%token, outstanding = ?self.outstanding(), "cache.stale_completion");
			return None;
		}
		self.settle(result);
		Some(mem::take(&mut self.waiters))
	}

	/// Settles from any state. An outstanding command is abandoned.
	pub fn set(&mut self, result: Result<T, CacheError>) -> Transition<W> {
		if self.disposed {
			return Transition::none();
		}
		let cancelled = self.outstanding();
		self.settle(result);
		Transition {
			cancelled,
			waiters: mem::take(&mut self.waiters),
		}
	}

	/// Reset carrying an immediate value, e.g. a state delivered by a protocol event.
	pub fn reset_to(&mut self, value: T) -> Transition<W> {
		self.set(Ok(value))
	}

	/// Back to `Empty`. Waiters are released so they re-validate.
	pub fn reset(&mut self) -> Transition<W> {
		if self.disposed {
			return Transition::none();
		}
		let cancelled = self.outstanding();
		if let CacheState::Valid(Ok(value)) = mem::replace(&mut self.state, CacheState::Empty)
			&& self.keep_stale
		{
			self.stale = Some(value);
		}
		Transition {
			cancelled,
			waiters: mem::take(&mut self.waiters),
		}
	}

	/// Retires the cache for good. It reads as `Valid(Err(Disposed))` from now on.
	pub fn dispose(&mut self) -> Transition<W> {
		if self.disposed {
			return Transition::none();
		}
		let cancelled = self.outstanding();
		self.state = CacheState::Valid(Err(CacheError::Disposed));
		self.stale = None;
		self.disposed = true;
		Transition {
			cancelled,
			waiters: mem::take(&mut self.waiters),
		}
	}

	fn settle(&mut self, result: Result<T, CacheError>) {
		if result.is_ok() {
			self.stale = None;
		}
		self.state = CacheState::Valid(result);
	}
}

impl<T: Clone, W> AsyncValueCache<T, W> {
	/// Owned copy of the settled result, for dependents that copy values or errors.
	pub fn cloned_result(&self) -> Option<Result<T, CacheError>> {
		match &self.state {
			CacheState::Valid(result) => Some(result.clone()),
			_ => None,
		}
	}
}

impl<T, W: PartialEq> AsyncValueCache<T, W> {
	/// Registers `waiter` unless the cache is already `Valid` or the waiter is present.
	/// Returns whether the waiter will be released later.
	pub fn add_waiter(&mut self, waiter: W) -> bool {
		if self.is_valid() {
			return false;
		}
		if !self.waiters.contains(&waiter) {
			self.waiters.push(waiter);
		}
		true
	}
}

/// Type-erased control surface shared by every cache shape.
///
/// The dispatch loop drives caches it cannot name the value type of through this trait.
pub trait CacheControl<W> {
	fn phase(&self) -> Phase;
	fn add_waiter(&mut self, waiter: W) -> bool;
	fn mark_suspended(&mut self);
	fn mark_issued(&mut self, token: CommandToken);
	fn outstanding(&self) -> Option<CommandToken>;
	fn error(&self) -> Option<&CacheError>;
	/// Settles to `Valid(Err(error))`.
	fn fail(&mut self, error: CacheError) -> Transition<W>;
	fn reset(&mut self) -> Transition<W>;
	fn dispose(&mut self) -> Transition<W>;
}

impl<T, W: PartialEq> CacheControl<W> for AsyncValueCache<T, W> {
	fn phase(&self) -> Phase {
		AsyncValueCache::phase(self)
	}

	fn add_waiter(&mut self, waiter: W) -> bool {
		AsyncValueCache::add_waiter(self, waiter)
	}

	fn mark_suspended(&mut self) {
		AsyncValueCache::mark_suspended(self);
	}

	fn mark_issued(&mut self, token: CommandToken) {
		AsyncValueCache::mark_issued(self, token);
	}

	fn outstanding(&self) -> Option<CommandToken> {
		AsyncValueCache::outstanding(self)
	}

	fn error(&self) -> Option<&CacheError> {
		AsyncValueCache::error(self)
	}

	fn fail(&mut self, error: CacheError) -> Transition<W> {
		self.set(Err(error))
	}

	fn reset(&mut self) -> Transition<W> {
		AsyncValueCache::reset(self)
	}

	fn dispose(&mut self) -> Transition<W> {
		AsyncValueCache::dispose(self)
	}
}
