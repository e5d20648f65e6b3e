//! The session: every node, every cache, and the machinery that fills them.
//!
//! # Purpose
//!
//! - Owns: the node arena and identity registry, in-flight commands and their routing,
//!   the ready queue of posted waiters, timers, watches, casts, memory blocks, deltas.
//! - Does not own: the transport. Commands leave through [`RemoteChannel`] and their
//!   completions come back through [`Session::deliver`].
//!
//! # Mental model
//!
//! A retrieval is a function of one [`CacheAddr`] that either issues a command, parks on
//! another cache (registering itself as a [`Waiter::Cache`]), or settles the cache from data
//! it already has. Parked retrievals re-run from the top when woken, so every retrieval is
//! written to be re-run-safe.
//!
//! # Invariants
//!
//! - Every accepted command has exactly one [`Inflight`] entry until its completion arrives
//!   or the owning cache gives it up.
//!   - Enforced in: [`Session::issue`], [`Session::cancel`].
//!   - Tested by: `session::tests::reset_cancels_outstanding_command`.
//!   - Failure symptom: completions routed to the wrong cache, or leaked entries.
//! - Waiters released by a transition go to the ready queue, never run inline.
//!   - Enforced in: [`Session::apply`].
//!   - Tested by: `session::tests::waiters_run_only_from_ready_queue`.
//!   - Failure symptom: re-entrant mutation of a cache that is mid-transition.

mod complete;
mod events;
mod expr;
mod lookup;
mod memory;
mod resolve;
mod retrieve;
mod stack;
mod timers;


use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use indexmap::IndexMap;
use remora_cache::{CacheError, Commit, Phase, Transition};
use remora_proto::{Command, CommandToken, EntityId, PeerServices, RemoteChannel, RemoteError, Reply, TokenGen};
use rustc_hash::FxHashMap;
use slab::Slab;

pub use self::expr::WatchId;
pub use self::memory::{BlockId, MemoryBlock};
pub use self::resolve::Resolved;
use self::resolve::Resolution;
use self::timers::TimerKind;
use crate::arena::Arena;
use crate::{
	CacheAddr, CacheSlot, Capabilities, DeltaFlags, ExecNode, ExprNode, FrameNode, LaunchNode, ModelConfig, ModelDelta, Node, NodeIdx, NodeKind,
	RegisterNode, SymbolNode, Waiter,
};

/// Outcome of one run of a retrieval.
#[derive(Debug)]
pub(crate) enum Step {
	/// Send this command; its completion settles the cache.
	Issue(Command),
	/// Parked on another cache.
	Wait,
	/// Settled (or abandoned) without a command.
	Settled,
}

/// Who a completion belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
	Cache(CacheAddr),
	Resolve(EntityId),
	Block(BlockId),
	/// Fire-and-forget; the completion is dropped.
	Detached,
	/// A cancelled `ExpressionsCreate`. The evaluator it yields is disposed on arrival.
	Release,
}

#[derive(Debug)]
struct Inflight {
	target: Target,
	command: Command,
}

/// State of one debug session.
pub struct Session {
	config: ModelConfig,
	channel: Box<dyn RemoteChannel>,
	services: PeerServices,
	tokens: TokenGen,
	arena: Arena,
	registry: FxHashMap<EntityId, NodeIdx>,
	root: NodeIdx,
	inflight: FxHashMap<CommandToken, Inflight>,
	ready: VecDeque<Waiter>,
	capabilities: Capabilities,
	resolving: FxHashMap<EntityId, Resolution>,
	resolve_failures: FxHashMap<EntityId, CacheError>,
	casts: FxHashMap<EntityId, String>,
	watches: Vec<(WatchId, String)>,
	next_watch: u32,
	blocks: Slab<MemoryBlock>,
	timers: BTreeMap<(Duration, u64), TimerKind>,
	timer_seq: u64,
	now: Duration,
	lookup_timer_armed: bool,
	deltas: IndexMap<EntityId, DeltaFlags>,
	closed: bool,
}

impl Session {
	pub fn new(channel: impl RemoteChannel + 'static, config: ModelConfig) -> Self {
		let services = channel.services();
		let mut arena = Arena::default();
		let root = arena.insert(Node::new(EntityId::root(), None, NodeKind::Launch(LaunchNode::new(&config))));
		let mut registry = FxHashMap::default();
		registry.insert(EntityId::root(), root);
		tracing::debug!(services = ?services, "session.open");
		Self {
			config,
			channel: Box::new(channel),
			services,
			tokens: TokenGen::new(),
			arena,
			registry,
			root,
			inflight: FxHashMap::default(),
			ready: VecDeque::new(),
			capabilities: Capabilities::default(),
			resolving: FxHashMap::default(),
			resolve_failures: FxHashMap::default(),
			casts: FxHashMap::default(),
			watches: Vec::new(),
			next_watch: 0,
			blocks: Slab::new(),
			timers: BTreeMap::new(),
			timer_seq: 0,
			now: Duration::ZERO,
			lookup_timer_armed: false,
			deltas: IndexMap::new(),
			closed: false,
		}
	}

	pub fn config(&self) -> &ModelConfig {
		&self.config
	}

	pub fn services(&self) -> PeerServices {
		self.services
	}

	pub fn capabilities(&self) -> &Capabilities {
		&self.capabilities
	}

	/// The launch root.
	pub fn root(&self) -> NodeIdx {
		self.root
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	pub fn node(&self, idx: NodeIdx) -> Option<&Node> {
		self.arena.get(idx)
	}

	pub fn node_mut(&mut self, idx: NodeIdx) -> Option<&mut Node> {
		self.arena.get_mut(idx)
	}

	/// Registered node for `id`, without resolving.
	pub fn find(&self, id: &str) -> Option<NodeIdx> {
		self.registry.get(id).copied().filter(|idx| self.arena.contains(*idx))
	}

	pub fn node_count(&self) -> usize {
		self.arena.len()
	}

	/// Commands sent and not yet completed, including cancelled creations still owed a
	/// release.
	pub fn outstanding_commands(&self) -> usize {
		self.inflight.len()
	}

	pub fn exec(&self, idx: NodeIdx) -> Option<&ExecNode> {
		self.arena.get(idx)?.as_exec()
	}

	pub fn frame(&self, idx: NodeIdx) -> Option<&FrameNode> {
		self.arena.get(idx)?.as_frame()
	}

	pub fn expr(&self, idx: NodeIdx) -> Option<&ExprNode> {
		self.arena.get(idx)?.as_expr()
	}

	pub fn register(&self, idx: NodeIdx) -> Option<&RegisterNode> {
		self.arena.get(idx)?.as_register()
	}

	pub fn symbol(&self, idx: NodeIdx) -> Option<&SymbolNode> {
		self.arena.get(idx)?.as_symbol()
	}

	/// Current children of a child-list cache, in order. `None` unless the list is valid.
	pub fn children(&self, addr: CacheAddr) -> Option<Vec<NodeIdx>> {
		let set = self.arena.get(addr.node)?.child_set(addr.slot)?;
		Some(set.data()?.values().copied().collect())
	}

	pub fn phase(&self, addr: CacheAddr) -> Option<Phase> {
		Some(self.arena.get(addr.node)?.inspect(addr.slot)?.phase())
	}

	/// Settled error of a cache. A cache of a disposed node reads as disposed.
	pub fn error(&self, addr: CacheAddr) -> Option<CacheError> {
		match self.arena.get(addr.node) {
			Some(node) => node.inspect(addr.slot)?.error().cloned(),
			None => Some(CacheError::Disposed),
		}
	}

	pub fn is_pending(&self, addr: CacheAddr) -> bool {
		self.phase(addr) == Some(Phase::Pending)
	}

	/// Makes sure the cache at `addr` is, or is becoming, valid.
	///
	/// Returns `true` once the cache is settled (value or error). Otherwise the retrieval
	/// is running and `waiter`, if given, is posted when the cache settles or resets.
	/// A cache of a disposed node counts as settled; [`Self::error`] reports it.
	pub fn validate(&mut self, addr: CacheAddr, waiter: Option<Waiter>) -> bool {
		if addr.slot.is_lookup() {
			self.touch_lookup(addr);
		}
		let Some(control) = self.control(addr) else {
			return true;
		};
		match control.phase() {
			Phase::Valid => return true,
			Phase::Pending => {
				if let Some(waiter) = waiter {
					control.add_waiter(waiter);
				}
				return false;
			}
			Phase::Empty => control.mark_suspended(),
		}
		self.run_retrieval(addr);
		match self.control(addr) {
			None => true,
			Some(control) if control.phase() == Phase::Valid => true,
			Some(control) => {
				if let Some(waiter) = waiter {
					control.add_waiter(waiter);
				}
				false
			}
		}
	}

	/// Drains the ready queue. Waiters posted while draining run in the same call.
	pub fn run_pending(&mut self) {
		while let Some(waiter) = self.ready.pop_front() {
			match waiter {
				Waiter::Cache(addr) => self.revalidate(addr),
				Waiter::Resolve(id) => self.continue_resolution(&id),
				Waiter::Callback(callback) => callback(self),
			}
		}
		self.resolve_failures.clear();
	}

	/// Waiters posted and not yet run.
	pub fn ready_len(&self) -> usize {
		self.ready.len()
	}

	/// Routes the completion of `token`. Call [`Self::run_pending`] afterwards.
	pub fn deliver(&mut self, token: CommandToken, result: Result<Reply, RemoteError>) {
		let Some(Inflight { target, command }) = self.inflight.remove(&token) else {
			tracing::debug!(%token, "session.unknown_completion");
			return;
		};
		tracing::trace!(%token, command = command.name(), ok = result.is_ok(), "session.complete");
		match target {
			Target::Cache(addr) => self.complete(addr, token, command, result),
			Target::Resolve(id) => self.complete_probe(id, command, result),
			Target::Block(block) => self.complete_block(block, token, &command, result),
			Target::Detached => {
				if let Err(err) = result {
					tracing::debug!(%token, command = command.name(), %err, "session.detached_failed");
				}
			}
			Target::Release => match result {
				Ok(Reply::Expression(record)) => self.release_remote(record.id),
				Ok(other) => tracing::warn!(%token, reply = other.kind(), "expr.unexpected_release_reply"),
				Err(err) => tracing::debug!(%token, %err, "expr.cancelled_create_failed"),
			},
		}
	}

	/// Drains the change notifications collected since the last call.
	pub fn take_deltas(&mut self) -> Vec<ModelDelta> {
		self.deltas.drain(..).map(|(id, flags)| ModelDelta { id, flags }).collect()
	}

	/// Tears the session down. Every node is disposed children first, outstanding
	/// commands are cancelled, and pending resolutions are woken to observe the failure.
	pub fn shutdown(&mut self) {
		if self.closed {
			return;
		}
		tracing::debug!(nodes = self.arena.len(), inflight = self.inflight.len(), "session.shutdown");
		let tokens: Vec<CommandToken> = self.inflight.keys().copied().collect();
		for token in tokens {
			self.cancel(token);
		}
		self.inflight.clear();
		self.dispose_node(self.root);
		for idx in self.arena.indices() {
			self.dispose_node(idx);
		}
		self.close_all_blocks();
		for (id, resolution) in self.resolving.drain() {
			self.resolve_failures.insert(id, CacheError::Disposed);
			self.ready.extend(resolution.waiters);
		}
		self.timers.clear();
		self.lookup_timer_armed = false;
		self.closed = true;
		self.run_pending();
	}

	pub(crate) fn control(&mut self, addr: CacheAddr) -> Option<&mut dyn remora_cache::CacheControl<Waiter>> {
		self.arena.get_mut(addr.node)?.control(addr.slot)
	}

	fn revalidate(&mut self, addr: CacheAddr) {
		let Some(control) = self.control(addr) else { return };
		if control.phase() == Phase::Pending && control.outstanding().is_none() {
			self.run_retrieval(addr);
		}
	}

	fn run_retrieval(&mut self, addr: CacheAddr) {
		match self.retrieve(addr) {
			Step::Issue(command) => self.start_command(addr, command),
			Step::Wait | Step::Settled => {}
		}
	}

	/// Validates `dep` on behalf of the retrieval at `addr`.
	pub(crate) fn depend(&mut self, addr: CacheAddr, dep: CacheAddr) -> bool {
		self.validate(dep, Some(Waiter::Cache(addr)))
	}

	pub(crate) fn start_command(&mut self, addr: CacheAddr, command: Command) {
		match self.issue(Target::Cache(addr), command) {
			Ok(token) => {
				if let Some(control) = self.control(addr) {
					control.mark_issued(token);
				}
			}
			Err(err) => self.fail(addr, err.into()),
		}
	}

	fn issue(&mut self, target: Target, command: Command) -> Result<CommandToken, RemoteError> {
		if self.closed {
			return Err(RemoteError::ChannelClosed);
		}
		let token = self.tokens.next();
		tracing::trace!(%token, command = command.name(), "session.issue");
		self.channel.send(token, command.clone())?;
		self.inflight.insert(token, Inflight { target, command });
		Ok(token)
	}

	/// Cancels `token`. A cancelled expression creation stays in flight as a release: the
	/// peer may still create the evaluator, which must then be disposed.
	fn cancel(&mut self, token: CommandToken) {
		let Some(inflight) = self.inflight.get_mut(&token) else { return };
		if inflight.target == Target::Release {
			return;
		}
		tracing::trace!(%token, command = inflight.command.name(), "session.cancel");
		if matches!(inflight.command, Command::ExpressionsCreate { .. }) && !self.closed {
			inflight.target = Target::Release;
		} else {
			self.inflight.remove(&token);
		}
		self.channel.cancel(token);
	}

	pub(crate) fn fail(&mut self, addr: CacheAddr, error: CacheError) {
		if let Some(control) = self.control(addr) {
			let transition = control.fail(error);
			self.apply(transition);
		}
	}

	pub(crate) fn reset(&mut self, addr: CacheAddr) {
		if let Some(control) = self.control(addr) {
			let transition = control.reset();
			self.apply(transition);
		}
	}

	pub(crate) fn apply(&mut self, transition: Transition<Waiter>) {
		if let Some(token) = transition.cancelled {
			self.cancel(token);
		}
		self.ready.extend(transition.waiters);
	}

	pub(crate) fn apply_commit(&mut self, commit: Commit<NodeIdx, Waiter>) {
		if let Some(token) = commit.cancelled {
			self.cancel(token);
		}
		self.ready.extend(commit.waiters);
		for idx in commit.disposed {
			self.dispose_node(idx);
		}
	}

	/// Whether a completion for `token` would still be accepted by the child list at `addr`.
	pub(crate) fn child_set_current(&self, addr: CacheAddr, token: CommandToken) -> bool {
		self.arena
			.get(addr.node)
			.and_then(|node| node.child_set(addr.slot))
			.is_some_and(|set| set.is_current(token))
	}

	/// Commits a child list, from a completion when `token` is given, else as a snapshot.
	pub(crate) fn commit_children(&mut self, addr: CacheAddr, token: Option<CommandToken>, entries: IndexMap<EntityId, NodeIdx>) {
		let Some(set) = self.arena.get_mut(addr.node).and_then(|node| node.child_set_mut(addr.slot)) else {
			return;
		};
		let commit = match token {
			Some(token) => set.commit(token, entries),
			None => Some(set.set_snapshot(entries)),
		};
		if let Some(commit) = commit {
			self.apply_commit(commit);
		}
	}

	pub(crate) fn fail_children(&mut self, addr: CacheAddr, token: CommandToken, error: CacheError) {
		let waiters = self
			.arena
			.get_mut(addr.node)
			.and_then(|node| node.child_set_mut(addr.slot))
			.and_then(|set| set.fail(token, error));
		if let Some(waiters) = waiters {
			self.ready.extend(waiters);
		}
	}

	/// Child of `parent` in the list at `slot` under `id`, reusing the node the list or the
	/// registry already has.
	pub(crate) fn attach(&mut self, parent: NodeIdx, slot: CacheSlot, id: EntityId, make: impl FnOnce(&ModelConfig) -> NodeKind) -> NodeIdx {
		let listed = self
			.arena
			.get(parent)
			.and_then(|node| node.child_set(slot))
			.and_then(|set| set.lookup(&id))
			.copied();
		if let Some(existing) = listed.filter(|idx| self.arena.contains(*idx)) {
			return existing;
		}
		if let Some(existing) = self.find(id.as_str()) {
			if self.arena.get(existing).is_some_and(|node| node.parent == Some(parent)) {
				return existing;
			}
			tracing::debug!(%id, "node.reparent");
			self.dispose_node(existing);
		}
		let kind = make(&self.config);
		let idx = self.arena.insert(Node::new(id.clone(), Some(parent), kind));
		tracing::trace!(%id, node = %idx, "node.create");
		self.registry.insert(id.clone(), idx);
		self.note(id, DeltaFlags::ADDED);
		idx
	}

	/// Disposes `idx` and everything it owns, children first.
	pub(crate) fn dispose_node(&mut self, idx: NodeIdx) {
		let Some(node) = self.arena.get(idx) else { return };
		let id = node.id.clone();
		if let Some(parent) = node.parent
			&& let Some(owner) = self.arena.get_mut(parent)
		{
			for slot in owner.slots() {
				if let Some(set) = owner.child_set_mut(*slot) {
					set.forget(&id);
				}
			}
			if let Some(exec) = owner.as_exec_mut() {
				exec.symbols.remove(&id);
			}
		}

		let mut order = Vec::new();
		let mut stack = vec![idx];
		while let Some(next) = stack.pop() {
			if let Some(node) = self.arena.get(next) {
				order.push(next);
				stack.extend(node.owned_children());
			}
		}
		for victim in order.into_iter().rev() {
			self.teardown(victim);
		}
		self.note(id, DeltaFlags::REMOVED);
	}

	fn teardown(&mut self, idx: NodeIdx) {
		let Some(mut node) = self.arena.remove(idx) else { return };
		tracing::debug!(id = %node.id, kind = node.kind.name(), "node.dispose");
		if let Some(remote) = node.as_expr_mut().and_then(|expr| expr.owns_remote.take()) {
			self.release_remote(remote);
		}
		for slot in node.slots() {
			if let Some(control) = node.control(*slot) {
				let transition = control.dispose();
				self.apply(transition);
			}
		}
		if let Some(exec) = node.as_exec_mut() {
			let mut transitions = Vec::new();
			for (_, mut cache) in exec.line_info.drain_all() {
				transitions.push(cache.dispose());
			}
			for (_, mut cache) in exec.func_info.drain_all() {
				transitions.push(cache.dispose());
			}
			for (_, mut cache) in exec.sym_file_info.drain_all() {
				transitions.push(cache.dispose());
			}
			for transition in transitions {
				self.apply(transition);
			}
		}
		if self.registry.get(&node.id) == Some(&idx) {
			self.registry.remove(&node.id);
		}
		self.detach_blocks(&node.id);
	}

	pub(crate) fn note(&mut self, id: EntityId, flags: DeltaFlags) {
		*self.deltas.entry(id).or_default() |= flags;
	}

	/// `idx` and every node it owns, parents before children.
	pub(crate) fn subtree(&self, idx: NodeIdx) -> Vec<NodeIdx> {
		let mut out = Vec::new();
		let mut stack = vec![idx];
		while let Some(next) = stack.pop() {
			if let Some(node) = self.arena.get(next) {
				out.push(next);
				let mut children = node.owned_children();
				children.reverse();
				stack.extend(children);
			}
		}
		out
	}

	/// Nearest execution context at or above `idx`.
	pub(crate) fn owning_exec(&self, idx: NodeIdx) -> Option<NodeIdx> {
		let mut current = Some(idx);
		while let Some(at) = current {
			let node = self.arena.get(at)?;
			if node.as_exec().is_some() {
				return Some(at);
			}
			current = node.parent;
		}
		None
	}
}
