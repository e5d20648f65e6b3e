//! Expressions: locals, watches, and the sub-expressions derived from their values.

use std::fmt;

use indexmap::IndexMap;
use remora_cache::CacheError;
use remora_cache::partition::{self, Plan};
use remora_proto::{Command, CommandToken, EntityId, ExprSource, ExpressionRecord, PeerServices, RemoteError, Reply, SymbolRecord, TypeClass};

use super::complete::decode;
use super::{Session, Step, Target};
use crate::{CacheAddr, CacheSlot, DeltaFlags, ExprNode, ExprOrigin, NodeIdx, NodeKind, PartitionNode};

/// Handle of one session watch expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u32);

impl fmt::Display for WatchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "W{}", self.0)
	}
}

impl Session {
	pub(super) fn retrieve_expr(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		if !self.has_service(PeerServices::EXPRESSIONS) {
			if addr.slot == CacheSlot::Children {
				return self.settle_empty(addr);
			}
			self.fail(addr, CacheError::ServiceUnavailable("Expressions"));
			return Step::Settled;
		}
		match addr.slot {
			CacheSlot::Context => self.retrieve_expr_context(addr, &id),
			CacheSlot::Value => {
				if !self.depend(addr, addr.with(CacheSlot::Context)) {
					return Step::Wait;
				}
				match self.expr(addr.node).and_then(|expr| expr.context.cloned_result()) {
					Some(Ok(record)) => Step::Issue(Command::ExpressionsEvaluate { id: record.id }),
					Some(Err(err)) => self.settle(addr, Err(err), |n| Some(&mut n.as_expr_mut()?.value)),
					None => Step::Settled,
				}
			}
			CacheSlot::Type => {
				if !self.depend(addr, addr.with(CacheSlot::Value)) {
					return Step::Wait;
				}
				let Some(expr) = self.expr(addr.node) else { return Step::Settled };
				let declared = expr.context.data().and_then(|record| record.type_id.clone());
				let type_id = match expr.value.cloned_result() {
					Some(Ok(value)) => value.type_id.or(declared),
					Some(Err(err)) => return self.settle(addr, Err(err), |n| Some(&mut n.as_expr_mut()?.type_info)),
					None => return Step::Settled,
				};
				match type_id {
					Some(id) if self.has_service(PeerServices::SYMBOLS) => Step::Issue(Command::SymbolsGetContext { id }),
					_ => self.settle(addr, Ok(None), |n| Some(&mut n.as_expr_mut()?.type_info)),
				}
			}
			CacheSlot::BaseType => {
				if !self.depend(addr, addr.with(CacheSlot::Type)) {
					return Step::Wait;
				}
				let base = match self.expr(addr.node).and_then(|expr| expr.type_info.cloned_result()) {
					Some(Ok(symbol)) => symbol.and_then(|symbol| symbol.base_type_id),
					Some(Err(err)) => return self.settle(addr, Err(err), |n| Some(&mut n.as_expr_mut()?.base_type)),
					None => return Step::Settled,
				};
				match base {
					Some(id) if self.has_service(PeerServices::SYMBOLS) => Step::Issue(Command::SymbolsGetContext { id }),
					_ => self.settle(addr, Ok(None), |n| Some(&mut n.as_expr_mut()?.base_type)),
				}
			}
			CacheSlot::Children => self.retrieve_expr_children(addr, &id),
			_ => Step::Settled,
		}
	}

	fn retrieve_expr_context(&mut self, addr: CacheAddr, id: &EntityId) -> Step {
		let Some(node) = self.arena.get(addr.node) else { return Step::Settled };
		let Some(expr) = node.as_expr() else { return Step::Settled };
		let parent = node.parent;
		let origin = expr.origin.clone();
		let cast = self.casts.get(id).cloned();

		let (context, source) = match origin {
			ExprOrigin::Local { remote } if cast.is_none() => return Step::Issue(Command::ExpressionsGetContext { id: remote }),
			ExprOrigin::Local { remote } => (self.evaluation_context(parent), ExprSource::Local(remote)),
			ExprOrigin::Watch { script } => (self.evaluation_context(parent), ExprSource::Script(script)),
			ExprOrigin::Field { base, member, deref } => {
				let Some(record) = self.base_record(addr, base) else { return Step::Wait };
				let source = ExprSource::Field {
					base: record.id,
					field: member.id,
					deref,
				};
				(record.parent_id, source)
			}
			ExprOrigin::Element { base, index } => {
				let Some(record) = self.base_record(addr, base) else { return Step::Wait };
				(record.parent_id, ExprSource::Index { base: record.id, index })
			}
			ExprOrigin::Deref { base } => {
				let Some(record) = self.base_record(addr, base) else { return Step::Wait };
				(record.parent_id, ExprSource::Deref { base: record.id })
			}
		};
		Step::Issue(Command::ExpressionsCreate { context, source, cast })
	}

	/// Remote record of the expression `base`, parking `addr` on it. A failed or vanished
	/// base settles `addr` with the same error and yields `None`.
	fn base_record(&mut self, addr: CacheAddr, base: NodeIdx) -> Option<ExpressionRecord> {
		let base_addr = CacheAddr::new(base, CacheSlot::Context);
		if !self.depend(addr, base_addr) {
			return None;
		}
		match self.expr(base).and_then(|expr| expr.context.cloned_result()) {
			Some(Ok(record)) => Some(record),
			Some(Err(err)) => {
				self.fail(addr, err);
				None
			}
			None => {
				self.fail(addr, CacheError::Disposed);
				None
			}
		}
	}

	/// Frame an expression created directly under `parent` is evaluated in. Emulated
	/// frames evaluate in their context.
	fn evaluation_context(&self, parent: Option<NodeIdx>) -> EntityId {
		let Some(node) = parent.and_then(|parent| self.arena.get(parent)) else {
			return EntityId::root();
		};
		match node.as_frame() {
			Some(frame) if frame.emulated => node
				.parent
				.and_then(|exec| self.arena.get(exec))
				.map_or_else(EntityId::root, |exec| exec.id.clone()),
			_ => node.id.clone(),
		}
	}

	fn retrieve_expr_children(&mut self, addr: CacheAddr, id: &EntityId) -> Step {
		if !self.depend(addr, addr.with(CacheSlot::Type)) {
			return Step::Wait;
		}
		let Some(expr) = self.expr(addr.node) else { return Step::Settled };
		let value = expr.value.cloned_result();
		let symbol = match expr.type_info.cloned_result() {
			Some(Ok(Some(symbol))) => symbol,
			Some(Ok(None)) => return self.settle_empty(addr),
			Some(Err(err)) => {
				self.fail(addr, err);
				return Step::Settled;
			}
			None => return Step::Settled,
		};
		match symbol.type_class {
			TypeClass::Composite => Step::Issue(Command::SymbolsGetChildren { id: symbol.id }),
			TypeClass::Array => {
				let entries = self.plan_children(addr, id, addr.node, 1, 0, symbol.length);
				self.commit_children(addr, None, entries);
				Step::Settled
			}
			TypeClass::Pointer => {
				let null = value.and_then(Result::ok).and_then(|value| value.as_u64()) == Some(0);
				if null {
					return self.settle_empty(addr);
				}
				if !self.depend(addr, addr.with(CacheSlot::BaseType)) {
					return Step::Wait;
				}
				match self.expr(addr.node).and_then(|expr| expr.base_type.cloned_result()) {
					Some(Ok(Some(base))) if base.type_class == TypeClass::Composite => Step::Issue(Command::SymbolsGetChildren { id: base.id }),
					Some(Ok(Some(base))) if !matches!(base.type_class, TypeClass::Function | TypeClass::Unknown) => {
						let key = EntityId::new(format!("{id}.*"));
						let base_node = addr.node;
						let child = self.attach(addr.node, CacheSlot::Children, key.clone(), |config| {
							NodeKind::Expr(ExprNode::new(config, ExprOrigin::Deref { base: base_node }))
						});
						self.commit_children(addr, None, IndexMap::from([(key, child)]));
						Step::Settled
					}
					Some(Err(err)) => {
						self.fail(addr, err);
						Step::Settled
					}
					_ => self.settle_empty(addr),
				}
			}
			_ => self.settle_empty(addr),
		}
	}

	/// Children of the index range `offset..offset + len` of `array`, as elements or
	/// partitions at `level`. `owner` is the node whose list they join.
	fn plan_children(&mut self, addr: CacheAddr, owner_id: &EntityId, array: NodeIdx, level: u32, offset: u64, len: u64) -> IndexMap<EntityId, NodeIdx> {
		let mut entries = IndexMap::new();
		match partition::plan(offset, len) {
			Plan::Elements(range) => {
				let Some(array_id) = self.arena.get(array).map(|node| node.id.clone()) else {
					return entries;
				};
				for index in range {
					let key = EntityId::new(format!("{array_id}[{index}]"));
					let child = self.attach(addr.node, addr.slot, key.clone(), |config| {
						NodeKind::Expr(ExprNode::new(config, ExprOrigin::Element { base: array, index }))
					});
					entries.insert(key, child);
				}
			}
			Plan::Partitions(parts) => {
				for part in parts {
					let key = EntityId::new(format!("AP{level}.{}.{owner_id}", part.start));
					let (start, size) = (part.start, part.end - part.start);
					let child = self.attach(addr.node, addr.slot, key.clone(), |config| {
						NodeKind::Partition(PartitionNode::new(config, level, start, size, array))
					});
					entries.insert(key, child);
				}
			}
		}
		entries
	}

	pub(super) fn retrieve_partition(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		let Some(partition) = self.arena.get(addr.node).and_then(|node| node.as_partition()) else {
			return Step::Settled;
		};
		let (array, level, offset, size) = (partition.array, partition.level, partition.offset, partition.size);
		let entries = self.plan_children(addr, &id, array, level + 1, offset, size);
		self.commit_children(addr, None, entries);
		Step::Settled
	}

	/// Fields of a composite value, or of the composite a pointer value points to.
	pub(super) fn complete_fields(&mut self, addr: CacheAddr, token: CommandToken, command: &Command, result: Result<Reply, RemoteError>) {
		if !self.child_set_current(addr, token) {
			tracing::debug!(%token, "expr.stale_fields");
			return;
		}
		let members = match decode(command, result, |reply| match reply {
			Reply::Symbols(members) => Some(members),
			_ => None,
		}) {
			Ok(members) => members,
			Err(err) => {
				self.fail_children(addr, token, err);
				return;
			}
		};
		let Some(node) = self.arena.get(addr.node) else { return };
		let id = node.id.clone();
		let deref = node
			.as_expr()
			.and_then(|expr| expr.type_info.data().cloned().flatten())
			.is_some_and(|symbol| symbol.type_class == TypeClass::Pointer);

		let mut entries = IndexMap::new();
		for member in members.into_iter().filter(|member: &SymbolRecord| !member.artificial) {
			let prefix = if deref { "DF" } else { "F" };
			let key = EntityId::new(format!("{id}.{prefix}{}", member.id));
			let base = addr.node;
			let child = self.attach(addr.node, CacheSlot::Children, key.clone(), |config| {
				NodeKind::Expr(ExprNode::new(config, ExprOrigin::Field { base, member, deref }))
			});
			entries.insert(key, child);
		}
		self.commit_children(addr, Some(token), entries);
	}

	/// One watch expression per session watch, keyed `<frame>.W<serial>`.
	pub(super) fn retrieve_watches(&mut self, addr: CacheAddr, frame: &EntityId) -> Step {
		let watches = self.watches.clone();
		let mut entries = IndexMap::new();
		for (watch, script) in watches {
			let key = EntityId::new(format!("{frame}.{watch}"));
			let child = self.attach(addr.node, CacheSlot::Watches, key.clone(), |config| {
				NodeKind::Expr(ExprNode::new(config, ExprOrigin::Watch { script }))
			});
			entries.insert(key, child);
		}
		self.commit_children(addr, None, entries);
		Step::Settled
	}

	/// Adds a watch expression evaluated in every frame.
	pub fn add_watch(&mut self, script: impl Into<String>) -> WatchId {
		let watch = WatchId(self.next_watch);
		self.next_watch += 1;
		self.watches.push((watch, script.into()));
		self.reset_watch_lists();
		watch
	}

	pub fn remove_watch(&mut self, watch: WatchId) -> bool {
		let before = self.watches.len();
		self.watches.retain(|(id, _)| *id != watch);
		let removed = self.watches.len() != before;
		if removed {
			self.reset_watch_lists();
		}
		removed
	}

	pub fn watches(&self) -> impl Iterator<Item = (WatchId, &str)> {
		self.watches.iter().map(|(id, script)| (*id, script.as_str()))
	}

	fn reset_watch_lists(&mut self) {
		for idx in self.arena.indices() {
			if self.frame(idx).is_some() {
				self.reset(CacheAddr::new(idx, CacheSlot::Watches));
			}
		}
	}

	/// Cast applied to the expression `expr`, remembered by key.
	pub fn cast(&self, expr: NodeIdx) -> Option<&str> {
		let id = &self.arena.get(expr)?.id;
		self.casts.get(id).map(String::as_str)
	}

	/// Re-creates `expr` with `cast` applied (or removed), dropping its sub-expressions.
	pub fn set_cast(&mut self, expr: NodeIdx, cast: Option<String>) {
		let Some(id) = self.arena.get(expr).filter(|node| node.as_expr().is_some()).map(|node| node.id.clone()) else {
			return;
		};
		match cast {
			Some(cast) => self.casts.insert(id.clone(), cast),
			None => self.casts.remove(&id),
		};
		tracing::debug!(%id, cast = ?self.casts.get(&id), "expr.cast");
		self.rebuild_expression(expr);
		self.note(id, DeltaFlags::CONTENT);
	}

	fn rebuild_expression(&mut self, idx: NodeIdx) {
		let Some(expr) = self.arena.get_mut(idx).and_then(|node| node.as_expr_mut()) else {
			return;
		};
		let remote = expr.owns_remote.take();
		let (transition, children) = expr.children.clear();
		let transitions = [
			transition,
			expr.context.reset(),
			expr.value.reset(),
			expr.type_info.reset(),
			expr.base_type.reset(),
		];
		for transition in transitions {
			self.apply(transition);
		}
		for child in children {
			self.dispose_node(child);
		}
		if let Some(remote) = remote {
			self.release_remote(remote);
		}
	}

	/// Disposes a remote evaluator without waiting for the outcome.
	pub(crate) fn release_remote(&mut self, remote: EntityId) {
		if let Err(err) = self.issue(Target::Detached, Command::ExpressionsDispose { id: remote.clone() }) {
			tracing::debug!(%remote, %err, "expr.release_failed");
		}
	}
}
