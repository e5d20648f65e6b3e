//! Reaction of the model to peer events.
//!
//! | Event | Resets |
//! |---|---|
//! | suspended | state (to the reported state, or refetched when no PC came), address, register values, stack trace, frame records and addresses, expression values unless mid-call, exec-state symbols |
//! | resumed | state (to running) and address; the stack trace after the resume debounce |
//! | context changed | record (to the reported record), state, address, stack trace, registers |
//! | state changed | state, address |
//! | registers changed | register list |
//! | register value changed | that register, state and address of its context, frames, lookups, expressions |
//! | memory changed | lookups, expressions, memory blocks, stack trace |
//! | memory map changed | the above, memory map, modules, symbols |

use remora_proto::{ContextState, EntityId, PeerEvent, RunControlContext, UpdatePolicy};
use rustc_hash::FxHashSet;

use super::Session;
use super::timers::TimerKind;
use crate::{CacheAddr, CacheSlot, DeltaFlags, ExecNode, NodeIdx, NodeKind};

impl Session {
	/// Applies one peer event. Call [`Self::run_pending`] afterwards.
	pub fn handle_event(&mut self, event: PeerEvent) {
		tracing::debug!(event = event.name(), "session.event");
		match event {
			PeerEvent::ContextAdded { contexts } => {
				for record in contexts {
					self.on_context_added(record);
				}
			}
			PeerEvent::ContextChanged { contexts } => {
				for record in contexts {
					self.on_context_changed(record);
				}
			}
			PeerEvent::ContextRemoved { ids } => {
				for id in ids {
					if let Some(idx) = self.find(id.as_str()) {
						self.dispose_node(idx);
					}
				}
			}
			PeerEvent::ContextSuspended { id, pc, reason, func_call } => {
				if let Some(exec) = self.exec_by_id(&id) {
					self.on_suspended(exec, ContextState::suspended(pc, reason, func_call));
				}
			}
			PeerEvent::ContextResumed { id } => {
				if let Some(exec) = self.exec_by_id(&id) {
					self.on_resumed(exec);
				}
			}
			PeerEvent::ContainerSuspended {
				id,
				pc,
				reason,
				func_call,
				suspended,
			} => {
				if let Some(exec) = self.stateful_exec(&id) {
					self.on_suspended(exec, ContextState::suspended(pc, reason.clone(), func_call));
				}
				for other in suspended.iter().filter(|other| **other != id) {
					if let Some(exec) = self.stateful_exec(other) {
						self.on_suspended(exec, ContextState::suspended(None, reason.clone(), func_call));
					}
				}
			}
			PeerEvent::ContainerResumed { ids } => {
				for id in ids {
					if let Some(exec) = self.stateful_exec(&id) {
						self.on_resumed(exec);
					}
				}
			}
			PeerEvent::ContextStateChanged { id } => {
				if let Some(exec) = self.exec_by_id(&id) {
					self.reset(CacheAddr::new(exec, CacheSlot::State));
					self.reset(CacheAddr::new(exec, CacheSlot::Address));
					self.note(id, DeltaFlags::STATE);
				}
			}
			PeerEvent::RegistersChanged { context } => {
				if let Some(exec) = self.exec_by_id(&context) {
					self.reset(CacheAddr::new(exec, CacheSlot::Registers));
					self.note(context, DeltaFlags::CONTENT);
				}
			}
			PeerEvent::RegisterValueChanged { id } => self.on_register_changed(&id),
			PeerEvent::MemoryChanged { context, ranges } => {
				tracing::trace!(%context, ranges = ranges.len(), "memory.changed");
				if let Some(exec) = self.exec_by_id(&context) {
					self.on_memory_changed(exec, false);
				}
			}
			PeerEvent::MemoryMapChanged { context } => {
				if let Some(exec) = self.exec_by_id(&context) {
					self.on_memory_changed(exec, true);
				}
			}
		}
	}

	fn exec_by_id(&self, id: &EntityId) -> Option<NodeIdx> {
		self.find(id.as_str()).filter(|idx| self.exec(*idx).is_some())
	}

	/// Exec node for `id` unless its known record says it has no run state. Container
	/// events list such contexts alongside the threads they hold.
	fn stateful_exec(&self, id: &EntityId) -> Option<NodeIdx> {
		let exec = self.exec_by_id(id)?;
		let stateless = self
			.exec(exec)
			.and_then(|node| node.context.data())
			.and_then(Option::as_ref)
			.is_some_and(|record| !record.has_state);
		if stateless {
			tracing::trace!(%id, "context.stateless_container_event");
			return None;
		}
		Some(exec)
	}

	/// Creates (or reuses) the exec node for `record` under `parent` and applies the record.
	pub(super) fn adopt_exec(&mut self, parent: NodeIdx, record: RunControlContext) -> NodeIdx {
		let id = record.id.clone();
		let exec = self.attach(parent, CacheSlot::Children, id.clone(), |config| NodeKind::Exec(ExecNode::new(config)));
		if let Some(node) = self.arena.get_mut(exec).and_then(|node| node.as_exec_mut()) {
			let transition = node.context.reset_to(Some(record));
			self.apply(transition);
		}
		if let Some(set) = self.arena.get_mut(parent).and_then(|node| node.child_set_mut(CacheSlot::Children)) {
			set.insert(id, exec);
		}
		exec
	}

	fn on_context_added(&mut self, record: RunControlContext) {
		if self.find(record.id.as_str()).is_some() {
			self.on_context_changed(record);
			return;
		}
		let parent = match &record.parent_id {
			None => Some(self.root),
			Some(parent) if parent.is_root() => Some(self.root),
			Some(parent) => self.exec_by_id(parent),
		};
		let Some(parent) = parent else {
			tracing::debug!(id = %record.id, parent = ?record.parent_id, "context.added_orphan");
			return;
		};
		let parent_id = self.arena.get(parent).map(|node| node.id.clone());
		self.adopt_exec(parent, record);
		if let Some(parent_id) = parent_id {
			self.note(parent_id, DeltaFlags::CONTENT);
		}
	}

	fn on_context_changed(&mut self, record: RunControlContext) {
		let id = record.id.clone();
		let Some(exec) = self.exec_by_id(&id) else { return };
		if let Some(node) = self.arena.get_mut(exec).and_then(|node| node.as_exec_mut()) {
			let transition = node.context.reset_to(Some(record));
			self.apply(transition);
		}
		for slot in [CacheSlot::State, CacheSlot::Address, CacheSlot::StackTrace, CacheSlot::Registers] {
			self.reset(CacheAddr::new(exec, slot));
		}
		self.note(id, DeltaFlags::STATE | DeltaFlags::CONTENT);
	}

	fn on_suspended(&mut self, exec: NodeIdx, state: ContextState) {
		let Some(node) = self.arena.get_mut(exec) else { return };
		let id = node.id.clone();
		let Some(context) = node.as_exec_mut() else { return };
		let pc_known = state.pc.is_some();
		let func_call = state.func_call;
		context.limit_factor = 1;
		context.suspend_seq += 1;
		context.resume_pending = false;
		let seq = context.suspend_seq;
		// Without a PC the reported state is incomplete; fetch it instead.
		if pc_known {
			let transition = context.state.reset_to(Some(state));
			self.apply(transition);
		} else {
			self.reset(CacheAddr::new(exec, CacheSlot::State));
		}
		self.reset(CacheAddr::new(exec, CacheSlot::Address));
		self.reset(CacheAddr::new(exec, CacheSlot::StackTrace));

		for idx in self.subtree(exec).into_iter().skip(1) {
			let Some(node) = self.arena.get(idx) else { continue };
			match &node.kind {
				NodeKind::Register(_) => self.reset(CacheAddr::new(idx, CacheSlot::Value)),
				NodeKind::Frame(_) => {
					for slot in [CacheSlot::Context, CacheSlot::Address, CacheSlot::Locals] {
						self.reset(CacheAddr::new(idx, slot));
					}
				}
				NodeKind::Expr(expr) => {
					if !func_call || expr.value.error().is_some() {
						self.reset(CacheAddr::new(idx, CacheSlot::Value));
						self.reset(CacheAddr::new(idx, CacheSlot::Children));
					}
				}
				NodeKind::Symbol(symbol) => {
					let policy = symbol.context.last_known().map(|record| record.update_policy);
					if policy == Some(UpdatePolicy::ExecState) {
						self.reset(CacheAddr::new(idx, CacheSlot::Context));
						self.reset(CacheAddr::new(idx, CacheSlot::Members));
					}
				}
				_ => {}
			}
		}

		if pc_known {
			self.note(id, DeltaFlags::STATE | DeltaFlags::CONTENT);
		} else {
			let delay = self.config.suspend_debounce();
			self.schedule(delay, TimerKind::AnnounceSuspend { context: exec, seq });
		}
	}

	fn on_resumed(&mut self, exec: NodeIdx) {
		let Some(context) = self.arena.get_mut(exec).and_then(|node| node.as_exec_mut()) else {
			return;
		};
		context.resume_seq += 1;
		context.resume_pending = true;
		let seq = context.resume_seq;
		let transition = context.state.reset_to(Some(ContextState::running()));
		self.apply(transition);
		self.reset(CacheAddr::new(exec, CacheSlot::Address));
		let delay = self.config.resume_debounce();
		self.schedule(delay, TimerKind::ConfirmResume { context: exec, seq });
	}

	fn on_register_changed(&mut self, id: &EntityId) {
		let Some(register) = self.find(id.as_str()).filter(|idx| self.register(*idx).is_some()) else {
			return;
		};
		self.reset(CacheAddr::new(register, CacheSlot::Value));
		let Some(exec) = self.owning_exec(register) else { return };
		self.reset(CacheAddr::new(exec, CacheSlot::State));
		self.reset(CacheAddr::new(exec, CacheSlot::Address));
		self.clear_lookups(exec);
		for idx in self.subtree(exec) {
			let Some(node) = self.arena.get(idx) else { continue };
			match node.kind {
				NodeKind::Frame(_) => {
					self.reset(CacheAddr::new(idx, CacheSlot::Context));
					self.reset(CacheAddr::new(idx, CacheSlot::Address));
				}
				NodeKind::Expr(_) => {
					self.reset(CacheAddr::new(idx, CacheSlot::Value));
					self.reset(CacheAddr::new(idx, CacheSlot::Children));
				}
				_ => {}
			}
		}
		self.note(id.clone(), DeltaFlags::CONTENT);
	}

	/// Memory of `exec` changed; with `map` set, its memory map changed too. Contexts below
	/// `exec` share its memory.
	fn on_memory_changed(&mut self, exec: NodeIdx, map: bool) {
		let nodes = self.subtree(exec);
		let mut contexts = FxHashSet::default();
		for idx in nodes {
			let Some(node) = self.arena.get(idx) else { continue };
			match node.kind {
				NodeKind::Exec(_) => {
					contexts.insert(node.id.clone());
					self.clear_lookups(idx);
					self.reset(CacheAddr::new(idx, CacheSlot::StackTrace));
					if map {
						self.reset(CacheAddr::new(idx, CacheSlot::MemoryMap));
						self.reset(CacheAddr::new(idx, CacheSlot::Modules));
					}
				}
				NodeKind::Frame(_) => {
					self.reset(CacheAddr::new(idx, CacheSlot::Context));
					self.reset(CacheAddr::new(idx, CacheSlot::Address));
				}
				NodeKind::Expr(_) => {
					self.reset(CacheAddr::new(idx, CacheSlot::Value));
					self.reset(CacheAddr::new(idx, CacheSlot::Children));
				}
				NodeKind::Module(_) if map => self.reset(CacheAddr::new(idx, CacheSlot::Region)),
				NodeKind::Symbol(_) if map => {
					self.reset(CacheAddr::new(idx, CacheSlot::Context));
					self.reset(CacheAddr::new(idx, CacheSlot::Members));
				}
				_ => {}
			}
		}
		self.reset_blocks(&contexts);
		for id in contexts {
			self.note(id, DeltaFlags::CONTENT);
		}
	}
}
