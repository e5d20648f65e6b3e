//! Stack traces and frames.
//!
//! Frames are numbered from the innermost frame (0). With a configured limit `L` the
//! windowed command asks for `0..=L`; a peer that rejects it is remembered and the full
//! list is fetched instead, keeping its `L + 1` innermost frames. A suspended context
//! always shows at least one frame: a stand-in keyed `<context>-TF` when the peer
//! reports none.

use indexmap::IndexMap;
use remora_cache::CacheError;
use remora_proto::{Command, CommandToken, EntityId, PeerServices, RemoteError, Reply};

use super::{Session, Step};
use crate::{CacheAddr, CacheSlot, DeltaFlags, FrameNode, NodeIdx, NodeKind};

impl Session {
	pub(super) fn retrieve_stack(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		if !self.depend(addr, addr.with(CacheSlot::State)) {
			return Step::Wait;
		}
		let suspended = match self.exec(addr.node).and_then(|exec| exec.state.cloned_result()) {
			Some(Ok(state)) => state.is_some_and(|state| state.suspended),
			Some(Err(err)) => {
				self.fail(addr, err);
				return Step::Settled;
			}
			None => false,
		};
		if !suspended {
			return self.settle_empty(addr);
		}
		if !self.has_service(PeerServices::STACK_TRACE) {
			let entries = self.emulated_stack(addr, &id);
			self.commit_children(addr, None, entries);
			return Step::Settled;
		}
		match self.frame_window(addr.node) {
			Some(end) if self.capabilities.allows_windowed_stack() => Step::Issue(Command::StackTraceGetChildrenRange { context: id, start: 0, end }),
			_ => Step::Issue(Command::StackTraceGetChildren { context: id }),
		}
	}

	/// Deepest frame number fetched for `exec`, or `None` for the complete stack.
	fn frame_window(&self, exec: NodeIdx) -> Option<u32> {
		let limit = self.config.stack_limit()?;
		let factor = self.exec(exec).map_or(1, |exec| exec.limit_factor);
		Some(limit.saturating_mul(factor))
	}

	pub(super) fn complete_stack(&mut self, addr: CacheAddr, token: CommandToken, command: Command, result: Result<Reply, RemoteError>) {
		if !self.child_set_current(addr, token) {
			tracing::debug!(%token, "stack.stale_completion");
			return;
		}
		let windowed = matches!(command, Command::StackTraceGetChildrenRange { .. });
		let Some(context) = self.arena.get(addr.node).map(|node| node.id.clone()) else { return };
		let ids = match result {
			Err(err) if windowed && err.is_unsupported() => {
				self.capabilities.note_windowed_stack(false);
				tracing::info!(%context, %err, "stack.windowed_unsupported");
				self.start_command(addr, Command::StackTraceGetChildren { context });
				return;
			}
			Err(err) => {
				self.fail_children(addr, token, err.into());
				return;
			}
			Ok(Reply::Ids(ids)) => ids,
			Ok(other) => {
				tracing::warn!(command = command.name(), reply = other.kind(), "stack.unexpected_reply");
				let error = CacheError::UnexpectedReply {
					command: command.name(),
					reply: other.kind(),
				};
				self.fail_children(addr, token, error);
				return;
			}
		};
		if windowed {
			self.capabilities.note_windowed_stack(true);
		}

		let keep = self.frame_window(addr.node).map_or(usize::MAX, |end| (end as usize).saturating_add(1));
		let innermost_first: Vec<EntityId> = if windowed { ids } else { ids.into_iter().rev().collect() };
		let mut entries = IndexMap::new();
		for (frame_no, frame_id) in innermost_first.into_iter().take(keep).enumerate() {
			let frame_no = i32::try_from(frame_no).unwrap_or(i32::MAX);
			let frame = self.attach(addr.node, CacheSlot::StackTrace, frame_id.clone(), |config| {
				NodeKind::Frame(FrameNode::new(config, frame_no, false))
			});
			if let Some(node) = self.arena.get_mut(frame).and_then(|node| node.as_frame_mut()) {
				node.frame_no = frame_no;
			}
			entries.insert(frame_id, frame);
		}
		if entries.is_empty() {
			entries = self.emulated_stack(addr, &context);
		}
		self.mark_dropped_frames(addr, &entries);
		self.commit_children(addr, Some(token), entries);
	}

	fn emulated_stack(&mut self, addr: CacheAddr, context: &EntityId) -> IndexMap<EntityId, NodeIdx> {
		let key = EntityId::new(format!("{context}-TF"));
		let frame = self.attach(addr.node, CacheSlot::StackTrace, key.clone(), |config| NodeKind::Frame(FrameNode::new(config, 0, true)));
		IndexMap::from([(key, frame)])
	}

	/// Frames still tracked by the stack but absent from `entries` sort last.
	fn mark_dropped_frames(&mut self, addr: CacheAddr, entries: &IndexMap<EntityId, NodeIdx>) {
		let tracked: Vec<NodeIdx> = self
			.arena
			.get(addr.node)
			.and_then(|node| node.child_set(CacheSlot::StackTrace))
			.map(|set| set.entities().copied().collect())
			.unwrap_or_default();
		for frame in tracked {
			if entries.values().any(|kept| *kept == frame) {
				continue;
			}
			if let Some(node) = self.arena.get_mut(frame).and_then(|node| node.as_frame_mut()) {
				node.frame_no = -1;
			}
		}
	}

	/// Fetches more frames of `context` on the next read of its stack trace.
	pub fn raise_trace_limit(&mut self, context: NodeIdx) {
		let Some(node) = self.arena.get_mut(context) else { return };
		let id = node.id.clone();
		let Some(exec) = node.as_exec_mut() else { return };
		exec.limit_factor = exec.limit_factor.saturating_add(1);
		tracing::debug!(%id, factor = exec.limit_factor, "stack.raise_limit");
		self.reset(CacheAddr::new(context, CacheSlot::StackTrace));
		self.note(id, DeltaFlags::CONTENT);
	}

	pub(super) fn retrieve_frame(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		let Some((emulated, frame_no, exec)) = self
			.arena
			.get(addr.node)
			.and_then(|node| Some((node.as_frame()?.emulated, node.as_frame()?.frame_no, node.parent?)))
		else {
			return Step::Settled;
		};
		match addr.slot {
			CacheSlot::Context => {
				if emulated || !self.has_service(PeerServices::STACK_TRACE) {
					return self.settle(addr, Ok(None), |n| Some(&mut n.as_frame_mut()?.context));
				}
				Step::Issue(Command::StackTraceGetContext { id })
			}
			CacheSlot::Address if emulated || frame_no == 0 => {
				let exec_address = CacheAddr::new(exec, CacheSlot::Address);
				if !self.depend(addr, exec_address) {
					return Step::Wait;
				}
				let address = self
					.exec(exec)
					.and_then(|exec| exec.address.cloned_result())
					.unwrap_or(Err(CacheError::Disposed));
				self.settle(addr, address, |n| Some(&mut n.as_frame_mut()?.address))
			}
			CacheSlot::Address => {
				if !self.depend(addr, addr.with(CacheSlot::Context)) {
					return Step::Wait;
				}
				let address = self
					.frame(addr.node)
					.and_then(|frame| frame.context.cloned_result())
					.unwrap_or(Err(CacheError::Disposed))
					.map(|record| record.and_then(|record| record.instruction_address));
				self.settle(addr, address, |n| Some(&mut n.as_frame_mut()?.address))
			}
			CacheSlot::Locals => {
				if emulated || !self.has_service(PeerServices::EXPRESSIONS) {
					return self.settle_empty(addr);
				}
				Step::Issue(Command::ExpressionsGetChildren { frame: id })
			}
			CacheSlot::Watches => self.retrieve_watches(addr, &id),
			_ => Step::Settled,
		}
	}
}
