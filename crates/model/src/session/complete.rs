use indexmap::IndexMap;
use remora_cache::CacheError;
use remora_proto::{Command, CommandToken, EntityId, RemoteError, Reply};

use super::Session;
use crate::{CacheAddr, CacheSlot, ExecNode, ExprNode, ExprOrigin, ModelConfig, Node, NodeKind, NodeTag, RegisterNode, ValueCache};

/// Extracts the payload `pick` expects, or reports the reply as unexpected.
pub(super) fn decode<T>(command: &Command, result: Result<Reply, RemoteError>, pick: impl FnOnce(Reply) -> Option<T>) -> Result<T, CacheError> {
	let reply = result?;
	let kind = reply.kind();
	pick(reply).ok_or_else(|| {
		tracing::warn!(command = command.name(), reply = kind, "session.unexpected_reply");
		CacheError::UnexpectedReply {
			command: command.name(),
			reply: kind,
		}
	})
}

impl Session {
	pub(super) fn complete(&mut self, addr: CacheAddr, token: CommandToken, command: Command, result: Result<Reply, RemoteError>) {
		let Some(tag) = self.arena.get(addr.node).map(|node| node.kind.tag()) else {
			tracing::debug!(%token, command = command.name(), "session.orphan_completion");
			return;
		};
		if addr.slot.is_lookup() {
			self.complete_lookup(addr, token, &command, result);
			return;
		}
		use CacheSlot as S;
		use NodeTag as K;
		match (tag, addr.slot) {
			(K::Exec, S::StackTrace) => self.complete_stack(addr, token, command, result),
			(K::Launch | K::Exec, S::Children) => self.complete_list(addr, token, &command, result, |config, _| NodeKind::Exec(ExecNode::new(config))),
			(K::Exec, S::Registers) | (K::Register, S::Children) => {
				self.complete_list(addr, token, &command, result, |config, _| NodeKind::Register(RegisterNode::new(config)));
			}
			(K::Frame, S::Locals) => self.complete_list(addr, token, &command, result, |config, id| {
				NodeKind::Expr(ExprNode::new(config, ExprOrigin::Local { remote: id.clone() }))
			}),
			(K::Expr, S::Children) => self.complete_fields(addr, token, &command, result),
			(K::Expr, S::Context) => self.complete_expression(addr, token, &command, result),
			(K::Exec, S::Context) => {
				let record = decode(&command, result, |reply| match reply {
					Reply::RunControlContext(record) => Some(Some(record)),
					_ => None,
				});
				self.finish(addr, token, record, |n| Some(&mut n.as_exec_mut()?.context));
			}
			(K::Exec, S::State) => {
				let state = decode(&command, result, |reply| match reply {
					Reply::State(state) => Some(Some(state)),
					_ => None,
				});
				self.finish(addr, token, state, |n| Some(&mut n.as_exec_mut()?.state));
			}
			(K::Exec, S::MemoryMap) => {
				let map = decode(&command, result, |reply| match reply {
					Reply::MemoryMap(map) => Some(map),
					_ => None,
				});
				self.finish(addr, token, map, |n| Some(&mut n.as_exec_mut()?.memory_map));
			}
			(K::Frame, S::Context) => {
				let record = decode(&command, result, |reply| match reply {
					Reply::Frame(record) => Some(Some(record)),
					_ => None,
				});
				self.finish(addr, token, record, |n| Some(&mut n.as_frame_mut()?.context));
			}
			(K::Expr, S::Value) => {
				let value = decode(&command, result, |reply| match reply {
					Reply::Value(value) => Some(value),
					_ => None,
				});
				self.finish(addr, token, value, |n| Some(&mut n.as_expr_mut()?.value));
			}
			(K::Expr, S::Type) => {
				let symbol = decode(&command, result, |reply| match reply {
					Reply::Symbol(symbol) => Some(Some(symbol)),
					_ => None,
				});
				self.finish(addr, token, symbol, |n| Some(&mut n.as_expr_mut()?.type_info));
			}
			(K::Expr, S::BaseType) => {
				let symbol = decode(&command, result, |reply| match reply {
					Reply::Symbol(symbol) => Some(Some(symbol)),
					_ => None,
				});
				self.finish(addr, token, symbol, |n| Some(&mut n.as_expr_mut()?.base_type));
			}
			(K::Register, S::Context) => {
				let record = decode(&command, result, |reply| match reply {
					Reply::Register(record) => Some(record),
					_ => None,
				});
				self.finish(addr, token, record, |n| Some(&mut n.as_register_mut()?.context));
			}
			(K::Register, S::Value) => {
				let bytes = decode(&command, result, |reply| match reply {
					Reply::RegisterValue(bytes) | Reply::Bytes(bytes) => Some(bytes),
					_ => None,
				});
				self.finish(addr, token, bytes, |n| Some(&mut n.as_register_mut()?.value));
			}
			(K::Symbol, S::Context) => {
				let record = decode(&command, result, |reply| match reply {
					Reply::Symbol(record) => Some(record),
					_ => None,
				});
				self.finish(addr, token, record, |n| Some(&mut n.as_symbol_mut()?.context));
			}
			(K::Symbol, S::Members) => {
				let members = decode(&command, result, |reply| match reply {
					Reply::Symbols(members) => Some(members),
					_ => None,
				});
				self.finish(addr, token, members, |n| Some(&mut n.as_symbol_mut()?.members));
			}
			(tag, slot) => tracing::warn!(%token, ?tag, ?slot, command = command.name(), "session.unrouted_completion"),
		}
	}

	/// Commits the completion of `token` to a value cache. Returns whether it was accepted.
	pub(super) fn finish<T>(
		&mut self,
		addr: CacheAddr,
		token: CommandToken,
		result: Result<T, CacheError>,
		pick: impl FnOnce(&mut Node) -> Option<&mut ValueCache<T>>,
	) -> bool {
		let Some(cache) = self.arena.get_mut(addr.node).and_then(pick) else {
			return false;
		};
		match cache.complete(token, result) {
			Some(waiters) => {
				self.ready.extend(waiters);
				true
			}
			None => false,
		}
	}

	/// Commits a peer-ordered id list, creating a node per new id.
	fn complete_list(
		&mut self,
		addr: CacheAddr,
		token: CommandToken,
		command: &Command,
		result: Result<Reply, RemoteError>,
		make: impl Fn(&ModelConfig, &EntityId) -> NodeKind,
	) {
		if !self.child_set_current(addr, token) {
			tracing::debug!(%token, command = command.name(), "child_set.stale_completion");
			return;
		}
		let ids = match decode(command, result, |reply| match reply {
			Reply::Ids(ids) => Some(ids),
			_ => None,
		}) {
			Ok(ids) => ids,
			Err(err) => {
				self.fail_children(addr, token, err);
				return;
			}
		};
		let mut entries = IndexMap::with_capacity(ids.len());
		for id in ids {
			let node = self.attach(addr.node, addr.slot, id.clone(), |config| make(config, &id));
			entries.insert(id, node);
		}
		self.commit_children(addr, Some(token), entries);
	}

	/// Remote expression record. A record created for us is owned by the node, or released
	/// right away when the node no longer wants it.
	fn complete_expression(&mut self, addr: CacheAddr, token: CommandToken, command: &Command, result: Result<Reply, RemoteError>) {
		let created = matches!(command, Command::ExpressionsCreate { .. });
		let record = decode(command, result, |reply| match reply {
			Reply::Expression(record) => Some(record),
			_ => None,
		});
		let remote = record.as_ref().ok().filter(|_| created).map(|record| record.id.clone());
		let accepted = self.finish(addr, token, record, |n| Some(&mut n.as_expr_mut()?.context));
		let Some(remote) = remote else { return };
		if !accepted {
			self.release_remote(remote);
			return;
		}
		let previous = self
			.arena
			.get_mut(addr.node)
			.and_then(|node| node.as_expr_mut())
			.and_then(|expr| expr.owns_remote.replace(remote));
		if let Some(previous) = previous {
			self.release_remote(previous);
		}
	}
}
