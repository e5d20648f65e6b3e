//! Per-address lookups: source line, enclosing function, symbol file.
//!
//! Each execution context keeps one bounded [`remora_cache::LookupCache`] per kind. Entries
//! are created on first read; creation and completion trim idle entries beyond the bound.
//! While any context holds lookups, a timer evicts the least recently used idle entry of
//! every kind on each tick and disarms itself once all of them are empty.

use remora_cache::{CacheError, LookupCache};
use remora_proto::{CodeArea, Command, CommandToken, EntityId, PeerServices, RemoteError, Reply, SymFileInfo};

use super::complete::decode;
use super::timers::TimerKind;
use super::{Session, Step};
use crate::{CacheAddr, CacheSlot, ExecNode, FuncInfo, LineInfo, NodeIdx, Waiter};

/// Smallest area containing `address`.
fn narrowest(areas: Vec<CodeArea>, address: u64) -> Option<CodeArea> {
	areas.into_iter().filter(|area| area.contains(address)).min_by_key(CodeArea::span)
}

impl Session {
	/// Creates or promotes the lookup entry behind `addr`.
	pub(super) fn touch_lookup(&mut self, addr: CacheAddr) {
		let Some(exec) = self.arena.get_mut(addr.node).and_then(|node| node.as_exec_mut()) else {
			return;
		};
		let evicted = match addr.slot {
			CacheSlot::LineInfo(address) => exec.line_info.entry(address).1.len(),
			CacheSlot::FuncInfo(address) => exec.func_info.entry(address).1.len(),
			CacheSlot::SymFileInfo(address) => exec.sym_file_info.entry(address).1.len(),
			_ => return,
		};
		if evicted > 0 {
			tracing::trace!(evicted, slot = ?addr.slot, "lookup.trim");
		}
		self.arm_lookup_timer();
	}

	pub(super) fn retrieve_lookup(&mut self, addr: CacheAddr, context: EntityId) -> Step {
		match addr.slot {
			CacheSlot::LineInfo(address) => {
				if !self.has_service(PeerServices::LINE_NUMBERS) {
					self.fail(addr, CacheError::ServiceUnavailable("LineNumbers"));
					return Step::Settled;
				}
				Step::Issue(Command::LineNumbersMapToSource {
					context,
					start: address,
					end: address.saturating_add(1),
				})
			}
			CacheSlot::FuncInfo(address) => {
				if !self.has_service(PeerServices::SYMBOLS) {
					self.fail(addr, CacheError::ServiceUnavailable("Symbols"));
					return Step::Settled;
				}
				Step::Issue(Command::SymbolsFindByAddr { context, address })
			}
			CacheSlot::SymFileInfo(address) => {
				if !self.has_service(PeerServices::SYMBOLS) {
					self.fail(addr, CacheError::ServiceUnavailable("Symbols"));
					return Step::Settled;
				}
				Step::Issue(Command::SymbolsGetSymFileInfo { context, address })
			}
			_ => Step::Settled,
		}
	}

	/// Peer failures are folded into the looked-up value so the address stays attached;
	/// only protocol misuse fails the cache.
	pub(super) fn complete_lookup(&mut self, addr: CacheAddr, token: CommandToken, command: &Command, result: Result<Reply, RemoteError>) {
		match addr.slot {
			CacheSlot::LineInfo(address) => {
				let info = match result {
					Err(err) => Ok(LineInfo {
						address,
						area: None,
						error: Some(err),
					}),
					ok => decode(command, ok, |reply| match reply {
						Reply::CodeAreas(areas) => Some(LineInfo {
							address,
							area: narrowest(areas, address),
							error: None,
						}),
						_ => None,
					}),
				};
				self.finish_lookup(addr.node, token, address, info, |exec| &mut exec.line_info);
			}
			CacheSlot::FuncInfo(address) => {
				let info = match result {
					Err(err) => Ok(FuncInfo {
						address,
						symbol: None,
						error: Some(err),
					}),
					ok => decode(command, ok, |reply| match reply {
						Reply::Symbol(symbol) => Some(FuncInfo {
							address,
							symbol: Some(symbol),
							error: None,
						}),
						_ => None,
					}),
				};
				self.finish_lookup(addr.node, token, address, info, |exec| &mut exec.func_info);
			}
			CacheSlot::SymFileInfo(address) => {
				let info = match result {
					Err(err) => Ok(SymFileInfo {
						file_name: None,
						error: Some(err),
					}),
					ok => decode(command, ok, |reply| match reply {
						Reply::SymFile(info) => Some(info),
						_ => None,
					}),
				};
				self.finish_lookup(addr.node, token, address, info, |exec| &mut exec.sym_file_info);
			}
			_ => {}
		}
	}

	fn finish_lookup<T>(
		&mut self,
		node: NodeIdx,
		token: CommandToken,
		address: u64,
		result: Result<T, CacheError>,
		pick: impl FnOnce(&mut ExecNode) -> &mut LookupCache<u64, T, Waiter>,
	) {
		let Some(exec) = self.arena.get_mut(node).and_then(|node| node.as_exec_mut()) else {
			return;
		};
		let lookups = pick(exec);
		let waiters = lookups.peek_mut(&address).and_then(|cache| cache.complete(token, result));
		let evicted = lookups.trim().len();
		if evicted > 0 {
			tracing::trace!(evicted, "lookup.trim");
		}
		if let Some(waiters) = waiters {
			self.ready.extend(waiters);
		}
	}

	pub(super) fn arm_lookup_timer(&mut self) {
		if self.lookup_timer_armed {
			return;
		}
		self.lookup_timer_armed = true;
		let first = self.config.lookup_first_tick();
		self.schedule(first, TimerKind::LookupEviction);
	}

	/// One eviction tick over every context.
	pub(super) fn evict_lookups(&mut self) {
		let mut evicted = 0usize;
		let mut remaining = false;
		for idx in self.arena.indices() {
			let Some(exec) = self.arena.get_mut(idx).and_then(|node| node.as_exec_mut()) else {
				continue;
			};
			evicted += usize::from(exec.line_info.evict_one().is_some());
			evicted += usize::from(exec.func_info.evict_one().is_some());
			evicted += usize::from(exec.sym_file_info.evict_one().is_some());
			remaining |= !exec.lookups_empty();
		}
		tracing::trace!(evicted, remaining, "lookup.evict_tick");
		if remaining {
			let tick = self.config.lookup_tick();
			self.schedule(tick, TimerKind::LookupEviction);
		} else {
			self.lookup_timer_armed = false;
		}
	}

	/// Drops every idle lookup of `exec` and restarts the ones in flight.
	pub(super) fn clear_lookups(&mut self, exec: NodeIdx) {
		let Some(exec) = self.arena.get_mut(exec).and_then(|node| node.as_exec_mut()) else {
			return;
		};
		let dropped = exec.line_info.drain_idle().len() + exec.func_info.drain_idle().len() + exec.sym_file_info.drain_idle().len();
		let mut transitions = Vec::new();
		transitions.extend(exec.line_info.iter_mut().map(|(_, cache)| cache.reset()));
		transitions.extend(exec.func_info.iter_mut().map(|(_, cache)| cache.reset()));
		transitions.extend(exec.sym_file_info.iter_mut().map(|(_, cache)| cache.reset()));
		tracing::trace!(dropped, restarted = transitions.len(), "lookup.clear");
		for transition in transitions {
			self.apply(transition);
		}
	}
}
