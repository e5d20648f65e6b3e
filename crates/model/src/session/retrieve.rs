use indexmap::IndexMap;
use remora_cache::CacheError;
use remora_proto::{Command, EntityId, PeerServices};

use super::{Session, Step};
use crate::{CacheAddr, CacheSlot, ModuleNode, Node, NodeIdx, NodeKind, NodeTag, SymbolNode, ValueCache};

impl Session {
	/// Runs the retrieval of the cache at `addr` once.
	pub(super) fn retrieve(&mut self, addr: CacheAddr) -> Step {
		let Some((tag, id)) = self.arena.get(addr.node).map(|node| (node.kind.tag(), node.id.clone())) else {
			return Step::Settled;
		};
		match tag {
			NodeTag::Launch => self.retrieve_contexts(addr, None),
			NodeTag::Exec => self.retrieve_exec(addr, id),
			NodeTag::Frame => self.retrieve_frame(addr, id),
			NodeTag::Expr => self.retrieve_expr(addr, id),
			NodeTag::Register => self.retrieve_register(addr, id),
			NodeTag::Symbol => self.retrieve_symbol(addr, id),
			NodeTag::Module => self.retrieve_module(addr),
			NodeTag::Partition => self.retrieve_partition(addr, id),
		}
	}

	/// Settles a value cache without a command.
	pub(super) fn settle<T>(
		&mut self,
		addr: CacheAddr,
		result: Result<T, CacheError>,
		pick: impl FnOnce(&mut Node) -> Option<&mut ValueCache<T>>,
	) -> Step {
		if let Some(cache) = self.arena.get_mut(addr.node).and_then(pick) {
			let transition = cache.set(result);
			self.apply(transition);
		}
		Step::Settled
	}

	/// Settles an empty child list without a command.
	pub(super) fn settle_empty(&mut self, addr: CacheAddr) -> Step {
		self.commit_children(addr, None, IndexMap::new());
		Step::Settled
	}

	pub(super) fn has_service(&self, service: PeerServices) -> bool {
		self.services.contains(service)
	}

	fn retrieve_contexts(&mut self, addr: CacheAddr, parent: Option<EntityId>) -> Step {
		if !self.has_service(PeerServices::RUN_CONTROL) {
			return self.settle_empty(addr);
		}
		Step::Issue(Command::RunControlGetChildren { parent })
	}

	fn retrieve_exec(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		match addr.slot {
			CacheSlot::Context => {
				if !self.has_service(PeerServices::RUN_CONTROL) {
					return self.settle(addr, Ok(None), |n| Some(&mut n.as_exec_mut()?.context));
				}
				Step::Issue(Command::RunControlGetContext { id })
			}
			CacheSlot::State => {
				if !self.depend(addr, addr.with(CacheSlot::Context)) {
					return Step::Wait;
				}
				let context = self.exec(addr.node).and_then(|exec| exec.context.cloned_result());
				match context {
					Some(Ok(Some(record))) if record.has_state => Step::Issue(Command::RunControlGetState { id }),
					Some(Err(err)) => self.settle(addr, Err(err), |n| Some(&mut n.as_exec_mut()?.state)),
					_ => self.settle(addr, Ok(None), |n| Some(&mut n.as_exec_mut()?.state)),
				}
			}
			CacheSlot::Address => {
				if !self.depend(addr, addr.with(CacheSlot::State)) {
					return Step::Wait;
				}
				let state = self.exec(addr.node).and_then(|exec| exec.state.cloned_result());
				let address = match state {
					Some(Ok(Some(state))) if state.suspended => Ok(state.pc),
					Some(Err(err)) => Err(err),
					_ => Ok(None),
				};
				self.settle(addr, address, |n| Some(&mut n.as_exec_mut()?.address))
			}
			CacheSlot::MemoryMap => {
				if !self.has_service(PeerServices::MEMORY_MAP) {
					return self.settle(addr, Ok(Vec::new()), |n| Some(&mut n.as_exec_mut()?.memory_map));
				}
				Step::Issue(Command::MemoryMapGet { context: id })
			}
			CacheSlot::Children => self.retrieve_contexts(addr, Some(id)),
			CacheSlot::StackTrace => self.retrieve_stack(addr, id),
			CacheSlot::Registers => {
				if !self.has_service(PeerServices::REGISTERS) {
					return self.settle_empty(addr);
				}
				Step::Issue(Command::RegistersGetChildren { parent: id })
			}
			CacheSlot::Modules => self.retrieve_modules(addr, &id),
			CacheSlot::LineInfo(_) | CacheSlot::FuncInfo(_) | CacheSlot::SymFileInfo(_) => self.retrieve_lookup(addr, id),
			_ => Step::Settled,
		}
	}

	/// One module per memory map region backed by a file.
	fn retrieve_modules(&mut self, addr: CacheAddr, id: &EntityId) -> Step {
		if !self.depend(addr, addr.with(CacheSlot::MemoryMap)) {
			return Step::Wait;
		}
		let map = match self.exec(addr.node).and_then(|exec| exec.memory_map.cloned_result()) {
			Some(Ok(map)) => map,
			Some(Err(err)) => {
				self.fail(addr, err);
				return Step::Settled;
			}
			None => return Step::Settled,
		};
		let mut entries = IndexMap::new();
		for (index, region) in map.iter().enumerate() {
			if region.file_name.is_none() {
				continue;
			}
			let key = EntityId::new(format!("{id}.Module-{index}"));
			let module = self.attach(addr.node, CacheSlot::Modules, key.clone(), |config| {
				NodeKind::Module(ModuleNode::new(config, index))
			});
			entries.insert(key, module);
		}
		self.commit_children(addr, None, entries);
		Step::Settled
	}

	fn retrieve_module(&mut self, addr: CacheAddr) -> Step {
		let Some((parent, index)) = self
			.arena
			.get(addr.node)
			.and_then(|node| Some((node.parent?, node.as_module()?.index)))
		else {
			return Step::Settled;
		};
		let map_addr = CacheAddr::new(parent, CacheSlot::MemoryMap);
		if !self.depend(addr, map_addr) {
			return Step::Wait;
		}
		let region = match self.exec(parent).and_then(|exec| exec.memory_map.cloned_result()) {
			Some(Ok(map)) => Ok(map.get(index).cloned()),
			Some(Err(err)) => Err(err),
			None => Err(CacheError::Disposed),
		};
		self.settle(addr, region, |n| Some(&mut n.as_module_mut()?.region))
	}

	fn retrieve_register(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		if !self.has_service(PeerServices::REGISTERS) {
			return match addr.slot {
				CacheSlot::Children => self.settle_empty(addr),
				_ => {
					self.fail(addr, CacheError::ServiceUnavailable("Registers"));
					Step::Settled
				}
			};
		}
		match addr.slot {
			CacheSlot::Context => Step::Issue(Command::RegistersGetContext { id }),
			CacheSlot::Value => Step::Issue(Command::RegistersGet { id }),
			CacheSlot::Children => Step::Issue(Command::RegistersGetChildren { parent: id }),
			_ => Step::Settled,
		}
	}

	fn retrieve_symbol(&mut self, addr: CacheAddr, id: EntityId) -> Step {
		if !self.has_service(PeerServices::SYMBOLS) {
			self.fail(addr, CacheError::ServiceUnavailable("Symbols"));
			return Step::Settled;
		}
		match addr.slot {
			CacheSlot::Context => Step::Issue(Command::SymbolsGetContext { id }),
			CacheSlot::Members => Step::Issue(Command::SymbolsGetChildren { id }),
			_ => Step::Settled,
		}
	}

	/// Symbol node `id` owned by the execution context `exec`, created on first use.
	pub fn symbol_node(&mut self, exec: NodeIdx, id: EntityId) -> Option<NodeIdx> {
		let existing = self.exec(exec)?.symbol(id.as_str());
		if let Some(existing) = existing.filter(|idx| self.arena.contains(*idx)) {
			return Some(existing);
		}
		if let Some(registered) = self.find(id.as_str()) {
			return Some(registered);
		}
		let node = Node::new(id.clone(), Some(exec), NodeKind::Symbol(SymbolNode::new(&self.config)));
		let idx = self.arena.insert(node);
		self.registry.insert(id.clone(), idx);
		self.arena.get_mut(exec)?.as_exec_mut()?.symbols.insert(id, idx);
		Some(idx)
	}
}
