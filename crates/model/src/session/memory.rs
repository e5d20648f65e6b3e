//! Memory blocks opened by the front end.
//!
//! A block refers to its context by id only. Memory events on the context reset its bytes;
//! disposing the context detaches the block, which from then on reads as an
//! `InvalidContext` error.

use remora_cache::CacheError;
use remora_proto::{Command, CommandToken, EntityId, PeerServices, RemoteError, Reply};
use rustc_hash::FxHashSet;

use super::complete::decode;
use super::{Session, Target};
use crate::{ValueCache, Waiter};

/// Handle of an open memory block. Handles are reused after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

pub struct MemoryBlock {
	pub context: EntityId,
	pub address: u64,
	pub size: u64,
	pub bytes: ValueCache<Vec<u8>>,
	detached: bool,
}

impl MemoryBlock {
	/// The context this block reads from was disposed.
	pub fn is_detached(&self) -> bool {
		self.detached
	}
}

impl Session {
	pub fn open_memory_block(&mut self, context: EntityId, address: u64, size: u64) -> BlockId {
		let block = MemoryBlock {
			context,
			address,
			size,
			bytes: ValueCache::new().with_stale(self.config.keep_stale_values),
			detached: false,
		};
		BlockId(self.blocks.insert(block))
	}

	pub fn memory_block(&self, block: BlockId) -> Option<&MemoryBlock> {
		self.blocks.get(block.0)
	}

	/// Reads the bytes of `block`. Same contract as [`Self::validate`].
	pub fn read_block(&mut self, block: BlockId, waiter: Option<Waiter>) -> bool {
		let Some(entry) = self.blocks.get_mut(block.0) else { return true };
		if entry.bytes.is_valid() {
			return true;
		}
		if entry.bytes.is_pending() {
			if let Some(waiter) = waiter {
				entry.bytes.add_waiter(waiter);
			}
			return false;
		}
		let error = if entry.detached {
			Some(CacheError::InvalidContext(entry.context.clone()))
		} else if !self.services.contains(PeerServices::MEMORY) {
			Some(CacheError::ServiceUnavailable("Memory"))
		} else {
			None
		};
		if let Some(error) = error {
			let transition = entry.bytes.set(Err(error));
			self.apply(transition);
			return true;
		}

		let command = Command::MemoryRead {
			context: entry.context.clone(),
			address: entry.address,
			size: entry.size,
		};
		match self.issue(Target::Block(block), command) {
			Ok(token) => {
				let Some(entry) = self.blocks.get_mut(block.0) else { return true };
				entry.bytes.mark_issued(token);
				if let Some(waiter) = waiter {
					entry.bytes.add_waiter(waiter);
				}
				false
			}
			Err(err) => {
				if let Some(entry) = self.blocks.get_mut(block.0) {
					let transition = entry.bytes.set(Err(err.into()));
					self.apply(transition);
				}
				true
			}
		}
	}

	pub fn close_memory_block(&mut self, block: BlockId) {
		if !self.blocks.contains(block.0) {
			return;
		}
		let mut entry = self.blocks.remove(block.0);
		let transition = entry.bytes.dispose();
		self.apply(transition);
	}

	pub(super) fn complete_block(&mut self, block: BlockId, token: CommandToken, command: &Command, result: Result<Reply, RemoteError>) {
		let bytes = decode(command, result, |reply| match reply {
			Reply::Bytes(bytes) => Some(bytes),
			_ => None,
		});
		let Some(entry) = self.blocks.get_mut(block.0) else { return };
		if let Some(waiters) = entry.bytes.complete(token, bytes) {
			self.ready.extend(waiters);
		}
	}

	/// Resets the bytes of every attached block reading from one of `contexts`.
	pub(super) fn reset_blocks(&mut self, contexts: &FxHashSet<EntityId>) {
		let mut transitions = Vec::new();
		for (_, entry) in self.blocks.iter_mut() {
			if !entry.detached && contexts.contains(&entry.context) {
				transitions.push(entry.bytes.reset());
			}
		}
		for transition in transitions {
			self.apply(transition);
		}
	}

	pub(super) fn detach_blocks(&mut self, context: &EntityId) {
		let mut transitions = Vec::new();
		for (_, entry) in self.blocks.iter_mut() {
			if entry.detached || entry.context != *context {
				continue;
			}
			entry.detached = true;
			tracing::debug!(%context, address = entry.address, "memory.block_detached");
			transitions.push(entry.bytes.set(Err(CacheError::InvalidContext(context.clone()))));
		}
		for transition in transitions {
			self.apply(transition);
		}
	}

	pub(super) fn close_all_blocks(&mut self) {
		let mut transitions = Vec::new();
		for mut entry in self.blocks.drain() {
			transitions.push(entry.bytes.dispose());
		}
		for transition in transitions {
			self.apply(transition);
		}
	}
}
