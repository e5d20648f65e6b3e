use slab::Slab;

use crate::node::Node;

/// Index of a node in the session arena.
///
/// Slots are reused after disposal; the generation tells a reused slot apart from the
/// node that lived there before, so a stale index resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx {
	slot: usize,
	generation: u32,
}

impl std::fmt::Display for NodeIdx {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "node#{}v{}", self.slot, self.generation)
	}
}

struct Entry {
	generation: u32,
	node: Node,
}

#[derive(Default)]
pub(crate) struct Arena {
	entries: Slab<Entry>,
	next_generation: u32,
}

impl Arena {
	pub(crate) fn insert(&mut self, node: Node) -> NodeIdx {
		self.next_generation = self.next_generation.wrapping_add(1);
		let generation = self.next_generation;
		let slot = self.entries.insert(Entry { generation, node });
		NodeIdx { slot, generation }
	}

	pub(crate) fn get(&self, idx: NodeIdx) -> Option<&Node> {
		self.entries.get(idx.slot).filter(|entry| entry.generation == idx.generation).map(|entry| &entry.node)
	}

	pub(crate) fn get_mut(&mut self, idx: NodeIdx) -> Option<&mut Node> {
		self.entries
			.get_mut(idx.slot)
			.filter(|entry| entry.generation == idx.generation)
			.map(|entry| &mut entry.node)
	}

	pub(crate) fn contains(&self, idx: NodeIdx) -> bool {
		self.get(idx).is_some()
	}

	pub(crate) fn remove(&mut self, idx: NodeIdx) -> Option<Node> {
		if !self.contains(idx) {
			return None;
		}
		Some(self.entries.remove(idx.slot).node)
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	pub(crate) fn indices(&self) -> Vec<NodeIdx> {
		self.entries
			.iter()
			.map(|(slot, entry)| NodeIdx {
				slot,
				generation: entry.generation,
			})
			.collect()
	}
}
