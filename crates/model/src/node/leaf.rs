use remora_proto::{MemoryRegion, RegisterRecord, SymbolRecord};

use super::{ChildSet, LIST_POOL_MARGIN, ValueCache};
use crate::ModelConfig;

/// Root of the tree; top-level contexts hang off it.
pub struct LaunchNode {
	pub children: ChildSet,
}

impl LaunchNode {
	pub(crate) fn new(config: &ModelConfig) -> Self {
		Self {
			children: ChildSet::new(LIST_POOL_MARGIN).with_stale(config.keep_stale_values),
		}
	}
}

pub struct RegisterNode {
	pub context: ValueCache<RegisterRecord>,
	pub value: ValueCache<Vec<u8>>,
	/// Sub-registers or group members.
	pub children: ChildSet,
}

impl RegisterNode {
	pub(crate) fn new(config: &ModelConfig) -> Self {
		let keep = config.keep_stale_values;
		Self {
			context: ValueCache::new().with_stale(keep),
			value: ValueCache::new().with_stale(keep),
			children: ChildSet::new(LIST_POOL_MARGIN).with_stale(keep),
		}
	}
}

pub struct SymbolNode {
	pub context: ValueCache<SymbolRecord>,
	/// Member records, for type symbols.
	pub members: ValueCache<Vec<SymbolRecord>>,
}

impl SymbolNode {
	pub(crate) fn new(config: &ModelConfig) -> Self {
		let keep = config.keep_stale_values;
		Self {
			context: ValueCache::new().with_stale(keep),
			members: ValueCache::new().with_stale(keep),
		}
	}
}

/// A loaded module, one per memory map region backed by a file.
pub struct ModuleNode {
	/// Index into the owning context's memory map.
	pub index: usize,
	pub region: ValueCache<Option<MemoryRegion>>,
}

impl ModuleNode {
	pub(crate) fn new(config: &ModelConfig, index: usize) -> Self {
		Self {
			index,
			region: ValueCache::new().with_stale(config.keep_stale_values),
		}
	}
}
