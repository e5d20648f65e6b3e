use remora_cache::LookupCache;
use remora_proto::{CodeArea, ContextState, EntityId, MemoryRegion, RemoteError, RunControlContext, SymFileInfo, SymbolRecord};
use rustc_hash::FxHashMap;

use super::{ChildSet, LIST_POOL_MARGIN, ValueCache};
use crate::{ModelConfig, NodeIdx, Waiter};

/// Source position of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
	pub address: u64,
	/// Smallest code area containing the address.
	pub area: Option<CodeArea>,
	/// Lookup failures are kept with their address instead of failing the cache.
	pub error: Option<RemoteError>,
}

/// Function containing one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
	pub address: u64,
	pub symbol: Option<SymbolRecord>,
	pub error: Option<RemoteError>,
}

/// A process, thread, or other execution context.
pub struct ExecNode {
	/// `None` when the peer has no run-control service.
	pub context: ValueCache<Option<RunControlContext>>,
	/// `None` for contexts without execution state.
	pub state: ValueCache<Option<ContextState>>,
	/// PC while suspended.
	pub address: ValueCache<Option<u64>>,
	pub memory_map: ValueCache<Vec<MemoryRegion>>,
	pub children: ChildSet,
	/// Frames, innermost first.
	pub stack_trace: ChildSet,
	pub registers: ChildSet,
	pub modules: ChildSet,
	pub line_info: LookupCache<u64, LineInfo, Waiter>,
	pub func_info: LookupCache<u64, FuncInfo, Waiter>,
	pub sym_file_info: LookupCache<u64, SymFileInfo, Waiter>,
	pub(crate) symbols: FxHashMap<EntityId, NodeIdx>,
	/// Multiplier on the configured frame limit, raised on demand, reset on suspend.
	pub(crate) limit_factor: u32,
	pub(crate) resume_seq: u64,
	pub(crate) suspend_seq: u64,
	pub(crate) resume_pending: bool,
}

impl ExecNode {
	pub(crate) fn new(config: &ModelConfig) -> Self {
		let keep = config.keep_stale_values;
		let bound = config.lookup_cache_bound;
		Self {
			context: ValueCache::new().with_stale(keep),
			state: ValueCache::new().with_stale(keep),
			address: ValueCache::new().with_stale(keep),
			memory_map: ValueCache::new().with_stale(keep),
			children: ChildSet::new(LIST_POOL_MARGIN).with_stale(keep),
			stack_trace: ChildSet::new(config.stack_pool_margin).with_stale(keep),
			registers: ChildSet::new(LIST_POOL_MARGIN).with_stale(keep),
			modules: ChildSet::new(LIST_POOL_MARGIN).with_stale(keep),
			line_info: LookupCache::new(bound).with_stale(keep),
			func_info: LookupCache::new(bound).with_stale(keep),
			sym_file_info: LookupCache::new(bound).with_stale(keep),
			symbols: FxHashMap::default(),
			limit_factor: 1,
			resume_seq: 0,
			suspend_seq: 0,
			resume_pending: false,
		}
	}

	/// Resumed, but the resume has not been reported yet.
	pub fn resume_pending(&self) -> bool {
		self.resume_pending
	}

	pub fn limit_factor(&self) -> u32 {
		self.limit_factor
	}

	pub fn symbol(&self, id: &str) -> Option<NodeIdx> {
		self.symbols.get(id).copied()
	}

	pub(crate) fn lookups_empty(&self) -> bool {
		self.line_info.is_empty() && self.func_info.is_empty() && self.sym_file_info.is_empty()
	}
}
