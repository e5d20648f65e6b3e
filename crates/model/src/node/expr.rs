use remora_proto::{EntityId, ExprValue, ExpressionRecord, SymbolRecord};

use super::{ChildSet, ValueCache};
use crate::{ModelConfig, NodeIdx};

/// Where an expression node comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprOrigin {
	/// A local variable the peer listed for a frame.
	Local { remote: EntityId },
	/// A session watch expression, instantiated per frame.
	Watch { script: String },
	/// A member of the composite value of `base`, through a pointer when `deref` is set.
	Field { base: NodeIdx, member: SymbolRecord, deref: bool },
	/// An element of the array value of `base`.
	Element { base: NodeIdx, index: u64 },
	/// The target of the pointer value of `base`.
	Deref { base: NodeIdx },
}

impl ExprOrigin {
	/// The expression this one is derived from.
	pub fn base(&self) -> Option<NodeIdx> {
		match self {
			Self::Field { base, .. } | Self::Element { base, .. } | Self::Deref { base } => Some(*base),
			Self::Local { .. } | Self::Watch { .. } => None,
		}
	}
}

pub struct ExprNode {
	pub origin: ExprOrigin,
	/// Remote evaluator record.
	pub context: ValueCache<ExpressionRecord>,
	pub value: ValueCache<ExprValue>,
	/// Type of the value. `None` without symbol information.
	pub type_info: ValueCache<Option<SymbolRecord>>,
	/// Pointed-to or element type.
	pub base_type: ValueCache<Option<SymbolRecord>>,
	pub children: ChildSet,
	/// Remote evaluator created on our behalf, disposed with the node.
	pub(crate) owns_remote: Option<EntityId>,
}

impl ExprNode {
	pub(crate) fn new(config: &ModelConfig, origin: ExprOrigin) -> Self {
		let keep = config.keep_stale_values;
		Self {
			origin,
			context: ValueCache::new().with_stale(keep),
			value: ValueCache::new().with_stale(keep),
			type_info: ValueCache::new().with_stale(keep),
			base_type: ValueCache::new().with_stale(keep),
			children: ChildSet::new(config.expression_pool_margin).with_stale(keep),
			owns_remote: None,
		}
	}
}

/// Synthetic node grouping a sub-range of a large array.
pub struct PartitionNode {
	/// Depth below the array expression, starting at 1.
	pub level: u32,
	pub offset: u64,
	pub size: u64,
	/// The array expression all elements index into.
	pub array: NodeIdx,
	pub children: ChildSet,
}

impl PartitionNode {
	pub(crate) fn new(config: &ModelConfig, level: u32, offset: u64, size: u64, array: NodeIdx) -> Self {
		Self {
			level,
			offset,
			size,
			array,
			children: ChildSet::new(config.expression_pool_margin).with_stale(config.keep_stale_values),
		}
	}
}
