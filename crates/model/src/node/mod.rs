//! Entity kinds and the caches each one owns.

mod exec;
mod expr;
mod frame;
mod leaf;

pub use exec::{ExecNode, FuncInfo, LineInfo};
pub use expr::{ExprNode, ExprOrigin, PartitionNode};
pub use frame::FrameNode;
pub use leaf::{LaunchNode, ModuleNode, RegisterNode, SymbolNode};
use remora_cache::{AsyncValueCache, CacheControl, KeyedChildSet};
use remora_proto::EntityId;

use crate::{NodeIdx, Waiter};

pub type ValueCache<T> = AsyncValueCache<T, Waiter>;
pub type ChildSet = KeyedChildSet<EntityId, NodeIdx, Waiter>;

/// Retired pool size for lists whose margin is not configurable.
pub(crate) const LIST_POOL_MARGIN: usize = 64;

/// Which cache of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
	/// The node's own remote record.
	Context,
	State,
	Address,
	MemoryMap,
	Children,
	StackTrace,
	Registers,
	Modules,
	Locals,
	Watches,
	Value,
	Type,
	BaseType,
	Region,
	Members,
	LineInfo(u64),
	FuncInfo(u64),
	SymFileInfo(u64),
}

impl CacheSlot {
	pub fn is_lookup(self) -> bool {
		matches!(self, Self::LineInfo(_) | Self::FuncInfo(_) | Self::SymFileInfo(_))
	}
}

/// Address of one cache in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheAddr {
	pub node: NodeIdx,
	pub slot: CacheSlot,
}

impl CacheAddr {
	pub fn new(node: NodeIdx, slot: CacheSlot) -> Self {
		Self { node, slot }
	}

	/// Another cache of the same node.
	pub fn with(self, slot: CacheSlot) -> Self {
		Self { node: self.node, slot }
	}
}

/// One debug entity.
pub struct Node {
	pub id: EntityId,
	/// `None` only for the launch root.
	pub parent: Option<NodeIdx>,
	pub kind: NodeKind,
}

pub enum NodeKind {
	Launch(LaunchNode),
	Exec(ExecNode),
	Frame(FrameNode),
	Expr(ExprNode),
	Register(RegisterNode),
	Symbol(SymbolNode),
	Module(ModuleNode),
	Partition(PartitionNode),
}

/// Payload-free discriminant of [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
	Launch,
	Exec,
	Frame,
	Expr,
	Register,
	Symbol,
	Module,
	Partition,
}

impl NodeKind {
	pub fn tag(&self) -> NodeTag {
		match self {
			Self::Launch(_) => NodeTag::Launch,
			Self::Exec(_) => NodeTag::Exec,
			Self::Frame(_) => NodeTag::Frame,
			Self::Expr(_) => NodeTag::Expr,
			Self::Register(_) => NodeTag::Register,
			Self::Symbol(_) => NodeTag::Symbol,
			Self::Module(_) => NodeTag::Module,
			Self::Partition(_) => NodeTag::Partition,
		}
	}

	pub fn name(&self) -> &'static str {
		match self.tag() {
			NodeTag::Launch => "launch",
			NodeTag::Exec => "exec",
			NodeTag::Frame => "frame",
			NodeTag::Expr => "expr",
			NodeTag::Register => "register",
			NodeTag::Symbol => "symbol",
			NodeTag::Module => "module",
			NodeTag::Partition => "partition",
		}
	}
}

macro_rules! kind_accessors {
	($($variant:ident => $get:ident, $get_mut:ident, $ty:ty;)*) => {
		impl Node {
			$(
				pub fn $get(&self) -> Option<&$ty> {
					match &self.kind {
						NodeKind::$variant(inner) => Some(inner),
						_ => None,
					}
				}

				pub fn $get_mut(&mut self) -> Option<&mut $ty> {
					match &mut self.kind {
						NodeKind::$variant(inner) => Some(inner),
						_ => None,
					}
				}
			)*
		}
	};
}

kind_accessors! {
	Launch => as_launch, as_launch_mut, LaunchNode;
	Exec => as_exec, as_exec_mut, ExecNode;
	Frame => as_frame, as_frame_mut, FrameNode;
	Expr => as_expr, as_expr_mut, ExprNode;
	Register => as_register, as_register_mut, RegisterNode;
	Symbol => as_symbol, as_symbol_mut, SymbolNode;
	Module => as_module, as_module_mut, ModuleNode;
	Partition => as_partition, as_partition_mut, PartitionNode;
}

impl Node {
	pub fn new(id: EntityId, parent: Option<NodeIdx>, kind: NodeKind) -> Self {
		Self { id, parent, kind }
	}

	/// Type-erased access to the cache in `slot`. Lookup slots resolve only once created.
	pub fn control(&mut self, slot: CacheSlot) -> Option<&mut dyn CacheControl<Waiter>> {
		use CacheSlot as S;
		use NodeKind as K;
		let control: &mut dyn CacheControl<Waiter> = match (&mut self.kind, slot) {
			(K::Launch(n), S::Children) => &mut n.children,
			(K::Exec(n), S::Context) => &mut n.context,
			(K::Exec(n), S::State) => &mut n.state,
			(K::Exec(n), S::Address) => &mut n.address,
			(K::Exec(n), S::MemoryMap) => &mut n.memory_map,
			(K::Exec(n), S::Children) => &mut n.children,
			(K::Exec(n), S::StackTrace) => &mut n.stack_trace,
			(K::Exec(n), S::Registers) => &mut n.registers,
			(K::Exec(n), S::Modules) => &mut n.modules,
			(K::Exec(n), S::LineInfo(address)) => n.line_info.peek_mut(&address)?,
			(K::Exec(n), S::FuncInfo(address)) => n.func_info.peek_mut(&address)?,
			(K::Exec(n), S::SymFileInfo(address)) => n.sym_file_info.peek_mut(&address)?,
			(K::Frame(n), S::Context) => &mut n.context,
			(K::Frame(n), S::Address) => &mut n.address,
			(K::Frame(n), S::Locals) => &mut n.locals,
			(K::Frame(n), S::Watches) => &mut n.watches,
			(K::Expr(n), S::Context) => &mut n.context,
			(K::Expr(n), S::Value) => &mut n.value,
			(K::Expr(n), S::Type) => &mut n.type_info,
			(K::Expr(n), S::BaseType) => &mut n.base_type,
			(K::Expr(n), S::Children) => &mut n.children,
			(K::Register(n), S::Context) => &mut n.context,
			(K::Register(n), S::Value) => &mut n.value,
			(K::Register(n), S::Children) => &mut n.children,
			(K::Symbol(n), S::Context) => &mut n.context,
			(K::Symbol(n), S::Members) => &mut n.members,
			(K::Module(n), S::Region) => &mut n.region,
			(K::Partition(n), S::Children) => &mut n.children,
			_ => return None,
		};
		Some(control)
	}

	/// Read-only counterpart of [`Self::control`].
	pub fn inspect(&self, slot: CacheSlot) -> Option<&dyn CacheControl<Waiter>> {
		use CacheSlot as S;
		use NodeKind as K;
		if let Some(set) = self.child_set(slot) {
			return Some(set as &dyn CacheControl<Waiter>);
		}
		let control: &dyn CacheControl<Waiter> = match (&self.kind, slot) {
			(K::Exec(n), S::Context) => &n.context,
			(K::Exec(n), S::State) => &n.state,
			(K::Exec(n), S::Address) => &n.address,
			(K::Exec(n), S::MemoryMap) => &n.memory_map,
			(K::Exec(n), S::LineInfo(address)) => n.line_info.peek(&address)?,
			(K::Exec(n), S::FuncInfo(address)) => n.func_info.peek(&address)?,
			(K::Exec(n), S::SymFileInfo(address)) => n.sym_file_info.peek(&address)?,
			(K::Frame(n), S::Context) => &n.context,
			(K::Frame(n), S::Address) => &n.address,
			(K::Expr(n), S::Context) => &n.context,
			(K::Expr(n), S::Value) => &n.value,
			(K::Expr(n), S::Type) => &n.type_info,
			(K::Expr(n), S::BaseType) => &n.base_type,
			(K::Register(n), S::Context) => &n.context,
			(K::Register(n), S::Value) => &n.value,
			(K::Symbol(n), S::Context) => &n.context,
			(K::Symbol(n), S::Members) => &n.members,
			(K::Module(n), S::Region) => &n.region,
			_ => return None,
		};
		Some(control)
	}

	pub fn child_set(&self, slot: CacheSlot) -> Option<&ChildSet> {
		use CacheSlot as S;
		use NodeKind as K;
		match (&self.kind, slot) {
			(K::Launch(n), S::Children) => Some(&n.children),
			(K::Exec(n), S::Children) => Some(&n.children),
			(K::Exec(n), S::StackTrace) => Some(&n.stack_trace),
			(K::Exec(n), S::Registers) => Some(&n.registers),
			(K::Exec(n), S::Modules) => Some(&n.modules),
			(K::Frame(n), S::Locals) => Some(&n.locals),
			(K::Frame(n), S::Watches) => Some(&n.watches),
			(K::Expr(n), S::Children) => Some(&n.children),
			(K::Register(n), S::Children) => Some(&n.children),
			(K::Partition(n), S::Children) => Some(&n.children),
			_ => None,
		}
	}

	pub fn child_set_mut(&mut self, slot: CacheSlot) -> Option<&mut ChildSet> {
		use CacheSlot as S;
		use NodeKind as K;
		match (&mut self.kind, slot) {
			(K::Launch(n), S::Children) => Some(&mut n.children),
			(K::Exec(n), S::Children) => Some(&mut n.children),
			(K::Exec(n), S::StackTrace) => Some(&mut n.stack_trace),
			(K::Exec(n), S::Registers) => Some(&mut n.registers),
			(K::Exec(n), S::Modules) => Some(&mut n.modules),
			(K::Frame(n), S::Locals) => Some(&mut n.locals),
			(K::Frame(n), S::Watches) => Some(&mut n.watches),
			(K::Expr(n), S::Children) => Some(&mut n.children),
			(K::Register(n), S::Children) => Some(&mut n.children),
			(K::Partition(n), S::Children) => Some(&mut n.children),
			_ => None,
		}
	}

	/// Every non-lookup slot the node owns.
	pub fn slots(&self) -> &'static [CacheSlot] {
		use CacheSlot as S;
		match self.kind {
			NodeKind::Launch(_) => &[S::Children],
			NodeKind::Exec(_) => &[
				S::Context,
				S::State,
				S::Address,
				S::MemoryMap,
				S::Children,
				S::StackTrace,
				S::Registers,
				S::Modules,
			],
			NodeKind::Frame(_) => &[S::Context, S::Address, S::Locals, S::Watches],
			NodeKind::Expr(_) => &[S::Context, S::Value, S::Type, S::BaseType, S::Children],
			NodeKind::Register(_) => &[S::Context, S::Value, S::Children],
			NodeKind::Symbol(_) => &[S::Context, S::Members],
			NodeKind::Module(_) => &[S::Region],
			NodeKind::Partition(_) => &[S::Children],
		}
	}

	/// Nodes this node owns, current and retired.
	pub fn owned_children(&self) -> Vec<NodeIdx> {
		let mut owned: Vec<NodeIdx> = self
			.slots()
			.iter()
			.filter_map(|slot| self.child_set(*slot))
			.flat_map(|set| set.entities().copied())
			.collect();
		if let NodeKind::Exec(exec) = &self.kind {
			owned.extend(exec.symbols.values().copied());
		}
		owned
	}
}
