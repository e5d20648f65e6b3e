//! Records returned by the peer's services.

use serde::{Deserialize, Serialize};

use crate::{EntityId, RemoteError};

/// Run-control properties of a process, thread, or other execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunControlContext {
	pub id: EntityId,
	/// `None` for top-level contexts, which belong to the launch root.
	#[serde(default)]
	pub parent_id: Option<EntityId>,
	#[serde(default)]
	pub process_id: Option<EntityId>,
	#[serde(default)]
	pub name: Option<String>,
	/// Whether the context has an execution state (a thread does, a process usually does not).
	#[serde(default)]
	pub has_state: bool,
	#[serde(default)]
	pub is_container: bool,
}

/// Execution state of a context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextState {
	pub suspended: bool,
	#[serde(default)]
	pub pc: Option<u64>,
	#[serde(default)]
	pub reason: Option<String>,
	/// Suspended in the middle of an expression-evaluator function call.
	#[serde(default)]
	pub func_call: bool,
}

impl ContextState {
	pub fn running() -> Self {
		Self::default()
	}

	pub fn suspended(pc: Option<u64>, reason: Option<String>, func_call: bool) -> Self {
		Self {
			suspended: true,
			pc,
			reason,
			func_call,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrameRecord {
	pub id: EntityId,
	/// The execution context the frame belongs to.
	pub context_id: EntityId,
	#[serde(default)]
	pub instruction_address: Option<u64>,
	#[serde(default)]
	pub frame_address: Option<u64>,
	#[serde(default)]
	pub func_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRecord {
	pub id: EntityId,
	/// An execution context or a parent register group.
	pub parent_id: EntityId,
	pub name: String,
	#[serde(default)]
	pub size: u32,
	#[serde(default)]
	pub readable: bool,
	#[serde(default)]
	pub writeable: bool,
	#[serde(default)]
	pub big_endian: bool,
}

/// One entry of a context's memory map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
	pub address: u64,
	pub size: u64,
	#[serde(default)]
	pub file_name: Option<String>,
	#[serde(default)]
	pub offset: u64,
	#[serde(default)]
	pub section: Option<String>,
}

impl MemoryRegion {
	pub fn contains(&self, address: u64) -> bool {
		address >= self.address && address - self.address < self.size
	}
}

/// A remote expression evaluator object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionRecord {
	pub id: EntityId,
	/// Frame or execution context the expression is evaluated in.
	pub parent_id: EntityId,
	pub expression: String,
	#[serde(default)]
	pub symbol_id: Option<EntityId>,
	#[serde(default)]
	pub type_id: Option<EntityId>,
	#[serde(default)]
	pub size: u64,
	#[serde(default)]
	pub can_assign: bool,
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExprValue {
	#[serde(default)]
	pub bytes: Vec<u8>,
	#[serde(default)]
	pub type_id: Option<EntityId>,
	#[serde(default)]
	pub type_class: TypeClass,
	#[serde(default)]
	pub big_endian: bool,
	/// Set when the value lives in a register rather than memory.
	#[serde(default)]
	pub register_id: Option<EntityId>,
}

impl ExprValue {
	/// Interprets the value bytes as an unsigned integer, honouring endianness.
	///
	/// Returns `None` for values wider than 8 bytes or with no bytes at all.
	pub fn as_u64(&self) -> Option<u64> {
		if self.bytes.is_empty() || self.bytes.len() > 8 {
			return None;
		}
		let mut buf = [0u8; 8];
		if self.big_endian {
			buf[8 - self.bytes.len()..].copy_from_slice(&self.bytes);
			Some(u64::from_be_bytes(buf))
		} else {
			buf[..self.bytes.len()].copy_from_slice(&self.bytes);
			Some(u64::from_le_bytes(buf))
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
	#[default]
	Unknown,
	Value,
	Reference,
	Function,
	Type,
	Comp,
	Block,
	Namespace,
	Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeClass {
	#[default]
	Unknown,
	Cardinal,
	Integer,
	Real,
	Pointer,
	Array,
	Composite,
	Enumeration,
	Function,
	Member,
	Complex,
}

/// When a symbol's properties may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
	/// Only when the memory map changes.
	#[default]
	MemoryMap,
	/// Whenever the owning context's execution state changes.
	ExecState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
	pub id: EntityId,
	#[serde(default)]
	pub owner_id: Option<EntityId>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub symbol_class: SymbolClass,
	#[serde(default)]
	pub type_class: TypeClass,
	#[serde(default)]
	pub type_id: Option<EntityId>,
	#[serde(default)]
	pub base_type_id: Option<EntityId>,
	/// Element count for arrays.
	#[serde(default)]
	pub length: u64,
	#[serde(default)]
	pub size: u64,
	#[serde(default)]
	pub lower_bound: i64,
	#[serde(default)]
	pub offset: u64,
	#[serde(default)]
	pub artificial: bool,
	#[serde(default)]
	pub inheritance: bool,
	#[serde(default)]
	pub update_policy: UpdatePolicy,
}

/// Source range mapped to an address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArea {
	#[serde(default)]
	pub file: Option<String>,
	pub start_line: u32,
	#[serde(default)]
	pub start_column: u32,
	pub end_line: u32,
	#[serde(default)]
	pub end_column: u32,
	pub start_address: u64,
	pub end_address: u64,
	#[serde(default)]
	pub is_statement: bool,
}

impl CodeArea {
	pub fn contains(&self, address: u64) -> bool {
		address >= self.start_address && address < self.end_address
	}

	pub fn span(&self) -> u64 {
		self.end_address.saturating_sub(self.start_address)
	}
}

/// Symbol file information for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymFileInfo {
	#[serde(default)]
	pub file_name: Option<String>,
	#[serde(default)]
	pub error: Option<RemoteError>,
}
