use serde::{Deserialize, Serialize};

use crate::{
	CodeArea, ContextState, EntityId, ExprValue, ExpressionRecord, MemoryRegion, RegisterRecord, RunControlContext, StackFrameRecord, SymFileInfo,
	SymbolRecord,
};

/// What a remote expression evaluator is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprSource {
	/// Free-form expression text.
	Script(String),
	/// An existing peer expression, re-created so a cast can be applied to it.
	Local(EntityId),
	/// Member `field` of the composite value of `base`, through a pointer when `deref` is set.
	Field { base: EntityId, field: EntityId, deref: bool },
	/// Element `index` of the array value of `base`.
	Index { base: EntityId, index: u64 },
	/// Target of the pointer value of `base`.
	Deref { base: EntityId },
}

/// A request to the peer. Every command yields exactly one completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
	RunControlGetChildren { parent: Option<EntityId> },
	RunControlGetContext { id: EntityId },
	RunControlGetState { id: EntityId },
	/// Complete frame list, outermost frame first.
	StackTraceGetChildren { context: EntityId },
	/// Frames `start..=end` counted from the innermost frame, innermost first.
	StackTraceGetChildrenRange { context: EntityId, start: u32, end: u32 },
	StackTraceGetContext { id: EntityId },
	RegistersGetChildren { parent: EntityId },
	RegistersGetContext { id: EntityId },
	RegistersGet { id: EntityId },
	MemoryMapGet { context: EntityId },
	MemoryRead { context: EntityId, address: u64, size: u64 },
	ExpressionsCreate { context: EntityId, source: ExprSource, cast: Option<String> },
	ExpressionsGetContext { id: EntityId },
	/// Local variables of a frame.
	ExpressionsGetChildren { frame: EntityId },
	ExpressionsEvaluate { id: EntityId },
	ExpressionsDispose { id: EntityId },
	SymbolsGetContext { id: EntityId },
	/// Member records of a type symbol.
	SymbolsGetChildren { id: EntityId },
	SymbolsFindByAddr { context: EntityId, address: u64 },
	SymbolsGetSymFileInfo { context: EntityId, address: u64 },
	LineNumbersMapToSource { context: EntityId, start: u64, end: u64 },
}

impl Command {
	/// Stable name used in logs and unsupported-command errors.
	pub fn name(&self) -> &'static str {
		match self {
			Self::RunControlGetChildren { .. } => "RunControl.getChildren",
			Self::RunControlGetContext { .. } => "RunControl.getContext",
			Self::RunControlGetState { .. } => "RunControl.getState",
			Self::StackTraceGetChildren { .. } => "StackTrace.getChildren",
			Self::StackTraceGetChildrenRange { .. } => "StackTrace.getChildrenRange",
			Self::StackTraceGetContext { .. } => "StackTrace.getContext",
			Self::RegistersGetChildren { .. } => "Registers.getChildren",
			Self::RegistersGetContext { .. } => "Registers.getContext",
			Self::RegistersGet { .. } => "Registers.get",
			Self::MemoryMapGet { .. } => "MemoryMap.get",
			Self::MemoryRead { .. } => "Memory.get",
			Self::ExpressionsCreate { .. } => "Expressions.create",
			Self::ExpressionsGetContext { .. } => "Expressions.getContext",
			Self::ExpressionsGetChildren { .. } => "Expressions.getChildren",
			Self::ExpressionsEvaluate { .. } => "Expressions.evaluate",
			Self::ExpressionsDispose { .. } => "Expressions.dispose",
			Self::SymbolsGetContext { .. } => "Symbols.getContext",
			Self::SymbolsGetChildren { .. } => "Symbols.getChildren",
			Self::SymbolsFindByAddr { .. } => "Symbols.findByAddr",
			Self::SymbolsGetSymFileInfo { .. } => "Symbols.getSymFileInfo",
			Self::LineNumbersMapToSource { .. } => "LineNumbers.mapToSource",
		}
	}
}

/// Successful completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "data", rename_all = "snake_case")]
pub enum Reply {
	Ids(Vec<EntityId>),
	RunControlContext(RunControlContext),
	State(ContextState),
	Frame(StackFrameRecord),
	Register(RegisterRecord),
	RegisterValue(Vec<u8>),
	MemoryMap(Vec<MemoryRegion>),
	Bytes(Vec<u8>),
	Expression(ExpressionRecord),
	Value(ExprValue),
	Symbol(SymbolRecord),
	Symbols(Vec<SymbolRecord>),
	SymFile(SymFileInfo),
	CodeAreas(Vec<CodeArea>),
	Done,
}

impl Reply {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Ids(_) => "ids",
			Self::RunControlContext(_) => "run_control_context",
			Self::State(_) => "state",
			Self::Frame(_) => "frame",
			Self::Register(_) => "register",
			Self::RegisterValue(_) => "register_value",
			Self::MemoryMap(_) => "memory_map",
			Self::Bytes(_) => "bytes",
			Self::Expression(_) => "expression",
			Self::Value(_) => "value",
			Self::Symbol(_) => "symbol",
			Self::Symbols(_) => "symbols",
			Self::SymFile(_) => "sym_file",
			Self::CodeAreas(_) => "code_areas",
			Self::Done => "done",
		}
	}
}
