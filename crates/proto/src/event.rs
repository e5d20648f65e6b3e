use serde::{Deserialize, Serialize};

use crate::{EntityId, RunControlContext};

/// Unsolicited notification from the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PeerEvent {
	ContextAdded { contexts: Vec<RunControlContext> },
	ContextChanged { contexts: Vec<RunControlContext> },
	ContextRemoved { ids: Vec<EntityId> },
	ContextSuspended {
		id: EntityId,
		#[serde(default)]
		pc: Option<u64>,
		#[serde(default)]
		reason: Option<String>,
		#[serde(default)]
		func_call: bool,
	},
	ContextResumed { id: EntityId },
	/// A whole group stopped; `id` triggered it and carries the PC.
	ContainerSuspended {
		id: EntityId,
		#[serde(default)]
		pc: Option<u64>,
		#[serde(default)]
		reason: Option<String>,
		#[serde(default)]
		func_call: bool,
		suspended: Vec<EntityId>,
	},
	ContainerResumed { ids: Vec<EntityId> },
	/// State changed without a suspend/resume transition (e.g. exception info updated).
	ContextStateChanged { id: EntityId },
	/// The register list of a context changed.
	RegistersChanged { context: EntityId },
	RegisterValueChanged { id: EntityId },
	MemoryChanged {
		context: EntityId,
		#[serde(default)]
		ranges: Vec<(u64, u64)>,
	},
	MemoryMapChanged { context: EntityId },
}

impl PeerEvent {
	pub fn name(&self) -> &'static str {
		match self {
			Self::ContextAdded { .. } => "context_added",
			Self::ContextChanged { .. } => "context_changed",
			Self::ContextRemoved { .. } => "context_removed",
			Self::ContextSuspended { .. } => "context_suspended",
			Self::ContextResumed { .. } => "context_resumed",
			Self::ContainerSuspended { .. } => "container_suspended",
			Self::ContainerResumed { .. } => "container_resumed",
			Self::ContextStateChanged { .. } => "context_state_changed",
			Self::RegistersChanged { .. } => "registers_changed",
			Self::RegisterValueChanged { .. } => "register_value_changed",
			Self::MemoryChanged { .. } => "memory_changed",
			Self::MemoryMapChanged { .. } => "memory_map_changed",
		}
	}
}
