use remora_proto::EntityId;

bitflags::bitflags! {
	/// What changed about a node since the front end last looked.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct DeltaFlags: u8 {
		const ADDED = 1 << 0;
		const REMOVED = 1 << 1;
		/// Execution state (running / suspended) changed.
		const STATE = 1 << 2;
		/// Children or values changed.
		const CONTENT = 1 << 3;
	}
}

/// One coalesced change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDelta {
	pub id: EntityId,
	pub flags: DeltaFlags,
}
