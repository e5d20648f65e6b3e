use remora_proto::StackFrameRecord;

use super::{ChildSet, LIST_POOL_MARGIN, ValueCache};
use crate::ModelConfig;

/// One stack frame of a suspended context.
pub struct FrameNode {
	/// Position from the innermost frame, `-1` once the frame dropped out of the stack.
	pub frame_no: i32,
	/// Stand-in frame for a suspended context that reported no frames.
	pub emulated: bool,
	/// `None` for emulated frames.
	pub context: ValueCache<Option<StackFrameRecord>>,
	pub address: ValueCache<Option<u64>>,
	pub locals: ChildSet,
	/// One expression per session watch.
	pub watches: ChildSet,
}

impl FrameNode {
	pub(crate) fn new(config: &ModelConfig, frame_no: i32, emulated: bool) -> Self {
		let keep = config.keep_stale_values;
		Self {
			frame_no,
			emulated,
			context: ValueCache::new().with_stale(keep),
			address: ValueCache::new().with_stale(keep),
			locals: ChildSet::new(config.expression_pool_margin).with_stale(keep),
			watches: ChildSet::new(LIST_POOL_MARGIN).with_stale(keep),
		}
	}
}
