use serde::{Deserialize, Serialize};

bitflags::bitflags! {
	/// Services advertised by the peer when the channel opens.
	///
	/// A missing service is not an error: caches backed by it settle
	/// immediately with an empty or emulated value.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
	pub struct PeerServices: u32 {
		const RUN_CONTROL = 1 << 0;
		const STACK_TRACE = 1 << 1;
		const REGISTERS = 1 << 2;
		const MEMORY = 1 << 3;
		const MEMORY_MAP = 1 << 4;
		const EXPRESSIONS = 1 << 5;
		const SYMBOLS = 1 << 6;
		const LINE_NUMBERS = 1 << 7;
	}
}
