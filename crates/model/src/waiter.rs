use std::fmt;

use remora_proto::EntityId;

use crate::{CacheAddr, Session};

/// Continuation registered on an unsettled cache.
///
/// Posted to the session's ready queue when the cache settles or resets; drained by
/// [`Session::run_pending`].
pub enum Waiter {
	/// Re-run the parked retrieval of this cache.
	Cache(CacheAddr),
	/// Continue resolving this id.
	Resolve(EntityId),
	/// Arbitrary front-end continuation.
	Callback(Box<dyn FnOnce(&mut Session) + Send>),
}

impl Waiter {
	pub fn callback(f: impl FnOnce(&mut Session) + Send + 'static) -> Self {
		Self::Callback(Box::new(f))
	}
}

/// Callbacks never compare equal, so each registration is kept.
impl PartialEq for Waiter {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Cache(a), Self::Cache(b)) => a == b,
			(Self::Resolve(a), Self::Resolve(b)) => a == b,
			_ => false,
		}
	}
}

impl fmt::Debug for Waiter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Cache(addr) => f.debug_tuple("Cache").field(addr).finish(),
			Self::Resolve(id) => f.debug_tuple("Resolve").field(id).finish(),
			Self::Callback(_) => f.write_str("Callback(..)"),
		}
	}
}
