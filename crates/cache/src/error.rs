use remora_proto::{EntityId, RemoteError};
use thiserror::Error;

/// Error stored in a settled cache.
///
/// Cloned into dependents so a failure reads the same at every level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
	#[error(transparent)]
	Remote(#[from] RemoteError),
	#[error("cache disposed")]
	Disposed,
	#[error("unexpected reply `{reply}` for {command}")]
	UnexpectedReply { command: &'static str, reply: &'static str },
	#[error("service unavailable: {0}")]
	ServiceUnavailable(&'static str),
	#[error("invalid context: {0}")]
	InvalidContext(EntityId),
}
