use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;

/// Failure of one remote command.
///
/// Cloneable so a cache can store it and dependents can copy it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
	/// The peer does not implement this command (or this form of it).
	#[error("command not supported by peer: {command}")]
	UnsupportedCommand { command: String },
	/// The named entity does not exist on the peer (anymore).
	#[error("invalid context: {0}")]
	InvalidContext(EntityId),
	/// Any other peer-reported failure.
	#[error("peer error {code}: {message}")]
	Peer { code: i32, message: String },
	/// The channel closed before the command completed.
	#[error("channel closed")]
	ChannelClosed,
	/// The command was cancelled before the peer answered.
	#[error("command cancelled")]
	Cancelled,
}

impl RemoteError {
	/// Whether this error means "unknown command" rather than "command failed".
	///
	/// Capability probing relies on this being distinguishable from every
	/// other failure.
	pub fn is_unsupported(&self) -> bool {
		matches!(self, Self::UnsupportedCommand { .. })
	}
}
