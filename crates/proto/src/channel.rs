use crate::{Command, CommandToken, PeerServices, RemoteError};

/// Outbound half of the connection to the peer.
///
/// Implementations must deliver exactly one completion per accepted command,
/// even after [`RemoteChannel::cancel`] (typically `Err(RemoteError::Cancelled)`),
/// on the model's dispatch thread. The model tolerates completions for tokens
/// it has already forgotten.
pub trait RemoteChannel: Send {
	/// Services the peer advertised.
	fn services(&self) -> PeerServices;

	/// Queues `command`. An `Err` means it was never sent and no completion will follow.
	fn send(&mut self, token: CommandToken, command: Command) -> Result<(), RemoteError>;

	/// Best-effort cancellation of an outstanding command.
	fn cancel(&mut self, token: CommandToken);
}
