//! Remote-call contract between the debug model and a debug agent peer.
//!
//! The model never sees wire bytes. It issues [`Command`] values tagged with a
//! [`CommandToken`] through a [`RemoteChannel`], and receives exactly one
//! `(token, Result<Reply, RemoteError>)` completion per issued command plus a
//! stream of unsolicited [`PeerEvent`]s.
//!
//! Transports (sockets, pipes, in-process agents) live outside this crate and
//! implement [`RemoteChannel`].

mod channel;
mod command;
mod error;
mod event;
mod id;
mod records;
mod services;

pub use channel::RemoteChannel;
pub use command::{Command, ExprSource, Reply};
pub use error::RemoteError;
pub use event::PeerEvent;
pub use id::{CommandToken, EntityId, TokenGen};
pub use records::{
	CodeArea, ContextState, ExprValue, ExpressionRecord, MemoryRegion, RegisterRecord, RunControlContext, StackFrameRecord, SymFileInfo, SymbolClass,
	SymbolRecord, TypeClass, UpdatePolicy,
};
pub use services::PeerServices;
