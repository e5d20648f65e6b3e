//! Tokio host for a [`Session`].
//!
//! The session itself is synchronous. [`SessionDriver`] owns it on one task and feeds it
//! completions, peer events and front-end calls from an mpsc queue, one message at a time,
//! draining the ready queue after each. The session's timers run off the tokio clock.
//!
//! [`MpscChannel`] is the matching outbound half: a [`RemoteChannel`] that forwards commands
//! to whatever task talks to the peer.

use remora_proto::{Command, CommandToken, PeerEvent, PeerServices, RemoteChannel, RemoteError, Reply};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Session;

/// Message processed by the dispatch loop.
pub enum Inbound {
	/// Completion of a command sent through the session's channel.
	Completion { token: CommandToken, result: Result<Reply, RemoteError> },
	Event(PeerEvent),
	/// Front-end code to run against the session.
	Call(Box<dyn FnOnce(&mut Session) + Send>),
}

impl std::fmt::Debug for Inbound {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Completion { token, result } => f.debug_struct("Completion").field("token", token).field("ok", &result.is_ok()).finish(),
			Self::Event(event) => f.debug_tuple("Event").field(&event.name()).finish(),
			Self::Call(_) => f.write_str("Call(..)"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
	/// The dispatch loop has stopped.
	#[error("session driver stopped")]
	Stopped,
	/// The loop stopped before answering a query.
	#[error("session driver dropped the query")]
	QueryDropped,
}

/// Cloneable sender into a running [`SessionDriver`].
#[derive(Clone)]
pub struct DispatchHandle {
	tx: mpsc::UnboundedSender<Inbound>,
	cancel: CancellationToken,
}

impl DispatchHandle {
	pub fn send(&self, msg: Inbound) -> Result<(), DriverError> {
		self.tx.send(msg).map_err(|_| DriverError::Stopped)
	}

	pub fn complete(&self, token: CommandToken, result: Result<Reply, RemoteError>) -> Result<(), DriverError> {
		self.send(Inbound::Completion { token, result })
	}

	pub fn event(&self, event: PeerEvent) -> Result<(), DriverError> {
		self.send(Inbound::Event(event))
	}

	pub fn call(&self, f: impl FnOnce(&mut Session) + Send + 'static) -> Result<(), DriverError> {
		self.send(Inbound::Call(Box::new(f)))
	}

	/// Runs `f` on the dispatch task and returns its result.
	pub async fn query<R>(&self, f: impl FnOnce(&mut Session) -> R + Send + 'static) -> Result<R, DriverError>
	where
		R: Send + 'static,
	{
		let (reply_tx, reply_rx) = oneshot::channel();
		self.call(move |session| {
			let _ = reply_tx.send(f(session));
		})?;
		reply_rx.await.map_err(|_| DriverError::QueryDropped)
	}

	/// Asks the loop to shut the session down and stop.
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}

	pub fn is_stopped(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Owns a [`Session`] and runs its dispatch loop.
pub struct SessionDriver {
	session: Session,
	rx: mpsc::UnboundedReceiver<Inbound>,
	cancel: CancellationToken,
	epoch: Instant,
}

impl SessionDriver {
	pub fn new(session: Session) -> (Self, DispatchHandle) {
		let (tx, rx) = mpsc::unbounded_channel();
		let cancel = CancellationToken::new();
		let handle = DispatchHandle { tx, cancel: cancel.clone() };
		let driver = Self {
			session,
			rx,
			cancel,
			epoch: Instant::now(),
		};
		(driver, handle)
	}

	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Processes messages until cancelled or every handle is dropped, then shuts the
	/// session down and hands it back.
	pub async fn run(mut self) -> Session {
		tracing::debug!("driver.start");
		loop {
			let deadline = self.session.next_deadline().map(|at| self.epoch + at);
			let timer = async move {
				match deadline {
					Some(deadline) => tokio::time::sleep_until(deadline).await,
					None => std::future::pending().await,
				}
			};
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				msg = self.rx.recv() => {
					let Some(msg) = msg else { break };
					self.tick();
					self.dispatch(msg);
				}
				_ = timer => self.tick(),
			}
		}
		tracing::debug!(inflight = self.session.outstanding_commands(), "driver.stop");
		self.rx.close();
		self.session.shutdown();
		self.session
	}

	/// Moves the session clock to the tokio clock, firing due timers.
	fn tick(&mut self) {
		let now = Instant::now().saturating_duration_since(self.epoch);
		self.session.set_time(now);
	}

	fn dispatch(&mut self, msg: Inbound) {
		tracing::trace!(?msg, "driver.dispatch");
		match msg {
			Inbound::Completion { token, result } => self.session.deliver(token, result),
			Inbound::Event(event) => self.session.handle_event(event),
			Inbound::Call(f) => f(&mut self.session),
		}
		self.session.run_pending();
	}
}

/// Outbound traffic of an [`MpscChannel`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
	Send { token: CommandToken, command: Command },
	Cancel(CommandToken),
}

/// [`RemoteChannel`] that forwards to an mpsc receiver.
///
/// Completions are expected back through [`DispatchHandle::complete`].
#[derive(Debug)]
pub struct MpscChannel {
	services: PeerServices,
	tx: mpsc::UnboundedSender<Outbound>,
}

impl MpscChannel {
	pub fn new(services: PeerServices) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { services, tx }, rx)
	}
}

impl RemoteChannel for MpscChannel {
	fn services(&self) -> PeerServices {
		self.services
	}

	fn send(&mut self, token: CommandToken, command: Command) -> Result<(), RemoteError> {
		self.tx.send(Outbound::Send { token, command }).map_err(|_| RemoteError::ChannelClosed)
	}

	fn cancel(&mut self, token: CommandToken) {
		let _ = self.tx.send(Outbound::Cancel(token));
	}
}
