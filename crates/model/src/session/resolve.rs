//! Identity resolution: id -> node, instantiating unknown ancestors on the way.
//!
//! An unknown id is probed with the run-control, stack-trace, then register service until
//! one of them knows it. The record names a parent, which is resolved the same way; the
//! node is then created under it, directly for contexts and through the parent's frame or
//! register list otherwise. Concurrent requests for one id share a single resolution.

use remora_cache::CacheError;
use remora_proto::{Command, EntityId, PeerServices, RegisterRecord, RemoteError, Reply, RunControlContext, StackFrameRecord};

use super::{Session, Target};
use crate::{CacheAddr, CacheSlot, NodeIdx, Waiter};

/// Outcome of [`Session::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
	Node(NodeIdx),
	/// Still resolving; the waiter runs when it finishes.
	Pending,
	Failed(CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
	RunControl,
	StackTrace,
	Registers,
}

impl Probe {
	fn first() -> Self {
		Self::RunControl
	}

	fn next(self) -> Option<Self> {
		match self {
			Self::RunControl => Some(Self::StackTrace),
			Self::StackTrace => Some(Self::Registers),
			Self::Registers => None,
		}
	}

	fn service(self) -> PeerServices {
		match self {
			Self::RunControl => PeerServices::RUN_CONTROL,
			Self::StackTrace => PeerServices::STACK_TRACE,
			Self::Registers => PeerServices::REGISTERS,
		}
	}

	fn command(self, id: EntityId) -> Command {
		match self {
			Self::RunControl => Command::RunControlGetContext { id },
			Self::StackTrace => Command::StackTraceGetContext { id },
			Self::Registers => Command::RegistersGetContext { id },
		}
	}
}

#[derive(Debug)]
enum Found {
	Context(RunControlContext),
	Frame(StackFrameRecord),
	Register(RegisterRecord),
}

impl Found {
	fn parent(&self) -> EntityId {
		match self {
			Self::Context(record) => record.parent_id.clone().unwrap_or_else(EntityId::root),
			Self::Frame(record) => record.context_id.clone(),
			Self::Register(record) => record.parent_id.clone(),
		}
	}
}

#[derive(Debug)]
enum Stage {
	Probing(Probe),
	Found(Found),
}

#[derive(Debug)]
pub(crate) struct Resolution {
	stage: Stage,
	pub(super) waiters: Vec<Waiter>,
}

impl Session {
	/// Node for `id`, resolving it and its unknown ancestors when needed.
	///
	/// A failure is reported to every waiter of the failed resolution; later calls retry.
	pub fn resolve(&mut self, id: &EntityId, waiter: Option<Waiter>) -> Resolved {
		if let Some(idx) = self.find(id.as_str()) {
			return Resolved::Node(idx);
		}
		if let Some(err) = self.resolve_failures.get(id) {
			return Resolved::Failed(err.clone());
		}
		if let Some(resolution) = self.resolving.get_mut(id) {
			if let Some(waiter) = waiter {
				if !resolution.waiters.contains(&waiter) {
					resolution.waiters.push(waiter);
				}
			}
			return Resolved::Pending;
		}

		tracing::debug!(%id, "resolve.start");
		self.resolving.insert(
			id.clone(),
			Resolution {
				stage: Stage::Probing(Probe::first()),
				waiters: waiter.into_iter().collect(),
			},
		);
		self.probe(id.clone(), Some(Probe::first()), None);
		if let Some(idx) = self.find(id.as_str()) {
			return Resolved::Node(idx);
		}
		match self.resolve_failures.get(id) {
			Some(err) => Resolved::Failed(err.clone()),
			None => Resolved::Pending,
		}
	}

	/// Sends the first applicable probe from `probe` on. `last` is the error of the previous
	/// probe, reported when none is left.
	fn probe(&mut self, id: EntityId, mut probe: Option<Probe>, mut last: Option<CacheError>) {
		while let Some(current) = probe {
			if self.has_service(current.service()) {
				match self.issue(Target::Resolve(id.clone()), current.command(id.clone())) {
					Ok(_) => {
						if let Some(resolution) = self.resolving.get_mut(&id) {
							resolution.stage = Stage::Probing(current);
						}
						return;
					}
					Err(err) => last = Some(err.into()),
				}
			}
			probe = current.next();
		}
		let error = last.unwrap_or_else(|| CacheError::InvalidContext(id.clone()));
		self.finish_resolution(&id, Err(error));
	}

	pub(super) fn complete_probe(&mut self, id: EntityId, command: Command, result: Result<Reply, RemoteError>) {
		let Some(Stage::Probing(probe)) = self.resolving.get(&id).map(|resolution| &resolution.stage) else {
			tracing::debug!(%id, command = command.name(), "resolve.stale_probe");
			return;
		};
		let probe = *probe;
		let found = match result {
			Ok(Reply::RunControlContext(record)) => Found::Context(record),
			Ok(Reply::Frame(record)) => Found::Frame(record),
			Ok(Reply::Register(record)) => Found::Register(record),
			Ok(other) => {
				tracing::warn!(%id, command = command.name(), reply = other.kind(), "resolve.unexpected_reply");
				let error = CacheError::UnexpectedReply {
					command: command.name(),
					reply: other.kind(),
				};
				self.probe(id, probe.next(), Some(error));
				return;
			}
			Err(err) => {
				tracing::trace!(%id, ?probe, %err, "resolve.probe_miss");
				self.probe(id, probe.next(), Some(err.into()));
				return;
			}
		};
		if let Some(resolution) = self.resolving.get_mut(&id) {
			resolution.stage = Stage::Found(found);
		}
		self.continue_resolution(&id);
	}

	/// Resumes a resolution whose record is known: resolves the parent, then instantiates.
	pub(super) fn continue_resolution(&mut self, id: &EntityId) {
		let parent_id = match self.resolving.get(id).map(|resolution| &resolution.stage) {
			Some(Stage::Found(found)) => found.parent(),
			_ => return,
		};
		let parent = if parent_id.is_root() {
			self.root
		} else {
			match self.resolve(&parent_id, Some(Waiter::Resolve(id.clone()))) {
				Resolved::Node(parent) => parent,
				Resolved::Pending => return,
				Resolved::Failed(err) => {
					self.finish_resolution(id, Err(err));
					return;
				}
			}
		};

		let Some(Resolution {
			stage: Stage::Found(found), ..
		}) = self.resolving.get(id)
		else {
			return;
		};
		let outcome = match found {
			Found::Context(record) => {
				let record = record.clone();
				if self.exec(parent).is_none() && parent != self.root {
					Err(CacheError::InvalidContext(id.clone()))
				} else {
					Ok(self.adopt_exec(parent, record))
				}
			}
			Found::Frame(_) => match self.listed_under(id, CacheAddr::new(parent, CacheSlot::StackTrace)) {
				Some(outcome) => outcome,
				None => return,
			},
			Found::Register(_) => {
				let slot = if self.exec(parent).is_some() { CacheSlot::Registers } else { CacheSlot::Children };
				match self.listed_under(id, CacheAddr::new(parent, slot)) {
					Some(outcome) => outcome,
					None => return,
				}
			}
		};
		self.finish_resolution(id, outcome);
	}

	/// Finds `id` through the child list at `list`. `None` while the list is loading.
	fn listed_under(&mut self, id: &EntityId, list: CacheAddr) -> Option<Result<NodeIdx, CacheError>> {
		if !self.validate(list, Some(Waiter::Resolve(id.clone()))) {
			return None;
		}
		if let Some(err) = self.error(list) {
			return Some(Err(err));
		}
		Some(self.find(id.as_str()).ok_or_else(|| CacheError::InvalidContext(id.clone())))
	}

	fn finish_resolution(&mut self, id: &EntityId, outcome: Result<NodeIdx, CacheError>) {
		let Some(resolution) = self.resolving.remove(id) else { return };
		match outcome {
			Ok(idx) => tracing::debug!(%id, node = %idx, "resolve.done"),
			Err(err) => {
				tracing::debug!(%id, %err, "resolve.failed");
				self.resolve_failures.insert(id.clone(), err);
			}
		}
		self.ready.extend(resolution.waiters);
	}
}
