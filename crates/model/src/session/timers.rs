//! Session clock and timers.
//!
//! The session keeps a logical clock advanced by its driver (or by tests). Timers are keyed
//! by deadline and insertion order so equal deadlines fire in scheduling order.

use std::time::Duration;

use super::Session;
use crate::{CacheAddr, CacheSlot, DeltaFlags, NodeIdx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
	LookupEviction,
	/// Reports a resume unless a newer suspend or resume arrived since `seq`.
	ConfirmResume { context: NodeIdx, seq: u64 },
	/// Reports a suspend that came without a PC, unless superseded since `seq`.
	AnnounceSuspend { context: NodeIdx, seq: u64 },
}

impl Session {
	/// Time elapsed on the session clock.
	pub fn now(&self) -> Duration {
		self.now
	}

	/// Deadline of the earliest pending timer.
	pub fn next_deadline(&self) -> Option<Duration> {
		self.timers.first_key_value().map(|((deadline, _), _)| *deadline)
	}

	pub fn advance(&mut self, by: Duration) {
		self.set_time(self.now.saturating_add(by));
	}

	/// Moves the clock forward to `now`, fires every timer due by then, and drains the
	/// waiters they released. The clock never goes back.
	pub fn set_time(&mut self, now: Duration) {
		self.now = self.now.max(now);
		while let Some(entry) = self.timers.first_entry()
			&& entry.key().0 <= self.now
		{
			let kind = entry.remove();
			self.fire(kind);
		}
		self.run_pending();
	}

	pub(super) fn schedule(&mut self, after: Duration, kind: TimerKind) {
		let deadline = self.now.saturating_add(after);
		self.timer_seq += 1;
		self.timers.insert((deadline, self.timer_seq), kind);
	}

	fn fire(&mut self, kind: TimerKind) {
		tracing::trace!(?kind, now = ?self.now, "timer.fire");
		match kind {
			TimerKind::LookupEviction => self.evict_lookups(),
			TimerKind::ConfirmResume { context, seq } => {
				let Some(node) = self.arena.get_mut(context) else { return };
				let id = node.id.clone();
				let Some(exec) = node.as_exec_mut() else { return };
				if !exec.resume_pending || exec.resume_seq != seq {
					return;
				}
				exec.resume_pending = false;
				self.reset(CacheAddr::new(context, CacheSlot::StackTrace));
				self.note(id, DeltaFlags::STATE | DeltaFlags::CONTENT);
			}
			TimerKind::AnnounceSuspend { context, seq } => {
				let Some(node) = self.arena.get(context) else { return };
				let Some(exec) = node.as_exec() else { return };
				// The state may still be refetching; only a known running state cancels.
				let running = exec.state.data().and_then(Option::as_ref).is_some_and(|state| !state.suspended);
				if running || exec.resume_pending || exec.suspend_seq != seq {
					return;
				}
				let id = node.id.clone();
				self.note(id, DeltaFlags::STATE | DeltaFlags::CONTENT);
			}
		}
	}
}
