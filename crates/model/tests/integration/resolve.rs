use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use remora_cache::CacheError;
use remora_model::{Resolved, Session, Waiter};
use remora_proto::{Command, EntityId, PeerServices, RegisterRecord, RemoteError, Reply, StackFrameRecord};

use crate::common::{Peer, context, ids};

/// Waiter that records what `resolve` reports once it runs.
fn recorder(id: &str) -> (Waiter, Arc<Mutex<Vec<Resolved>>>) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let id = EntityId::new(id);
	let waiter = Waiter::callback(move |session: &mut Session| {
		let outcome = session.resolve(&id, None);
		sink.lock().unwrap().push(outcome);
	});
	(waiter, seen)
}

fn missing(id: &str) -> RemoteError {
	RemoteError::InvalidContext(id.into())
}

#[test]
fn known_id_resolves_immediately() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	assert_eq!(peer.session.resolve(&"P1".into(), None), Resolved::Node(exec));
	assert!(peer.sent().is_empty());
}

#[test]
fn frame_resolves_through_its_context_stack() {
	let mut peer = Peer::new(PeerServices::all());
	peer.suspended("P1", Some(0x400));
	let (waiter, seen) = recorder("F7");

	assert_eq!(peer.session.resolve(&"F7".into(), Some(waiter)), Resolved::Pending);
	let (token, command) = peer.single();
	assert_eq!(command, Command::RunControlGetContext { id: "F7".into() });
	peer.reject(token, missing("F7"));

	let record = StackFrameRecord {
		id: "F7".into(),
		context_id: "P1".into(),
		instruction_address: Some(0x400),
		frame_address: None,
		func_id: None,
	};
	peer.expect(Command::StackTraceGetContext { id: "F7".into() }, Reply::Frame(record));
	assert!(seen.lock().unwrap().is_empty());

	let (token, command) = peer.single();
	assert!(matches!(command, Command::StackTraceGetChildrenRange { .. }));
	peer.reply(token, ids(&["F7", "F8"]));

	let frame = peer.session.find("F7").unwrap();
	assert_eq!(*seen.lock().unwrap(), vec![Resolved::Node(frame)]);
	assert_eq!(peer.session.frame(frame).unwrap().frame_no, 0);
}

#[test]
fn unknown_ancestors_are_instantiated_top_down() {
	let mut peer = Peer::new(PeerServices::all());
	let (waiter, seen) = recorder("T1");

	assert_eq!(peer.session.resolve(&"T1".into(), Some(waiter)), Resolved::Pending);
	peer.expect(
		Command::RunControlGetContext { id: "T1".into() },
		Reply::RunControlContext(context("T1", Some("P1"))),
	);
	peer.expect(
		Command::RunControlGetContext { id: "P1".into() },
		Reply::RunControlContext(context("P1", None)),
	);
	assert!(peer.sent().is_empty());

	let p1 = peer.session.find("P1").unwrap();
	let t1 = peer.session.find("T1").unwrap();
	assert_eq!(peer.session.node(p1).unwrap().parent, Some(peer.session.root()));
	assert_eq!(peer.session.node(t1).unwrap().parent, Some(p1));
	assert_eq!(*seen.lock().unwrap(), vec![Resolved::Node(t1)]);
}

#[test]
fn concurrent_requests_share_one_probe() {
	let mut peer = Peer::new(PeerServices::all());
	let (first, first_seen) = recorder("P5");
	let (second, second_seen) = recorder("P5");

	assert_eq!(peer.session.resolve(&"P5".into(), Some(first)), Resolved::Pending);
	assert_eq!(peer.session.resolve(&"P5".into(), Some(second)), Resolved::Pending);
	let (token, _) = peer.single();
	peer.reply(token, Reply::RunControlContext(context("P5", None)));

	let p5 = peer.session.find("P5").unwrap();
	assert_eq!(*first_seen.lock().unwrap(), vec![Resolved::Node(p5)]);
	assert_eq!(*second_seen.lock().unwrap(), vec![Resolved::Node(p5)]);
}

#[test]
fn failure_reaches_every_waiter_and_is_retried_later() {
	let mut peer = Peer::new(PeerServices::all());
	let (first, first_seen) = recorder("X1");
	let (second, second_seen) = recorder("X1");
	peer.session.resolve(&"X1".into(), Some(first));
	peer.session.resolve(&"X1".into(), Some(second));

	for expected in [
		Command::RunControlGetContext { id: "X1".into() },
		Command::StackTraceGetContext { id: "X1".into() },
		Command::RegistersGetContext { id: "X1".into() },
	] {
		let (token, command) = peer.single();
		assert_eq!(command, expected);
		peer.reject(token, missing("X1"));
	}

	let failed = Resolved::Failed(CacheError::Remote(missing("X1")));
	assert_eq!(*first_seen.lock().unwrap(), vec![failed.clone()]);
	assert_eq!(*second_seen.lock().unwrap(), vec![failed]);

	assert_eq!(peer.session.resolve(&"X1".into(), None), Resolved::Pending);
	let (_, command) = peer.single();
	assert_eq!(command, Command::RunControlGetContext { id: "X1".into() });
}

#[test]
fn register_resolves_through_register_list() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let (waiter, seen) = recorder("R3");
	peer.session.resolve(&"R3".into(), Some(waiter));

	let (token, _) = peer.single();
	peer.reject(token, missing("R3"));
	let (token, _) = peer.single();
	peer.reject(token, missing("R3"));
	let record = RegisterRecord {
		id: "R3".into(),
		parent_id: "P1".into(),
		name: "r3".into(),
		size: 8,
		readable: true,
		writeable: true,
		big_endian: false,
	};
	peer.expect(Command::RegistersGetContext { id: "R3".into() }, Reply::Register(record));
	peer.expect(Command::RegistersGetChildren { parent: "P1".into() }, ids(&["R0", "R3"]));

	let r3 = peer.session.find("R3").unwrap();
	assert_eq!(peer.session.node(r3).unwrap().parent, Some(exec));
	assert_eq!(*seen.lock().unwrap(), vec![Resolved::Node(r3)]);
}

#[test]
fn frame_missing_from_stack_fails() {
	let mut peer = Peer::new(PeerServices::RUN_CONTROL | PeerServices::STACK_TRACE);
	peer.suspended("P1", Some(0x400));
	let (waiter, seen) = recorder("F9");
	peer.session.resolve(&"F9".into(), Some(waiter));

	let (token, _) = peer.single();
	peer.reject(token, missing("F9"));
	let record = StackFrameRecord {
		id: "F9".into(),
		context_id: "P1".into(),
		instruction_address: None,
		frame_address: None,
		func_id: None,
	};
	peer.expect(Command::StackTraceGetContext { id: "F9".into() }, Reply::Frame(record));
	let (token, _) = peer.single();
	peer.reply(token, ids(&["F1"]));

	assert_eq!(*seen.lock().unwrap(), vec![Resolved::Failed(CacheError::InvalidContext("F9".into()))]);
	assert_eq!(peer.session.find("F9"), None);
}

#[test]
fn probes_skip_missing_services() {
	let mut peer = Peer::new(PeerServices::REGISTERS);
	peer.session.resolve(&"Q1".into(), None);
	let (_, command) = peer.single();
	assert_eq!(command, Command::RegistersGetContext { id: "Q1".into() });
}
