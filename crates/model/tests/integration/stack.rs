use pretty_assertions::assert_eq;
use remora_model::{CacheAddr, CacheSlot, ExprOrigin, WindowedStack};
use remora_proto::{Command, ExprSource, PeerServices, Reply, StackFrameRecord};

use crate::common::{Peer, ids, unsupported};

#[test]
fn stack_without_service_is_emulated() {
	let mut peer = Peer::new(PeerServices::all() - PeerServices::STACK_TRACE);
	let exec = peer.suspended("P1", Some(0x400));
	let stack = CacheAddr::new(exec, CacheSlot::StackTrace);

	assert!(peer.session.validate(stack, None));
	assert!(peer.sent().is_empty());
	let frames = peer.session.children(stack).unwrap();
	assert_eq!(peer.ids(&frames), vec!["P1-TF"]);

	let frame = frames[0];
	assert!(peer.session.validate(CacheAddr::new(frame, CacheSlot::Context), None));
	assert!(peer.session.validate(CacheAddr::new(frame, CacheSlot::Locals), None));
	assert!(peer.session.validate(CacheAddr::new(frame, CacheSlot::Address), None));
	assert!(peer.sent().is_empty());
	let node = peer.session.frame(frame).unwrap();
	assert_eq!(node.context.data(), Some(&None));
	assert_eq!(node.address.data(), Some(&Some(0x400)));
	assert_eq!(node.locals.data().map(|locals| locals.len()), Some(0));
}

#[test]
fn windowed_stack_is_used_while_supported() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1", "F2", "F3"]);
	assert_eq!(peer.ids(&frames), vec!["F1", "F2", "F3"]);
	assert_eq!(peer.session.capabilities().windowed_stack(), WindowedStack::Supported);

	peer.event(crate::common::suspend("P1", Some(0x404)));
	let stack = CacheAddr::new(exec, CacheSlot::StackTrace);
	assert!(!peer.session.validate(stack, None));
	let (_, command) = peer.single();
	assert!(matches!(command, Command::StackTraceGetChildrenRange { start: 0, end: 10, .. }));
}

#[test]
fn fallback_is_shared_by_every_context() {
	let mut peer = Peer::new(PeerServices::all());
	let p1 = peer.suspended("P1", Some(0x400));
	let p2 = peer.suspended("P2", Some(0x800));

	peer.session.validate(CacheAddr::new(p1, CacheSlot::StackTrace), None);
	let (token, _) = peer.single();
	peer.reject(token, unsupported("StackTrace.getChildrenRange"));
	peer.expect(Command::StackTraceGetChildren { context: "P1".into() }, ids(&["A2", "A1"]));

	peer.session.validate(CacheAddr::new(p2, CacheSlot::StackTrace), None);
	let (_, command) = peer.single();
	assert_eq!(command, Command::StackTraceGetChildren { context: "P2".into() });
}

#[test]
fn stack_failure_is_stored_and_frames_survive() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);

	peer.event(crate::common::suspend("P1", Some(0x404)));
	let stack = CacheAddr::new(exec, CacheSlot::StackTrace);
	peer.session.validate(stack, None);
	let (token, _) = peer.single();
	peer.reject(
		token,
		remora_proto::RemoteError::Peer {
			code: 7,
			message: "target busy".into(),
		},
	);
	assert!(peer.session.error(stack).is_some());
	assert_eq!(peer.session.find("F1"), Some(frames[0]));
	assert_eq!(peer.session.capabilities().windowed_stack(), WindowedStack::Supported);
}

#[test]
fn frame_address_comes_from_record_below_the_top() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1", "F2"]);

	let top = CacheAddr::new(frames[0], CacheSlot::Address);
	assert!(peer.session.validate(top, None));
	assert!(peer.sent().is_empty());
	assert_eq!(peer.session.frame(frames[0]).unwrap().address.data(), Some(&Some(0x400)));

	let caller = CacheAddr::new(frames[1], CacheSlot::Address);
	assert!(!peer.session.validate(caller, None));
	let record = StackFrameRecord {
		id: "F2".into(),
		context_id: "P1".into(),
		instruction_address: Some(0x1234),
		frame_address: None,
		func_id: None,
	};
	peer.expect(Command::StackTraceGetContext { id: "F2".into() }, Reply::Frame(record));
	assert_eq!(peer.session.frame(frames[1]).unwrap().address.data(), Some(&Some(0x1234)));
}

#[test]
fn locals_are_listed_per_frame() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);
	let locals = CacheAddr::new(frames[0], CacheSlot::Locals);

	assert!(!peer.session.validate(locals, None));
	peer.expect(Command::ExpressionsGetChildren { frame: "F1".into() }, ids(&["E1", "E2"]));
	let listed = peer.session.children(locals).unwrap();
	assert_eq!(peer.ids(&listed), vec!["E1", "E2"]);
	assert_eq!(
		peer.session.expr(listed[0]).unwrap().origin,
		ExprOrigin::Local { remote: "E1".into() }
	);
}

#[test]
fn watches_are_instantiated_in_every_frame() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1", "F2"]);
	let watch = peer.session.add_watch("count + 1");
	assert_eq!(watch.to_string(), "W0");

	for (frame, expected) in frames.iter().zip(["F1.W0", "F2.W0"]) {
		let watches = CacheAddr::new(*frame, CacheSlot::Watches);
		assert!(peer.session.validate(watches, None));
		let listed = peer.session.children(watches).unwrap();
		assert_eq!(peer.ids(&listed), vec![expected]);
	}

	let f1_watch = peer.session.find("F1.W0").unwrap();
	assert!(!peer.session.validate(CacheAddr::new(f1_watch, CacheSlot::Context), None));
	let (_, command) = peer.single();
	assert_eq!(
		command,
		Command::ExpressionsCreate {
			context: "F1".into(),
			source: ExprSource::Script("count + 1".into()),
			cast: None,
		}
	);

	assert!(peer.session.remove_watch(watch));
	let watches = CacheAddr::new(frames[1], CacheSlot::Watches);
	assert!(peer.session.validate(watches, None));
	assert_eq!(peer.session.children(watches), Some(Vec::new()));
}
