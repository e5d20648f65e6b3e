use std::time::Duration;

use pretty_assertions::assert_eq;
use remora_cache::Phase;
use remora_model::{CacheAddr, CacheSlot, DeltaFlags, ModelDelta};
use remora_proto::{Command, ContextState, PeerEvent, PeerServices, Reply, TypeClass};

use crate::common::{Peer, context, expression, ids, suspend, value};

fn flags_for(deltas: &[ModelDelta], id: &str) -> DeltaFlags {
	deltas.iter().filter(|delta| delta.id.as_str() == id).fold(DeltaFlags::empty(), |acc, delta| acc | delta.flags)
}

#[test]
fn resume_is_confirmed_after_debounce() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	peer.stack(exec, &["F1"]);
	peer.session.take_deltas();

	peer.event(PeerEvent::ContextResumed { id: "P1".into() });
	let state = peer.session.exec(exec).unwrap().state.data().cloned();
	assert_eq!(state, Some(Some(ContextState::running())));
	assert!(peer.session.exec(exec).unwrap().resume_pending());
	assert!(flags_for(&peer.session.take_deltas(), "P1").is_empty());

	let stack = CacheAddr::new(exec, CacheSlot::StackTrace);
	peer.session.advance(Duration::from_millis(399));
	assert_eq!(peer.session.phase(stack), Some(Phase::Valid));

	peer.session.advance(Duration::from_millis(1));
	assert_eq!(peer.session.phase(stack), Some(Phase::Empty));
	assert!(flags_for(&peer.session.take_deltas(), "P1").contains(DeltaFlags::STATE));
	assert!(!peer.session.exec(exec).unwrap().resume_pending());
}

#[test]
fn quick_resume_and_suspend_keeps_stack() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	peer.stack(exec, &["F1"]);

	peer.event(PeerEvent::ContextResumed { id: "P1".into() });
	peer.session.advance(Duration::from_millis(100));
	peer.event(suspend("P1", Some(0x404)));
	let frames = peer.stack(exec, &["F1"]);
	assert_eq!(peer.ids(&frames), vec!["F1"]);

	peer.session.advance(Duration::from_millis(400));
	let stack = CacheAddr::new(exec, CacheSlot::StackTrace);
	assert_eq!(peer.session.phase(stack), Some(Phase::Valid));
	assert!(peer.sent().is_empty());
}

#[test]
fn suspend_without_pc_is_announced_after_debounce() {
	let mut peer = Peer::new(PeerServices::all());
	peer.event(PeerEvent::ContextAdded {
		contexts: vec![context("P1", None)],
	});
	peer.session.take_deltas();

	peer.event(suspend("P1", None));
	assert!(flags_for(&peer.session.take_deltas(), "P1").is_empty());
	assert_eq!(peer.session.next_deadline(), Some(Duration::from_millis(500)));

	peer.session.advance(Duration::from_millis(500));
	assert!(flags_for(&peer.session.take_deltas(), "P1").contains(DeltaFlags::STATE));
}

#[test]
fn superseded_suspend_is_not_announced() {
	let mut peer = Peer::new(PeerServices::all());
	peer.event(PeerEvent::ContextAdded {
		contexts: vec![context("P1", None)],
	});
	peer.event(suspend("P1", None));
	peer.event(PeerEvent::ContextResumed { id: "P1".into() });
	peer.session.take_deltas();

	peer.session.advance(Duration::from_millis(500));
	let flags = flags_for(&peer.session.take_deltas(), "P1");
	// Only the resume confirmation at 400ms reports.
	assert_eq!(flags, DeltaFlags::STATE | DeltaFlags::CONTENT);
	peer.session.advance(Duration::from_millis(1000));
	assert!(peer.session.take_deltas().is_empty());
}

#[test]
fn container_suspend_covers_listed_contexts() {
	let mut peer = Peer::new(PeerServices::all());
	peer.event(PeerEvent::ContextAdded {
		contexts: vec![context("P1", None), context("T1", Some("P1")), context("T2", Some("P1"))],
	});
	let p1 = peer.session.find("P1").unwrap();
	let t2 = peer.session.find("T2").unwrap();
	assert_eq!(peer.session.node(t2).unwrap().parent, Some(p1));

	peer.event(PeerEvent::ContainerSuspended {
		id: "T1".into(),
		pc: Some(0x400),
		reason: Some("step".into()),
		func_call: false,
		suspended: vec!["T1".into(), "T2".into()],
	});
	let t1 = peer.session.find("T1").unwrap();
	let t1_state = peer.session.exec(t1).unwrap().state.data().cloned().flatten().unwrap();
	assert_eq!(t1_state.pc, Some(0x400));
	// T2 came without a PC, so its state is fetched rather than guessed.
	let t2_state = CacheAddr::new(t2, CacheSlot::State);
	assert_eq!(peer.session.phase(t2_state), Some(Phase::Empty));
	let t2_address = CacheAddr::new(t2, CacheSlot::Address);
	assert!(!peer.session.validate(t2_address, None));
	peer.expect(
		Command::RunControlGetState { id: "T2".into() },
		Reply::State(ContextState::suspended(Some(0x800), Some("step".into()), false)),
	);
	assert_eq!(peer.session.exec(t2).unwrap().address.data(), Some(&Some(0x800)));

	peer.event(PeerEvent::ContainerResumed {
		ids: vec!["T1".into(), "T2".into()],
	});
	assert!(peer.session.exec(t2).unwrap().resume_pending());
}

#[test]
fn container_events_skip_stateless_contexts() {
	let mut peer = Peer::new(PeerServices::all());
	let mut process = context("P1", None);
	process.has_state = false;
	process.is_container = true;
	peer.event(PeerEvent::ContextAdded {
		contexts: vec![process, context("T1", Some("P1"))],
	});
	let p1 = peer.session.find("P1").unwrap();
	let t1 = peer.session.find("T1").unwrap();

	peer.event(PeerEvent::ContainerSuspended {
		id: "T1".into(),
		pc: Some(0x400),
		reason: None,
		func_call: false,
		suspended: vec!["P1".into(), "T1".into()],
	});
	assert_eq!(peer.session.phase(CacheAddr::new(p1, CacheSlot::State)), Some(Phase::Empty));
	assert!(peer.session.validate(CacheAddr::new(p1, CacheSlot::State), None));
	assert!(peer.sent().is_empty());
	assert_eq!(peer.session.exec(p1).unwrap().state.data(), Some(&None));
	let t1_state = peer.session.exec(t1).unwrap().state.data().cloned().flatten().unwrap();
	assert_eq!(t1_state.pc, Some(0x400));

	peer.event(PeerEvent::ContainerResumed {
		ids: vec!["P1".into(), "T1".into()],
	});
	assert!(!peer.session.exec(p1).unwrap().resume_pending());
	assert!(peer.session.exec(t1).unwrap().resume_pending());
	assert_eq!(peer.session.exec(p1).unwrap().state.data(), Some(&None));
}

#[test]
fn orphan_context_is_ignored() {
	let mut peer = Peer::new(PeerServices::all());
	peer.event(PeerEvent::ContextAdded {
		contexts: vec![context("T9", Some("P9"))],
	});
	assert_eq!(peer.session.find("T9"), None);
	assert_eq!(peer.session.node_count(), 1);
}

#[test]
fn context_changed_replaces_record_and_resets_state() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let mut record = context("P1", None);
	record.name = Some("renamed".into());

	peer.event(PeerEvent::ContextChanged { contexts: vec![record] });
	let node = peer.session.exec(exec).unwrap();
	assert_eq!(node.context.data().cloned().flatten().and_then(|record| record.name), Some("renamed".into()));
	assert_eq!(node.state.phase(), Phase::Empty);

	assert!(!peer.session.validate(CacheAddr::new(exec, CacheSlot::State), None));
	let (_, command) = peer.single();
	assert_eq!(command, Command::RunControlGetState { id: "P1".into() });
}

#[test]
fn register_value_change_resets_register_and_context_state() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let registers = CacheAddr::new(exec, CacheSlot::Registers);
	peer.session.validate(registers, None);
	peer.expect(Command::RegistersGetChildren { parent: "P1".into() }, ids(&["R0"]));
	let r0 = peer.session.find("R0").unwrap();
	let value_addr = CacheAddr::new(r0, CacheSlot::Value);
	peer.session.validate(value_addr, None);
	peer.expect(Command::RegistersGet { id: "R0".into() }, Reply::RegisterValue(vec![1, 0, 0, 0]));
	assert_eq!(peer.session.register(r0).unwrap().value.data(), Some(&vec![1, 0, 0, 0]));

	peer.event(PeerEvent::RegisterValueChanged { id: "R0".into() });
	assert_eq!(peer.session.phase(value_addr), Some(Phase::Empty));
	assert_eq!(peer.session.phase(CacheAddr::new(exec, CacheSlot::State)), Some(Phase::Empty));
	// The list itself is untouched.
	assert_eq!(peer.session.phase(registers), Some(Phase::Valid));

	peer.event(PeerEvent::RegistersChanged { context: "P1".into() });
	assert_eq!(peer.session.phase(registers), Some(Phase::Empty));
}

#[test]
fn suspend_during_function_call_keeps_expression_values() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);
	peer.session.validate(CacheAddr::new(frames[0], CacheSlot::Locals), None);
	peer.expect(Command::ExpressionsGetChildren { frame: "F1".into() }, ids(&["E1"]));
	let e1 = peer.session.find("E1").unwrap();
	let value_addr = CacheAddr::new(e1, CacheSlot::Value);
	peer.session.validate(value_addr, None);
	peer.expect(Command::ExpressionsGetContext { id: "E1".into() }, Reply::Expression(expression("E1", "F1", None)));
	peer.expect(Command::ExpressionsEvaluate { id: "E1".into() }, Reply::Value(value(&[7], TypeClass::Integer)));

	peer.event(PeerEvent::ContextSuspended {
		id: "P1".into(),
		pc: Some(0x500),
		reason: None,
		func_call: true,
	});
	assert_eq!(peer.session.phase(value_addr), Some(Phase::Valid));

	peer.event(suspend("P1", Some(0x504)));
	assert_eq!(peer.session.phase(value_addr), Some(Phase::Empty));
}

#[test]
fn memory_change_resets_expressions_and_stack() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);
	peer.session.validate(CacheAddr::new(frames[0], CacheSlot::Locals), None);
	peer.expect(Command::ExpressionsGetChildren { frame: "F1".into() }, ids(&["E1"]));
	let e1 = peer.session.find("E1").unwrap();
	let value_addr = CacheAddr::new(e1, CacheSlot::Value);
	peer.session.validate(value_addr, None);
	peer.expect(Command::ExpressionsGetContext { id: "E1".into() }, Reply::Expression(expression("E1", "F1", None)));
	peer.expect(Command::ExpressionsEvaluate { id: "E1".into() }, Reply::Value(value(&[7], TypeClass::Integer)));

	peer.event(PeerEvent::MemoryChanged {
		context: "P1".into(),
		ranges: vec![(0x1000, 0x10)],
	});
	assert_eq!(peer.session.phase(value_addr), Some(Phase::Empty));
	assert_eq!(peer.session.phase(CacheAddr::new(exec, CacheSlot::StackTrace)), Some(Phase::Empty));
	// The record survives; only the value is fetched again.
	peer.session.validate(value_addr, None);
	let (_, command) = peer.single();
	assert_eq!(command, Command::ExpressionsEvaluate { id: "E1".into() });
}
