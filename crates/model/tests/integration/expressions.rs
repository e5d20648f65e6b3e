use pretty_assertions::assert_eq;
use remora_cache::Phase;
use remora_model::{CacheAddr, CacheSlot, ExprOrigin, NodeIdx};
use remora_proto::{Command, ExprSource, ExprValue, PeerServices, Reply, SymbolRecord, TypeClass, UpdatePolicy};

use crate::common::{Peer, expression, ids, suspend, symbol, value};

/// Suspended `P1` with one frame `F1` holding the local `E1`.
fn local(peer: &mut Peer, type_id: Option<&str>) -> NodeIdx {
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);
	peer.session.validate(CacheAddr::new(frames[0], CacheSlot::Locals), None);
	peer.expect(Command::ExpressionsGetChildren { frame: "F1".into() }, ids(&["E1"]));
	let e1 = peer.session.find("E1").unwrap();
	assert!(!peer.session.validate(CacheAddr::new(e1, CacheSlot::Children), None));
	peer.expect(
		Command::ExpressionsGetContext { id: "E1".into() },
		Reply::Expression(expression("E1", "F1", type_id)),
	);
	e1
}

/// Answers the value and type fetches that listing the children of `E1` starts.
fn typed(peer: &mut Peer, value: ExprValue, type_symbol: SymbolRecord) {
	peer.expect(Command::ExpressionsEvaluate { id: "E1".into() }, Reply::Value(value));
	let type_id = type_symbol.id.clone();
	peer.expect(Command::SymbolsGetContext { id: type_id }, Reply::Symbol(type_symbol));
}

fn pointer(base: &str) -> SymbolRecord {
	SymbolRecord {
		base_type_id: Some(base.into()),
		..symbol("T1", TypeClass::Pointer)
	}
}

fn array(length: u64) -> SymbolRecord {
	SymbolRecord {
		length,
		..symbol("T1", TypeClass::Array)
	}
}

#[test]
fn composite_fields_are_keyed_by_member() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0; 8], TypeClass::Composite), symbol("T1", TypeClass::Composite));

	let hidden = SymbolRecord {
		artificial: true,
		..symbol("M0", TypeClass::Pointer)
	};
	peer.expect(
		Command::SymbolsGetChildren { id: "T1".into() },
		Reply::Symbols(vec![hidden, symbol("M1", TypeClass::Integer), symbol("M2", TypeClass::Integer)]),
	);
	let fields = peer.session.children(CacheAddr::new(e1, CacheSlot::Children)).unwrap();
	assert_eq!(peer.ids(&fields), vec!["E1.FM1", "E1.FM2"]);

	assert!(!peer.session.validate(CacheAddr::new(fields[0], CacheSlot::Context), None));
	let (_, command) = peer.single();
	assert_eq!(
		command,
		Command::ExpressionsCreate {
			context: "F1".into(),
			source: ExprSource::Field {
				base: "E1".into(),
				field: "M1".into(),
				deref: false,
			},
			cast: None,
		}
	);
}

#[test]
fn null_pointer_has_no_children() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0; 8], TypeClass::Pointer), pointer("T2"));

	let children = CacheAddr::new(e1, CacheSlot::Children);
	assert!(peer.session.validate(children, None));
	assert!(peer.sent().is_empty());
	assert_eq!(peer.session.children(children), Some(Vec::new()));
}

#[test]
fn pointer_to_scalar_has_one_target() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0x10, 0, 0, 0, 0, 0, 0, 0], TypeClass::Pointer), pointer("T2"));
	peer.expect(
		Command::SymbolsGetContext { id: "T2".into() },
		Reply::Symbol(symbol("T2", TypeClass::Integer)),
	);

	let targets = peer.session.children(CacheAddr::new(e1, CacheSlot::Children)).unwrap();
	assert_eq!(peer.ids(&targets), vec!["E1.*"]);
	assert_eq!(peer.session.expr(targets[0]).unwrap().origin, ExprOrigin::Deref { base: e1 });

	peer.session.validate(CacheAddr::new(targets[0], CacheSlot::Context), None);
	let (_, command) = peer.single();
	assert_eq!(
		command,
		Command::ExpressionsCreate {
			context: "F1".into(),
			source: ExprSource::Deref { base: "E1".into() },
			cast: None,
		}
	);
}

#[test]
fn pointer_to_composite_lists_dereferenced_fields() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0x10, 0, 0, 0, 0, 0, 0, 0], TypeClass::Pointer), pointer("T2"));
	peer.expect(
		Command::SymbolsGetContext { id: "T2".into() },
		Reply::Symbol(symbol("T2", TypeClass::Composite)),
	);
	peer.expect(
		Command::SymbolsGetChildren { id: "T2".into() },
		Reply::Symbols(vec![symbol("M1", TypeClass::Integer)]),
	);

	let fields = peer.session.children(CacheAddr::new(e1, CacheSlot::Children)).unwrap();
	assert_eq!(peer.ids(&fields), vec!["E1.DFM1"]);
	peer.session.validate(CacheAddr::new(fields[0], CacheSlot::Context), None);
	let (_, command) = peer.single();
	assert!(matches!(
		command,
		Command::ExpressionsCreate {
			source: ExprSource::Field { deref: true, .. },
			..
		}
	));
}

#[test]
fn large_array_is_partitioned() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0; 4], TypeClass::Array), array(250));

	let parts = peer.session.children(CacheAddr::new(e1, CacheSlot::Children)).unwrap();
	assert_eq!(peer.ids(&parts), vec!["AP1.0.E1", "AP1.100.E1", "AP1.200.E1"]);

	let last = CacheAddr::new(parts[2], CacheSlot::Children);
	assert!(peer.session.validate(last, None));
	assert!(peer.sent().is_empty());
	let elements = peer.session.children(last).unwrap();
	assert_eq!(elements.len(), 50);
	assert_eq!(peer.id(elements[0]), "E1[200]");
	assert_eq!(peer.id(elements[49]), "E1[249]");
	assert_eq!(
		peer.session.expr(elements[0]).unwrap().origin,
		ExprOrigin::Element { base: e1, index: 200 }
	);

	peer.session.validate(CacheAddr::new(elements[0], CacheSlot::Context), None);
	let (_, command) = peer.single();
	assert_eq!(
		command,
		Command::ExpressionsCreate {
			context: "F1".into(),
			source: ExprSource::Index { base: "E1".into(), index: 200 },
			cast: None,
		}
	);
}

#[test]
fn huge_array_nests_partitions() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, Some("T1"));
	typed(&mut peer, value(&[0; 4], TypeClass::Array), array(25_000));

	let parts = peer.session.children(CacheAddr::new(e1, CacheSlot::Children)).unwrap();
	assert_eq!(peer.ids(&parts), vec!["AP1.0.E1", "AP1.10000.E1", "AP1.20000.E1"]);

	let first = CacheAddr::new(parts[0], CacheSlot::Children);
	assert!(peer.session.validate(first, None));
	let nested = peer.session.children(first).unwrap();
	assert_eq!(nested.len(), 100);
	assert_eq!(peer.id(nested[0]), "AP2.0.AP1.0.E1");
	assert_eq!(peer.id(nested[99]), "AP2.9900.AP1.0.E1");

	let leaf = peer.session.node(nested[99]).unwrap().as_partition().unwrap();
	assert_eq!((leaf.level, leaf.offset, leaf.size, leaf.array), (2, 9900, 100, e1));
}

#[test]
fn cast_recreates_and_releases_the_expression() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, None);
	peer.sent();

	peer.session.set_cast(e1, Some("char*".into()));
	assert_eq!(peer.session.cast(e1), Some("char*"));
	let context = CacheAddr::new(e1, CacheSlot::Context);
	assert!(!peer.session.validate(context, None));
	peer.expect(
		Command::ExpressionsCreate {
			context: "F1".into(),
			source: ExprSource::Local("E1".into()),
			cast: Some("char*".into()),
		},
		Reply::Expression(expression("X1", "F1", None)),
	);
	assert_eq!(peer.session.expr(e1).unwrap().context.data().map(|record| record.id.to_string()), Some("X1".into()));

	peer.session.set_cast(e1, None);
	assert_eq!(peer.session.cast(e1), None);
	let (_, command) = peer.single();
	assert_eq!(command, Command::ExpressionsDispose { id: "X1".into() });

	assert!(!peer.session.validate(context, None));
	let (_, command) = peer.single();
	assert_eq!(command, Command::ExpressionsGetContext { id: "E1".into() });
}

#[test]
fn evaluator_created_after_cancel_is_disposed() {
	let mut peer = Peer::new(PeerServices::all());
	let e1 = local(&mut peer, None);
	peer.sent();

	peer.session.set_cast(e1, Some("int".into()));
	let context = CacheAddr::new(e1, CacheSlot::Context);
	assert!(!peer.session.validate(context, None));
	let (token, command) = peer.single();
	assert!(matches!(command, Command::ExpressionsCreate { .. }));

	peer.session.set_cast(e1, Some("long".into()));
	peer.sent();
	assert_eq!(peer.cancelled, vec![token]);
	assert_eq!(peer.session.outstanding_commands(), 1);

	// The peer created the evaluator before it saw the cancel.
	peer.reply(token, Reply::Expression(expression("X1", "F1", None)));
	let (_, command) = peer.single();
	assert_eq!(command, Command::ExpressionsDispose { id: "X1".into() });
	assert_eq!(peer.session.phase(context), Some(Phase::Empty));
}

#[test]
fn watch_failure_is_kept_on_the_watch() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let frames = peer.stack(exec, &["F1"]);
	peer.session.add_watch("bogus +");
	let watches = CacheAddr::new(frames[0], CacheSlot::Watches);
	peer.session.validate(watches, None);
	let watch = peer.session.children(watches).unwrap()[0];

	let value_addr = CacheAddr::new(watch, CacheSlot::Value);
	assert!(!peer.session.validate(value_addr, None));
	let (token, _) = peer.single();
	let err = remora_proto::RemoteError::Peer {
		code: 3,
		message: "syntax error".into(),
	};
	peer.reject(token, err.clone());

	assert!(peer.session.validate(value_addr, None));
	assert_eq!(peer.session.error(value_addr), Some(remora_cache::CacheError::Remote(err)));
	assert!(peer.sent().is_empty());
}

#[test]
fn symbols_refresh_per_update_policy() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let volatile = peer.session.symbol_node(exec, "S1".into()).unwrap();
	let stable = peer.session.symbol_node(exec, "S2".into()).unwrap();
	assert_eq!(peer.session.symbol_node(exec, "S1".into()), Some(volatile));

	peer.session.validate(CacheAddr::new(volatile, CacheSlot::Context), None);
	let record = SymbolRecord {
		update_policy: UpdatePolicy::ExecState,
		..symbol("S1", TypeClass::Composite)
	};
	peer.expect(Command::SymbolsGetContext { id: "S1".into() }, Reply::Symbol(record));
	peer.session.validate(CacheAddr::new(volatile, CacheSlot::Members), None);
	peer.expect(
		Command::SymbolsGetChildren { id: "S1".into() },
		Reply::Symbols(vec![symbol("M1", TypeClass::Integer)]),
	);
	assert_eq!(peer.session.symbol(volatile).unwrap().members.data().map(Vec::len), Some(1));
	peer.session.validate(CacheAddr::new(stable, CacheSlot::Context), None);
	peer.expect(
		Command::SymbolsGetContext { id: "S2".into() },
		Reply::Symbol(symbol("S2", TypeClass::Integer)),
	);

	peer.event(suspend("P1", Some(0x404)));
	assert_eq!(peer.session.phase(CacheAddr::new(volatile, CacheSlot::Context)), Some(Phase::Empty));
	assert_eq!(peer.session.phase(CacheAddr::new(volatile, CacheSlot::Members)), Some(Phase::Empty));
	assert_eq!(peer.session.phase(CacheAddr::new(stable, CacheSlot::Context)), Some(Phase::Valid));
}
