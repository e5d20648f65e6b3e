use std::time::Duration;

use pretty_assertions::assert_eq;
use remora_cache::CacheError;
use remora_model::{CacheAddr, CacheSlot, ModelConfig};
use remora_proto::{CodeArea, Command, PeerEvent, PeerServices, RemoteError, Reply, SymFileInfo, TypeClass};

use crate::common::{Peer, symbol};

fn area(start: u64, end: u64, line: u32) -> CodeArea {
	CodeArea {
		file: Some("main.c".into()),
		start_line: line,
		start_column: 0,
		end_line: line,
		end_column: 0,
		start_address: start,
		end_address: end,
		is_statement: true,
	}
}

#[test]
fn line_info_picks_the_narrowest_area() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let addr = CacheAddr::new(exec, CacheSlot::LineInfo(0x418));

	assert!(!peer.session.validate(addr, None));
	peer.expect(
		Command::LineNumbersMapToSource {
			context: "P1".into(),
			start: 0x418,
			end: 0x419,
		},
		Reply::CodeAreas(vec![area(0x400, 0x500, 10), area(0x410, 0x420, 12), area(0x600, 0x610, 30)]),
	);
	let info = peer.session.exec(exec).unwrap().line_info.peek(&0x418).unwrap().data().cloned().unwrap();
	assert_eq!(info.area.map(|area| area.start_line), Some(12));
	assert_eq!(info.error, None);
}

#[test]
fn peer_error_is_folded_into_the_value() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let addr = CacheAddr::new(exec, CacheSlot::FuncInfo(0x400));

	peer.session.validate(addr, None);
	let (token, command) = peer.single();
	assert_eq!(
		command,
		Command::SymbolsFindByAddr {
			context: "P1".into(),
			address: 0x400
		}
	);
	let err = RemoteError::Peer {
		code: 2,
		message: "no symbol".into(),
	};
	peer.reject(token, err.clone());

	assert_eq!(peer.session.error(addr), None);
	let info = peer.session.exec(exec).unwrap().func_info.peek(&0x400).unwrap().data().cloned().unwrap();
	assert_eq!(info.symbol, None);
	assert_eq!(info.error, Some(err));
}

#[test]
fn func_and_sym_file_info_carry_peer_records() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));

	peer.session.validate(CacheAddr::new(exec, CacheSlot::FuncInfo(0x400)), None);
	let (token, _) = peer.single();
	peer.reply(token, Reply::Symbol(symbol("main", TypeClass::Function)));

	peer.session.validate(CacheAddr::new(exec, CacheSlot::SymFileInfo(0x400)), None);
	let (token, command) = peer.single();
	assert_eq!(
		command,
		Command::SymbolsGetSymFileInfo {
			context: "P1".into(),
			address: 0x400
		}
	);
	let file = SymFileInfo {
		file_name: Some("/usr/lib/debug/a.out.debug".into()),
		error: None,
	};
	peer.reply(token, Reply::SymFile(file.clone()));

	let node = peer.session.exec(exec).unwrap();
	let func = node.func_info.peek(&0x400).unwrap().data().cloned().unwrap();
	assert_eq!(func.symbol.map(|symbol| symbol.id.to_string()), Some("main".into()));
	assert_eq!(node.sym_file_info.peek(&0x400).unwrap().data(), Some(&file));
}

#[test]
fn missing_service_settles_with_error() {
	let mut peer = Peer::new(PeerServices::RUN_CONTROL);
	let exec = peer.suspended("P1", Some(0x400));
	let addr = CacheAddr::new(exec, CacheSlot::LineInfo(0x400));

	assert!(peer.session.validate(addr, None));
	assert!(peer.sent().is_empty());
	assert_eq!(peer.session.error(addr), Some(CacheError::ServiceUnavailable("LineNumbers")));
}

#[test]
fn idle_lookups_are_evicted_by_the_timer() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let addr = CacheAddr::new(exec, CacheSlot::LineInfo(0x400));
	peer.session.validate(addr, None);
	let (token, _) = peer.single();
	peer.reply(token, Reply::CodeAreas(Vec::new()));
	assert_eq!(peer.session.next_deadline(), Some(Duration::from_millis(4000)));

	peer.session.advance(Duration::from_millis(3999));
	assert!(peer.session.exec(exec).unwrap().line_info.contains(&0x400));

	peer.session.advance(Duration::from_millis(1));
	assert!(peer.session.exec(exec).unwrap().line_info.is_empty());
	assert_eq!(peer.session.next_deadline(), None);
}

#[test]
fn pending_lookups_survive_eviction() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	let addr = CacheAddr::new(exec, CacheSlot::LineInfo(0x400));
	peer.session.validate(addr, None);
	let (token, _) = peer.single();

	peer.session.advance(Duration::from_millis(4000));
	assert!(peer.session.exec(exec).unwrap().line_info.contains(&0x400));
	assert_eq!(peer.session.next_deadline(), Some(Duration::from_millis(6500)));

	peer.reply(token, Reply::CodeAreas(Vec::new()));
	peer.session.advance(Duration::from_millis(2500));
	assert!(!peer.session.exec(exec).unwrap().line_info.contains(&0x400));
}

#[test]
fn reads_keep_recent_lookups() {
	let config = ModelConfig {
		lookup_cache_bound: 2,
		..ModelConfig::default()
	};
	let mut peer = Peer::with_config(PeerServices::all(), config);
	let exec = peer.suspended("P1", Some(0x400));
	for address in [1, 2] {
		peer.session.validate(CacheAddr::new(exec, CacheSlot::LineInfo(address)), None);
		let (token, _) = peer.single();
		peer.reply(token, Reply::CodeAreas(Vec::new()));
	}

	// Reading 1 again makes 2 the least recently used.
	assert!(peer.session.validate(CacheAddr::new(exec, CacheSlot::LineInfo(1)), None));
	peer.session.validate(CacheAddr::new(exec, CacheSlot::LineInfo(3)), None);
	let lines = &peer.session.exec(exec).unwrap().line_info;
	assert!(lines.contains(&1) && lines.contains(&3));
	assert!(!lines.contains(&2));
}

#[test]
fn memory_change_drops_idle_lookups() {
	let mut peer = Peer::new(PeerServices::all());
	let exec = peer.suspended("P1", Some(0x400));
	peer.session.validate(CacheAddr::new(exec, CacheSlot::LineInfo(1)), None);
	let (token, _) = peer.single();
	peer.reply(token, Reply::CodeAreas(Vec::new()));
	let pending = CacheAddr::new(exec, CacheSlot::LineInfo(2));
	peer.session.validate(pending, None);
	let (stale, _) = peer.single();

	peer.event(PeerEvent::MemoryChanged {
		context: "P1".into(),
		ranges: Vec::new(),
	});
	let lines = &peer.session.exec(exec).unwrap().line_info;
	assert!(!lines.contains(&1));
	assert!(lines.contains(&2));

	// The restarted lookup asks again.
	peer.session.validate(pending, None);
	let (_, command) = peer.single();
	assert!(matches!(command, Command::LineNumbersMapToSource { start: 2, .. }));
	assert_eq!(peer.sent().len(), 0);
	assert_eq!(peer.cancelled, vec![stale]);
}
