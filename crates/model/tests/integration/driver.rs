use std::time::Duration;

use pretty_assertions::assert_eq;
use remora_cache::Phase;
use remora_model::{CacheAddr, CacheSlot, DispatchHandle, DriverError, ModelConfig, MpscChannel, Outbound, Session, SessionDriver};
use remora_proto::{Command, PeerEvent, PeerServices};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::common::{context, ids, suspend};

fn spawn() -> (DispatchHandle, UnboundedReceiver<Outbound>, JoinHandle<Session>) {
	let _ = tracing_subscriber::fmt::try_init();
	let (channel, outbound) = MpscChannel::new(PeerServices::all());
	let (driver, handle) = SessionDriver::new(Session::new(channel, ModelConfig::default()));
	(handle, outbound, tokio::spawn(driver.run()))
}

async fn suspended(handle: &DispatchHandle, id: &str) -> CacheAddr {
	handle.event(PeerEvent::ContextAdded { contexts: vec![context(id, None)] }).unwrap();
	handle.event(suspend(id, Some(0x400))).unwrap();
	let id = id.to_owned();
	let exec = handle.query(move |session| session.find(&id)).await.unwrap().unwrap();
	CacheAddr::new(exec, CacheSlot::StackTrace)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn completions_flow_through_the_loop() {
	let (handle, mut outbound, task) = spawn();
	let stack = suspended(&handle, "P1").await;

	assert!(!handle.query(move |session| session.validate(stack, None)).await.unwrap());
	let Some(Outbound::Send { token, command }) = outbound.recv().await else {
		panic!("expected a command");
	};
	assert!(matches!(command, Command::StackTraceGetChildrenRange { .. }));

	handle.complete(token, Ok(ids(&["F1", "F2"]))).unwrap();
	let frames = handle
		.query(move |session| {
			let frames = session.children(stack).unwrap_or_default();
			frames.into_iter().map(|idx| session.node(idx).unwrap().id.to_string()).collect::<Vec<_>>()
		})
		.await
		.unwrap();
	assert_eq!(frames, vec!["F1", "F2"]);

	handle.shutdown();
	assert!(task.await.unwrap().is_closed());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn timers_run_off_the_tokio_clock() {
	let (handle, mut outbound, task) = spawn();
	let stack = suspended(&handle, "P1").await;
	handle.call(move |session| {
		session.validate(stack, None);
	})
	.unwrap();
	let Some(Outbound::Send { token, .. }) = outbound.recv().await else {
		panic!("expected a command");
	};
	handle.complete(token, Ok(ids(&["F1"]))).unwrap();

	handle.event(PeerEvent::ContextResumed { id: "P1".into() }).unwrap();
	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(handle.query(move |session| session.phase(stack)).await.unwrap(), Some(Phase::Valid));

	tokio::time::sleep(Duration::from_millis(400)).await;
	assert_eq!(handle.query(move |session| session.phase(stack)).await.unwrap(), Some(Phase::Empty));

	handle.shutdown();
	task.await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_cancels_outstanding_commands() {
	let (handle, mut outbound, task) = spawn();
	let stack = suspended(&handle, "P1").await;
	handle.query(move |session| session.validate(stack, None)).await.unwrap();
	let Some(Outbound::Send { token, .. }) = outbound.recv().await else {
		panic!("expected a command");
	};

	handle.shutdown();
	let session = task.await.unwrap();
	assert!(session.is_closed());
	assert_eq!(session.outstanding_commands(), 0);
	assert_eq!(outbound.recv().await, Some(Outbound::Cancel(token)));

	assert!(handle.is_stopped());
	assert_eq!(handle.query(|session| session.node_count()).await, Err(DriverError::Stopped));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_every_handle_stops_the_loop() {
	let (handle, _outbound, task) = spawn();
	let other = handle.clone();
	drop(handle);
	other.event(PeerEvent::ContextAdded { contexts: vec![context("P1", None)] }).unwrap();
	drop(other);

	let session = task.await.unwrap();
	assert!(session.is_closed());
	assert_eq!(session.find("P1"), None);
}
