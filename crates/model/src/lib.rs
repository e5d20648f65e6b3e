//! Demand-driven model of a remote debuggee.
//!
//! # Purpose
//!
//! - Owns: the tree of debug entities (launch root, execution contexts, stack frames,
//!   expressions, registers, symbols, modules, array partitions), the caches each entity
//!   fetches its remote state into, identity resolution, the reaction of every cache to
//!   peer events, and the single-threaded dispatch loop all of it runs on.
//! - Does not own: the transport to the peer, rendering, or the front end's view protocol.
//!   Front ends read caches through [`Session::validate`] and the node accessors and drain
//!   [`ModelDelta`]s to learn what to refresh.
//!
//! # Mental model
//!
//! Every piece of remote state is a cache addressed by [`CacheAddr`] (node + slot).
//! Reading one is `validate(addr, waiter)`: `true` means settled, `false` means a command is
//! in flight (or the retrieval is parked on another cache) and `waiter` will be posted when
//! it settles. Retrievals that need other caches validate them with themselves as waiter and
//! simply run again from the top when woken. There are no locks and no blocking: all state
//! lives in one [`Session`], driven either directly (tests, embedding) or by
//! [`SessionDriver`] on a tokio task.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`Session`] | Per-run state: arena, registry, in-flight commands, timers | Touched only from the dispatch thread | [`Session::new`], [`SessionDriver`] |
//! | [`NodeIdx`] | Generation-checked arena index | Stale after disposal | arena insert |
//! | [`Node`] / [`NodeKind`] | One entity and its caches | Closed set of kinds | child set commits, resolution, events |
//! | [`CacheAddr`] | Address of one cache | Lookup slots are created on demand | everywhere |
//! | [`Waiter`] | Continuation posted when a cache settles | Never run inline | validate, resolve |
//! | [`ModelConfig`] | Tunables loaded from TOML | Defaults match a typical agent | startup |
//!
//! # Invariants
//!
//! - A completion commits only while its token is the cache's outstanding token.
//! - Waiters are posted to the ready queue and drained by [`Session::run_pending`], never
//!   called from inside the transition that released them.
//! - Children are disposed before their parent, and a disposed node is absent from the
//!   identity registry.
//! - Once the peer rejects the windowed stack command, the session never issues it again.
//! - Idle lookup caches never exceed their bound; pending lookups are never evicted.
//!
//! # Data flow
//!
//! Demand flows down: front end -> `validate` -> retrieval -> `RemoteChannel::send`.
//! Results flow up: `deliver` -> cache completion -> waiters posted -> `run_pending` ->
//! parked retrievals re-run. Invalidation flows from [`remora_proto::PeerEvent`] through
//! [`Session::handle_event`] into cache resets, whose waiters re-validate.
//!
//! # Lifecycle
//!
//! [`Session::new`] creates the launch root. Nodes appear when a child list names them, when
//! an event adds them, or when [`Session::resolve`] walks an unknown id up to a known ancestor.
//! They disappear when absent from two consecutive child list fetches, when the peer removes
//! them, or at [`Session::shutdown`].
//!
//! # Concurrency and ordering
//!
//! Single logical thread. Cross-thread callers go through [`DispatchHandle`], whose messages
//! are processed one at a time in arrival order; posted waiters run after each message.
//!
//! # Failure modes
//!
//! Errors are data. A failed command settles its cache to `Valid(Err)`; dependents copy the
//! error. Nothing in the model is fatal; a failed cache reports its error until reset.

mod arena;
mod capability;
mod config;
mod delta;
mod driver;
mod invariants;
mod node;
mod session;
mod waiter;

pub use arena::NodeIdx;
pub use capability::{Capabilities, WindowedStack};
pub use config::{ConfigError, ModelConfig};
pub use delta::{DeltaFlags, ModelDelta};
pub use driver::{DispatchHandle, DriverError, Inbound, MpscChannel, Outbound, SessionDriver};
pub use node::{
	CacheAddr, CacheSlot, ChildSet, ExecNode, ExprNode, ExprOrigin, FrameNode, FuncInfo, LaunchNode, LineInfo, ModuleNode, Node, NodeKind, NodeTag, PartitionNode,
	RegisterNode, SymbolNode, ValueCache,
};
pub use session::{BlockId, MemoryBlock, Resolved, Session, WatchId};
pub use waiter::Waiter;
