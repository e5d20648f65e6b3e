//! Demand-driven asynchronous cache primitives.
//!
//! # Purpose
//!
//! - Owns: memoized values fetched through exactly one outstanding remote command, keyed
//!   collections of entities whose identity survives recomputation, bounded recency-ordered
//!   lookup tables, and the partition plan for oversized collections.
//! - Does not own: issuing commands, knowing what a value means, or running waiters. The
//!   caller (the model's dispatch loop) does all three.
//!
//! # Mental model
//!
//! A cache is a small state machine `Empty -> Pending -> Valid`. The caller drives it:
//! `mark_suspended` / `mark_issued` when a retrieval starts, `complete` when a command
//! finishes, `reset` when an event invalidates it. Every transition that releases waiters
//! or abandons a command returns a [`Transition`] the caller must act on: post the waiters,
//! cancel the command. Nothing here ever calls back into the caller.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`AsyncValueCache`] | One memoized value or error | At most one outstanding token | `validate` / completion / event handlers |
//! | [`KeyedChildSet`] | Ordered key -> entity snapshot | Entities reused per key until retired | Child list completions |
//! | [`LookupCache`] | Address-keyed caches in LRU order | Idle size never above bound; pending never evicted | Lookup validation, eviction ticks |
//! | [`partition::plan`] | Split of a large index range | Fanout 100 per level | Array children |
//!
//! # Invariants
//!
//! - A completion commits only if its token is the cache's current outstanding token.
//! - `Valid` holds a value or an error, never both; waiters exist only while not `Valid`.
//! - A disposed cache stays `Valid(Err(Disposed))` and refuses every transition.
//! - An entity leaves a [`KeyedChildSet`] only after two consecutive commits without its key,
//!   when the retired pool overflows its margin, or when the set is cleared.

mod child_set;
mod error;
mod lookup;
pub mod partition;
mod value;

pub use child_set::{Commit, KeyedChildSet};
pub use error::CacheError;
pub use lookup::LookupCache;
pub use value::{AsyncValueCache, CacheControl, CacheState, Phase, Transition, Waiters};
