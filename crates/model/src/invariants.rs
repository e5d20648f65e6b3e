//! Invariant catalog for [`crate::Session`].
#![allow(dead_code)]

/// Must commit a completion only while its token is the cache's outstanding token.
///
/// - Enforced in: [`remora_cache::AsyncValueCache::complete`], [`remora_cache::KeyedChildSet::commit`]
/// - Tested by: `session::tests::reset_cancels_outstanding_command`, `session::tests::late_completion_after_reset_is_dropped`
/// - Failure symptom: A value fetched before an event overwrites the state the event announced.
pub(crate) const TOKEN_GUARDED_COMPLETION: () = ();

/// Must post released waiters to the ready queue and run them only from [`crate::Session::run_pending`].
///
/// - Enforced in: `Session::apply`, `Session::finish`
/// - Tested by: `session::tests::waiters_run_only_from_ready_queue`
/// - Failure symptom: A front-end callback mutates the session while a cache transition is half applied.
pub(crate) const WAITERS_RUN_FROM_READY_QUEUE: () = ();

/// Must dispose children before their parent and drop a disposed node from the identity registry.
///
/// - Enforced in: `Session::dispose_node`, `Session::teardown`
/// - Tested by: `session::tests::removing_context_disposes_its_frames_first`, `session::tests::shutdown_disposes_everything`
/// - Failure symptom: [`crate::Session::find`] returns a node whose caches read as disposed, or a frame outlives its context.
pub(crate) const CHILDREN_DISPOSED_FIRST: () = ();

/// Must never issue the windowed stack command again once the peer rejected it.
///
/// - Enforced in: `Session::complete_stack`, [`crate::Capabilities`]
/// - Tested by: `session::tests::windowed_stack_falls_back_once`
/// - Failure symptom: Every suspend costs an extra round trip that always fails.
pub(crate) const WINDOWED_STACK_FALLBACK_IS_STICKY: () = ();

/// Must show a suspended context with at least one frame.
///
/// - Enforced in: `Session::complete_stack`, `Session::retrieve_stack`
/// - Tested by: `session::tests::empty_stack_gets_stand_in_frame`, `stack::stack_without_service_is_emulated`
/// - Failure symptom: A stopped thread shows no location and no locals.
pub(crate) const SUSPENDED_CONTEXT_HAS_A_FRAME: () = ();

/// Must keep idle lookup caches within their bound and never evict a pending lookup.
///
/// - Enforced in: [`remora_cache::LookupCache::entry`], [`remora_cache::LookupCache::trim`]
/// - Tested by: `session::tests::lookup_cache_respects_bound`, `lookup::pending_lookups_survive_eviction`
/// - Failure symptom: Unbounded memory growth while stepping, or waiters that never wake.
pub(crate) const LOOKUPS_BOUNDED: () = ();

/// Must share one resolution between concurrent requests for the same id.
///
/// - Enforced in: [`crate::Session::resolve`]
/// - Tested by: `resolve::concurrent_requests_share_one_probe`
/// - Failure symptom: Duplicate nodes for one remote entity, or redundant probe traffic.
pub(crate) const SINGLE_RESOLUTION_PER_ID: () = ();

/// Must not announce a resume until it has held for the resume debounce.
///
/// - Enforced in: `Session::fire`
/// - Tested by: `events::resume_is_confirmed_after_debounce`, `events::quick_resume_and_suspend_keeps_stack`
/// - Failure symptom: The stack view flickers empty on every step.
pub(crate) const RESUME_DEBOUNCED: () = ();
