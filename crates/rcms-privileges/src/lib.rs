#![deny(clippy::await_holding_lock)]
//! # RCMS Privileges - Client-Side Privilege Resolution
//!
//! Answers "may the current actor do X" for every permission-gated UI
//! element from one cached grant set, fetched once per generation.
//!
//! - [`cache`]: the coalescing [`ResolutionCache`]
//! - [`bridge`]: the [`InvalidationBridge`] that keeps the cache in step with
//!   session sign-in, role change, forced refresh and sign-out
//! - [`state`]: read-only views of the cache for rendering and auditing

pub mod bridge;
pub mod cache;
pub mod state;

pub use bridge::{dispatch, BridgeSubscription, InvalidationBridge, SessionChannel, SessionSignal};
pub use cache::{Binding, PendingRefresh, ResolutionCache};
pub use state::{CacheEntry, CachePhase, CacheStatus, PermissionState};
