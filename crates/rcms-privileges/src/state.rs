//! Observable cache state
//!
//! UI code reads these types; it never mutates cache internals.

use rcms_core::{ActorId, GrantSet, RcmsError};
use std::sync::Arc;
use std::time::Instant;

/// One installed generation of an actor's grant set.
///
/// Immutable once published; a refresh installs a new entry instead of
/// mutating this one.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Actor the grant set belongs to
    pub actor_id: ActorId,
    /// Resolved grants
    pub grant_set: Arc<GrantSet>,
    /// When the fetch that produced this entry settled
    pub fetched_at: Instant,
    /// Generation number; strictly increases across installed entries
    pub generation: u64,
}

impl CacheEntry {
    /// Decision function for this generation
    #[inline]
    pub fn allows(&self, capability: &str) -> bool {
        self.grant_set.allows(capability)
    }
}

/// Lifecycle phase of the cache for the bound actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePhase {
    /// Nothing held, nothing in flight
    Empty,
    /// First fetch in flight
    Loading,
    /// Grant set held
    Ready,
    /// Grant set held and a newer fetch in flight
    Refreshing,
}

/// Snapshot of the cache for observability and auditing
#[derive(Debug, Clone)]
pub struct CacheStatus {
    /// Current phase
    pub phase: CachePhase,
    /// Generation being served, if any
    pub generation: Option<u64>,
    /// The served grant set outlived a failed refresh
    pub stale: bool,
    /// Most recent fetch failure, cleared by the next success
    pub last_error: Option<RcmsError>,
}

/// Answer a capability-gated UI element renders from.
///
/// Only `Allowed` enables a control; `Pending` and `Unavailable` render
/// disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Granted by the current generation
    Allowed,
    /// Not granted by the current generation
    Denied,
    /// No answer resolved yet
    Pending,
    /// The fetch failed and there is nothing to serve
    Unavailable,
}

impl PermissionState {
    /// Whether a gated control should be enabled
    #[inline]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}
