//! Policy store: the privilege override table
//!
//! Rows are unique on `(actor_id, scope_id, capability)`. A row with no scope
//! is an unscoped grant that applies in every scope of its actor. The store
//! is the system of record and owns its own concurrency control; everything
//! above it is stateless.

use async_trait::async_trait;
use rcms_core::{ActorId, Capability, RcmsError, ScopeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// An explicitly granted capability for an actor, optionally scoped
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverrideRow {
    /// Actor holding the grant
    pub actor_id: ActorId,
    /// Scope the grant is confined to; `None` applies everywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
    /// Granted capability
    pub capability: Capability,
}

impl OverrideRow {
    /// Build a row
    pub fn new(actor_id: ActorId, scope_id: Option<ScopeId>, capability: Capability) -> Self {
        Self {
            actor_id,
            scope_id,
            capability,
        }
    }

    /// Whether this row is visible when acting in `scope`
    #[inline]
    pub fn applies_in(&self, scope: &ScopeId) -> bool {
        self.scope_id.as_ref().map_or(true, |own| own == scope)
    }
}

/// Difference produced by an override write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideChange {
    /// Actor whose rows changed
    pub actor_id: ActorId,
    /// Scope the write targeted
    pub scope_id: Option<ScopeId>,
    /// Capabilities newly granted
    pub added: BTreeSet<Capability>,
    /// Capabilities no longer granted
    pub removed: BTreeSet<Capability>,
}

impl OverrideChange {
    /// A change that altered nothing
    pub fn unchanged(actor_id: ActorId, scope_id: Option<ScopeId>) -> Self {
        Self {
            actor_id,
            scope_id,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// True if no row was added or removed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Error type for policy store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable
    #[error("store unreachable: {0}")]
    Unreachable(String),
    /// Backend rejected the operation
    #[error("store operation failed: {0}")]
    Backend(String),
}

impl From<StoreError> for RcmsError {
    fn from(err: StoreError) -> Self {
        RcmsError::store_unavailable(err.to_string())
    }
}

/// Read/write access to the override table
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Every row held by `actor_id`, across all scopes
    async fn overrides_for_actor(&self, actor_id: &ActorId) -> Result<Vec<OverrideRow>, StoreError>;

    /// Rows of `actor_id` visible in `scope`: scoped to it, or unscoped
    async fn overrides_in_scope(
        &self,
        actor_id: &ActorId,
        scope: &ScopeId,
    ) -> Result<Vec<OverrideRow>, StoreError> {
        let rows = self.overrides_for_actor(actor_id).await?;
        Ok(rows.into_iter().filter(|row| row.applies_in(scope)).collect())
    }

    /// Replace the actor's rows for exactly `scope` with `capabilities`
    async fn replace_overrides(
        &self,
        actor_id: &ActorId,
        scope: Option<&ScopeId>,
        capabilities: BTreeSet<Capability>,
    ) -> Result<OverrideChange, StoreError>;

    /// Delete the actor's rows for `scope`, or all of them when `scope` is `None`
    async fn delete_overrides(
        &self,
        actor_id: &ActorId,
        scope: Option<&ScopeId>,
    ) -> Result<Vec<OverrideRow>, StoreError>;
}

/// In-memory override table
pub struct MemoryPolicyStore {
    rows: RwLock<BTreeSet<OverrideRow>>,
    available: AtomicBool,
}

impl MemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_rows(std::iter::empty())
    }

    /// Create a store seeded with `rows`; duplicates collapse
    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = OverrideRow>,
    {
        Self {
            rows: RwLock::new(rows.into_iter().collect()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every operation fails with `Unreachable` until restored
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn overrides_for_actor(&self, actor_id: &ActorId) -> Result<Vec<OverrideRow>, StoreError> {
        self.ensure_available()?;
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| &row.actor_id == actor_id)
            .cloned()
            .collect())
    }

    async fn replace_overrides(
        &self,
        actor_id: &ActorId,
        scope: Option<&ScopeId>,
        capabilities: BTreeSet<Capability>,
    ) -> Result<OverrideChange, StoreError> {
        self.ensure_available()?;
        let mut rows = self.rows.write().await;

        let existing: BTreeSet<Capability> = rows
            .iter()
            .filter(|row| &row.actor_id == actor_id && row.scope_id.as_ref() == scope)
            .map(|row| row.capability.clone())
            .collect();

        let removed: BTreeSet<Capability> =
            existing.difference(&capabilities).cloned().collect();
        let added: BTreeSet<Capability> = capabilities.difference(&existing).cloned().collect();

        rows.retain(|row| {
            !(&row.actor_id == actor_id
                && row.scope_id.as_ref() == scope
                && removed.contains(&row.capability))
        });
        for capability in &added {
            rows.insert(OverrideRow::new(
                actor_id.clone(),
                scope.cloned(),
                capability.clone(),
            ));
        }

        Ok(OverrideChange {
            actor_id: actor_id.clone(),
            scope_id: scope.cloned(),
            added,
            removed,
        })
    }

    async fn delete_overrides(
        &self,
        actor_id: &ActorId,
        scope: Option<&ScopeId>,
    ) -> Result<Vec<OverrideRow>, StoreError> {
        self.ensure_available()?;
        let mut rows = self.rows.write().await;
        let matches = |row: &OverrideRow| {
            &row.actor_id == actor_id && scope.map_or(true, |s| row.scope_id.as_ref() == Some(s))
        };
        let deleted: Vec<OverrideRow> = rows.iter().filter(|row| matches(row)).cloned().collect();
        rows.retain(|row| !matches(row));
        Ok(deleted)
    }
}
