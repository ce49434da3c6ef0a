//! Privilege service
//!
//! Stateless request handler over a [`PolicyStore`] and an [`ActorDirectory`].
//! Implements the two read operations of [`PrivilegeEndpoint`] plus override
//! administration. Every successful override write that changes something is
//! published on a change feed so in-process clients can invalidate their
//! caches.

use crate::directory::ActorDirectory;
use crate::evaluation::evaluate_capability;
use crate::grant_set::{needs_overrides, resolve_grant_set};
use crate::store::{OverrideChange, OverrideRow, PolicyStore};
use async_trait::async_trait;
use rcms_core::{
    Actor, ActorId, Capability, CapabilityCatalog, EvaluateCapabilityRequest,
    EvaluateCapabilityResponse, FetchGrantSetRequest, FetchGrantSetResponse, PrivilegeConfig,
    PrivilegeEndpoint, RcmsError, Result, ScopeId, SuperuserOverrides, Tier,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Server-side privilege resolution endpoint
pub struct PrivilegeService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    superuser_overrides: SuperuserOverrides,
    catalog: CapabilityCatalog,
    changes: broadcast::Sender<OverrideChange>,
}

impl<S, D> PrivilegeService<S, D>
where
    S: PolicyStore,
    D: ActorDirectory,
{
    /// Create a service using the default capability catalog
    pub fn new(store: Arc<S>, directory: Arc<D>, config: &PrivilegeConfig) -> Self {
        let (changes, _) = broadcast::channel(config.bridge.channel_capacity.max(1));
        Self {
            store,
            directory,
            superuser_overrides: config.policy.superuser_overrides,
            catalog: CapabilityCatalog::default(),
            changes,
        }
    }

    /// Replace the capability catalog used to validate override writes
    pub fn with_catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Capability catalog in use
    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Superuser override policy in use
    pub fn superuser_overrides(&self) -> SuperuserOverrides {
        self.superuser_overrides
    }

    /// Subscribe to non-empty override changes
    pub fn subscribe_changes(&self) -> broadcast::Receiver<OverrideChange> {
        self.changes.subscribe()
    }

    async fn resolve_actor(&self, actor_id: &ActorId) -> Result<Actor> {
        self.directory
            .resolve(actor_id)
            .await?
            .ok_or_else(|| RcmsError::actor_not_found(actor_id.as_str()))
    }

    /// Rows the decision for `actor` depends on; skips the store when the
    /// tier decides on its own.
    async fn visible_overrides(
        &self,
        actor: &Actor,
        scope: Option<&ScopeId>,
    ) -> Result<Vec<OverrideRow>> {
        if !needs_overrides(actor, self.superuser_overrides) {
            return Ok(Vec::new());
        }
        let rows = match (actor.tier, scope) {
            (Tier::ScopeAdmin, Some(scope)) => {
                self.store.overrides_in_scope(&actor.id, scope).await?
            }
            // Missing scope is rejected by the evaluator.
            (Tier::ScopeAdmin, None) => Vec::new(),
            _ => self.store.overrides_for_actor(&actor.id).await?,
        };
        Ok(rows)
    }

    /// Replace the override rows of `actor_id` for exactly `scope_id`.
    ///
    /// Capabilities must be known to the catalog or be the `"All"` token.
    /// Under the `ignore` superuser policy, writes targeting a superuser are
    /// a no-op.
    pub async fn replace_overrides(
        &self,
        actor_id: &ActorId,
        scope_id: Option<ScopeId>,
        capabilities: Vec<Capability>,
    ) -> Result<OverrideChange> {
        let actor = self.resolve_actor(actor_id).await?;

        if let Some(unknown) = capabilities
            .iter()
            .find(|cap| !cap.is_all_token() && !self.catalog.contains(cap.as_str()))
        {
            return Err(RcmsError::invalid(format!("unknown capability: {unknown}")));
        }

        if actor.tier == Tier::Superuser && self.superuser_overrides == SuperuserOverrides::Ignore
        {
            tracing::info!(
                actor = %actor.id,
                "superuser holds every capability; override write ignored"
            );
            return Ok(OverrideChange::unchanged(actor.id, scope_id));
        }
        if actor.tier == Tier::Member {
            tracing::debug!(actor = %actor.id, "override rows for a member have no effect");
        }

        let capabilities: BTreeSet<Capability> = capabilities.into_iter().collect();
        let change = self
            .store
            .replace_overrides(&actor.id, scope_id.as_ref(), capabilities)
            .await?;
        self.publish(&change);
        Ok(change)
    }

    /// Delete the override rows of `actor_id` for `scope_id`, or all of them.
    pub async fn delete_overrides(
        &self,
        actor_id: &ActorId,
        scope_id: Option<ScopeId>,
    ) -> Result<OverrideChange> {
        let actor = self.resolve_actor(actor_id).await?;
        let deleted = self
            .store
            .delete_overrides(&actor.id, scope_id.as_ref())
            .await?;
        if deleted.is_empty() {
            return Err(RcmsError::not_found(format!(
                "no override rows for actor {}",
                actor.id
            )));
        }

        let change = OverrideChange {
            actor_id: actor.id,
            scope_id,
            added: BTreeSet::new(),
            removed: deleted.into_iter().map(|row| row.capability).collect(),
        };
        self.publish(&change);
        Ok(change)
    }

    fn publish(&self, change: &OverrideChange) {
        if change.is_empty() {
            return;
        }
        tracing::info!(
            actor = %change.actor_id,
            scope = ?change.scope_id,
            added = change.added.len(),
            removed = change.removed.len(),
            "override rows changed"
        );
        // No subscribers is fine.
        let _ = self.changes.send(change.clone());
    }
}

#[async_trait]
impl<S, D> PrivilegeEndpoint for PrivilegeService<S, D>
where
    S: PolicyStore + 'static,
    D: ActorDirectory + 'static,
{
    async fn evaluate_capability(
        &self,
        request: EvaluateCapabilityRequest,
    ) -> Result<EvaluateCapabilityResponse> {
        let actor = self.resolve_actor(&request.actor_id).await?;
        let scope = actor.effective_scope(request.scope_id.as_ref()).cloned();
        let rows = self.visible_overrides(&actor, scope.as_ref()).await?;
        let decision = evaluate_capability(
            &actor,
            scope.as_ref(),
            &request.capability,
            &rows,
            self.superuser_overrides,
        )?;
        tracing::debug!(
            actor = %actor.id,
            tier = %actor.tier,
            capability = %request.capability,
            ?decision,
            "evaluated capability"
        );
        Ok(EvaluateCapabilityResponse {
            allowed: decision.is_allowed(),
        })
    }

    async fn fetch_grant_set(
        &self,
        request: FetchGrantSetRequest,
    ) -> Result<FetchGrantSetResponse> {
        let actor = self.resolve_actor(&request.actor_id).await?;
        let scope = actor.effective_scope(request.scope_id.as_ref()).cloned();
        let rows = self.visible_overrides(&actor, scope.as_ref()).await?;
        let capabilities =
            resolve_grant_set(&actor, scope.as_ref(), &rows, self.superuser_overrides)?;
        tracing::debug!(
            actor = %actor.id,
            tier = %actor.tier,
            grants = %capabilities,
            "resolved grant set"
        );
        Ok(FetchGrantSetResponse { capabilities })
    }
}
