//! Privilege Endpoint Trait Definitions
//!
//! Request/response contracts for the two server operations the client
//! resolution cache consumes. The contracts are transport-agnostic: the
//! server crate implements [`PrivilegeEndpoint`] directly, and any transport
//! adapter can implement it by forwarding.
//!
//! # Effect Classification
//!
//! - **Category**: Application Effect
//! - **Implementation**: `rcms-authorization` (`PrivilegeService`)
//! - **Usage**: `rcms-privileges` (`ResolutionCache`), ad-hoc single checks
//!
//! `FetchGrantSet` is the preferred call; `EvaluateCapability` exists for
//! single checks where fetching the whole grant set is unwarranted.

use crate::capability::{Capability, GrantSet};
use crate::errors::Result;
use crate::identifiers::{ActorId, ScopeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `EvaluateCapability(actor_id, scope_id?, capability)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateCapabilityRequest {
    /// Actor being checked
    pub actor_id: ActorId,
    /// Scope of the action; defaults to the actor's home scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
    /// Capability being requested
    pub capability: Capability,
}

/// `{ allowed: bool }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateCapabilityResponse {
    /// Decision
    pub allowed: bool,
}

/// `FetchGrantSet(actor_id, scope_id?)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchGrantSetRequest {
    /// Actor whose grant set is resolved
    pub actor_id: ActorId,
    /// Scope to resolve for; defaults to the actor's home scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
}

/// `{ capabilities: [] | "All" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchGrantSetResponse {
    /// Resolved grant set
    pub capabilities: GrantSet,
}

/// Server operations consumed by the client resolution cache
#[async_trait]
pub trait PrivilegeEndpoint: Send + Sync {
    /// Decide a single capability
    async fn evaluate_capability(
        &self,
        request: EvaluateCapabilityRequest,
    ) -> Result<EvaluateCapabilityResponse>;

    /// Resolve the actor's complete grant set in one call
    async fn fetch_grant_set(&self, request: FetchGrantSetRequest)
        -> Result<FetchGrantSetResponse>;
}

/// Blanket implementation for Arc<T> where T: PrivilegeEndpoint
#[async_trait]
impl<T: PrivilegeEndpoint + ?Sized> PrivilegeEndpoint for Arc<T> {
    async fn evaluate_capability(
        &self,
        request: EvaluateCapabilityRequest,
    ) -> Result<EvaluateCapabilityResponse> {
        (**self).evaluate_capability(request).await
    }

    async fn fetch_grant_set(
        &self,
        request: FetchGrantSetRequest,
    ) -> Result<FetchGrantSetResponse> {
        (**self).fetch_grant_set(request).await
    }
}
