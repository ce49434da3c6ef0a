//! Actors and their coarse role tiers

use crate::identifiers::{ActorId, ScopeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse role class of an actor.
///
/// Tiers are checked in a fixed order by the evaluator: Superuser, then
/// Member, then ScopeAdmin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Global administrator; no fixed scope
    Superuser,
    /// Administrator confined to a scope, governed by override rows
    ScopeAdmin,
    /// Regular user; holds no administrative capabilities
    Member,
}

impl Tier {
    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Superuser => "SUPERUSER",
            Self::ScopeAdmin => "SCOPE_ADMIN",
            Self::Member => "MEMBER",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated identity supplied by the login/session component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier
    pub id: ActorId,
    /// Role tier
    pub tier: Tier,
    /// Home scope; absent for superusers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<ScopeId>,
}

impl Actor {
    /// Superuser with no fixed scope
    pub fn superuser(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            tier: Tier::Superuser,
            scope_id: None,
        }
    }

    /// Administrator of `scope_id`
    pub fn scope_admin(id: impl Into<ActorId>, scope_id: impl Into<ScopeId>) -> Self {
        Self {
            id: id.into(),
            tier: Tier::ScopeAdmin,
            scope_id: Some(scope_id.into()),
        }
    }

    /// Regular member with no home scope; see [`Actor::with_scope`]
    pub fn member(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            tier: Tier::Member,
            scope_id: None,
        }
    }

    /// Attach a home scope
    pub fn with_scope(mut self, scope_id: impl Into<ScopeId>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    /// Resolve the scope a request applies to: the explicit one, else home.
    pub fn effective_scope<'a>(&'a self, requested: Option<&'a ScopeId>) -> Option<&'a ScopeId> {
        requested.or(self.scope_id.as_ref())
    }
}
