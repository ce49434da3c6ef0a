//! Policy evaluation logic
//!
//! Pure, tier-dispatched decision over an actor's override rows. Tiers are
//! checked in a fixed order: Superuser, Member, ScopeAdmin.

use crate::store::OverrideRow;
use rcms_core::{Actor, Capability, RcmsError, Result, ScopeId, SuperuserOverrides, Tier};

/// Result of policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Access is allowed
    Allow,
    /// Access is denied
    Deny,
}

impl Decision {
    /// True for `Allow`
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// Evaluate whether `actor` may perform `capability` in `scope`.
///
/// `overrides` are the rows visible to the actor; rows belonging to other
/// actors are ignored. `scope` is required for scope administrators and
/// ignored for every other tier.
pub fn evaluate_capability(
    actor: &Actor,
    scope: Option<&ScopeId>,
    capability: &Capability,
    overrides: &[OverrideRow],
    superuser_overrides: SuperuserOverrides,
) -> Result<Decision> {
    match actor.tier {
        Tier::Superuser => Ok(evaluate_superuser(
            actor,
            capability,
            overrides,
            superuser_overrides,
        )),
        Tier::Member => Ok(Decision::Deny),
        Tier::ScopeAdmin => {
            let scope = require_scope(actor, scope)?;
            let granted = own_rows(actor, overrides)
                .filter(|row| row.applies_in(scope))
                .any(|row| row.capability.grants(capability.as_str()));
            Ok(Decision::from_bool(granted))
        }
    }
}

/// Superusers are allowed unless narrowed by their own rows.
fn evaluate_superuser(
    actor: &Actor,
    capability: &Capability,
    overrides: &[OverrideRow],
    superuser_overrides: SuperuserOverrides,
) -> Decision {
    if superuser_overrides == SuperuserOverrides::Ignore {
        return Decision::Allow;
    }

    let mut rows = own_rows(actor, overrides).peekable();
    if rows.peek().is_none() {
        return Decision::Allow;
    }
    Decision::from_bool(rows.any(|row| row.capability.grants(capability.as_str())))
}

pub(crate) fn own_rows<'a>(
    actor: &'a Actor,
    overrides: &'a [OverrideRow],
) -> impl Iterator<Item = &'a OverrideRow> + 'a {
    overrides.iter().filter(move |row| row.actor_id == actor.id)
}

pub(crate) fn require_scope<'a>(actor: &Actor, scope: Option<&'a ScopeId>) -> Result<&'a ScopeId> {
    scope.ok_or_else(|| {
        RcmsError::invalid(format!(
            "scope is required for scope administrator {}",
            actor.id
        ))
    })
}
