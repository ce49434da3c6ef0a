//! Grant-set resolution
//!
//! Materializes an actor's complete grant set in one pass so a client can
//! answer every capability check from memory. This is an optimization of
//! [`evaluate_capability`](crate::evaluation::evaluate_capability), not a
//! second policy: for every capability `c`,
//! `resolve_grant_set(..).allows(c)` equals the evaluator's decision.

use crate::evaluation::{own_rows, require_scope};
use crate::store::OverrideRow;
use rcms_core::{Actor, GrantSet, Result, ScopeId, SuperuserOverrides, Tier};

/// Resolve the grant set of `actor` acting in `scope`.
pub fn resolve_grant_set(
    actor: &Actor,
    scope: Option<&ScopeId>,
    overrides: &[OverrideRow],
    superuser_overrides: SuperuserOverrides,
) -> Result<GrantSet> {
    match actor.tier {
        Tier::Superuser => {
            if superuser_overrides == SuperuserOverrides::Ignore {
                return Ok(GrantSet::AllCapabilities);
            }
            let rows: Vec<&OverrideRow> = own_rows(actor, overrides).collect();
            if rows.is_empty() {
                Ok(GrantSet::AllCapabilities)
            } else {
                Ok(GrantSet::from_capabilities(
                    rows.into_iter().map(|row| row.capability.clone()),
                ))
            }
        }
        Tier::Member => Ok(GrantSet::empty()),
        Tier::ScopeAdmin => {
            let scope = require_scope(actor, scope)?;
            // No default-allow on an empty result.
            Ok(GrantSet::from_capabilities(
                own_rows(actor, overrides)
                    .filter(|row| row.applies_in(scope))
                    .map(|row| row.capability.clone()),
            ))
        }
    }
}

/// Whether resolving `actor` needs override rows at all under `policy`
pub fn needs_overrides(actor: &Actor, superuser_overrides: SuperuserOverrides) -> bool {
    match actor.tier {
        Tier::Member => false,
        Tier::Superuser => superuser_overrides == SuperuserOverrides::Narrow,
        Tier::ScopeAdmin => true,
    }
}
