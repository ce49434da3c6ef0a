//! # RCMS Core - Privilege Types and Contracts
//!
//! Shared vocabulary for privilege resolution: actors and tiers, capabilities
//! and grant sets, the capability catalog, the unified error type, layered
//! configuration, and the request/response contracts of the privilege
//! endpoint.

pub mod actor;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod protocol;

pub use actor::{Actor, Tier};
pub use capability::{Capability, GrantSet, ALL_TOKEN};
pub use catalog::{category_of, CapabilityCatalog};
pub use config::{
    BridgeSettings, ClientSettings, PolicySettings, PrivilegeConfig, RcmsConfig,
    SuperuserOverrides,
};
pub use errors::{RcmsError, Result};
pub use identifiers::{ActorId, ScopeId};
pub use protocol::{
    EvaluateCapabilityRequest, EvaluateCapabilityResponse, FetchGrantSetRequest,
    FetchGrantSetResponse, PrivilegeEndpoint,
};
