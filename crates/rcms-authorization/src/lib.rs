#![deny(clippy::await_holding_lock)]
//! # RCMS Authorization - Server-Side Privilege Resolution
//!
//! Maps (actor, scope, capability) to Allow/Deny against the privilege
//! override table, and materializes an actor's full grant set in one call.
//!
//! - [`store`]: the override table (`PolicyStore`) and an in-memory backend
//! - [`directory`]: actor id resolution (`ActorNotFound` comes from here)
//! - [`evaluation`]: the pure tier-dispatched evaluator
//! - [`grant_set`]: the one-call grant-set resolver, equivalent to the evaluator
//! - [`service`]: the `PrivilegeEndpoint` implementation and override administration

pub mod directory;
pub mod evaluation;
pub mod grant_set;
pub mod service;
pub mod store;

pub use directory::{ActorDirectory, MemoryActorDirectory};
pub use evaluation::{evaluate_capability, Decision};
pub use grant_set::resolve_grant_set;
pub use service::PrivilegeService;
pub use store::{MemoryPolicyStore, OverrideChange, OverrideRow, PolicyStore, StoreError};
