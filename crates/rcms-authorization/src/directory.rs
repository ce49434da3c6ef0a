//! Actor directory
//!
//! Resolves actor ids to the tier and home scope recorded by the session
//! component. An id that does not resolve is `ActorNotFound`, never a Deny.

use crate::store::StoreError;
use async_trait::async_trait;
use rcms_core::{Actor, ActorId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Lookup of known actors
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// Resolve an actor id; `Ok(None)` if it is unknown
    async fn resolve(&self, actor_id: &ActorId) -> Result<Option<Actor>, StoreError>;
}

/// In-memory actor directory
#[derive(Default)]
pub struct MemoryActorDirectory {
    actors: RwLock<HashMap<ActorId, Actor>>,
}

impl MemoryActorDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding `actors`
    pub fn with_actors<I>(actors: I) -> Self
    where
        I: IntoIterator<Item = Actor>,
    {
        Self {
            actors: RwLock::new(
                actors
                    .into_iter()
                    .map(|actor| (actor.id.clone(), actor))
                    .collect(),
            ),
        }
    }

    /// Insert or replace an actor record (role switch)
    pub async fn upsert(&self, actor: Actor) {
        self.actors.write().await.insert(actor.id.clone(), actor);
    }

    /// Remove an actor record
    pub async fn remove(&self, actor_id: &ActorId) -> Option<Actor> {
        self.actors.write().await.remove(actor_id)
    }
}

#[async_trait]
impl ActorDirectory for MemoryActorDirectory {
    async fn resolve(&self, actor_id: &ActorId) -> Result<Option<Actor>, StoreError> {
        Ok(self.actors.read().await.get(actor_id).cloned())
    }
}
