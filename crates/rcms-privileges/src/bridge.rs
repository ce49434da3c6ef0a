//! Invalidation Bridge
//!
//! Turns session lifecycle signals into cache transitions. Signals travel on
//! a [`SessionChannel`]; the bridge runs at most one listener task however
//! many components attach to it.
//!
//! | Signal | Cache transition |
//! |--------|------------------|
//! | `SignedIn` / `RoleChanged` for a new actor id | emptied, new actor bound, load started |
//! | `SignedIn` / `RoleChanged` with changed tier or scope | refresh superseding any in-flight fetch |
//! | `SignedIn` with identical attributes | nothing |
//! | `RoleChanged` with identical attributes | refresh superseding any in-flight fetch |
//! | `ForceRefresh` for the bound actor | refresh superseding any in-flight fetch |
//! | `SignedOut` | emptied, no actor |

use crate::cache::{Binding, PendingRefresh, ResolutionCache};
use parking_lot::Mutex;
use rcms_core::{Actor, ActorId, BridgeSettings, Result};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Session lifecycle signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// An actor authenticated
    SignedIn(Actor),
    /// The actor's tier or scope may have changed
    RoleChanged(Actor),
    /// The actor's overrides changed server-side
    ForceRefresh {
        /// Actor whose grant set is outdated
        actor_id: ActorId,
    },
    /// The session ended
    SignedOut,
}

/// Broadcast channel shared by every tab-local component that emits or
/// observes session signals
#[derive(Debug, Clone)]
pub struct SessionChannel {
    sender: broadcast::Sender<SessionSignal>,
}

impl SessionChannel {
    /// Create a channel buffering `capacity` signals per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a channel from bridge settings
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self::new(settings.channel_capacity)
    }

    /// Publish a signal; returns how many subscribers will see it
    pub fn publish(&self, signal: SessionSignal) -> usize {
        debug!(?signal, "publishing session signal");
        self.sender.send(signal).unwrap_or(0)
    }

    /// Ask every cache bound to `actor_id` to refetch
    pub fn force_refresh(&self, actor_id: impl Into<ActorId>) -> usize {
        self.publish(SessionSignal::ForceRefresh {
            actor_id: actor_id.into(),
        })
    }

    /// New receiver starting at the next published signal
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSignal> {
        self.sender.subscribe()
    }
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

/// Apply one signal to the cache.
///
/// The synchronous transition happens before this returns, so signals
/// applied in order leave the cache in order. A returned refresh is already
/// running.
pub fn dispatch(cache: &ResolutionCache, signal: SessionSignal) -> Result<Option<PendingRefresh>> {
    match signal {
        SessionSignal::SignedIn(actor) if cache.actor().as_ref() == Some(&actor) => Ok(None),
        SessionSignal::SignedIn(actor) | SessionSignal::RoleChanged(actor) => {
            match cache.bind_actor(actor) {
                Binding::Switched => cache.begin_refresh().map(Some),
                Binding::Updated | Binding::Unchanged => cache.invalidate().map(Some),
            }
        }
        SessionSignal::ForceRefresh { actor_id } => match cache.actor() {
            Some(actor) if actor.id == actor_id => cache.invalidate().map(Some),
            _ => {
                debug!(actor_id = %actor_id, "ignoring refresh for an actor not bound here");
                Ok(None)
            }
        },
        SessionSignal::SignedOut => {
            cache.clear();
            Ok(None)
        }
    }
}

struct ListenerSlot {
    task: Option<JoinHandle<()>>,
    holders: usize,
    epoch: u64,
}

/// Keeps a [`ResolutionCache`] in step with the session
pub struct InvalidationBridge {
    cache: ResolutionCache,
    listener: Mutex<ListenerSlot>,
}

impl InvalidationBridge {
    /// Create a bridge driving `cache`
    pub fn new(cache: ResolutionCache) -> Arc<Self> {
        Arc::new(Self {
            cache,
            listener: Mutex::new(ListenerSlot {
                task: None,
                holders: 0,
                epoch: 0,
            }),
        })
    }

    /// Cache driven by this bridge
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Apply a signal directly and wait for any refresh it starts
    pub async fn apply(&self, signal: SessionSignal) -> Result<()> {
        match dispatch(&self.cache, signal)? {
            Some(pending) => pending.wait().await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Attach to `channel`.
    ///
    /// The first holder spawns the listener task; later holders share it.
    /// The task stops when the last subscription is released. Must be called
    /// from within a Tokio runtime.
    pub fn attach(self: &Arc<Self>, channel: &SessionChannel) -> BridgeSubscription {
        let mut slot = self.listener.lock();
        slot.holders += 1;
        let running = slot.task.as_ref().is_some_and(|task| !task.is_finished());
        if !running {
            debug!("starting session listener");
            slot.task = Some(tokio::spawn(listen(self.cache.clone(), channel.subscribe())));
        }
        BridgeSubscription {
            bridge: Some(Arc::clone(self)),
            epoch: slot.epoch,
        }
    }

    /// Whether a listener task is running
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of live subscriptions
    pub fn holders(&self) -> usize {
        self.listener.lock().holders
    }

    /// Stop the listener regardless of outstanding subscriptions. Safe to
    /// call repeatedly; outstanding subscriptions become inert.
    pub fn shutdown(&self) {
        let mut slot = self.listener.lock();
        slot.epoch += 1;
        slot.holders = 0;
        if let Some(task) = slot.task.take() {
            info!("shutting down session listener");
            task.abort();
        }
    }

    fn release(&self, epoch: u64) {
        let mut slot = self.listener.lock();
        if slot.epoch != epoch {
            return;
        }
        slot.holders = slot.holders.saturating_sub(1);
        if slot.holders == 0 {
            if let Some(task) = slot.task.take() {
                debug!("last subscription released; stopping session listener");
                task.abort();
            }
        }
    }
}

/// Handle keeping the bridge's listener alive
#[must_use = "the listener stops when the subscription is dropped"]
pub struct BridgeSubscription {
    bridge: Option<Arc<InvalidationBridge>>,
    epoch: u64,
}

impl BridgeSubscription {
    /// Release this hold on the listener; further calls do nothing
    pub fn release(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.release(self.epoch);
        }
    }
}

impl Drop for BridgeSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

async fn listen(cache: ResolutionCache, mut signals: broadcast::Receiver<SessionSignal>) {
    loop {
        match signals.recv().await {
            Ok(signal) => {
                if let Err(err) = dispatch(&cache, signal) {
                    warn!(error = %err, "session signal could not be applied");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "session signals dropped; forcing refresh");
                if cache.actor().is_some() {
                    if let Err(err) = cache.invalidate() {
                        warn!(error = %err, "forced refresh could not start");
                    }
                }
            }
            Err(RecvError::Closed) => {
                debug!("session channel closed");
                break;
            }
        }
    }
}
