//! Client Resolution Cache
//!
//! Holds the bound actor's grant set and answers capability checks for every
//! permission-gated UI element. All callers that need the grant set while it
//! is being fetched join one shared in-flight future, so a generation costs
//! exactly one `FetchGrantSet` call no matter how many elements ask.
//!
//! ## Generations
//!
//! Every fetch captures a ticket when it is launched. The ticket becomes the
//! entry's generation if, when the fetch settles, no newer fetch was launched
//! and the cache was not invalidated in between. Otherwise the result is
//! discarded with [`RcmsError::StaleGenerationDiscarded`] and the waiters
//! follow the newer fetch instead. Installed generations therefore strictly
//! increase.
//!
//! ## Locking
//!
//! State sits behind a `parking_lot::Mutex` that is only held for short
//! synchronous sections; it is never held across an `.await`. The grant set
//! itself is published as an immutable `Arc`, so readers never lock it.

use crate::state::{CacheEntry, CachePhase, CacheStatus, PermissionState};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use rcms_core::{
    Actor, ActorId, ClientSettings, FetchGrantSetRequest, GrantSet, PrivilegeEndpoint, RcmsError,
    Result, ScopeId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<CacheEntry>>>>;

#[derive(Clone)]
struct InFlight {
    ticket: u64,
    future: FetchFuture,
}

/// Where a waiter goes after its own fetch was discarded
enum Successor {
    Join(InFlight),
    Settled(Result<Arc<CacheEntry>>),
}

struct CacheState {
    actor: Option<Actor>,
    entry: Option<Arc<CacheEntry>>,
    stale: bool,
    last_error: Option<RcmsError>,
    in_flight: Option<InFlight>,
    /// Outcome of the latest fetch that was not discarded
    settled: Option<(u64, Result<Arc<CacheEntry>>)>,
    next_ticket: u64,
    latest_ticket: u64,
    fetch_count: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            actor: None,
            entry: None,
            stale: false,
            last_error: None,
            in_flight: None,
            settled: None,
            next_ticket: 1,
            latest_ticket: 0,
            fetch_count: 0,
        }
    }

    fn phase(&self) -> CachePhase {
        match (&self.entry, &self.in_flight) {
            (None, None) => CachePhase::Empty,
            (None, Some(_)) => CachePhase::Loading,
            (Some(_), None) => CachePhase::Ready,
            (Some(_), Some(_)) => CachePhase::Refreshing,
        }
    }

    /// Drop everything held for the current actor. Burns a ticket so that a
    /// fetch still in flight can never install its result afterwards.
    fn reset(&mut self) {
        self.entry = None;
        self.stale = false;
        self.last_error = None;
        self.in_flight = None;
        self.settled = None;
        self.latest_ticket = self.next_ticket;
        self.next_ticket += 1;
    }
}

struct Inner {
    endpoint: Arc<dyn PrivilegeEndpoint>,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
}

impl Inner {
    /// Join the latest in-flight fetch, or launch one.
    fn join_or_launch(self: &Arc<Self>, state: &mut CacheState, supersede: bool) -> Result<InFlight> {
        let actor = state
            .actor
            .clone()
            .ok_or_else(|| RcmsError::invalid("no actor bound to the resolution cache"))?;

        if !supersede {
            if let Some(in_flight) = &state.in_flight {
                trace!(ticket = in_flight.ticket, "joining in-flight grant set fetch");
                return Ok(in_flight.clone());
            }
        }
        Ok(self.launch(state, actor))
    }

    /// Next step for a waiter whose fetch `discarded` was superseded.
    ///
    /// `owner` pins the waiter to the actor it started for; a waiter that
    /// only needs the current actor's grant set passes `None` and accepts
    /// any installed entry.
    fn successor(self: &Arc<Self>, discarded: u64, owner: Option<&ActorId>) -> Successor {
        let mut state = self.state.lock();
        match owner {
            Some(owner) => {
                if state.actor.as_ref().map(|actor| &actor.id) != Some(owner) {
                    debug!(ticket = discarded, actor_id = %owner, "refresh outlived its actor");
                    return Successor::Settled(Err(RcmsError::stale_generation(
                        discarded,
                        state.latest_ticket,
                    )));
                }
            }
            None => {
                if let Some(entry) = &state.entry {
                    return Successor::Settled(Ok(Arc::clone(entry)));
                }
            }
        }
        if let Some(in_flight) = &state.in_flight {
            return Successor::Join(in_flight.clone());
        }
        if let Some((ticket, outcome)) = &state.settled {
            if *ticket > discarded {
                return Successor::Settled(outcome.clone());
            }
        }
        match self.join_or_launch(&mut state, false) {
            Ok(in_flight) => Successor::Join(in_flight),
            Err(err) => Successor::Settled(Err(err)),
        }
    }

    /// Follow `in_flight` through any supersessions until an outcome lands
    async fn settle(
        self: &Arc<Self>,
        mut in_flight: InFlight,
        owner: Option<&ActorId>,
    ) -> Result<Arc<CacheEntry>> {
        loop {
            match in_flight.future.clone().await {
                Err(err) if err.is_stale_generation() => {
                    match self.successor(in_flight.ticket, owner) {
                        Successor::Join(next) => in_flight = next,
                        Successor::Settled(outcome) => return outcome,
                    }
                }
                other => return other,
            }
        }
    }

    fn launch(self: &Arc<Self>, state: &mut CacheState, actor: Actor) -> InFlight {
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.latest_ticket = ticket;
        state.fetch_count += 1;

        let inner = Arc::clone(self);
        let endpoint = Arc::clone(&self.endpoint);
        let fetch_timeout = self.fetch_timeout;
        let request = FetchGrantSetRequest {
            actor_id: actor.id.clone(),
            scope_id: actor.scope_id.clone(),
        };
        let actor_id = actor.id;

        debug!(ticket, actor_id = %actor_id, "launching grant set fetch");

        let future: FetchFuture = async move {
            let outcome =
                match tokio::time::timeout(fetch_timeout, endpoint.fetch_grant_set(request)).await {
                    Ok(response) => response.map(|response| response.capabilities),
                    Err(_) => Err(RcmsError::timeout(
                        "fetch_grant_set",
                        u64::try_from(fetch_timeout.as_millis()).unwrap_or(u64::MAX),
                    )),
                };
            inner.complete(ticket, actor_id, outcome)
        }
        .boxed()
        .shared();

        // Drive the fetch even when nobody awaits it, e.g. a refresh started
        // from a session signal.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(future.clone().map(|_| ()));
        }

        let in_flight = InFlight { ticket, future };
        state.in_flight = Some(in_flight.clone());
        in_flight
    }

    fn complete(
        &self,
        ticket: u64,
        actor_id: ActorId,
        outcome: Result<GrantSet>,
    ) -> Result<Arc<CacheEntry>> {
        let mut state = self.state.lock();
        if ticket != state.latest_ticket {
            debug!(
                ticket,
                current = state.latest_ticket,
                "discarding superseded grant set fetch"
            );
            return Err(RcmsError::stale_generation(ticket, state.latest_ticket));
        }
        state.in_flight = None;

        match outcome {
            Ok(grant_set) => {
                let entry = Arc::new(CacheEntry {
                    actor_id,
                    grant_set: Arc::new(grant_set),
                    fetched_at: Instant::now(),
                    generation: ticket,
                });
                info!(
                    generation = ticket,
                    actor_id = %entry.actor_id,
                    grants = %entry.grant_set,
                    "installed grant set"
                );
                state.entry = Some(Arc::clone(&entry));
                state.stale = false;
                state.last_error = None;
                state.settled = Some((ticket, Ok(Arc::clone(&entry))));
                Ok(entry)
            }
            Err(err) => {
                match &state.entry {
                    Some(entry) => {
                        warn!(
                            generation = entry.generation,
                            error = %err,
                            "grant set refresh failed; serving last known set"
                        );
                        state.stale = true;
                    }
                    None => warn!(error = %err, "grant set fetch failed with nothing to serve"),
                }
                state.last_error = Some(err.clone());
                state.settled = Some((ticket, Err(err.clone())));
                Err(err)
            }
        }
    }
}

/// Outcome of [`ResolutionCache::bind_actor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Same actor, same tier and scope
    Unchanged,
    /// Same actor id with a different tier or scope; the held set is stale
    Updated,
    /// A different actor; the cache was emptied
    Switched,
}

/// Tab-scoped coalescing cache of one actor's grant set
#[derive(Clone)]
pub struct ResolutionCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ResolutionCache")
            .field("actor", &state.actor.as_ref().map(|actor| &actor.id))
            .field("phase", &state.phase())
            .field("generation", &state.entry.as_ref().map(|e| e.generation))
            .field("stale", &state.stale)
            .finish()
    }
}

impl ResolutionCache {
    /// Create an empty cache backed by `endpoint`
    pub fn new(endpoint: Arc<dyn PrivilegeEndpoint>, settings: &ClientSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                fetch_timeout: settings.fetch_timeout(),
                state: Mutex::new(CacheState::new()),
            }),
        }
    }

    /// Bind the session's actor.
    ///
    /// A different actor empties the cache. The same actor with a changed
    /// tier or scope keeps serving the held set until a refresh replaces it.
    pub fn bind_actor(&self, actor: Actor) -> Binding {
        let mut state = self.inner.state.lock();
        let binding = match &state.actor {
            Some(current) if *current == actor => Binding::Unchanged,
            Some(current) if current.id == actor.id => Binding::Updated,
            _ => Binding::Switched,
        };
        match binding {
            Binding::Unchanged => {}
            Binding::Updated => {
                debug!(actor_id = %actor.id, tier = %actor.tier, "actor attributes changed");
                state.actor = Some(actor);
            }
            Binding::Switched => {
                info!(actor_id = %actor.id, tier = %actor.tier, "binding new actor");
                state.reset();
                state.actor = Some(actor);
            }
        }
        binding
    }

    /// Forget the actor and everything held for it
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        if let Some(actor) = state.actor.take() {
            info!(actor_id = %actor.id, "clearing resolution cache");
        }
        state.reset();
    }

    /// Synchronous check for rendering; never waits.
    ///
    /// The first check on an Empty cache with a bound actor starts the
    /// shared fetch and reports `Pending`. After a failed fetch with nothing
    /// to serve it reports `Unavailable` and leaves the retry to
    /// [`refresh`](Self::refresh), [`is_allowed`](Self::is_allowed) or a
    /// session signal. `scope` is informational: mutating actions are
    /// re-verified by the server.
    pub fn check(&self, capability: &str, scope: Option<&ScopeId>) -> PermissionState {
        let mut state = self.inner.state.lock();
        let idle = state.entry.is_none()
            && state.in_flight.is_none()
            && state.last_error.is_none()
            && state.actor.is_some();
        // Launching spawns the fetch; without a runtime nothing would drive it.
        if idle && tokio::runtime::Handle::try_current().is_ok() {
            if let Err(err) = self.inner.join_or_launch(&mut state, false) {
                debug!(error = %err, "could not start grant set fetch");
            }
        }
        let permission = match &state.entry {
            Some(entry) if entry.allows(capability) => PermissionState::Allowed,
            Some(_) => PermissionState::Denied,
            None if state.in_flight.is_none() && state.last_error.is_some() => {
                PermissionState::Unavailable
            }
            None => PermissionState::Pending,
        };
        trace!(capability, scope = ?scope, ?permission, "checked capability");
        permission
    }

    /// Whether the bound actor holds `capability`.
    ///
    /// Answers from memory once a generation is installed; otherwise joins
    /// (or starts) the single in-flight fetch.
    pub async fn is_allowed(&self, capability: &str, scope: Option<&ScopeId>) -> Result<bool> {
        let entry = self.ready_entry().await?;
        let allowed = entry.allows(capability);
        trace!(
            capability,
            scope = ?scope,
            generation = entry.generation,
            allowed,
            "resolved capability"
        );
        Ok(allowed)
    }

    async fn ready_entry(&self) -> Result<Arc<CacheEntry>> {
        let in_flight = {
            let mut state = self.inner.state.lock();
            if let Some(entry) = &state.entry {
                return Ok(Arc::clone(entry));
            }
            self.inner.join_or_launch(&mut state, false)?
        };
        self.inner.settle(in_flight, None).await
    }

    /// Re-sync with the server. Concurrent calls share one fetch.
    pub async fn refresh(&self) -> Result<()> {
        self.begin_refresh()?.wait().await.map(|_| ())
    }

    /// Start (or join) a refresh without waiting for it
    pub fn begin_refresh(&self) -> Result<PendingRefresh> {
        self.start(false)
    }

    /// Start a fetch that supersedes any fetch already in flight.
    ///
    /// Used when the held grant set is known to be outdated: a fetch launched
    /// before the invalidation may carry the old answer and must not be
    /// installed.
    pub fn invalidate(&self) -> Result<PendingRefresh> {
        self.start(true)
    }

    fn start(&self, supersede: bool) -> Result<PendingRefresh> {
        let mut state = self.inner.state.lock();
        let in_flight = self.inner.join_or_launch(&mut state, supersede)?;
        let actor_id = state
            .actor
            .as_ref()
            .map(|actor| actor.id.clone())
            .ok_or_else(|| RcmsError::internal("fetch launched without an actor"))?;
        Ok(PendingRefresh {
            inner: Arc::clone(&self.inner),
            actor_id,
            in_flight,
        })
    }

    /// Actor currently bound, if any
    pub fn actor(&self) -> Option<Actor> {
        self.inner.state.lock().actor.clone()
    }

    /// Currently installed entry, if any
    pub fn snapshot(&self) -> Option<Arc<CacheEntry>> {
        self.inner.state.lock().entry.clone()
    }

    /// Generation currently served
    pub fn generation(&self) -> Option<u64> {
        self.inner
            .state
            .lock()
            .entry
            .as_ref()
            .map(|entry| entry.generation)
    }

    /// Phase, generation, stale flag and last error
    pub fn status(&self) -> CacheStatus {
        let state = self.inner.state.lock();
        CacheStatus {
            phase: state.phase(),
            generation: state.entry.as_ref().map(|entry| entry.generation),
            stale: state.stale,
            last_error: state.last_error.clone(),
        }
    }

    /// Number of `FetchGrantSet` calls launched so far
    pub fn fetch_count(&self) -> u64 {
        self.inner.state.lock().fetch_count
    }
}

/// A refresh in progress.
///
/// The fetch runs whether or not this handle is awaited; dropping it does
/// not cancel anything.
#[must_use = "a pending refresh does nothing extra unless awaited"]
pub struct PendingRefresh {
    inner: Arc<Inner>,
    actor_id: ActorId,
    in_flight: InFlight,
}

impl PendingRefresh {
    /// Generation this refresh will install if nothing supersedes it
    pub fn ticket(&self) -> u64 {
        self.in_flight.ticket
    }

    /// Actor the refresh was started for
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Wait until this refresh, or a newer one for the same actor that
    /// superseded it, settles.
    ///
    /// Fails with [`RcmsError::StaleGenerationDiscarded`] when the actor
    /// changed before an outcome landed.
    pub async fn wait(self) -> Result<Arc<CacheEntry>> {
        self.inner.settle(self.in_flight, Some(&self.actor_id)).await
    }
}
