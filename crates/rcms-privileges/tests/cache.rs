//! Coalescing, generation ordering and failure handling of the resolution
//! cache.

mod common;

use assert_matches::assert_matches;
use common::{eventually, grants, service, u1, u2, u3, CountingEndpoint, ScriptedEndpoint};
use futures::future::join_all;
use rcms_core::{Actor, ClientSettings, GrantSet, RcmsError};
use rcms_privileges::{CachePhase, PermissionState, ResolutionCache};
use std::time::Duration;

fn cache_over(endpoint: std::sync::Arc<ScriptedEndpoint>) -> ResolutionCache {
    ResolutionCache::new(endpoint, &ClientSettings::default())
}

#[tokio::test]
async fn fifty_elements_mounting_share_one_fetch() {
    let endpoint = ScriptedEndpoint::new();
    let release = endpoint.push_gated(Ok(grants(&["activity_add"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let cache = cache.clone();
            let capability = if i % 2 == 0 { "activity_add" } else { "activity_delete" };
            tokio::spawn(async move { (i, cache.is_allowed(capability, None).await) })
        })
        .collect();

    endpoint.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.status().phase, CachePhase::Loading);
    assert_eq!(cache.check("activity_add", None), PermissionState::Pending);
    release.send(()).unwrap();

    for handle in handles {
        let (i, allowed) = handle.await.unwrap();
        assert_eq!(allowed.unwrap(), i % 2 == 0);
    }
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(cache.fetch_count(), 1);
    assert_eq!(cache.status().phase, CachePhase::Ready);
}

#[tokio::test]
async fn joined_waiters_in_one_task_share_one_fetch() {
    let counting = CountingEndpoint::new(service());
    let cache = ResolutionCache::new(counting.clone(), &ClientSettings::default());
    cache.bind_actor(u3());

    let answers = join_all((0..50).map(|_| cache.is_allowed("anything", None))).await;
    assert!(answers.into_iter().all(|answer| answer.unwrap()));
    assert_eq!(counting.fetches(), 1);
}

#[tokio::test]
async fn reference_scenarios_through_the_cache() {
    let counting = CountingEndpoint::new(service());
    let cache = ResolutionCache::new(counting.clone(), &ClientSettings::default());

    cache.bind_actor(u1());
    assert!(!cache.is_allowed("task_reassign", None).await.unwrap());

    cache.bind_actor(u2());
    assert!(cache.is_allowed("activity_add", None).await.unwrap());
    assert!(!cache.is_allowed("activity_delete", None).await.unwrap());

    cache.bind_actor(u3());
    assert!(cache.is_allowed("anything", None).await.unwrap());
    let entry = cache.snapshot().unwrap();
    assert_eq!(*entry.grant_set, GrantSet::AllCapabilities);

    assert_eq!(counting.fetches(), 3);
}

#[tokio::test]
async fn fetch_uses_the_actor_home_scope() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(GrantSet::empty()));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());
    cache.refresh().await.unwrap();

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].actor_id.as_str(), "u2");
    assert_eq!(requests[0].scope_id.as_ref().map(|s| s.as_str()), Some("E1"));
}

#[tokio::test]
async fn concurrent_refreshes_coalesce() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(grants(&["user_add"])));
    let release = endpoint.push_gated(Ok(grants(&["user_add", "user_delete"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());
    cache.refresh().await.unwrap();

    let waiting = tokio::spawn({
        let cache = cache.clone();
        async move { join_all((0..10).map(|_| cache.refresh())).await }
    });
    endpoint.wait_for_calls(2).await;
    assert_eq!(cache.status().phase, CachePhase::Refreshing);
    // Reads during the refresh are served the previous generation.
    assert_eq!(cache.check("user_delete", None), PermissionState::Denied);
    release.send(()).unwrap();

    for result in waiting.await.unwrap() {
        result.unwrap();
    }
    assert_eq!(endpoint.calls(), 2);
    assert_eq!(cache.check("user_delete", None), PermissionState::Allowed);
}

#[tokio::test]
async fn superseded_fetch_never_overwrites_newer_generation() {
    let endpoint = ScriptedEndpoint::new();
    let release_old = endpoint.push_gated(Ok(grants(&["activity_add", "activity_delete"])));
    endpoint.push(Ok(grants(&["activity_add"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let old = cache.begin_refresh().unwrap();
    endpoint.wait_for_calls(1).await;

    let new = cache.invalidate().unwrap();
    assert!(new.ticket() > old.ticket());
    let installed = new.wait().await.unwrap();
    assert_eq!(installed.generation, cache.generation().unwrap());

    release_old.send(()).unwrap();
    let followed = old.wait().await.unwrap();
    assert_eq!(followed.generation, installed.generation);

    assert_eq!(cache.generation(), Some(installed.generation));
    assert_eq!(cache.check("activity_delete", None), PermissionState::Denied);
    assert_eq!(cache.check("activity_add", None), PermissionState::Allowed);
}

#[tokio::test]
async fn waiters_on_superseded_fetch_follow_the_newer_one() {
    let endpoint = ScriptedEndpoint::new();
    let release_old = endpoint.push_gated(Ok(grants(&["activity_delete"])));
    let release_new = endpoint.push_gated(Ok(grants(&["activity_add"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.is_allowed("activity_add", None).await }
    });
    endpoint.wait_for_calls(1).await;

    let _newer = cache.invalidate().unwrap();
    endpoint.wait_for_calls(2).await;

    release_old.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.snapshot().is_none());

    release_new.send(()).unwrap();
    assert!(waiter.await.unwrap().unwrap());
    assert_eq!(endpoint.calls(), 2);
}

#[tokio::test]
async fn generations_strictly_increase() {
    let endpoint = ScriptedEndpoint::new();
    for _ in 0..4 {
        endpoint.push(Ok(grants(&["user_add"])));
    }
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let mut seen = Vec::new();
    for _ in 0..4 {
        cache.refresh().await.unwrap();
        seen.push(cache.generation().unwrap());
    }
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]), "{seen:?}");
}

#[tokio::test]
async fn failed_refresh_keeps_serving_stale_set() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(grants(&["activity_add"])));
    endpoint.push(Err(RcmsError::store_unavailable("connection refused")));
    endpoint.push(Ok(grants(&["activity_add", "activity_update"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    cache.refresh().await.unwrap();
    let generation = cache.generation();

    let err = cache.refresh().await.unwrap_err();
    assert_matches!(err, RcmsError::StoreUnavailable { .. });

    let status = cache.status();
    assert_eq!(status.phase, CachePhase::Ready);
    assert!(status.stale);
    assert_eq!(status.generation, generation);
    assert_matches!(status.last_error, Some(RcmsError::StoreUnavailable { .. }));
    assert!(cache.is_allowed("activity_add", None).await.unwrap());

    cache.refresh().await.unwrap();
    let status = cache.status();
    assert!(!status.stale);
    assert!(status.last_error.is_none());
    assert!(status.generation > generation);
    assert!(cache.is_allowed("activity_update", None).await.unwrap());
}

#[tokio::test]
async fn failure_with_nothing_to_serve_reaches_every_waiter() {
    let endpoint = ScriptedEndpoint::new();
    let release = endpoint.push_gated(Err(RcmsError::store_unavailable("connection refused")));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u3());

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.is_allowed("user_add", None).await })
        })
        .collect();
    endpoint.wait_for_calls(1).await;
    release.send(()).unwrap();

    for handle in handles {
        assert_matches!(
            handle.await.unwrap(),
            Err(RcmsError::StoreUnavailable { .. })
        );
    }
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(cache.status().phase, CachePhase::Empty);
    let permission = cache.check("user_add", None);
    assert_eq!(permission, PermissionState::Unavailable);
    assert!(!permission.is_enabled());
}

#[tokio::test]
async fn slow_fetch_times_out() {
    let endpoint = ScriptedEndpoint::new();
    let _held = endpoint.push_gated(Ok(GrantSet::AllCapabilities));
    let cache = ResolutionCache::new(
        endpoint.clone(),
        &ClientSettings {
            fetch_timeout_ms: 50,
        },
    );
    cache.bind_actor(u3());

    let err = cache.is_allowed("user_add", None).await.unwrap_err();
    assert_matches!(
        err,
        RcmsError::Timeout {
            timeout_ms: 50,
            ..
        }
    );
    assert_eq!(cache.check("user_add", None), PermissionState::Unavailable);
}

#[tokio::test]
async fn sign_out_drops_the_grant_set() {
    let counting = CountingEndpoint::new(service());
    let cache = ResolutionCache::new(counting, &ClientSettings::default());
    cache.bind_actor(u3());
    cache.refresh().await.unwrap();

    cache.clear();
    assert!(cache.snapshot().is_none());
    assert_eq!(cache.check("user_add", None), PermissionState::Pending);
    assert_matches!(
        cache.is_allowed("user_add", None).await,
        Err(RcmsError::Invalid { .. })
    );
}

#[tokio::test]
async fn first_render_check_starts_one_shared_fetch() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(grants(&["activity_add"])));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    for _ in 0..50 {
        assert_eq!(cache.check("activity_add", None), PermissionState::Pending);
    }
    assert_eq!(cache.fetch_count(), 1);

    eventually(|| cache.check("activity_add", None) == PermissionState::Allowed).await;
    assert_eq!(cache.check("activity_delete", None), PermissionState::Denied);
    assert_eq!(endpoint.calls(), 1);
}

#[tokio::test]
async fn check_after_failure_stays_unavailable_without_refetching() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Err(RcmsError::store_unavailable("connection refused")));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    assert_eq!(cache.check("activity_add", None), PermissionState::Pending);
    eventually(|| cache.check("activity_add", None) == PermissionState::Unavailable).await;
    for _ in 0..10 {
        assert_eq!(cache.check("activity_add", None), PermissionState::Unavailable);
    }
    assert_eq!(endpoint.calls(), 1);
}

#[tokio::test]
async fn waiter_sees_failure_of_the_fetch_that_superseded_it() {
    let endpoint = ScriptedEndpoint::new();
    let release_old = endpoint.push_gated(Ok(grants(&["activity_add"])));
    endpoint.push(Err(RcmsError::store_unavailable("connection refused")));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let waiter = tokio::spawn({
        let cache = cache.clone();
        async move { cache.is_allowed("activity_add", None).await }
    });
    endpoint.wait_for_calls(1).await;

    let newer = cache.invalidate().unwrap();
    assert_matches!(newer.wait().await, Err(RcmsError::StoreUnavailable { .. }));
    assert_eq!(cache.check("activity_add", None), PermissionState::Unavailable);

    release_old.send(()).unwrap();
    assert_matches!(
        waiter.await.unwrap(),
        Err(RcmsError::StoreUnavailable { .. })
    );
    assert_eq!(endpoint.calls(), 2);
    assert!(cache.snapshot().is_none());
}

#[tokio::test]
async fn refresh_does_not_resolve_with_another_actors_entry() {
    let endpoint = ScriptedEndpoint::new();
    let release_old = endpoint.push_gated(Ok(grants(&["activity_add"])));
    endpoint.push(Ok(GrantSet::AllCapabilities));
    let cache = cache_over(endpoint.clone());
    cache.bind_actor(u2());

    let pending = cache.begin_refresh().unwrap();
    assert_eq!(pending.actor_id().as_str(), "u2");
    endpoint.wait_for_calls(1).await;

    cache.bind_actor(u3());
    cache.refresh().await.unwrap();
    let installed = cache.snapshot().unwrap();
    assert_eq!(installed.actor_id.as_str(), "u3");

    release_old.send(()).unwrap();
    let err = pending.wait().await.unwrap_err();
    assert!(err.is_stale_generation());

    assert_eq!(cache.generation(), Some(installed.generation));
    assert_eq!(*cache.snapshot().unwrap().grant_set, GrantSet::AllCapabilities);
}

#[tokio::test]
async fn unknown_actor_reaches_every_waiter_as_an_error() {
    let counting = CountingEndpoint::new(service());
    let cache = ResolutionCache::new(counting.clone(), &ClientSettings::default());
    cache.bind_actor(Actor::scope_admin("u404", "E1"));

    let answers = join_all((0..5).map(|_| cache.is_allowed("activity_add", None))).await;
    assert_eq!(answers.len(), 5);
    for answer in answers {
        assert_matches!(answer, Err(RcmsError::ActorNotFound { .. }));
    }
    assert!(counting.fetches() >= 1);

    let permission = cache.check("activity_add", None);
    assert_eq!(permission, PermissionState::Unavailable);
    assert_ne!(permission, PermissionState::Denied);
    assert!(!permission.is_enabled());
    assert_matches!(
        cache.status().last_error,
        Some(RcmsError::ActorNotFound { .. })
    );
}
