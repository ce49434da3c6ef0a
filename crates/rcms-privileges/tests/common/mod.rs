//! Test endpoints and fixtures for the resolution cache
//!
//! These stand in for a real transport and should not be used in production
//! code.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rcms_authorization::{MemoryActorDirectory, MemoryPolicyStore, OverrideRow, PrivilegeService};
use rcms_core::{
    Actor, Capability, EvaluateCapabilityRequest, EvaluateCapabilityResponse,
    FetchGrantSetRequest, FetchGrantSetResponse, GrantSet, PrivilegeConfig, PrivilegeEndpoint,
    RcmsError, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Build a literal grant set
pub fn grants(names: &[&str]) -> GrantSet {
    GrantSet::from_capabilities(names.iter().map(|name| Capability::new(*name).unwrap()))
}

struct Step {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<GrantSet>,
}

/// Endpoint answering fetches from a queue of scripted results.
///
/// A gated step does not answer until its sender fires (or is dropped).
#[derive(Default)]
pub struct ScriptedEndpoint {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<FetchGrantSetRequest>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an immediate answer
    pub fn push(&self, result: Result<GrantSet>) {
        self.steps.lock().push_back(Step { gate: None, result });
    }

    /// Queue an answer held back until the returned sender fires
    pub fn push_gated(&self, result: Result<GrantSet>) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.steps.lock().push_back(Step {
            gate: Some(gate),
            result,
        });
        release
    }

    /// Number of `fetch_grant_set` calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchGrantSetRequest> {
        self.requests.lock().clone()
    }

    /// Yield until at least `count` calls arrived
    pub async fn wait_for_calls(&self, count: usize) {
        eventually(|| self.calls() >= count).await;
    }
}

#[async_trait]
impl PrivilegeEndpoint for ScriptedEndpoint {
    async fn evaluate_capability(
        &self,
        _request: EvaluateCapabilityRequest,
    ) -> Result<EvaluateCapabilityResponse> {
        Err(RcmsError::internal("evaluate_capability is not scripted"))
    }

    async fn fetch_grant_set(&self, request: FetchGrantSetRequest) -> Result<FetchGrantSetResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        let step = self.steps.lock().pop_front();
        let Some(step) = step else {
            return Err(RcmsError::internal("script exhausted"));
        };
        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.result
            .map(|capabilities| FetchGrantSetResponse { capabilities })
    }
}

/// Counts grant-set fetches reaching an inner endpoint
pub struct CountingEndpoint<E> {
    inner: E,
    fetches: AtomicUsize,
}

impl<E> CountingEndpoint<E> {
    pub fn new(inner: E) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: PrivilegeEndpoint> PrivilegeEndpoint for CountingEndpoint<E> {
    async fn evaluate_capability(
        &self,
        request: EvaluateCapabilityRequest,
    ) -> Result<EvaluateCapabilityResponse> {
        self.inner.evaluate_capability(request).await
    }

    async fn fetch_grant_set(&self, request: FetchGrantSetRequest) -> Result<FetchGrantSetResponse> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_grant_set(request).await
    }
}

pub type Service = PrivilegeService<MemoryPolicyStore, MemoryActorDirectory>;

pub fn u1() -> Actor {
    Actor::member("u1")
}

pub fn u2() -> Actor {
    Actor::scope_admin("u2", "E1")
}

pub fn u3() -> Actor {
    Actor::superuser("u3")
}

/// Privilege service holding the reference actors and one override row
pub fn service() -> Arc<Service> {
    let store = Arc::new(MemoryPolicyStore::with_rows(vec![OverrideRow::new(
        "u2".into(),
        Some("E1".into()),
        Capability::new("activity_add").unwrap(),
    )]));
    let directory = Arc::new(MemoryActorDirectory::with_actors(vec![u1(), u2(), u3()]));
    Arc::new(PrivilegeService::new(
        store,
        directory,
        &PrivilegeConfig::default(),
    ))
}

/// Poll `condition` while letting spawned tasks run
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}
