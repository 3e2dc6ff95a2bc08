//! Common test utilities for controller integration tests
//!
//! Provides recording fakes for the reconciler's two external seams: the
//! replica scaler (mutation interface) and the event sink.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use async_trait::async_trait;
use replica_controller::cache::ResourceCache;
use replica_controller::events::{ControllerEvent, EventSink};
use replica_controller::reconciler::{Reconciler, ReplicaScaler, ScaleError};
use replica_controller::resource::{ReplicaState, ResourceIdentity, ResourceSnapshot};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// One call made to the [`RecordingScaler`]
#[derive(Debug, Clone)]
pub struct ScaleCall {
    pub key: ResourceIdentity,
    pub replicas: i32,
    pub at: Instant,
}

/// Scaler that records every call and fails according to a script
#[derive(Debug, Default)]
pub struct RecordingScaler {
    calls: Mutex<Vec<ScaleCall>>,
    /// Outcomes for the next calls; empty means succeed
    script: Mutex<VecDeque<Result<(), String>>>,
}

impl RecordingScaler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` calls, then succeed
    pub fn failing(n: usize) -> Arc<Self> {
        let scaler = Self::default();
        scaler
            .script
            .lock()
            .unwrap()
            .extend((0..n).map(|i| Err(format!("injected failure {}", i + 1))));
        Arc::new(scaler)
    }

    pub fn calls(&self) -> Vec<ScaleCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplicaScaler for RecordingScaler {
    async fn scale(&self, key: &ResourceIdentity, replicas: i32) -> Result<(), ScaleError> {
        self.calls.lock().unwrap().push(ScaleCall {
            key: key.clone(),
            replicas,
            at: Instant::now(),
        });
        match self.script.lock().unwrap().pop_front() {
            Some(Err(message)) => Err(ScaleError::Rejected(message)),
            Some(Ok(())) | None => Ok(()),
        }
    }
}

/// Event sink that keeps every recorded event
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: ControllerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn key(ns: &str, name: &str) -> ResourceIdentity {
    ResourceIdentity::new(ns, name)
}

pub fn snapshot(ns: &str, name: &str, rv: &str, replicas: i32) -> ResourceSnapshot {
    ResourceSnapshot::new(key(ns, name), rv, ReplicaState::new(replicas))
}

/// Reconciler targeting 2 replicas wired to the given fakes
pub fn reconciler(
    cache: &Arc<ResourceCache>,
    scaler: &Arc<RecordingScaler>,
    sink: &Arc<RecordingEventSink>,
) -> Reconciler {
    Reconciler::new(
        Arc::clone(cache),
        Arc::clone(scaler) as Arc<dyn ReplicaScaler>,
        Arc::clone(sink) as Arc<dyn EventSink>,
        2,
    )
}
