//! Shared helpers for client integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use estatedesk::auth::StoredToken;
use estatedesk::cache::ResponseCache;
use estatedesk::clock::ManualClock;
use estatedesk::storage::{KeyValueStore, MemoryStore};
use estatedesk::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use estatedesk::{CachedApiClient, ClientConfig};

pub const BASE_URL: &str = "http://api.test/api";

/// One scripted transport outcome
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this response
    Respond(HttpResponse),
    /// Fail at the transport level
    Fail(String),
    /// Return this response after a delay
    Delayed(Duration, HttpResponse),
    /// Never complete
    Hang,
}

/// Transport that replays scripted steps and records every request
///
/// Once the script runs out, the last step repeats.
#[derive(Default)]
pub struct MockTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = steps.pop_front() {
            *last = Some(step.clone());
            step
        } else {
            last.clone().expect("MockTransport has no scripted steps")
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        match self.next_step() {
            Step::Respond(response) => Ok(response),
            Step::Fail(message) => Err(TransportError::Connect(message)),
            Step::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Everything a pipeline test needs to inspect
pub struct Harness {
    pub client: CachedApiClient,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
}

/// Fast retry settings so tests don't wait seconds
pub fn fast_config() -> ClientConfig {
    ClientConfig::new(BASE_URL)
        .with_timeout(Duration::from_millis(200))
        .with_retry_delay(Duration::from_millis(5))
}

pub fn harness(steps: Vec<Step>) -> Harness {
    harness_with(fast_config(), Arc::new(MemoryStore::new()), steps)
}

pub fn harness_with(config: ClientConfig, store: Arc<MemoryStore>, steps: Vec<Step>) -> Harness {
    let transport = MockTransport::new(steps);
    let clock = ManualClock::default();
    let shared: Arc<dyn KeyValueStore> = store.clone();
    let cache = ResponseCache::with_clock(shared.clone(), Arc::new(clock.clone()));
    let client = CachedApiClient::new(
        config,
        transport.clone(),
        cache,
        Arc::new(StoredToken::new(shared)),
    );
    Harness {
        client,
        transport,
        store,
        clock,
    }
}

pub fn ok_json(body: serde_json::Value) -> Step {
    Step::Respond(HttpResponse::json(200, &body))
}

pub fn status_json(status: u16, body: serde_json::Value) -> Step {
    Step::Respond(HttpResponse::json(status, &body))
}

pub fn network_error() -> Step {
    Step::Fail("connection refused".to_string())
}
