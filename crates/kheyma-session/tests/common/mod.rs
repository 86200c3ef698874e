//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use kheyma_session::events::{SessionEventRx, create_event_channel};
use kheyma_session::gateway::RequestGateway;
use kheyma_session::session::SessionStore;
use kheyma_session::storage::{MemoryStorage, SessionStorage};
use serde_json::{Value, json};
use wiremock::{MockServer, Request, ResponseTemplate};

/// Memory storage that counts `clear_session` calls.
#[derive(Debug, Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    clears: AtomicUsize,
}

impl CountingStorage {
    pub fn with_record(token: &str, user_json: &str) -> Self {
        Self {
            inner: MemoryStorage::with_record(token, user_json),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl SessionStorage for CountingStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn clear_session(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_session()
    }
}

pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub store: SessionStore,
    pub events: SessionEventRx,
}

/// Builds a store against `server` over the given storage.
pub fn harness(server: &MockServer, storage: MemoryStorage) -> Harness {
    let storage = Arc::new(storage);
    let shared: Arc<dyn SessionStorage> = storage.clone();
    let (tx, events) = create_event_channel();
    let gateway = RequestGateway::new(server.uri(), shared).with_events(tx);
    Harness {
        storage,
        store: SessionStore::new(gateway),
        events,
    }
}

pub fn json_response(status: u16, body: &Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

pub fn auth_body(token: &str, email: &str, user_type: &str) -> Value {
    json!({
        "token": token,
        "email": email,
        "userType": user_type,
        "user": {"id": "u-1", "email": email, "type": user_type}
    })
}

pub fn authorization(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub fn body_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

pub async fn received(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}
