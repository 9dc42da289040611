#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use taskdesk_core::api::SessionEvent;
use taskdesk_core::auth::{MemoryTokenStore, TokenPair};
use taskdesk_core::SessionClient;
use tokio::sync::broadcast;

/// Unsigned JWT carrying `claims`; the client never checks signatures.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

pub fn task_page() -> Value {
    json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{"id": 1, "title": "Ship it", "priority": "high"}]
    })
}

pub fn client_with(uri: &str, pair: Option<TokenPair>) -> (SessionClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(match pair {
        Some(pair) => MemoryTokenStore::with_pair(pair),
        None => MemoryTokenStore::new(),
    });
    let client = SessionClient::new(uri, store.clone()).expect("client");
    (client, store)
}

pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
