//! Shared fixtures: an in-memory transport and a collecting status sink.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ane_awesome_utils::{Bridge, BridgeConfig, BridgeError, StatusEvent, StatusSink, Transport};
use parking_lot::Mutex;

/// Transport double: hands out sequential ids, records outbound frames and
/// serves pulled frames from a per-session queue.
#[derive(Default)]
pub struct FakeTransport {
    next_id: AtomicU64,
    pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    pub closed: Mutex<Vec<(String, u32)>>,
    pull: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
}

impl FakeTransport {
    pub fn queue_pull(&self, id: &str, frame: Vec<u8>) {
        self.pull.lock().entry(id.to_string()).or_default().push_back(frame);
    }
}

impl Transport for FakeTransport {
    fn create(&self) -> Result<String, BridgeError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{n}"))
    }

    fn connect(&self, _id: &str, uri: &str, _headers: &str) -> Result<(), BridgeError> {
        if uri.starts_with("wss://refused") {
            return Err(BridgeError::Transport("refused".into()));
        }
        Ok(())
    }

    fn send(&self, id: &str, frame: &[u8]) -> Result<(), BridgeError> {
        self.sent.lock().push((id.to_string(), frame.to_vec()));
        Ok(())
    }

    fn close(&self, id: &str, code: u32) -> Result<(), BridgeError> {
        self.closed.lock().push((id.to_string(), code));
        Ok(())
    }

    fn next_message(&self, id: &str) -> Option<Vec<u8>> {
        self.pull.lock().get_mut(id)?.pop_front()
    }

    fn load_url(&self, _url: &str, _method: &str, _body: &str, _headers: &str) -> Result<String, BridgeError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("request-{n}"))
    }
}

#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.events.lock().iter().filter(|e| e.contains(needle)).count()
    }
}

impl StatusSink for CollectingSink {
    fn deliver(&self, event: &StatusEvent) {
        self.events.lock().push(event.to_string());
    }
}

pub fn bridge() -> (Arc<Bridge>, Arc<FakeTransport>, Arc<CollectingSink>) {
    bridge_with(BridgeConfig::default())
}

pub fn bridge_with(config: BridgeConfig) -> (Arc<Bridge>, Arc<FakeTransport>, Arc<CollectingSink>) {
    let transport = Arc::new(FakeTransport::default());
    let sink = Arc::new(CollectingSink::default());
    let bridge = Arc::new(Bridge::new(config, transport.clone(), sink.clone()));
    (bridge, transport, sink)
}

/// Create, connect and open a session.
pub fn open(bridge: &Bridge) -> String {
    let id = bridge.create_web_socket().unwrap();
    bridge.connect_web_socket(&id, "wss://example/ws", "").unwrap();
    bridge.on_connected(&id, "");
    id
}
