//! Bridge façade: the synchronous operations the host calls and the
//! asynchronous callbacks the transport calls, wired over the session
//! registry, the loader store and the event dispatcher.
//!
//! Host-facing methods return `Result`/`Option`; the C ABI in [`abi`] turns
//! those into sentinels. Transport callbacks never fail: anything they cannot
//! apply is logged and dropped.

pub mod abi;
pub mod callback;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::dispatcher::{EventDispatcher, StatusSink};
use crate::error::{BridgeError, Result};
use crate::event::{LoaderEvent, WebSocketEvent};
use crate::loader::LoaderResultStore;
use crate::logging;
use crate::queue::Enqueued;
use crate::registry::{Removal, SessionRegistry};
use crate::session::{Session, SessionId, SessionState};
use crate::transport::Transport;
use crate::RUNTIME;

/// Close code used when finalize tears down sessions that are still open.
pub const NORMAL_CLOSURE: u32 = 1000;

pub struct Bridge {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    registry: SessionRegistry,
    loader_results: LoaderResultStore,
    dispatcher: EventDispatcher,
    finalized: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, transport: Arc<dyn Transport>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            config,
            transport,
            registry: SessionRegistry::new(),
            loader_results: LoaderResultStore::new(),
            dispatcher: EventDispatcher::new(sink),
            finalized: AtomicBool::new(false),
            reaper: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// State of a live session, `None` once it has been removed.
    pub fn session_state(&self, id: &str) -> Option<SessionState> {
        self.registry.find(id).map(|s| s.state())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_finalized() {
            Err(BridgeError::NotInitialized)
        } else {
            Ok(())
        }
    }

    fn session(&self, id: &str) -> Result<Arc<Session>> {
        self.registry
            .find(id)
            .ok_or_else(|| BridgeError::UnknownSession(id.to_string()))
    }

    /// Drop our handle first so an unshared session is destroyed immediately.
    fn discard(&self, session: Arc<Session>) -> Removal {
        let id = session.id().to_string();
        drop(session);
        self.registry.remove(&id)
    }

    // ─── Host operations ────────────────────────────────────────────

    pub fn create_web_socket(&self) -> Result<SessionId> {
        self.ensure_active()?;
        let reaped = self.registry.reap_pending();
        if reaped > 0 {
            tracing::debug!("reaped {reaped} closed sessions");
        }

        let id = self.transport.create()?;
        let session = Arc::new(Session::new(id.clone(), self.config.new_inbox()));
        if let Err(e) = self.registry.insert(session) {
            tracing::warn!("transport issued an id already tracked ({id}), releasing it");
            if let Err(close_err) = self.transport.close(&id, NORMAL_CLOSURE) {
                tracing::debug!("release of {id}: {close_err}");
            }
            return Err(e);
        }
        tracing::debug!("created web socket {id}");
        Ok(id)
    }

    pub fn connect_web_socket(&self, id: &str, uri: &str, headers: &str) -> Result<()> {
        self.ensure_active()?;
        if uri.is_empty() {
            return Err(BridgeError::InvalidArgument("uri"));
        }
        let session = self.session(id)?;
        tracing::debug!("connecting {id} to {uri}");
        let result = session.connect(&*self.transport, uri, headers);
        if let Err(BridgeError::Transport(_)) = &result {
            tracing::warn!("transport refused connect for {id}, discarding session");
            self.discard(session);
        }
        result
    }

    pub fn send_web_socket_message(&self, id: &str, frame: &[u8]) -> Result<()> {
        self.ensure_active()?;
        self.session(id)?.send(&*self.transport, frame)
    }

    pub fn send_web_socket_text(&self, id: &str, text: &str) -> Result<()> {
        self.ensure_active()?;
        self.session(id)?.send_text(text)
    }

    /// Request a close. The session stays pollable until the transport reports
    /// the disconnect.
    pub fn close_web_socket(&self, id: &str, code: u32) -> Result<()> {
        self.ensure_active()?;
        let session = self.session(id)?;
        let result = session.close(&*self.transport, code);
        if let Err(BridgeError::Transport(_)) = &result {
            // no disconnect callback will follow a refused close
            tracing::warn!("transport refused close for {id}, discarding session");
            session.mark_error();
            self.discard(session);
        }
        result
    }

    /// Next queued frame for `id`. Never blocks; unknown ids simply yield `None`.
    pub fn poll_next_message(&self, id: &str) -> Option<Vec<u8>> {
        if self.is_finalized() {
            return None;
        }
        self.registry.find(id)?.inbox().dequeue()
    }

    pub fn load_url(&self, url: &str, method: &str, body: &str, headers: &str) -> Result<String> {
        self.ensure_active()?;
        if url.is_empty() {
            return Err(BridgeError::InvalidArgument("url"));
        }
        let id = self.transport.load_url(url, method, body, headers)?;
        tracing::debug!("started {method} {url} as {id}");
        Ok(id)
    }

    /// Consume the stored response for a finished load.
    pub fn get_loader_result(&self, id: &str) -> Option<Vec<u8>> {
        if self.is_finalized() {
            return None;
        }
        self.loader_results.take(id)
    }

    pub fn add_static_host(&self, host: &str, ip: &str) -> Result<()> {
        self.ensure_active()?;
        if host.is_empty() || ip.is_empty() {
            return Err(BridgeError::InvalidArgument("host/ip"));
        }
        self.transport.add_static_host(host, ip)
    }

    pub fn remove_static_host(&self, host: &str) -> Result<()> {
        self.ensure_active()?;
        if host.is_empty() {
            return Err(BridgeError::InvalidArgument("host"));
        }
        self.transport.remove_static_host(host)
    }

    /// Stop accepting work, silence the dispatcher, close live sessions and
    /// release the transport. Idempotent.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("finalizing bridge");
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        self.dispatcher.shutdown();

        for session in self.registry.drain() {
            if session.state().is_terminal() {
                continue;
            }
            if let Err(e) = self.transport.close(session.id(), NORMAL_CLOSURE) {
                tracing::debug!("close during finalize: {e}");
            }
            session.mark_error();
            session.inbox().clear();
        }
        self.registry.reap_pending();
        self.loader_results.clear();
        self.transport.shutdown();
    }

    /// Sweep the pending-deletion set every `reap_interval_ms` on the shared runtime.
    pub fn start_reaper(self: &Arc<Self>) {
        let Some(period) = self.config.reap_interval() else {
            return;
        };
        let weak = Arc::downgrade(self);
        let handle = RUNTIME.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(bridge) = weak.upgrade() else { break };
                if bridge.is_finalized() {
                    break;
                }
                let reaped = bridge.registry.reap_pending();
                if reaped > 0 {
                    tracing::debug!("reaper erased {reaped} sessions");
                }
            }
        });
        if let Some(previous) = self.reaper.lock().replace(handle) {
            previous.abort();
        }
    }

    // ─── Transport callbacks ────────────────────────────────────────

    pub fn on_connected(&self, id: &str, headers: &str) {
        if self.is_finalized() {
            return;
        }
        let Some(session) = self.registry.find(id) else {
            tracing::debug!("connected callback for unknown session {id}");
            return;
        };
        if !session.mark_open() {
            tracing::warn!("connected callback for {id} in state {:?}", session.state());
            return;
        }
        drop(session);
        tracing::debug!("web socket {id} open");
        self.dispatcher.web_socket(
            id,
            WebSocketEvent::Connected {
                headers: headers.to_string(),
            },
        );
    }

    /// Push-style data delivery: the frame travels with the callback.
    pub fn on_data(&self, id: &str, frame: Vec<u8>) {
        if self.is_finalized() {
            return;
        }
        let Some(session) = self.registry.find(id) else {
            tracing::debug!("dropping {} byte frame for unknown session {id}", frame.len());
            return;
        };
        self.enqueue_and_notify(session, frame);
    }

    /// Pull-style data delivery: the transport only signals that a frame is
    /// ready. At most one frame is pulled per notification, and nothing is
    /// dispatched when the pull comes back empty.
    pub fn on_data_available(&self, id: &str) {
        if self.is_finalized() {
            return;
        }
        let Some(session) = self.registry.find(id) else {
            tracing::debug!("data notification for unknown session {id}");
            return;
        };
        let Some(frame) = self.transport.next_message(id) else {
            tracing::trace!("data notification for {id} but nothing to pull");
            return;
        };
        self.enqueue_and_notify(session, frame);
    }

    fn enqueue_and_notify(&self, session: Arc<Session>, frame: Vec<u8>) {
        let id = session.id().to_string();
        if session.state().is_terminal() {
            tracing::debug!("dropping frame for terminated session {id}");
            return;
        }
        match session.inbox().enqueue(frame) {
            Enqueued::Accepted => {}
            Enqueued::DroppedOldest => {
                tracing::warn!("inbox for {id} full, dropped oldest frame");
            }
            Enqueued::Rejected => {
                tracing::warn!("inbox for {id} full, rejected incoming frame");
                return;
            }
        }
        drop(session);
        self.dispatcher.web_socket(&id, WebSocketEvent::NextMessage);
    }

    /// Disconnect or failure. Dispatched at most once per session; the session
    /// is unresolvable afterwards.
    pub fn on_error(&self, id: &str, code: i32, reason: &str, response_code: i32, headers: &str) {
        if self.is_finalized() {
            return;
        }
        let Some(session) = self.registry.find(id) else {
            tracing::debug!("disconnect callback for unknown session {id}");
            return;
        };
        let Some(state) = session.mark_disconnected() else {
            tracing::debug!("duplicate disconnect callback for {id}");
            return;
        };
        let removal = self.discard(session);
        tracing::debug!("web socket {id} {state:?} ({code} {reason}), removal {removal:?}");
        self.dispatcher.web_socket(
            id,
            WebSocketEvent::Disconnected {
                code,
                reason: reason.to_string(),
                response_code,
                headers: headers.to_string(),
            },
        );
    }

    /// Push-style loader completion.
    pub fn on_load_success(&self, id: &str, data: Vec<u8>) {
        if self.is_finalized() {
            return;
        }
        tracing::debug!("load {id} finished with {} bytes", data.len());
        if self.loader_results.store(id, data) {
            self.dispatcher.url_loader(id, LoaderEvent::Success);
        }
    }

    /// Pull-style loader completion: fetch the result from the transport now so
    /// the host always reads it from the store.
    pub fn on_load_ready(&self, id: &str) {
        if self.is_finalized() {
            return;
        }
        match self.transport.loader_result(id) {
            Some(data) => self.on_load_success(id, data),
            None => {
                tracing::warn!("load {id} reported success but no result was available");
                self.dispatcher.url_loader(
                    id,
                    LoaderEvent::Error {
                        message: "result unavailable".to_string(),
                    },
                );
            }
        }
    }

    pub fn on_load_progress(&self, id: &str, message: &str) {
        if self.is_finalized() {
            return;
        }
        self.dispatcher.url_loader(
            id,
            LoaderEvent::Progress {
                message: message.to_string(),
            },
        );
    }

    pub fn on_load_error(&self, id: &str, message: &str) {
        if self.is_finalized() {
            return;
        }
        tracing::debug!("load {id} failed: {message}");
        self.dispatcher.url_loader(
            id,
            LoaderEvent::Error {
                message: message.to_string(),
            },
        );
    }

    pub fn on_log(&self, message: &str) {
        logging::managed_line(message);
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.abort();
        }
    }
}
