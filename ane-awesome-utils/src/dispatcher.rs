//! Serialized hand-off of status events to the host runtime.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{LoaderEvent, StatusEvent, WebSocketEvent};

/// Receiver of status events. In production this is the host's C callback.
pub trait StatusSink: Send + Sync {
    fn deliver(&self, event: &StatusEvent);
}

/// Delivers events to a [`StatusSink`] one at a time.
///
/// Events dispatched from one thread reach the sink in dispatch order. After
/// [`EventDispatcher::shutdown`] every dispatch is a no-op.
pub struct EventDispatcher {
    sink: Mutex<Option<Arc<dyn StatusSink>>>,
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Returns false when the dispatcher was already shut down.
    pub fn dispatch(&self, event: StatusEvent) -> bool {
        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink) => {
                tracing::trace!(code = %event.code, "dispatching status event");
                sink.deliver(&event);
                true
            }
            None => {
                tracing::debug!(code = %event.code, "dispatcher shut down, dropping event");
                false
            }
        }
    }

    pub fn web_socket(&self, id: &str, event: WebSocketEvent) -> bool {
        self.dispatch(StatusEvent::web_socket(id, &event))
    }

    pub fn url_loader(&self, id: &str, event: LoaderEvent) -> bool {
        self.dispatch(StatusEvent::url_loader(id, &event))
    }

    /// Stop delivering. Waits for an in-progress hand-off to finish.
    pub fn shutdown(&self) {
        self.sink.lock().take();
    }

    pub fn is_shut_down(&self) -> bool {
        self.sink.lock().is_none()
    }
}
