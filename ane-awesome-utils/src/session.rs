//! Session — one WebSocket connection's identity, inbox and lifecycle state.

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::queue::MessageQueue;
use crate::transport::Transport;

/// Opaque identifier allocated by the transport on create.
pub type SessionId = String;

/// Lifecycle of a session.
///
/// `Created → Connecting → Open → Closing → Closed`, with `Error` reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

/// Per-session state. Shared between the registry and in-flight callbacks via `Arc`.
///
/// `state` and `inbox` each have their own lock; neither is held across a
/// call into the transport.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: Mutex<SessionState>,
    inbox: MessageQueue,
}

impl Session {
    pub fn new(id: SessionId, inbox: MessageQueue) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::Created),
            inbox,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn inbox(&self) -> &MessageQueue {
        &self.inbox
    }

    fn wrong_state(&self, state: SessionState, op: &'static str) -> BridgeError {
        BridgeError::WrongState {
            id: self.id.clone(),
            state,
            op,
        }
    }

    /// Ask the transport to open the connection. Only valid from `Created`.
    ///
    /// A transport refusal leaves the session in `Error`; the caller is
    /// responsible for removing it from the registry.
    pub fn connect(&self, transport: &dyn Transport, uri: &str, headers: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Created {
                return Err(self.wrong_state(*state, "connect"));
            }
            *state = SessionState::Connecting;
        }
        transport.connect(&self.id, uri, headers).inspect_err(|_| {
            *self.state.lock() = SessionState::Error;
        })
    }

    /// Forward a binary frame unchanged. Only valid while `Open`.
    pub fn send(&self, transport: &dyn Transport, frame: &[u8]) -> Result<()> {
        let state = self.state();
        if state != SessionState::Open {
            return Err(self.wrong_state(state, "send"));
        }
        transport.send(&self.id, frame)
    }

    /// Text frames are not implemented by any transport variant.
    pub fn send_text(&self, _text: &str) -> Result<()> {
        Err(BridgeError::Unsupported("sending text frames"))
    }

    /// Request a close. Valid from any non-terminal state; the session stays
    /// addressable in `Closing` until the transport reports the disconnect.
    pub fn close(&self, transport: &dyn Transport, code: u32) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return Err(self.wrong_state(*state, "close"));
            }
            *state = SessionState::Closing;
        }
        transport.close(&self.id, code)
    }

    /// `Connecting → Open`. Returns false if the session was in any other state.
    pub fn mark_open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Connecting {
            *state = SessionState::Open;
            true
        } else {
            false
        }
    }

    /// Move to the terminal state reported by a disconnect: `Closed` when the
    /// close was requested locally, `Error` otherwise.
    ///
    /// Returns `None` when the session was already terminal, so a second
    /// disconnect callback is ignored.
    pub fn mark_disconnected(&self) -> Option<SessionState> {
        let mut state = self.state.lock();
        let next = match *state {
            s if s.is_terminal() => return None,
            SessionState::Closing => SessionState::Closed,
            _ => SessionState::Error,
        };
        *state = next;
        Some(next)
    }

    pub fn mark_error(&self) {
        *self.state.lock() = SessionState::Error;
    }
}
