//! Session registry with deferred deletion.
//!
//! `find` hands out strong `Arc` handles, so a callback thread can keep using a
//! session after a concurrent disconnect removed it. A removed session whose
//! handle is still held elsewhere is parked in `pending` and erased by
//! [`SessionRegistry::reap_pending`] once it is the last reference.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::session::{Session, SessionId};

/// What `remove` did with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// No other holder; the session was destroyed immediately.
    Dropped,
    /// Another holder is still using it; moved to the pending set.
    Deferred,
    /// The id was not live.
    Missing,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    // Lock order: `live` before `pending`.
    live: Mutex<HashMap<SessionId, Arc<Session>>>,
    pending: Mutex<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if the id is live or still pending deletion;
    /// reaped ids are not remembered.
    pub fn insert(&self, session: Arc<Session>) -> Result<()> {
        let mut live = self.live.lock();
        let id = session.id().to_string();
        if live.contains_key(&id) || self.pending.lock().iter().any(|s| s.id() == id) {
            return Err(BridgeError::DuplicateSession(id));
        }
        live.insert(id, session);
        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<Arc<Session>> {
        self.live.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Removal {
        let mut live = self.live.lock();
        let Some(session) = live.remove(id) else {
            return Removal::Missing;
        };
        if Arc::strong_count(&session) == 1 {
            drop(live);
            drop(session);
            Removal::Dropped
        } else {
            self.pending.lock().push(session);
            Removal::Deferred
        }
    }

    /// Erase pending sessions nobody else holds any more. Returns how many were erased.
    pub fn reap_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|s| Arc::strong_count(s) > 1);
        before - pending.len()
    }

    /// Remove every live session, returning the handles to the caller.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.live.lock().drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MessageQueue;

    fn session(id: &str) -> Arc<Session> {
        Arc::new(Session::new(id.to_string(), MessageQueue::new()))
    }

    #[test]
    fn test_insert_find_remove() {
        let reg = SessionRegistry::new();
        reg.insert(session("a")).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.find("a").is_some());
        assert!(reg.find("b").is_none());

        assert_eq!(reg.remove("a"), Removal::Dropped);
        assert!(reg.find("a").is_none());
        assert_eq!(reg.remove("a"), Removal::Missing);
        assert_eq!(reg.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let reg = SessionRegistry::new();
        reg.insert(session("a")).unwrap();
        assert!(matches!(
            reg.insert(session("a")),
            Err(BridgeError::DuplicateSession(_))
        ));
    }

    #[test]
    fn test_remove_while_held_is_deferred() {
        let reg = SessionRegistry::new();
        reg.insert(session("a")).unwrap();

        let held = reg.find("a").unwrap();
        assert_eq!(reg.remove("a"), Removal::Deferred);
        assert!(reg.find("a").is_none());
        assert_eq!(reg.pending_len(), 1);

        // id stays reserved while pending
        assert!(reg.insert(session("a")).is_err());

        // holder can still use the session safely
        held.inbox().enqueue(vec![1]);
        assert_eq!(reg.reap_pending(), 0);

        drop(held);
        assert_eq!(reg.reap_pending(), 1);
        assert_eq!(reg.pending_len(), 0);

        // no tombstones: once reaped, uniqueness is up to the transport
        assert!(reg.insert(session("a")).is_ok());
    }

    #[test]
    fn test_drain_empties_live_map() {
        let reg = SessionRegistry::new();
        reg.insert(session("a")).unwrap();
        reg.insert(session("b")).unwrap();
        let drained = reg.drain();
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_concurrent_find_and_remove() {
        let reg = Arc::new(SessionRegistry::new());
        for round in 0..2000 {
            let id = format!("s{round}");
            reg.insert(session(&id)).unwrap();

            let finder = {
                let reg = Arc::clone(&reg);
                let id = id.clone();
                std::thread::spawn(move || {
                    if let Some(s) = reg.find(&id) {
                        s.inbox().enqueue(vec![0xAB]);
                    }
                })
            };
            let remover = {
                let reg = Arc::clone(&reg);
                let id = id.clone();
                std::thread::spawn(move || reg.remove(&id))
            };
            finder.join().unwrap();
            assert_ne!(remover.join().unwrap(), Removal::Missing);
        }
        reg.reap_pending();
        assert!(reg.is_empty());
        assert_eq!(reg.pending_len(), 0);
    }
}
