//! The seam between the session core and the external WebSocket/HTTP transport.
//!
//! Production builds talk to the managed library through [`managed::ManagedLibrary`];
//! tests substitute a recording stub. Transport events flow back through the
//! `on_*` methods of [`crate::bridge::Bridge`].

pub mod managed;

use crate::error::Result;
use crate::session::SessionId;

/// Outbound half of the transport.
///
/// Implementations must be callable from any thread. The bridge never holds
/// one of its own locks while calling into a transport, so implementations may
/// invoke bridge callbacks synchronously from inside these methods.
pub trait Transport: Send + Sync {
    /// Allocate a connection handle and its identifier.
    fn create(&self) -> Result<SessionId>;

    fn connect(&self, id: &str, uri: &str, headers: &str) -> Result<()>;

    fn send(&self, id: &str, frame: &[u8]) -> Result<()>;

    fn close(&self, id: &str, code: u32) -> Result<()>;

    /// Pull the next frame for transports that only notify on data.
    fn next_message(&self, _id: &str) -> Option<Vec<u8>> {
        None
    }

    /// Start a one-shot HTTP request, returning the request id.
    fn load_url(&self, url: &str, method: &str, body: &str, headers: &str) -> Result<String>;

    /// Pull a completed loader response for transports that only notify on success.
    fn loader_result(&self, _id: &str) -> Option<Vec<u8>> {
        None
    }

    /// Pin `host` to `ip` in the transport's resolver.
    fn add_static_host(&self, _host: &str, _ip: &str) -> Result<()> {
        Ok(())
    }

    fn remove_static_host(&self, _host: &str) -> Result<()> {
        Ok(())
    }

    /// Release transport resources. Called once from finalize.
    fn shutdown(&self) {}
}
