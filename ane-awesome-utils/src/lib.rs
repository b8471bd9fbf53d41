//! Native WebSocket and URL-loader bridge for the AIR AwesomeAneUtils extension.
//!
//! Exposes a C ABI (`extern "C"`) surface that the AIR native extension glue
//! calls. Sessions live in a process-wide registry; transport callbacks arrive
//! on arbitrary threads and are turned into status events for the host.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod loader;
pub mod logging;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatcher::StatusSink;
pub use error::{BridgeError, FfiResult};
pub use event::StatusEvent;
pub use transport::Transport;

use once_cell::sync::Lazy;

/// Shared tokio runtime for background housekeeping.
/// One worker is plenty for the pending-session reaper.
pub(crate) static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("ane-awesome-utils")
        .build()
        .expect("Failed to create tokio runtime")
});
