//! C ABI exports: the surface the AIR native extension glue calls.
//!
//! All functions are `extern "C"` and `#[no_mangle]`. One [`Bridge`] is
//! installed process-wide by `awesome_utils_initialize` and torn down by
//! `awesome_utils_finalize`. Every export contains panics and reports failure
//! through its sentinel (null, empty buffer, `false` or a non-zero [`FfiResult`]).

use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::bridge::callback::{CallbackSink, StatusCallback};
use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::dispatcher::StatusSink;
use crate::error::{BridgeError, FfiResult, Result};
use crate::logging;
use crate::transport::managed::{self, ManagedLibrary};
use crate::transport::Transport;

/// The installed bridge, if any.
static BRIDGE: Lazy<RwLock<Option<Arc<Bridge>>>> = Lazy::new(|| RwLock::new(None));

pub fn installed() -> Option<Arc<Bridge>> {
    BRIDGE.read().clone()
}

/// Build and install a bridge over `transport`. If one is already installed it
/// is returned unchanged.
pub fn initialize_with(
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn StatusSink>,
) -> Arc<Bridge> {
    let mut slot = BRIDGE.write();
    if let Some(existing) = slot.as_ref() {
        tracing::debug!("bridge already installed");
        return Arc::clone(existing);
    }
    let bridge = Arc::new(Bridge::new(config, transport, sink));
    bridge.start_reaper();
    *slot = Some(Arc::clone(&bridge));
    bridge
}

/// Uninstall and finalize the bridge. No-op when nothing is installed.
pub fn finalize() {
    let bridge = BRIDGE.write().take();
    if let Some(bridge) = bridge {
        bridge.finalize();
    }
}

/// Helper: read a C string pointer into a Rust String, returning None on null or invalid UTF-8.
unsafe fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
}

/// Like `read_c_str`, but null reads as an empty string.
unsafe fn read_optional_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return Some(String::new());
    }
    unsafe { read_c_str(ptr) }
}

unsafe fn read_bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Run an export body, turning a panic into `fallback`.
fn guard<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        tracing::error!("{name}: panicked");
        fallback
    })
}

fn bridge() -> Result<Arc<Bridge>> {
    installed().ok_or(BridgeError::NotInitialized)
}

fn report(name: &str, result: Result<()>) -> i32 {
    if let Err(e) = &result {
        tracing::warn!("{name}: {e}");
    }
    FfiResult::from(result) as i32
}

/// Bytes handed to the host. Release with `awesome_utils_free_bytes`.
#[repr(C)]
#[derive(Debug)]
pub struct ByteBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl ByteBuffer {
    pub fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len();
        Self {
            data: Box::into_raw(boxed).cast::<u8>(),
            len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_null() || self.len == 0
    }
}

// ─── Lifecycle ───────────────────────────────────────────────────────

/// Load the managed transport library and install the bridge.
///
/// Returns `true` on success, and also when the bridge is already initialized.
///
/// # Safety
///
/// `config_json` must be null or a valid, NUL-terminated UTF-8 C string.
/// `status_cb` and `user_data` must stay valid until `awesome_utils_finalize` returns.
///
/// Config JSON schema (every field optional):
/// ```json
/// {
///   "library_path": "C:\\path\\to\\AwesomeAneUtils.dll",
///   "log_dir": "C:\\debug1",
///   "log_filter": "ane_awesome_utils=info",
///   "inbox_limit": 0,
///   "overflow_policy": "drop_oldest",
///   "reap_interval_ms": 1000
/// }
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_initialize(
    config_json: *const c_char,
    status_cb: Option<StatusCallback>,
    user_data: *mut c_void,
) -> bool {
    guard("awesome_utils_initialize", false, || {
        if installed().is_some() {
            return true;
        }
        let Some(cb) = status_cb else {
            tracing::error!("awesome_utils_initialize: null status callback");
            return false;
        };
        let Some(json) = (unsafe { read_optional_c_str(config_json) }) else {
            tracing::error!("awesome_utils_initialize: invalid config_json");
            return false;
        };
        let config = match BridgeConfig::from_json(&json) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("awesome_utils_initialize: {e}");
                return false;
            }
        };
        match logging::init(&config) {
            Ok(Some(path)) => tracing::info!("logging to {}", path.display()),
            Ok(None) => {}
            Err(e) => eprintln!("ane-awesome-utils: log setup failed: {e:#}"),
        }

        let Some(path) = config
            .library_path
            .clone()
            .or_else(managed::default_library_path)
        else {
            tracing::error!("awesome_utils_initialize: could not locate the managed library");
            return false;
        };
        let library = match ManagedLibrary::load(&path).and_then(|lib| lib.start().map(|()| lib)) {
            Ok(lib) => lib,
            Err(e) => {
                tracing::error!("awesome_utils_initialize: {e}");
                return false;
            }
        };

        let sink = Arc::new(CallbackSink::new(cb, user_data));
        initialize_with(config, Arc::new(library), sink);
        tracing::info!("bridge initialized");
        true
    })
}

/// Close every session, silence status events and release the transport.
/// Safe to call when not initialized and more than once.
#[unsafe(no_mangle)]
pub extern "C" fn awesome_utils_finalize() {
    guard("awesome_utils_finalize", (), finalize);
}

// ─── WebSocket ───────────────────────────────────────────────────────

/// Create a session. Returns its id, or null on failure.
/// Free the id with `awesome_utils_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn awesome_utils_create_web_socket() -> *mut c_char {
    guard("awesome_utils_create_web_socket", std::ptr::null_mut(), || {
        match bridge().and_then(|b| b.create_web_socket()) {
            Ok(id) => into_c_string(id),
            Err(e) => {
                tracing::warn!("awesome_utils_create_web_socket: {e}");
                std::ptr::null_mut()
            }
        }
    })
}

/// Start the opening handshake. `headers` may be null.
///
/// # Safety
///
/// `id` and `uri` must be valid, NUL-terminated UTF-8 C strings; `headers` null or one.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_connect_web_socket(
    id: *const c_char,
    uri: *const c_char,
    headers: *const c_char,
) -> i32 {
    guard("awesome_utils_connect_web_socket", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_connect_web_socket", Err(e)),
        };
        let (Some(id), Some(uri), Some(headers)) = (
            unsafe { read_c_str(id) },
            unsafe { read_c_str(uri) },
            unsafe { read_optional_c_str(headers) },
        ) else {
            return report(
                "awesome_utils_connect_web_socket",
                Err(BridgeError::InvalidArgument("id/uri/headers")),
            );
        };
        report(
            "awesome_utils_connect_web_socket",
            bridge.connect_web_socket(&id, &uri, &headers),
        )
    })
}

/// Send one binary frame. The bytes are copied before this returns.
///
/// # Safety
///
/// `id` must be a valid C string; `data` must point to `len` readable bytes
/// (it may be null when `len` is 0).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_send_web_socket_message(
    id: *const c_char,
    data: *const u8,
    len: usize,
) -> i32 {
    guard("awesome_utils_send_web_socket_message", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_send_web_socket_message", Err(e)),
        };
        let (Some(id), Some(frame)) = (unsafe { read_c_str(id) }, unsafe { read_bytes(data, len) })
        else {
            return report(
                "awesome_utils_send_web_socket_message",
                Err(BridgeError::InvalidArgument("id/data")),
            );
        };
        report(
            "awesome_utils_send_web_socket_message",
            bridge.send_web_socket_message(&id, frame),
        )
    })
}

/// Text frames are not supported; always fails with [`FfiResult::Unsupported`]
/// for a known session.
///
/// # Safety
///
/// `id` and `text` must be valid, NUL-terminated UTF-8 C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_send_web_socket_text(
    id: *const c_char,
    text: *const c_char,
) -> i32 {
    guard("awesome_utils_send_web_socket_text", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_send_web_socket_text", Err(e)),
        };
        let (Some(id), Some(text)) = (unsafe { read_c_str(id) }, unsafe { read_optional_c_str(text) })
        else {
            return report(
                "awesome_utils_send_web_socket_text",
                Err(BridgeError::InvalidArgument("id/text")),
            );
        };
        report(
            "awesome_utils_send_web_socket_text",
            bridge.send_web_socket_text(&id, &text),
        )
    })
}

/// Request a close with `code`. The `disconnected` event follows asynchronously.
///
/// # Safety
///
/// `id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_close_web_socket(id: *const c_char, code: u32) -> i32 {
    guard("awesome_utils_close_web_socket", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_close_web_socket", Err(e)),
        };
        let Some(id) = (unsafe { read_c_str(id) }) else {
            return report(
                "awesome_utils_close_web_socket",
                Err(BridgeError::InvalidArgument("id")),
            );
        };
        report("awesome_utils_close_web_socket", bridge.close_web_socket(&id, code))
    })
}

/// Dequeue the oldest received frame. Returns an empty buffer when the inbox
/// is empty or the id is unknown. Never blocks.
///
/// # Safety
///
/// `id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_poll_next_message(id: *const c_char) -> ByteBuffer {
    guard("awesome_utils_poll_next_message", ByteBuffer::empty(), || {
        let Some(id) = (unsafe { read_c_str(id) }) else {
            tracing::warn!("awesome_utils_poll_next_message: null or invalid id");
            return ByteBuffer::empty();
        };
        installed()
            .and_then(|b| b.poll_next_message(&id))
            .map(ByteBuffer::from_vec)
            .unwrap_or_else(ByteBuffer::empty)
    })
}

// ─── URL loader ──────────────────────────────────────────────────────

/// Start a one-shot HTTP request. Returns the request id, or null on failure.
/// `method` defaults to GET; `body` and `headers` may be null.
///
/// # Safety
///
/// Every pointer must be null or a valid, NUL-terminated UTF-8 C string; `url`
/// must not be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_load_url(
    url: *const c_char,
    method: *const c_char,
    body: *const c_char,
    headers: *const c_char,
) -> *mut c_char {
    guard("awesome_utils_load_url", std::ptr::null_mut(), || {
        let (Some(url), Some(method), Some(body), Some(headers)) = (
            unsafe { read_c_str(url) },
            unsafe { read_optional_c_str(method) },
            unsafe { read_optional_c_str(body) },
            unsafe { read_optional_c_str(headers) },
        ) else {
            tracing::warn!("awesome_utils_load_url: invalid argument");
            return std::ptr::null_mut();
        };
        let method = if method.is_empty() { "GET".to_string() } else { method };
        match bridge().and_then(|b| b.load_url(&url, &method, &body, &headers)) {
            Ok(id) => into_c_string(id),
            Err(e) => {
                tracing::warn!("awesome_utils_load_url: {e}");
                std::ptr::null_mut()
            }
        }
    })
}

/// Take the stored response of a finished load. A second call for the same id
/// returns an empty buffer.
///
/// # Safety
///
/// `id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_get_loader_result(id: *const c_char) -> ByteBuffer {
    guard("awesome_utils_get_loader_result", ByteBuffer::empty(), || {
        let Some(id) = (unsafe { read_c_str(id) }) else {
            tracing::warn!("awesome_utils_get_loader_result: null or invalid id");
            return ByteBuffer::empty();
        };
        installed()
            .and_then(|b| b.get_loader_result(&id))
            .map(ByteBuffer::from_vec)
            .unwrap_or_else(ByteBuffer::empty)
    })
}

// ─── Resolver ────────────────────────────────────────────────────────

/// Pin `host` to `ip` for subsequent connections and loads.
///
/// # Safety
///
/// `host` and `ip` must be valid, NUL-terminated UTF-8 C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_add_static_host(
    host: *const c_char,
    ip: *const c_char,
) -> i32 {
    guard("awesome_utils_add_static_host", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_add_static_host", Err(e)),
        };
        let (Some(host), Some(ip)) = (unsafe { read_c_str(host) }, unsafe { read_c_str(ip) }) else {
            return report(
                "awesome_utils_add_static_host",
                Err(BridgeError::InvalidArgument("host/ip")),
            );
        };
        report("awesome_utils_add_static_host", bridge.add_static_host(&host, &ip))
    })
}

/// # Safety
///
/// `host` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_remove_static_host(host: *const c_char) -> i32 {
    guard("awesome_utils_remove_static_host", FfiResult::Internal as i32, || {
        let bridge = match bridge() {
            Ok(b) => b,
            Err(e) => return report("awesome_utils_remove_static_host", Err(e)),
        };
        let Some(host) = (unsafe { read_c_str(host) }) else {
            return report(
                "awesome_utils_remove_static_host",
                Err(BridgeError::InvalidArgument("host")),
            );
        };
        report("awesome_utils_remove_static_host", bridge.remove_static_host(&host))
    })
}

// ─── Memory ──────────────────────────────────────────────────────────

/// Free a string returned by this library.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by `awesome_utils_create_web_socket`
/// or `awesome_utils_load_url`, and must not be freed twice.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Free a buffer returned by `awesome_utils_poll_next_message` or
/// `awesome_utils_get_loader_result`.
///
/// # Safety
///
/// `buffer` must come from this library unchanged and must not be freed twice.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn awesome_utils_free_bytes(buffer: ByteBuffer) {
    if buffer.is_empty() {
        return;
    }
    let slice = std::ptr::slice_from_raw_parts_mut(buffer.data, buffer.len);
    drop(unsafe { Box::from_raw(slice) });
}

// ─── Tests ───────────────────────────────────────────────────────────
