//! Transport backed by the managed AwesomeAneUtils library.
//!
//! The library is loaded at runtime with `libloading` and its
//! `csharpLibrary_awesomeUtils_*` exports are resolved once. Strings and byte
//! buffers cross as pointer + length; buffers returned by the library come back
//! as a [`DataArray`] that must be released with `disposeDataArrayBytes`.
//!
//! The library is loaded at most once per process and never unloaded. Its
//! runtime keeps worker threads alive inside it after `finalize`, and a
//! callback thread may drop the last bridge handle, so [`ManagedLibrary`]
//! only holds resolved function pointers into the process-wide handle.
//!
//! The library notifies on data rather than pushing payloads, so its data and
//! loader-success callbacks are routed to the bridge's pull-on-notify entry
//! points.

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use libloading::Library;
use once_cell::sync::OnceCell;

use super::Transport;
use crate::bridge::abi;
use crate::error::{BridgeError, Result};
use crate::logging;
use crate::session::SessionId;

const EXTENSION_ID: &str = "br.com.redesurftank.aneawesomeutils";

#[cfg(all(windows, target_pointer_width = "64"))]
const PLATFORM_DIR: &str = "Windows-x86-64";
#[cfg(all(windows, not(target_pointer_width = "64")))]
const PLATFORM_DIR: &str = "Windows-x86";
#[cfg(target_os = "macos")]
const PLATFORM_DIR: &str = "MacOS-x86-64";
#[cfg(not(any(windows, target_os = "macos")))]
const PLATFORM_DIR: &str = "default";

#[cfg(windows)]
const LIBRARY_FILE: &str = "AwesomeAneUtils.dll";
#[cfg(target_os = "macos")]
const LIBRARY_FILE: &str = "AwesomeAneUtils.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
const LIBRARY_FILE: &str = "libAwesomeAneUtils.so";

/// Buffer returned by the managed library. Null pointer or zero size means "nothing".
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataArray {
    pub data: *mut u8,
    pub size: i32,
}

type InitializeFn = unsafe extern "C" fn(
    *const c_void,
    *const c_void,
    *const c_void,
    *const c_void,
    *const c_void,
    *const c_void,
    *const c_void,
) -> i32;
type FinalizeFn = unsafe extern "C" fn();
type CreateWebSocketFn = unsafe extern "C" fn() -> DataArray;
type ConnectWebSocketFn =
    unsafe extern "C" fn(*const u8, i32, *const u8, i32, *const u8, i32) -> i32;
type SendWebSocketMessageFn = unsafe extern "C" fn(*const u8, i32, *const u8, i32) -> i32;
type CloseWebSocketFn = unsafe extern "C" fn(*const u8, i32, i32) -> i32;
type FetchByIdFn = unsafe extern "C" fn(*const u8, i32) -> DataArray;
type LoadUrlFn =
    unsafe extern "C" fn(*const u8, i32, *const u8, i32, *const u8, i32, *const u8, i32) -> DataArray;
type AddStaticHostFn = unsafe extern "C" fn(*const u8, i32, *const u8, i32);
type RemoveStaticHostFn = unsafe extern "C" fn(*const u8, i32);
type DisposeFn = unsafe extern "C" fn(*mut u8);

/// Process-wide handle, with the path it was loaded from.
static LIBRARY: OnceCell<(PathBuf, Library)> = OnceCell::new();

/// Resolved exports of the managed library. Dropping this releases nothing.
pub struct ManagedLibrary {
    initialize: InitializeFn,
    finalize: FinalizeFn,
    create_web_socket: CreateWebSocketFn,
    connect_web_socket: ConnectWebSocketFn,
    send_web_socket_message: SendWebSocketMessageFn,
    close_web_socket: CloseWebSocketFn,
    get_web_socket_message: FetchByIdFn,
    load_url: LoadUrlFn,
    get_loader_result: FetchByIdFn,
    add_static_host: AddStaticHostFn,
    remove_static_host: RemoveStaticHostFn,
    dispose: DisposeFn,
}

fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    let sym = unsafe { lib.get::<T>(name.as_bytes()) }
        .map_err(|e| BridgeError::Library(format!("missing export {name}: {e}")))?;
    Ok(*sym)
}

/// Load the library on first use. Later calls reuse the first handle.
fn library(path: &Path) -> Result<&'static Library> {
    let (loaded_from, lib) = LIBRARY.get_or_try_init(|| {
        tracing::info!("loading managed library from {}", path.display());
        let lib = unsafe { Library::new(path) }
            .map_err(|e| BridgeError::Library(format!("{}: {e}", path.display())))?;
        Ok::<_, BridgeError>((path.to_path_buf(), lib))
    })?;
    if loaded_from != path {
        tracing::warn!(
            "managed library already loaded from {}, ignoring {}",
            loaded_from.display(),
            path.display()
        );
    }
    Ok(lib)
}

fn len_i32(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| BridgeError::InvalidArgument("payload larger than 2 GiB"))
}

/// Where the AIR runtime unpacks the managed library.
///
/// Honours the `-extdir` argument used by the AIR debug launcher, falling back
/// to the extension directory next to the executable.
pub fn default_library_path() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let base = match args
        .iter()
        .position(|a| a == "-extdir")
        .and_then(|i| args.get(i + 1))
    {
        Some(dir) => PathBuf::from(dir).join(format!("{EXTENSION_ID}.ane")),
        None => std::env::current_exe()
            .ok()?
            .parent()?
            .join("META-INF")
            .join("AIR")
            .join("extensions")
            .join(EXTENSION_ID),
    };
    Some(
        base.join("META-INF")
            .join("ANE")
            .join(PLATFORM_DIR)
            .join(LIBRARY_FILE),
    )
}

impl ManagedLibrary {
    /// Load the library if needed and resolve every export the bridge uses.
    pub fn load(path: &Path) -> Result<Self> {
        let lib = library(path)?;

        Ok(Self {
            initialize: symbol(lib, "csharpLibrary_awesomeUtils_initialize")?,
            finalize: symbol(lib, "csharpLibrary_awesomeUtils_finalize")?,
            create_web_socket: symbol(lib, "csharpLibrary_awesomeUtils_createWebSocket")?,
            connect_web_socket: symbol(lib, "csharpLibrary_awesomeUtils_connectWebSocket")?,
            send_web_socket_message: symbol(lib, "csharpLibrary_awesomeUtils_sendWebSocketMessage")?,
            close_web_socket: symbol(lib, "csharpLibrary_awesomeUtils_closeWebSocket")?,
            get_web_socket_message: symbol(lib, "csharpLibrary_awesomeUtils_getWebSocketMessage")?,
            load_url: symbol(lib, "csharpLibrary_awesomeUtils_loadUrl")?,
            get_loader_result: symbol(lib, "csharpLibrary_awesomeUtils_getLoaderResult")?,
            add_static_host: symbol(lib, "csharpLibrary_awesomeUtils_addStaticHost")?,
            remove_static_host: symbol(lib, "csharpLibrary_awesomeUtils_removeStaticHost")?,
            dispose: symbol(lib, "csharpLibrary_awesomeUtils_disposeDataArrayBytes")?,
        })
    }

    /// Register the bridge callbacks with the library.
    pub fn start(&self) -> Result<()> {
        let code = unsafe {
            (self.initialize)(
                loader_success_callback as *const c_void,
                loader_progress_callback as *const c_void,
                loader_failure_callback as *const c_void,
                web_socket_connect_callback as *const c_void,
                web_socket_error_callback as *const c_void,
                web_socket_data_callback as *const c_void,
                write_log_callback as *const c_void,
            )
        };
        tracing::debug!("managed initialize returned {code}");
        if code == 1 {
            Ok(())
        } else {
            Err(BridgeError::Library(format!("initialize returned {code}")))
        }
    }

    /// Copy a returned buffer into Rust memory and release the original.
    fn take(&self, array: DataArray) -> Option<Vec<u8>> {
        if array.data.is_null() {
            return None;
        }
        let bytes = (array.size > 0).then(|| {
            unsafe { std::slice::from_raw_parts(array.data, array.size as usize) }.to_vec()
        });
        unsafe { (self.dispose)(array.data) };
        bytes
    }

    fn take_string(&self, array: DataArray) -> Option<String> {
        self.take(array).and_then(|b| String::from_utf8(b).ok())
    }
}

impl Transport for ManagedLibrary {
    fn create(&self) -> Result<SessionId> {
        let array = unsafe { (self.create_web_socket)() };
        self.take_string(array)
            .ok_or_else(|| BridgeError::Transport("createWebSocket".into()))
    }

    fn connect(&self, id: &str, uri: &str, headers: &str) -> Result<()> {
        let code = unsafe {
            (self.connect_web_socket)(
                id.as_ptr(),
                len_i32(id.len())?,
                uri.as_ptr(),
                len_i32(uri.len())?,
                headers.as_ptr(),
                len_i32(headers.len())?,
            )
        };
        match code {
            1 => Ok(()),
            _ => Err(BridgeError::Transport(format!("connectWebSocket {id}"))),
        }
    }

    fn send(&self, id: &str, frame: &[u8]) -> Result<()> {
        let code = unsafe {
            (self.send_web_socket_message)(
                id.as_ptr(),
                len_i32(id.len())?,
                frame.as_ptr(),
                len_i32(frame.len())?,
            )
        };
        match code {
            1 => Ok(()),
            _ => Err(BridgeError::Transport(format!("sendWebSocketMessage {id}"))),
        }
    }

    fn close(&self, id: &str, code: u32) -> Result<()> {
        let close_code = i32::try_from(code).map_err(|_| BridgeError::InvalidArgument("close code"))?;
        let ret = unsafe { (self.close_web_socket)(id.as_ptr(), len_i32(id.len())?, close_code) };
        match ret {
            1 => Ok(()),
            _ => Err(BridgeError::Transport(format!("closeWebSocket {id}"))),
        }
    }

    fn next_message(&self, id: &str) -> Option<Vec<u8>> {
        let len = len_i32(id.len()).ok()?;
        let array = unsafe { (self.get_web_socket_message)(id.as_ptr(), len) };
        self.take(array)
    }

    fn load_url(&self, url: &str, method: &str, body: &str, headers: &str) -> Result<String> {
        let array = unsafe {
            (self.load_url)(
                url.as_ptr(),
                len_i32(url.len())?,
                method.as_ptr(),
                len_i32(method.len())?,
                body.as_ptr(),
                len_i32(body.len())?,
                headers.as_ptr(),
                len_i32(headers.len())?,
            )
        };
        self.take_string(array)
            .ok_or_else(|| BridgeError::Transport(format!("loadUrl {url}")))
    }

    fn loader_result(&self, id: &str) -> Option<Vec<u8>> {
        let len = len_i32(id.len()).ok()?;
        let array = unsafe { (self.get_loader_result)(id.as_ptr(), len) };
        self.take(array)
    }

    fn add_static_host(&self, host: &str, ip: &str) -> Result<()> {
        unsafe {
            (self.add_static_host)(
                host.as_ptr(),
                len_i32(host.len())?,
                ip.as_ptr(),
                len_i32(ip.len())?,
            )
        };
        Ok(())
    }

    fn remove_static_host(&self, host: &str) -> Result<()> {
        unsafe { (self.remove_static_host)(host.as_ptr(), len_i32(host.len())?) };
        Ok(())
    }

    fn shutdown(&self) {
        unsafe { (self.finalize)() };
    }
}

// ─── Callbacks invoked by the managed library ──────────────────────

/// Read a callback string argument; null becomes empty, invalid UTF-8 is replaced.
unsafe fn arg(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Run a callback body against the installed bridge without letting a panic
/// unwind into the managed runtime.
fn with_bridge(name: &str, f: impl FnOnce(&crate::bridge::Bridge)) {
    let outcome = catch_unwind(AssertUnwindSafe(|| match abi::installed() {
        Some(bridge) => f(&bridge),
        None => tracing::debug!("{name}: bridge not installed, ignoring"),
    }));
    if outcome.is_err() {
        tracing::error!("{name}: panicked, event dropped");
    }
}

unsafe extern "C" fn loader_success_callback(id: *const c_char) {
    let id = unsafe { arg(id) };
    with_bridge("loader_success", |b| b.on_load_ready(&id));
}

unsafe extern "C" fn loader_progress_callback(id: *const c_char, message: *const c_char) {
    let (id, message) = unsafe { (arg(id), arg(message)) };
    with_bridge("loader_progress", |b| b.on_load_progress(&id, &message));
}

unsafe extern "C" fn loader_failure_callback(id: *const c_char, message: *const c_char) {
    let (id, message) = unsafe { (arg(id), arg(message)) };
    with_bridge("loader_failure", |b| b.on_load_error(&id, &message));
}

unsafe extern "C" fn web_socket_connect_callback(id: *const c_char, headers: *const c_char) {
    let (id, headers) = unsafe { (arg(id), arg(headers)) };
    with_bridge("web_socket_connect", |b| b.on_connected(&id, &headers));
}

unsafe extern "C" fn web_socket_error_callback(
    id: *const c_char,
    close_code: i32,
    reason: *const c_char,
    response_code: i32,
    headers: *const c_char,
) {
    let (id, reason, headers) = unsafe { (arg(id), arg(reason), arg(headers)) };
    with_bridge("web_socket_error", |b| {
        b.on_error(&id, close_code, &reason, response_code, &headers)
    });
}

unsafe extern "C" fn web_socket_data_callback(id: *const c_char) {
    let id = unsafe { arg(id) };
    with_bridge("web_socket_data", |b| b.on_data_available(&id));
}

unsafe extern "C" fn write_log_callback(message: *const c_char) {
    let message = unsafe { arg(message) };
    logging::managed_line(&message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_default_library_path_shape() {
        let path = default_library_path().unwrap();
        assert!(path.ends_with(Path::new("META-INF").join("ANE").join(PLATFORM_DIR).join(LIBRARY_FILE)));
        assert!(path.to_string_lossy().contains(EXTENSION_ID));
    }

    #[test]
    fn test_load_missing_library() {
        let err = ManagedLibrary::load(Path::new("/definitely/not/here/libAwesomeAneUtils.so"))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Library(_)));
        // a failed load leaves the slot empty so a later initialize can retry
        assert!(LIBRARY.get().is_none());
    }

    #[test]
    fn test_dropping_transport_keeps_library_loaded() {
        // only fn pointers: a bridge torn down on a callback thread cannot unmap the library
        assert!(!std::mem::needs_drop::<ManagedLibrary>());
    }

    #[test]
    fn test_arg_handles_null_and_text() {
        assert_eq!(unsafe { arg(std::ptr::null()) }, "");
        let s = CString::new("abc").unwrap();
        assert_eq!(unsafe { arg(s.as_ptr()) }, "abc");
    }

    #[test]
    fn test_callbacks_without_bridge_are_ignored() {
        let id = CString::new("nobody").unwrap();
        unsafe { web_socket_data_callback(id.as_ptr()) };
        unsafe { web_socket_connect_callback(id.as_ptr(), std::ptr::null()) };
        unsafe { loader_success_callback(std::ptr::null()) };
    }

    #[test]
    fn test_len_limit() {
        assert_eq!(len_i32(5).unwrap(), 5);
        assert!(len_i32(usize::MAX).is_err());
    }
}
