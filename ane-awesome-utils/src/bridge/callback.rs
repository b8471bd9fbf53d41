//! Safe wrapper around the host's C status callback.

use std::ffi::{c_char, c_void, CString};

use crate::dispatcher::StatusSink;
use crate::event::StatusEvent;

/// C callback signature: receives the status code and level as NUL-terminated
/// UTF-8 strings (pointer + length, length excludes the NUL) and opaque user data.
///
/// The host glue typically forwards the pair to `FREDispatchStatusEventAsync`.
pub type StatusCallback = unsafe extern "C" fn(
    code_ptr: *const c_char,
    code_len: usize,
    level_ptr: *const c_char,
    level_len: usize,
    user_data: *mut c_void,
);

/// Wraps the host status callback with its user_data pointer.
///
/// The host is responsible for keeping the callback and user_data valid until
/// `awesome_utils_finalize` returns.
pub struct CallbackSink {
    cb: StatusCallback,
    user_data: *mut c_void,
}

// Safety: the host status API is documented as callable from any thread, and
// the dispatcher serializes every call through this sink.
unsafe impl Send for CallbackSink {}
unsafe impl Sync for CallbackSink {}

impl CallbackSink {
    pub fn new(cb: StatusCallback, user_data: *mut c_void) -> Self {
        Self { cb, user_data }
    }
}

impl StatusSink for CallbackSink {
    /// Events containing interior NUL bytes are dropped with a warning.
    fn deliver(&self, event: &StatusEvent) {
        let (Ok(code), Ok(level)) = (
            CString::new(event.code.as_str()),
            CString::new(event.level.as_str()),
        ) else {
            tracing::warn!("status event contained interior NUL byte, dropping");
            return;
        };
        unsafe {
            (self.cb)(
                code.as_ptr(),
                event.code.len(),
                level.as_ptr(),
                event.level.len(),
                self.user_data,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CALL_COUNT: AtomicUsize = AtomicUsize::new(0);
    static LAST_CODE_LEN: AtomicUsize = AtomicUsize::new(0);
    static LAST_LEVEL_LEN: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn test_cb(
        code_ptr: *const c_char,
        code_len: usize,
        level_ptr: *const c_char,
        level_len: usize,
        _user_data: *mut c_void,
    ) {
        let code = unsafe { CStr::from_ptr(code_ptr) };
        let level = unsafe { CStr::from_ptr(level_ptr) };
        assert_eq!(code.to_bytes().len(), code_len);
        assert_eq!(level.to_bytes().len(), level_len);
        CALL_COUNT.fetch_add(1, Ordering::SeqCst);
        LAST_CODE_LEN.store(code_len, Ordering::SeqCst);
        LAST_LEVEL_LEN.store(level_len, Ordering::SeqCst);
    }

    #[test]
    fn test_callback_dispatch() {
        let sink = CallbackSink::new(test_cb, std::ptr::null_mut());
        sink.deliver(&StatusEvent {
            code: "web-socket;disconnected;abc".into(),
            level: "1000;bye".into(),
        });

        assert_eq!(CALL_COUNT.load(Ordering::SeqCst), 1);
        assert_eq!(LAST_CODE_LEN.load(Ordering::SeqCst), 27);
        assert_eq!(LAST_LEVEL_LEN.load(Ordering::SeqCst), 8);

        // interior NUL is dropped, not delivered
        sink.deliver(&StatusEvent {
            code: "bad\0code".into(),
            level: String::new(),
        });
        assert_eq!(CALL_COUNT.load(Ordering::SeqCst), 1);
    }
}
