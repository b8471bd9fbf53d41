//! Exercises the exported C functions end to end against an in-memory
//! transport. The bridge slot is process-wide, so everything runs in one test.

mod common;

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::{Arc, Mutex};

use ane_awesome_utils::bridge::abi::{self, *};
use ane_awesome_utils::bridge::callback::CallbackSink;
use ane_awesome_utils::{BridgeConfig, FfiResult};

static EVENTS: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

unsafe extern "C" fn record_status(
    code_ptr: *const c_char,
    _code_len: usize,
    level_ptr: *const c_char,
    _level_len: usize,
    _user_data: *mut c_void,
) {
    let code = unsafe { CStr::from_ptr(code_ptr) }.to_string_lossy().into_owned();
    let level = unsafe { CStr::from_ptr(level_ptr) }.to_string_lossy().into_owned();
    EVENTS.lock().unwrap().push((code, level));
}

fn take_string(ptr: *mut c_char) -> String {
    assert!(!ptr.is_null());
    let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
    unsafe { awesome_utils_free_string(ptr) };
    s
}

fn take_bytes(buf: ByteBuffer) -> Option<Vec<u8>> {
    if buf.is_empty() {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len) }.to_vec();
    unsafe { awesome_utils_free_bytes(buf) };
    Some(bytes)
}

#[test]
fn exported_surface_lifecycle() {
    // before initialize everything fails gracefully
    assert!(awesome_utils_create_web_socket().is_null());
    let unknown = CString::new("missing").unwrap();
    assert_eq!(take_bytes(unsafe { awesome_utils_poll_next_message(unknown.as_ptr()) }), None);

    let transport = Arc::new(common::FakeTransport::default());
    let sink = Arc::new(CallbackSink::new(record_status, std::ptr::null_mut()));
    let bridge = abi::initialize_with(BridgeConfig::default(), transport.clone(), sink);

    // a second initialize keeps the installed bridge
    let again = unsafe { awesome_utils_initialize(std::ptr::null(), Some(record_status), std::ptr::null_mut()) };
    assert!(again);
    assert!(Arc::ptr_eq(&bridge, &abi::installed().unwrap()));

    let id = take_string(awesome_utils_create_web_socket());
    let id_c = CString::new(id.clone()).unwrap();
    let uri = CString::new("wss://example/ws").unwrap();

    // sending before the handshake completes is a state error
    let frame = [0x01u8, 0x02];
    let rc = unsafe { awesome_utils_send_web_socket_message(id_c.as_ptr(), frame.as_ptr(), frame.len()) };
    assert_eq!(rc, FfiResult::WrongState as i32);

    let rc = unsafe { awesome_utils_connect_web_socket(id_c.as_ptr(), uri.as_ptr(), std::ptr::null()) };
    assert_eq!(rc, FfiResult::Ok as i32);
    let rc = unsafe { awesome_utils_connect_web_socket(id_c.as_ptr(), std::ptr::null(), std::ptr::null()) };
    assert_eq!(rc, FfiResult::InvalidArgument as i32);

    bridge.on_connected(&id, "");
    let rc = unsafe { awesome_utils_send_web_socket_message(id_c.as_ptr(), frame.as_ptr(), frame.len()) };
    assert_eq!(rc, FfiResult::Ok as i32);
    assert_eq!(transport.sent.lock().len(), 1);

    let text = CString::new("hello").unwrap();
    let rc = unsafe { awesome_utils_send_web_socket_text(id_c.as_ptr(), text.as_ptr()) };
    assert_eq!(rc, FfiResult::Unsupported as i32);

    bridge.on_data(&id, vec![9, 8, 7]);
    assert_eq!(
        take_bytes(unsafe { awesome_utils_poll_next_message(id_c.as_ptr()) }),
        Some(vec![9, 8, 7])
    );
    assert_eq!(take_bytes(unsafe { awesome_utils_poll_next_message(id_c.as_ptr()) }), None);

    let rc = unsafe { awesome_utils_close_web_socket(id_c.as_ptr(), 1000) };
    assert_eq!(rc, FfiResult::Ok as i32);
    bridge.on_error(&id, 1000, "normal closure", 0, "");
    let rc = unsafe { awesome_utils_close_web_socket(id_c.as_ptr(), 1000) };
    assert_eq!(rc, FfiResult::UnknownSession as i32);

    // one-shot loader
    let url = CString::new("https://example/data").unwrap();
    let req = take_string(unsafe {
        awesome_utils_load_url(url.as_ptr(), std::ptr::null(), std::ptr::null(), std::ptr::null())
    });
    bridge.on_load_progress(&req, "2;4");
    bridge.on_load_success(&req, b"data".to_vec());
    let req_c = CString::new(req.clone()).unwrap();
    assert_eq!(
        take_bytes(unsafe { awesome_utils_get_loader_result(req_c.as_ptr()) }),
        Some(b"data".to_vec())
    );
    assert_eq!(take_bytes(unsafe { awesome_utils_get_loader_result(req_c.as_ptr()) }), None);

    let host = CString::new("example.com").unwrap();
    let ip = CString::new("127.0.0.1").unwrap();
    assert_eq!(
        unsafe { awesome_utils_add_static_host(host.as_ptr(), ip.as_ptr()) },
        FfiResult::Ok as i32
    );
    assert_eq!(
        unsafe { awesome_utils_remove_static_host(host.as_ptr()) },
        FfiResult::Ok as i32
    );

    assert_eq!(
        EVENTS.lock().unwrap().clone(),
        vec![
            (format!("web-socket;connected;{id}"), String::new()),
            (format!("web-socket;nextMessage;{id}"), String::new()),
            (format!("web-socket;disconnected;{id}"), "1000;normal closure".to_string()),
            (format!("url-loader;progress;{req}"), "2;4".to_string()),
            (format!("url-loader;success;{req}"), String::new()),
        ]
    );

    awesome_utils_finalize();
    assert!(abi::installed().is_none());
    assert!(bridge.is_finalized());
    assert!(awesome_utils_create_web_socket().is_null());
    awesome_utils_finalize();
}
