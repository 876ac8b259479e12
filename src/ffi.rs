//! FFI bindings for ringstress
//!
//! C-compatible functions for driving a monitoring session from other
//! languages. Strings are null-terminated; returned strings are allocated here
//! and must be released with `ringstress_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::config::MonitorConfig;
use crate::decoder::PacketDecoder;
use crate::session::MonitoringSession;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Caller must free
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

unsafe fn bytes_from_raw<'a>(data: *const u8, len: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return if len == 0 { Some(&[]) } else { None };
    }
    Some(slice::from_raw_parts(data, len))
}

fn to_json_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Decode one ring payload and return its summary as JSON.
///
/// # Safety
/// - `data` must point to `len` readable bytes (or be NULL with `len == 0`).
/// - Returns a newly allocated string that must be freed with `ringstress_free_string`.
/// - Returns NULL on error; call `ringstress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ringstress_decode(data: *const u8, len: usize) -> *mut c_char {
    clear_last_error();

    let bytes = match bytes_from_raw(data, len) {
        Some(b) => b,
        None => {
            set_last_error("Null data pointer");
            return ptr::null_mut();
        }
    };

    match PacketDecoder::decode(bytes) {
        Ok(reading) => to_json_cstr(&reading.summary()),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a MonitoringSession
pub struct RingstressSessionHandle {
    session: MonitoringSession,
}

/// Create a session from a JSON configuration, or defaults when `config_json`
/// is NULL.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `ringstress_session_free`.
/// - Returns NULL on error; call `ringstress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_new(config_json: *const c_char) -> *mut RingstressSessionHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        MonitorConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string");
                return ptr::null_mut();
            }
        };
        match MonitorConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(RingstressSessionHandle {
        session: MonitoringSession::from_config(&config),
    });
    Box::into_raw(handle)
}

/// Free a session.
///
/// # Safety
/// - `session` must be a pointer returned by `ringstress_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_free(session: *mut RingstressSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Ingest one ring payload and return the session update as JSON.
/// A negative or non-finite `timestamp` means "use the wall clock".
///
/// # Safety
/// - `session` must be a valid pointer returned by `ringstress_session_new`.
/// - `data` must point to `len` readable bytes.
/// - Returns a newly allocated string that must be freed with `ringstress_free_string`.
/// - Returns NULL on error; call `ringstress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_ingest(
    session: *mut RingstressSessionHandle,
    data: *const u8,
    len: usize,
    timestamp: f64,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let bytes = match bytes_from_raw(data, len) {
        Some(b) => b,
        None => {
            set_last_error("Null data pointer");
            return ptr::null_mut();
        }
    };

    let ts = (timestamp.is_finite() && timestamp >= 0.0).then_some(timestamp);
    match handle.session.ingest(bytes, ts) {
        Ok(update) => to_json_cstr(&update),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Feed one BLE Heart Rate Measurement payload into the session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ringstress_session_new`.
/// - `data` must point to `len` readable bytes.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_ingest_heart_rate(
    session: *mut RingstressSessionHandle,
    data: *const u8,
    len: usize,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let bytes = match bytes_from_raw(data, len) {
        Some(b) => b,
        None => {
            set_last_error("Null data pointer");
            return -1;
        }
    };

    match handle.session.ingest_heart_rate(bytes) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Current session status (engine state and counters) as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ringstress_session_new`.
/// - Returns a newly allocated string that must be freed with `ringstress_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_status(session: *const RingstressSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;
    to_json_cstr(&handle.session.status())
}

/// Save session baselines to JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ringstress_session_new`.
/// - Returns a newly allocated string that must be freed with `ringstress_free_string`.
/// - Returns NULL on error; call `ringstress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_save_baselines(
    session: *const RingstressSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &*session;

    match handle.session.save_baselines() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load session baselines from JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `ringstress_session_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ringstress_session_load_baselines(
    session: *mut RingstressSessionHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.session.load_baselines(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a ringstress function.
///
/// # Safety
/// - `ptr` must be a pointer returned by a ringstress function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn ringstress_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - The returned pointer is valid until the next ringstress call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ringstress_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ringstress_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
