//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Inputs
//! - Report definitions and data are UTF-8 JSON passed as pointer + length.
//! - Data JSON maps source names to tables: either
//!   `{"columns": [...], "rows": [[...]]}` or an array of flat objects.
//!
//! ## Memory management
//! - Buffers returned by `bforge_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `bforge_free_buffer` / `bforge_free_string`.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error).
//! - Error details can be retrieved via `bforge_last_error`.
//!
//! ## Thread safety
//! - `bforge_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -lband_forge
//! // #include <stdint.h>
//! // extern int bforge_prepare_report(const uint8_t* report, uint32_t report_len,
//! //                                  const uint8_t* data, uint32_t data_len,
//! //                                  uint8_t** out_buf, uint32_t* out_len);
//! // extern void bforge_free_buffer(uint8_t* buf, uint32_t len);
//! // extern const char* bforge_last_error();
//! import "C"
//! ```

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::slice;

use crate::pipeline::{prepare_from_json, PipelineConfig};
use crate::report::ReportDefinition;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

// ---------------------------------------------------------------------------
// C-compatible configuration types
// ---------------------------------------------------------------------------

/// Optional run configuration passed to the `*_ex` functions.
#[repr(C)]
pub struct BforgePipelineConfig {
    /// `-1` follows the definition's `double_pass` flag, `0` forces a single
    /// pass, anything else forces a double pass.
    pub double_pass: c_int,
    /// Non-zero: serialize finished pages and drop their live copies.
    pub offload_pages: c_int,
}

fn pipeline_config_from_c(cfg: &BforgePipelineConfig) -> PipelineConfig {
    PipelineConfig {
        double_pass: match cfg.double_pass {
            -1 => None,
            0 => Some(false),
            _ => Some(true),
        },
        offload_pages: cfg.offload_pages != 0,
        ..PipelineConfig::default()
    }
}

/// # Safety
/// `ptr` must point to `len` valid bytes.
unsafe fn utf8_arg<'s>(ptr: *const u8, len: u32, what: &str) -> Result<&'s str, c_int> {
    let bytes = slice::from_raw_parts(ptr, len as usize);
    std::str::from_utf8(bytes).map_err(|e| {
        set_last_error(&format!("Invalid UTF-8 in {what}: {e}"));
        2
    })
}

fn into_buffer(bytes: Vec<u8>, out_buf: &mut *mut u8, out_len: &mut u32) {
    let len = bytes.len() as u32;
    let buf = bytes.into_boxed_slice();
    *out_buf = Box::into_raw(buf) as *mut u8;
    *out_len = len;
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Paginate a report and return the prepared pages as JSON bytes.
///
/// # Parameters
/// - `report_ptr`, `report_len`: report definition JSON
/// - `data_ptr`, `data_len`: data sources JSON
/// - `out_buf`: on success, receives a pointer to heap-allocated JSON bytes
/// - `out_len`: on success, receives the length of the buffer
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `bforge_last_error`.
///
/// # Safety
/// - `report_ptr` / `data_ptr` must point to `report_len` / `data_len` valid bytes.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` by calling `bforge_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn bforge_prepare_report(
    report_ptr: *const u8,
    report_len: u32,
    data_ptr: *const u8,
    data_len: u32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    bforge_prepare_report_ex(
        report_ptr,
        report_len,
        data_ptr,
        data_len,
        ptr::null(),
        out_buf,
        out_len,
    )
}

/// Paginate a report with a custom [`BforgePipelineConfig`].
///
/// # Parameters
/// - `cfg`: optional pointer to a [`BforgePipelineConfig`]; pass `NULL` for defaults
///
/// # Returns
/// `0` on success.
///
/// # Safety
/// Same as `bforge_prepare_report`. `cfg`, if non-null, must point to a
/// fully-initialised [`BforgePipelineConfig`].
#[no_mangle]
pub unsafe extern "C" fn bforge_prepare_report_ex(
    report_ptr: *const u8,
    report_len: u32,
    data_ptr: *const u8,
    data_len: u32,
    cfg: *const BforgePipelineConfig,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if report_ptr.is_null() || data_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let report = match utf8_arg(report_ptr, report_len, "report") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let data = match utf8_arg(data_ptr, data_len, "data") {
        Ok(s) => s,
        Err(rc) => return rc,
    };

    let config = if cfg.is_null() {
        PipelineConfig::default()
    } else {
        pipeline_config_from_c(&*cfg)
    };

    let prepared = match prepare_from_json(report, data, &config) {
        Ok(p) => p,
        Err(e) => {
            set_last_error(&e.to_string());
            return 3;
        }
    };

    match prepared.to_json() {
        Ok(json) => {
            into_buffer(json.into_bytes(), &mut *out_buf, &mut *out_len);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            4
        }
    }
}

/// Run a double pass and return only the logical page-number table as a
/// null-terminated JSON string.
///
/// # Returns
/// `0` on success.
///
/// # Safety
/// Same as `bforge_prepare_report`. `*out_json_ptr` must be freed with
/// `bforge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn bforge_page_numbers(
    report_ptr: *const u8,
    report_len: u32,
    data_ptr: *const u8,
    data_len: u32,
    out_json_ptr: *mut *mut c_char,
) -> c_int {
    if report_ptr.is_null() || data_ptr.is_null() || out_json_ptr.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }

    let report = match utf8_arg(report_ptr, report_len, "report") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let data = match utf8_arg(data_ptr, data_len, "data") {
        Ok(s) => s,
        Err(rc) => return rc,
    };

    let prepared = match prepare_from_json(report, data, &PipelineConfig::double_pass()) {
        Ok(p) => p,
        Err(e) => {
            set_last_error(&e.to_string());
            return 3;
        }
    };

    let json = match serde_json::to_string(&prepared.page_numbers) {
        Ok(json) => json,
        Err(e) => {
            set_last_error(&e.to_string());
            return 4;
        }
    };
    match CString::new(json) {
        Ok(cs) => {
            *out_json_ptr = cs.into_raw();
            0
        }
        Err(_) => {
            set_last_error("JSON contained null byte");
            4
        }
    }
}

/// Parse and validate a report definition without running it.
///
/// # Returns
/// `0` when the definition is usable.
///
/// # Safety
/// `report_ptr` must point to `report_len` valid bytes.
#[no_mangle]
pub unsafe extern "C" fn bforge_validate_report(report_ptr: *const u8, report_len: u32) -> c_int {
    if report_ptr.is_null() {
        set_last_error("Null pointer argument");
        return 1;
    }
    let report = match utf8_arg(report_ptr, report_len, "report") {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    match ReportDefinition::from_json(report) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            3
        }
    }
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a buffer returned by `bforge_prepare_report`.
///
/// # Safety
/// `buf` must have been returned by a previous `bforge_prepare_report` (or
/// similar) call, and `len` must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn bforge_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Free a string returned by `bforge_page_numbers`.
///
/// # Safety
/// `s` must have been returned by Rust's `CString::into_raw`.
#[no_mangle]
pub unsafe extern "C" fn bforge_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `bforge_*` call on the same
/// thread. The caller should **not** free this pointer – it is managed
/// internally.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn bforge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let borrow = e.borrow();
        match borrow.as_ref() {
            Some(cs) => cs.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Return the library version as a null-terminated string.
/// The caller must **not** free this pointer.
#[no_mangle]
pub extern "C" fn bforge_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
