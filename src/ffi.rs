//! C-compatible FFI API for cross-language bindings.
//!
//! # ABI Contract
//!
//! All exported functions use `extern "C"` calling convention and `#[no_mangle]`
//! to ensure stable symbol names.
//!
//! ## Handles
//! - `pf_renderer_new` returns an opaque `PfRenderer*` that owns the font
//!   cache. Create one per process and reuse it; it is safe to use from
//!   several threads at once.
//! - Release it with `pf_renderer_free`.
//!
//! ## Memory management
//! - Buffers returned by `pf_*` functions are allocated on the Rust heap.
//! - Callers **must** free them with `pf_free_buffer`.
//! - Strings from `pf_last_error` / `pf_version` are borrowed; never free them.
//! - Passing a null pointer to a free function is a no-op.
//!
//! ## Error handling
//! - Functions that can fail return a `c_int` (0 = success, non-zero = error,
//!   see the `PF_ERR_*` constants).
//! - Error details can be retrieved via `pf_last_error`.
//!
//! ## Thread safety
//! - The `pf_last_error` uses a thread-local, so it is safe to call from
//!   multiple threads.
//!
//! ## Usage from Go (cgo)
//! ```go
//! // #cgo LDFLAGS: -lpress_forge
//! // #include "press_forge.h"
//! import "C"
//!
//! r := C.pf_renderer_new(nil)
//! defer C.pf_renderer_free(r)
//! ```

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::slice;
use std::time::Duration;

use crate::error::RenderError;
use crate::pipeline::{DesignRenderer, ExportOutput, RenderConfig};

/// Success.
pub const PF_OK: c_int = 0;
/// A required pointer argument was null.
pub const PF_ERR_NULL: c_int = 1;
/// Input bytes were not valid UTF-8.
pub const PF_ERR_UTF8: c_int = 2;
/// The scene document was rejected.
pub const PF_ERR_PARSE: c_int = 3;
/// Rasterizing or encoding failed.
pub const PF_ERR_EXPORT: c_int = 4;

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

/// Opaque renderer handle.
pub struct PfRenderer {
    inner: DesignRenderer,
}

/// Optional configuration passed to [`pf_renderer_new`].
///
/// Fields set to `0` (or `NULL` for strings) fall back to the values from
/// the `PRESS_FORGE_*` environment, then to the built-in defaults:
/// - `title`            → "press-forge output"
/// - `media_root`       → "media"
/// - `design_dpi`       → 72
/// - `jpeg_quality`     → 85
/// - `fetch_timeout_ms` → 10000
#[repr(C)]
pub struct PfRenderConfig {
    /// Null-terminated UTF-8 PDF title.
    pub title: *const c_char,
    /// Null-terminated UTF-8 path that relative image sources resolve against.
    pub media_root: *const c_char,
    /// DPI the design coordinates are authored in.
    pub design_dpi: f32,
    /// Preview JPEG quality, 1–100.
    pub jpeg_quality: u8,
    /// Remote image fetch timeout in milliseconds.
    pub fetch_timeout_ms: u32,
}

/// Convert a `PfRenderConfig` (FFI) to a `RenderConfig` (Rust).
///
/// # Safety
/// String fields, if non-null, must point to valid null-terminated strings.
unsafe fn render_config_from_c(cfg: &PfRenderConfig) -> RenderConfig {
    let mut config = RenderConfig::from_env();

    if let Some(title) = opt_c_str(cfg.title) {
        config.title = title;
    }
    if let Some(root) = opt_c_str(cfg.media_root) {
        config.media_root = PathBuf::from(root);
    }
    if cfg.design_dpi > 0.0 {
        config.design_dpi = cfg.design_dpi;
    }
    if cfg.jpeg_quality != 0 {
        config.jpeg_quality = cfg.jpeg_quality;
    }
    if cfg.fetch_timeout_ms != 0 {
        config.fetch_timeout = Duration::from_millis(cfg.fetch_timeout_ms as u64);
    }
    config
}

unsafe fn opt_c_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok().map(str::to_string)
}

/// Borrow `len` bytes at `ptr` as UTF-8, recording the failure if not.
unsafe fn read_json<'a>(ptr: *const u8, len: u32) -> Result<&'a str, c_int> {
    let bytes = slice::from_raw_parts(ptr, len as usize);
    std::str::from_utf8(bytes).map_err(|e| {
        set_last_error(&format!("Invalid UTF-8: {e}"));
        PF_ERR_UTF8
    })
}

/// Hand an export result to the caller.
unsafe fn finish(
    result: crate::error::Result<ExportOutput>,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    match result {
        Ok(output) => {
            let len = output.bytes.len() as u32;
            let buf = output.bytes.into_boxed_slice();
            *out_buf = Box::into_raw(buf) as *mut u8;
            *out_len = len;
            PF_OK
        }
        Err(e) => {
            set_last_error(&e.to_string());
            match e {
                RenderError::Parse(_) => PF_ERR_PARSE,
                RenderError::Export(_) => PF_ERR_EXPORT,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer lifecycle
// ---------------------------------------------------------------------------

/// Create a renderer. Pass `NULL` to configure from the environment.
///
/// # Safety
/// `cfg`, if non-null, must point to a fully-initialised [`PfRenderConfig`].
/// The returned handle must be released with [`pf_renderer_free`].
#[no_mangle]
pub unsafe extern "C" fn pf_renderer_new(cfg: *const PfRenderConfig) -> *mut PfRenderer {
    let config = if cfg.is_null() {
        RenderConfig::from_env()
    } else {
        render_config_from_c(&*cfg)
    };
    Box::into_raw(Box::new(PfRenderer {
        inner: DesignRenderer::new(config),
    }))
}

/// Release a renderer created by [`pf_renderer_new`].
///
/// # Safety
/// `renderer` must come from [`pf_renderer_new`] and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn pf_renderer_free(renderer: *mut PfRenderer) {
    if !renderer.is_null() {
        drop(Box::from_raw(renderer));
    }
}

// ---------------------------------------------------------------------------
// Core API
// ---------------------------------------------------------------------------

/// Render a JPEG preview of a scene document.
///
/// # Parameters
/// - `json_ptr`: pointer to UTF-8 scene JSON (not necessarily null-terminated)
/// - `json_len`: length of the JSON data in bytes
/// - `width_px`, `height_px`: preview size
/// - `out_buf`, `out_len`: on success, receive the heap-allocated JPEG
///
/// # Returns
/// `0` on success, non-zero on error. On error, call `pf_last_error`.
///
/// # Safety
/// - `renderer` must be a live handle.
/// - `json_ptr` must point to `json_len` valid bytes.
/// - `out_buf` and `out_len` must be valid pointers.
/// - The caller must free `*out_buf` by calling `pf_free_buffer`.
#[no_mangle]
pub unsafe extern "C" fn pf_render_preview(
    renderer: *const PfRenderer,
    json_ptr: *const u8,
    json_len: u32,
    width_px: u32,
    height_px: u32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if renderer.is_null() || json_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return PF_ERR_NULL;
    }
    let json = match read_json(json_ptr, json_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let result = (*renderer).inner.render_preview_from_json(json, width_px, height_px);
    finish(result, out_buf, out_len)
}

/// Export a print PNG of exactly `width_px × height_px` tagged with `dpi`.
///
/// # Safety
/// Same as `pf_render_preview`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pf_export_png(
    renderer: *const PfRenderer,
    json_ptr: *const u8,
    json_len: u32,
    width_px: u32,
    height_px: u32,
    dpi: f32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if renderer.is_null() || json_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return PF_ERR_NULL;
    }
    let json = match read_json(json_ptr, json_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let result = (*renderer).inner.export_png_from_json(json, width_px, height_px, dpi);
    finish(result, out_buf, out_len)
}

/// Export a single-page print PDF of `width_mm × height_mm`.
///
/// # Safety
/// Same as `pf_render_preview`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pf_export_pdf(
    renderer: *const PfRenderer,
    json_ptr: *const u8,
    json_len: u32,
    width_mm: f32,
    height_mm: f32,
    dpi: f32,
    out_buf: *mut *mut u8,
    out_len: *mut u32,
) -> c_int {
    if renderer.is_null() || json_ptr.is_null() || out_buf.is_null() || out_len.is_null() {
        set_last_error("Null pointer argument");
        return PF_ERR_NULL;
    }
    let json = match read_json(json_ptr, json_len) {
        Ok(s) => s,
        Err(rc) => return rc,
    };
    let result = (*renderer).inner.export_pdf_from_json(json, width_mm, height_mm, dpi);
    finish(result, out_buf, out_len)
}

// ---------------------------------------------------------------------------
// Memory management
// ---------------------------------------------------------------------------

/// Free a buffer returned by one of the export functions.
///
/// # Safety
/// `buf` must have been returned by a previous `pf_*` export call, and `len`
/// must be the corresponding length.
#[no_mangle]
pub unsafe extern "C" fn pf_free_buffer(buf: *mut u8, len: u32) {
    if !buf.is_null() {
        let _ = Box::from_raw(slice::from_raw_parts_mut(buf, len as usize));
    }
}

/// Retrieve the last error message. Returns a null-terminated string.
///
/// The returned pointer is valid until the next `pf_*` call on the same
/// thread. The caller should **not** free this pointer – it is managed
/// internally.
///
/// Returns null if no error has occurred.
#[no_mangle]
pub extern "C" fn pf_last_error() -> *const c_char {
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
pub extern "C" fn pf_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &[u8] = br##"{"width": 100, "height": 60, "children": [
        {"className": "Rect", "attrs": {"x": 10, "y": 10, "width": 30, "height": 20, "fill": "#ff0000"}}
    ]}"##;

    fn renderer() -> *mut PfRenderer {
        let media = CString::new("media").unwrap();
        let cfg = PfRenderConfig {
            title: ptr::null(),
            media_root: media.as_ptr(),
            design_dpi: 0.0,
            jpeg_quality: 0,
            fetch_timeout_ms: 500,
        };
        unsafe { pf_renderer_new(&cfg) }
    }

    #[test]
    fn ffi_export_pdf() {
        let r = renderer();
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe {
            pf_export_pdf(
                r,
                SCENE.as_ptr(),
                SCENE.len() as u32,
                35.0,
                21.0,
                72.0,
                &mut out_buf,
                &mut out_len,
            )
        };

        assert_eq!(rc, PF_OK, "Expected success");
        assert!(!out_buf.is_null());
        assert!(out_len > 100);

        // Verify PDF header
        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(&bytes[0..5], b"%PDF-");

        unsafe {
            pf_free_buffer(out_buf, out_len);
            pf_renderer_free(r);
        }
    }

    #[test]
    fn ffi_preview_and_png() {
        let r = renderer();
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe {
            pf_render_preview(r, SCENE.as_ptr(), SCENE.len() as u32, 100, 60, &mut out_buf, &mut out_len)
        };
        assert_eq!(rc, PF_OK);
        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        unsafe { pf_free_buffer(out_buf, out_len) };

        let rc = unsafe {
            pf_export_png(r, SCENE.as_ptr(), SCENE.len() as u32, 200, 120, 144.0, &mut out_buf, &mut out_len)
        };
        assert_eq!(rc, PF_OK);
        let bytes = unsafe { slice::from_raw_parts(out_buf, out_len as usize) };
        assert_eq!(&bytes[1..4], b"PNG");
        unsafe {
            pf_free_buffer(out_buf, out_len);
            pf_renderer_free(r);
        }
    }

    #[test]
    fn ffi_parse_error_sets_last_error() {
        let r = renderer();
        let bad = b"{\"width\": 0, \"height\": 10}";
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe { pf_export_png(r, bad.as_ptr(), bad.len() as u32, 10, 10, 72.0, &mut out_buf, &mut out_len) };
        assert_eq!(rc, PF_ERR_PARSE);
        assert!(out_buf.is_null());
        let msg = unsafe { CStr::from_ptr(pf_last_error()) }.to_str().unwrap();
        assert!(msg.contains("invalid canvas size"), "{msg}");
        unsafe { pf_renderer_free(r) };
    }

    #[test]
    fn ffi_invalid_utf8() {
        let r = renderer();
        let bad = [0xFFu8, 0xFE];
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;
        let rc = unsafe { pf_render_preview(r, bad.as_ptr(), 2, 10, 10, &mut out_buf, &mut out_len) };
        assert_eq!(rc, PF_ERR_UTF8);
        unsafe { pf_renderer_free(r) };
    }

    #[test]
    fn ffi_null_input() {
        let mut out_buf: *mut u8 = ptr::null_mut();
        let mut out_len: u32 = 0;

        let rc = unsafe { pf_render_preview(ptr::null(), ptr::null(), 0, 1, 1, &mut out_buf, &mut out_len) };

        assert_eq!(rc, PF_ERR_NULL, "Should fail on null input");
        unsafe {
            pf_renderer_free(ptr::null_mut());
            pf_free_buffer(ptr::null_mut(), 0);
        }
    }

    #[test]
    fn ffi_version() {
        let v = pf_version();
        let version = unsafe { CStr::from_ptr(v) }.to_str().unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }
}
