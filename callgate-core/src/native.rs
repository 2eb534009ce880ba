//! Dispatch table provided by a separately built native library.
//!
//! The library exports five C functions (names configurable, see
//! [`DispatchSymbols`]):
//!
//! ```text
//! char* init(const char* conf, int conf_len);
//! char* call(const char* name, int name_len, const char* data, int data_len,
//!            char** out, int* out_len);
//! char* register(const char* name, int name_len, void* ctx, handler_fn cb);
//! void  free(char* buf);
//! char* alloc(int len);
//! ```
//!
//! A non-null return is a NUL-terminated error message owned by the caller.
//! Output and error buffers are released with `free`; buffers a registered
//! handler hands back are allocated with `alloc`.

use std::ffi::{c_char, c_int, c_void};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::config::DispatchSymbols;
use crate::dispatch::{CallHandler, DispatchOutcome, DispatchTable, NativeBuf};
use crate::error::BridgeError;

type InitFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_char;
type CallFn = unsafe extern "C" fn(
    *const c_char,
    c_int,
    *const c_char,
    c_int,
    *mut *mut c_char,
    *mut c_int,
) -> *mut c_char;
type RegisterFn = unsafe extern "C" fn(*const c_char, c_int, *mut c_void, HandlerFn) -> *mut c_char;
type FreeFn = unsafe extern "C" fn(*mut c_char);
type AllocFn = unsafe extern "C" fn(c_int) -> *mut c_char;

/// Signature of the callback a registered handler is invoked through.
pub type HandlerFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_char,
    c_int,
    *mut *mut c_char,
    *mut c_int,
) -> *mut c_char;

pub struct NativeLibrary {
    init: InitFn,
    call: CallFn,
    register: RegisterFn,
    free: FreeFn,
    alloc: AllocFn,
    // keeps the function pointers above valid
    _library: Library,
}

impl NativeLibrary {
    /// Load the library at `path` and bind its dispatch symbols.
    pub fn open(path: &Path, symbols: &DispatchSymbols) -> Result<Self, BridgeError> {
        // SAFETY: loading runs the library's initializers; the library is
        // trusted to be a dispatch table build.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            BridgeError::from(e).context(format!(
                "Cannot load dispatch library, path: [{}]",
                path.display()
            ))
        })?;
        // SAFETY: each symbol is declared with the C signature documented above.
        let (init, call, register, free, alloc) = unsafe {
            (
                symbol::<InitFn>(&library, &symbols.init)?,
                symbol::<CallFn>(&library, &symbols.call)?,
                symbol::<RegisterFn>(&library, &symbols.register)?,
                symbol::<FreeFn>(&library, &symbols.free)?,
                symbol::<AllocFn>(&library, &symbols.alloc)?,
            )
        };
        tracing::info!(path = %path.display(), "dispatch library loaded");
        Ok(Self {
            init,
            call,
            register,
            free,
            alloc,
            _library: library,
        })
    }

    /// An error buffer the library can later `free`.
    fn error_buf(&self, message: &str) -> NativeBuf {
        let ptr = copy_out(self.alloc, message.as_bytes());
        // SAFETY: `copy_out` NUL-terminates, or returns null.
        unsafe { NativeBuf::from_c_str(ptr) }
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, BridgeError> {
    let sym: Symbol<T> = unsafe { library.get(name.as_bytes()) }.map_err(|e| {
        BridgeError::from(e).context(format!("Cannot resolve dispatch symbol, name: [{name}]"))
    })?;
    Ok(*sym)
}

fn c_len(len: usize) -> Option<c_int> {
    c_int::try_from(len).ok()
}

impl DispatchTable for NativeLibrary {
    fn init(&self, config: &[u8]) -> Option<NativeBuf> {
        let Some(len) = c_len(config.len()) else {
            return Some(self.error_buf("Configuration is too large"));
        };
        // SAFETY: `config` is readable for `len` bytes for the duration of the call.
        let err = unsafe { (self.init)(config.as_ptr() as *const c_char, len) };
        // SAFETY: a non-null return is a NUL-terminated message we now own.
        (!err.is_null()).then(|| unsafe { NativeBuf::from_c_str(err) })
    }

    fn dispatch(&self, name: &[u8], payload: &[u8]) -> DispatchOutcome {
        let (Some(name_len), Some(payload_len)) = (c_len(name.len()), c_len(payload.len())) else {
            return DispatchOutcome::Failed(self.error_buf("Call payload is too large"));
        };
        let mut out: *mut c_char = ptr::null_mut();
        let mut out_len: c_int = 0;
        // SAFETY: inputs are readable for their lengths; `out`/`out_len` are valid for writes.
        let err = unsafe {
            (self.call)(
                name.as_ptr() as *const c_char,
                name_len,
                payload.as_ptr() as *const c_char,
                payload_len,
                &mut out,
                &mut out_len,
            )
        };
        if !err.is_null() {
            if !out.is_null() {
                // SAFETY: output buffers are ours to release.
                unsafe { (self.free)(out) };
            }
            // SAFETY: NUL-terminated message we now own.
            return DispatchOutcome::Failed(unsafe { NativeBuf::from_c_str(err) });
        }
        if out.is_null() {
            DispatchOutcome::Empty
        } else {
            DispatchOutcome::Output(NativeBuf::new(out, out_len.max(0) as usize))
        }
    }

    fn register(&self, name: &str, handler: Arc<dyn CallHandler>) -> Option<NativeBuf> {
        let Some(name_len) = c_len(name.len()) else {
            return Some(self.error_buf("Call name is too long"));
        };
        let slot = Box::into_raw(Box::new(HandlerSlot {
            handler,
            alloc: self.alloc,
        }));
        // SAFETY: `slot` stays valid for as long as the library holds it.
        let err = unsafe {
            (self.register)(
                name.as_ptr() as *const c_char,
                name_len,
                slot as *mut c_void,
                handler_trampoline,
            )
        };
        if err.is_null() {
            // owned by the library from here on
            return None;
        }
        // SAFETY: the library refused the slot and holds no pointer to it.
        drop(unsafe { Box::from_raw(slot) });
        // SAFETY: NUL-terminated message we now own.
        Some(unsafe { NativeBuf::from_c_str(err) })
    }

    unsafe fn free(&self, ptr: *mut c_char) {
        // SAFETY: forwarded from the caller's contract.
        unsafe { (self.free)(ptr) }
    }
}

/// State behind the opaque context pointer of a registered handler.
struct HandlerSlot {
    handler: Arc<dyn CallHandler>,
    alloc: AllocFn,
}

/// Copy `bytes` into a NUL-terminated buffer from `alloc`. Null if allocation fails.
fn copy_out(alloc: AllocFn, bytes: &[u8]) -> *mut c_char {
    let Some(size) = c_len(bytes.len() + 1) else {
        return ptr::null_mut();
    };
    // SAFETY: `alloc` returns null or a buffer of at least `size` bytes.
    let buf = unsafe { alloc(size) };
    if !buf.is_null() {
        // SAFETY: `buf` holds `bytes.len() + 1` bytes and does not overlap `bytes`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, bytes.len());
            *buf.add(bytes.len()) = 0;
        }
    }
    buf
}

unsafe extern "C" fn handler_trampoline(
    ctx: *mut c_void,
    data: *const c_char,
    data_len: c_int,
    out: *mut *mut c_char,
    out_len: *mut c_int,
) -> *mut c_char {
    // SAFETY: `ctx` is the slot leaked in `register`.
    let slot = unsafe { &*(ctx as *const HandlerSlot) };
    let payload: &[u8] = if data.is_null() || data_len <= 0 {
        &[]
    } else {
        // SAFETY: the library passes `data_len` readable bytes.
        unsafe { std::slice::from_raw_parts(data as *const u8, data_len as usize) }
    };

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| slot.handler.call(payload)));
    let (buf, len) = match result {
        Ok(Ok(Some(bytes))) => {
            let Some(len) = c_len(bytes.len()) else {
                return copy_out(slot.alloc, b"Handler output is too large");
            };
            let buf = copy_out(slot.alloc, &bytes);
            if buf.is_null() {
                tracing::error!(len = bytes.len(), "cannot allocate handler output");
                // SAFETY: the library passes valid out-pointers.
                unsafe {
                    *out = ptr::null_mut();
                    *out_len = 0;
                }
                return copy_out(slot.alloc, b"Cannot allocate handler output");
            }
            (buf, len)
        }
        Ok(Ok(None)) => (ptr::null_mut(), 0),
        Ok(Err(e)) => return copy_out(slot.alloc, e.trace().as_bytes()),
        Err(_) => {
            tracing::error!("call handler panicked");
            return copy_out(slot.alloc, b"Call handler panicked");
        }
    };
    // SAFETY: the library passes valid out-pointers.
    unsafe {
        *out = buf;
        *out_len = len;
    }
    ptr::null_mut()
}
