//! Interface to the native dispatch table.
//!
//! The table is an external collaborator: it maps call names to handlers,
//! runs them, and hands back buffers it allocated itself. Those buffers are
//! single-owner and must be returned through [`DispatchTable::free`] exactly
//! once. [`OwnedBuf`] does that on drop so every exit path releases them.

use std::ffi::c_char;
use std::sync::Arc;

use crate::error::BridgeError;

/// A buffer allocated by the dispatch table.
#[derive(Debug)]
pub struct NativeBuf {
    pub ptr: *mut c_char,
    pub len: usize,
}

impl NativeBuf {
    pub fn new(ptr: *mut c_char, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Wrap a NUL-terminated string, measuring its length.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a NUL-terminated string.
    pub unsafe fn from_c_str(ptr: *mut c_char) -> Self {
        let len = if ptr.is_null() {
            0
        } else {
            unsafe { std::ffi::CStr::from_ptr(ptr) }.to_bytes().len()
        };
        Self { ptr, len }
    }
}

/// Result of one native dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The call succeeded and produced output.
    Output(NativeBuf),
    /// The call succeeded without output.
    Empty,
    /// The call failed; the buffer holds the error message.
    Failed(NativeBuf),
}

/// A handler the dispatch table can invoke by name.
pub trait CallHandler: Send + Sync {
    /// `Ok(None)` means the call produced no output.
    fn call(&self, payload: &[u8]) -> Result<Option<Vec<u8>>, BridgeError>;
}

impl<F> CallHandler for F
where
    F: Fn(&[u8]) -> Result<Option<Vec<u8>>, BridgeError> + Send + Sync,
{
    fn call(&self, payload: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        self(payload)
    }
}

/// Box a closure as a shareable [`CallHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn CallHandler>
where
    F: Fn(&[u8]) -> Result<Option<Vec<u8>>, BridgeError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub trait DispatchTable: Send + Sync + 'static {
    /// Configure the table. Returns an error message buffer on failure.
    fn init(&self, config: &[u8]) -> Option<NativeBuf>;

    fn dispatch(&self, name: &[u8], payload: &[u8]) -> DispatchOutcome;

    /// Register `handler` under `name`. Returns an error message buffer on failure.
    fn register(&self, name: &str, handler: Arc<dyn CallHandler>) -> Option<NativeBuf>;

    /// Release a buffer this table handed out.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this table and must not have been freed already.
    unsafe fn free(&self, ptr: *mut c_char);
}

/// A [`NativeBuf`] that is returned to its table when dropped.
pub struct OwnedBuf<'t, T: DispatchTable + ?Sized> {
    buf: NativeBuf,
    table: &'t T,
}

impl<'t, T: DispatchTable + ?Sized> OwnedBuf<'t, T> {
    /// # Safety
    ///
    /// `buf` must have been produced by `table` and not be owned elsewhere.
    pub unsafe fn new(buf: NativeBuf, table: &'t T) -> Self {
        Self { buf, table }
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.buf.ptr.is_null() || self.buf.len == 0 {
            return &[];
        }
        // SAFETY: the table guarantees `len` readable bytes at `ptr` until freed.
        unsafe { std::slice::from_raw_parts(self.buf.ptr as *const u8, self.buf.len) }
    }

    /// Copy out as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl<T: DispatchTable + ?Sized> Drop for OwnedBuf<'_, T> {
    fn drop(&mut self) {
        if !self.buf.ptr.is_null() {
            // SAFETY: sole owner, freed exactly once here.
            unsafe { self.table.free(self.buf.ptr) };
        }
    }
}

/// Copy an optional error buffer out and release it.
pub(crate) fn take_error<T: DispatchTable + ?Sized>(table: &T, err: Option<NativeBuf>) -> Option<String> {
    err.map(|buf| {
        // SAFETY: error buffers returned by `table` are owned by the caller.
        let owned = unsafe { OwnedBuf::new(buf, table) };
        owned.to_string_lossy()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LocalDispatchTable;

    #[test]
    fn test_owned_buf_frees_once() {
        let table = LocalDispatchTable::new();
        let buf = table.alloc_text("hello");
        {
            let owned = unsafe { OwnedBuf::new(buf, &table) };
            assert_eq!(owned.as_bytes(), b"hello");
        }
        assert_eq!(table.freed(), 1);
    }

    #[test]
    fn test_owned_buf_null_not_freed() {
        let table = LocalDispatchTable::new();
        {
            let owned = unsafe { OwnedBuf::new(NativeBuf::new(std::ptr::null_mut(), 0), &table) };
            assert!(owned.as_bytes().is_empty());
        }
        assert_eq!(table.freed(), 0);
    }

    #[test]
    fn test_take_error() {
        let table = LocalDispatchTable::new();
        assert_eq!(take_error(&table, None), None);
        let err = table.alloc_text("bad");
        assert_eq!(take_error(&table, Some(err)).as_deref(), Some("bad"));
        assert_eq!(table.freed(), 1);
    }

    #[test]
    fn test_from_c_str_measures() {
        let raw = std::ffi::CString::new("abc").unwrap().into_raw();
        let buf = unsafe { NativeBuf::from_c_str(raw) };
        assert_eq!(buf.len, 3);
        drop(unsafe { std::ffi::CString::from_raw(raw) });
    }
}
