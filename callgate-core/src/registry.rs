//! In-process dispatch table backed by Rust handlers.

use std::ffi::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::dispatch::{CallHandler, DispatchOutcome, DispatchTable, NativeBuf};

type InitCheck = dyn Fn(&[u8]) -> Result<(), String> + Send + Sync;

/// A [`DispatchTable`] living in the same process as the bridge.
///
/// Each name can be registered once. Buffers handed out are NUL-terminated,
/// so even an empty one owns a distinct allocation, and are tracked by
/// address so `free` can rebuild and drop them.
pub struct LocalDispatchTable {
    handlers: DashMap<String, Arc<dyn CallHandler>>,
    allocations: DashMap<usize, usize>,
    config: Mutex<Option<Vec<u8>>>,
    init_check: Option<Box<InitCheck>>,
    freed: AtomicUsize,
}

impl Default for LocalDispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalDispatchTable {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            allocations: DashMap::new(),
            config: Mutex::new(None),
            init_check: None,
            freed: AtomicUsize::new(0),
        }
    }

    /// Validate the configuration passed to `init` with `check`.
    pub fn with_init_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&[u8]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.init_check = Some(Box::new(check));
        self
    }

    /// Configuration accepted by the last successful `init`.
    pub fn config(&self) -> Option<Vec<u8>> {
        self.config.lock().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of buffers returned through `free`.
    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    /// Number of buffers handed out and not yet freed.
    pub fn outstanding(&self) -> usize {
        self.allocations.len()
    }

    pub fn alloc_text(&self, text: &str) -> NativeBuf {
        self.alloc(text.as_bytes())
    }

    pub fn alloc(&self, bytes: &[u8]) -> NativeBuf {
        let mut owned = Vec::with_capacity(bytes.len() + 1);
        owned.extend_from_slice(bytes);
        owned.push(0);
        let boxed: Box<[u8]> = owned.into_boxed_slice();
        let size = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8 as *mut c_char;
        self.allocations.insert(ptr as usize, size);
        NativeBuf::new(ptr, bytes.len())
    }
}

impl DispatchTable for LocalDispatchTable {
    fn init(&self, config: &[u8]) -> Option<NativeBuf> {
        if let Some(check) = &self.init_check {
            if let Err(msg) = check(config) {
                return Some(self.alloc_text(&msg));
            }
        }
        *self.config.lock() = Some(config.to_vec());
        None
    }

    fn dispatch(&self, name: &[u8], payload: &[u8]) -> DispatchOutcome {
        let name = String::from_utf8_lossy(name);
        // clone out so the handler runs without holding a shard lock
        let handler = self.handlers.get(name.as_ref()).map(|h| h.value().clone());
        let Some(handler) = handler else {
            return DispatchOutcome::Failed(
                self.alloc_text(&format!("Unknown call name: [{name}]")),
            );
        };
        match handler.call(payload) {
            Ok(Some(out)) => DispatchOutcome::Output(self.alloc(&out)),
            Ok(None) => DispatchOutcome::Empty,
            Err(e) => DispatchOutcome::Failed(self.alloc_text(&e.trace())),
        }
    }

    fn register(&self, name: &str, handler: Arc<dyn CallHandler>) -> Option<NativeBuf> {
        match self.handlers.entry(name.to_string()) {
            Entry::Occupied(_) => Some(self.alloc_text(&format!(
                "Call name is already registered: [{name}]"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                tracing::debug!(name, "registered call handler");
                None
            }
        }
    }

    unsafe fn free(&self, ptr: *mut c_char) {
        let Some((_, size)) = self.allocations.remove(&(ptr as usize)) else {
            tracing::warn!("free of unknown or already released buffer");
            return;
        };
        let slice = std::ptr::slice_from_raw_parts_mut(ptr as *mut u8, size);
        // SAFETY: `ptr`/`size` came from `Box::into_raw` in `alloc`.
        drop(unsafe { Box::from_raw(slice) });
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}
