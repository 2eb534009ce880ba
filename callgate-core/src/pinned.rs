//! Pinned host references and the liveness flag that guards their release.

use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::host::HostRuntime;

/// Whether the host runtime can still accept reference releases.
///
/// Cleared at teardown when the runtime is no longer reachable. Once cleared,
/// pinned references are leaked instead of released.
#[derive(Debug)]
pub struct Liveness(AtomicBool);

impl Liveness {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_dead(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// A host reference kept alive across calls, released on drop while the
/// runtime is live.
pub struct Pinned<R: HostRuntime> {
    global: ManuallyDrop<R::Global>,
    runtime: Arc<R>,
    liveness: Arc<Liveness>,
}

impl<R: HostRuntime> Pinned<R> {
    pub fn new(global: R::Global, runtime: Arc<R>, liveness: Arc<Liveness>) -> Self {
        Self {
            global: ManuallyDrop::new(global),
            runtime,
            liveness,
        }
    }

    pub fn get(&self) -> &R::Global {
        &self.global
    }
}

impl<R: HostRuntime> Drop for Pinned<R> {
    fn drop(&mut self) {
        // SAFETY: `global` is never touched again after this point.
        let global = unsafe { ManuallyDrop::take(&mut self.global) };
        if self.liveness.is_live() {
            self.runtime.release(global);
        } else {
            tracing::debug!("host runtime gone, skipping reference release");
            std::mem::forget(global);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Interpreter;
    use crate::testing::FakeRuntime;

    #[test]
    fn test_release_while_live() {
        let runtime = Arc::new(FakeRuntime::new());
        let liveness = Arc::new(Liveness::new());
        let global = runtime.env().find_class("app/Thing").unwrap();
        let pinned = Pinned::new(global, runtime.clone(), liveness);
        assert_eq!(pinned.get().name, "class:app/Thing");
        drop(pinned);
        assert_eq!(runtime.release_count(), 1);
    }

    #[test]
    fn test_release_skipped_when_dead() {
        let runtime = Arc::new(FakeRuntime::new());
        let liveness = Arc::new(Liveness::new());
        let global = runtime.env().find_class("app/Thing").unwrap();
        let pinned = Pinned::new(global, runtime.clone(), liveness.clone());
        liveness.mark_dead();
        drop(pinned);
        assert_eq!(runtime.release_count(), 0);
    }
}
