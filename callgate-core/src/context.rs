//! The process-wide bridge context and the cell that owns it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::attach::current_interpreter;
use crate::config::HostNames;
use crate::error::{BridgeError, ResultExt};
use crate::host::{EnvLookup, HostRuntime, Interpreter};
use crate::pinned::{Liveness, Pinned};
use crate::resolve::resolve;

/// Resolved host handles plus the registered gateway object.
///
/// Read-only after construction except for the one-shot callback install.
pub struct BridgeContext<R: HostRuntime> {
    runtime: Arc<R>,
    liveness: Arc<Liveness>,
    helper_class: Pinned<R>,
    describe_error: R::StaticMethodId,
    // kept pinned so `run_script` stays valid
    _gateway_interface: Pinned<R>,
    run_script: R::MethodId,
    exception_class: Pinned<R>,
    callback: OnceCell<Arc<Pinned<R>>>,
}

impl<R: HostRuntime> BridgeContext<R> {
    pub(crate) fn new(
        runtime: Arc<R>,
        liveness: Arc<Liveness>,
        helper_class: Pinned<R>,
        describe_error: R::StaticMethodId,
        gateway_interface: Pinned<R>,
        run_script: R::MethodId,
        exception_class: Pinned<R>,
    ) -> Self {
        Self {
            runtime,
            liveness,
            helper_class,
            describe_error,
            _gateway_interface: gateway_interface,
            run_script,
            exception_class,
            callback: OnceCell::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn helper_class(&self) -> &R::Global {
        self.helper_class.get()
    }

    pub fn describe_error(&self) -> R::StaticMethodId {
        self.describe_error
    }

    pub fn run_script(&self) -> R::MethodId {
        self.run_script
    }

    pub fn exception_class(&self) -> &R::Global {
        self.exception_class.get()
    }

    /// The registered gateway object, once installed.
    pub fn callback(&self) -> Option<&R::Global> {
        self.callback.get().map(|pinned| pinned.get())
    }

    /// Pin `object` and install it as the gateway. Succeeds at most once.
    pub fn install_callback<E>(&self, env: &mut E, object: &E::Local) -> Result<(), BridgeError>
    where
        E: Interpreter<Runtime = R>,
    {
        if env.is_null(object) {
            return Err(BridgeError::NullArgument("gateway"));
        }
        if self.callback.get().is_some() {
            return Err(BridgeError::AlreadyRegistered("gateway".to_string()));
        }
        let global = env
            .pin(object)
            .context("Cannot create global ref for specified gateway object")?;
        let pinned = Arc::new(Pinned::new(
            global,
            self.runtime.clone(),
            self.liveness.clone(),
        ));
        // a racing installer may win between the check above and here
        self.callback
            .set(pinned)
            .map_err(|_| BridgeError::AlreadyRegistered("gateway".to_string()))
    }

    fn inherit_callback(&self, previous: &BridgeContext<R>) {
        if let Some(callback) = previous.callback.get() {
            let _ = self.callback.set(callback.clone());
        }
    }
}

/// Owner of the single [`BridgeContext`] of a process.
///
/// Construction is double-checked: readers load the current context without
/// locking; only a miss takes the init lock, re-checks and builds. A context
/// is always fully built before it is published.
///
/// Every context built by the cell shares one [`Liveness`] flag, so a gateway
/// carried over by [`ContextCell::reinitialize`] is guarded by the same flag
/// that teardown clears.
pub struct ContextCell<R: HostRuntime> {
    runtime: OnceCell<(Arc<R>, HostNames)>,
    current: ArcSwapOption<BridgeContext<R>>,
    liveness: Mutex<Arc<Liveness>>,
    init_lock: Mutex<()>,
    constructions: AtomicUsize,
    torn_down: AtomicBool,
}

impl<R: HostRuntime> Default for ContextCell<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: HostRuntime> ContextCell<R> {
    pub fn new() -> Self {
        Self {
            runtime: OnceCell::new(),
            current: ArcSwapOption::empty(),
            liveness: Mutex::new(Arc::new(Liveness::new())),
            init_lock: Mutex::new(()),
            constructions: AtomicUsize::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Record the ambient runtime. Returns `false` if one was already set.
    pub fn set_runtime(&self, runtime: Arc<R>, names: HostNames) -> bool {
        self.runtime.set((runtime, names)).is_ok()
    }

    pub fn runtime(&self) -> Option<&Arc<R>> {
        self.runtime.get().map(|(runtime, _)| runtime)
    }

    /// The published context, if any, without building one.
    pub fn current(&self) -> Option<Arc<BridgeContext<R>>> {
        self.current.load_full()
    }

    /// The current context, building it from the ambient runtime on first use.
    pub fn get(&self) -> Result<Arc<BridgeContext<R>>, BridgeError> {
        if let Some(ctx) = self.current.load_full() {
            return Ok(ctx);
        }
        let _guard = self.init_lock.lock();
        if let Some(ctx) = self.current.load_full() {
            return Ok(ctx);
        }
        if self.torn_down.load(Ordering::Acquire) {
            return Err(BridgeError::NotLoaded);
        }
        let ctx = Arc::new(self.construct()?);
        self.current.store(Some(ctx.clone()));
        Ok(ctx)
    }

    /// Build a fresh context and swap it in, replacing the current one.
    ///
    /// An installed gateway carries over. The previous context is released
    /// once its last in-flight user drops it.
    pub fn reinitialize(&self) -> Result<Arc<BridgeContext<R>>, BridgeError> {
        let _guard = self.init_lock.lock();
        if self.torn_down.load(Ordering::Acquire) {
            // references leaked by the last teardown stay leaked
            *self.liveness.lock() = Arc::new(Liveness::new());
        }
        let ctx = Arc::new(self.construct()?);
        if let Some(previous) = self.current.load_full() {
            ctx.inherit_callback(&previous);
        }
        self.current.store(Some(ctx.clone()));
        self.torn_down.store(false, Ordering::Release);
        tracing::info!("bridge context reinitialized");
        Ok(ctx)
    }

    /// Drop the context, releasing pinned references if the runtime is
    /// still reachable and leaking them otherwise.
    ///
    /// Only a thread already attached to the runtime counts as reachable.
    /// Teardown never attaches the calling thread.
    pub fn teardown(&self) {
        let _guard = self.init_lock.lock();
        self.torn_down.store(true, Ordering::Release);
        let Some(ctx) = self.current.swap(None) else {
            return;
        };
        let reachable = matches!(ctx.runtime().get_env(), EnvLookup::Attached(_));
        if !reachable {
            tracing::warn!("host runtime unreachable at teardown, leaking pinned references");
            self.liveness.lock().mark_dead();
        }
        tracing::info!(reachable, "bridge context torn down");
    }

    /// How many contexts have been built by this cell.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Acquire)
    }

    fn construct(&self) -> Result<BridgeContext<R>, BridgeError> {
        let (runtime, names) = self.runtime.get().ok_or(BridgeError::NotLoaded)?;
        let mut env = current_interpreter(&**runtime).context("Cannot obtain host environment")?;
        let liveness = self.liveness.lock().clone();
        let ctx = resolve(runtime, &mut env, names, &liveness)?;
        self.constructions.fetch_add(1, Ordering::AcqRel);
        Ok(ctx)
    }
}
