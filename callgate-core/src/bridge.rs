//! Process-wide bridge state and the host-facing entry points.
//!
//! [`Bridge`] ties the pieces together: the context cell, the dispatch table,
//! the one-time registration guard and the loaded configuration. Its entry
//! points never return errors to the host directly; a failure is raised as a
//! host exception and the call returns null.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::{BridgeConfig, HostNames};
use crate::context::{BridgeContext, ContextCell};
use crate::diagnostics;
use crate::dispatch::{CallHandler, DispatchTable};
use crate::error::BridgeError;
use crate::guard::RegistrationGuard;
use crate::host::{HostRuntime, Interpreter};
use crate::inbound::{self, Registration};
use crate::outbound::{self, ScriptGateway};

/// Returned from `on_load` when loading fails.
pub const LOAD_FAILED: i32 = -1;

pub struct Bridge<R: HostRuntime, T: DispatchTable> {
    contexts: ContextCell<R>,
    table: OnceCell<Arc<T>>,
    registered: RegistrationGuard,
    config: OnceCell<BridgeConfig>,
}

impl<R: HostRuntime, T: DispatchTable> Default for Bridge<R, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: HostRuntime, T: DispatchTable> Bridge<R, T> {
    pub fn new() -> Self {
        Self {
            contexts: ContextCell::new(),
            table: OnceCell::new(),
            registered: RegistrationGuard::new(),
            config: OnceCell::new(),
        }
    }

    /// Library load hook. Returns `version` on success and [`LOAD_FAILED`]
    /// otherwise, after writing a diagnostic dump to the configured error
    /// directory.
    ///
    /// A second load (after an unload, or a repeated call) rebuilds the
    /// context and keeps the dispatch table already bound.
    pub fn on_load<F>(&self, runtime: Arc<R>, config: BridgeConfig, open_table: F, version: i32) -> i32
    where
        F: FnOnce(&BridgeConfig) -> Result<T, BridgeError>,
    {
        let error_dir = config.error_dir.clone();
        match guarded(|| self.load(runtime, config, open_table)) {
            Ok(()) => {
                tracing::info!(version, "bridge loaded");
                version
            }
            Err(e) => {
                let message = format!("{}\nBridge load error", e.trace());
                tracing::error!(error = %message, "bridge load failed");
                diagnostics::dump_error(&error_dir, &message);
                LOAD_FAILED
            }
        }
    }

    fn load<F>(&self, runtime: Arc<R>, config: BridgeConfig, open_table: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&BridgeConfig) -> Result<T, BridgeError>,
    {
        let config = self.config.get_or_init(|| config);
        self.table
            .get_or_try_init(|| open_table(config).map(Arc::new))?;
        if self.contexts.set_runtime(runtime, config.names.clone()) {
            self.contexts.get()?;
        } else {
            self.contexts.reinitialize()?;
        }
        Ok(())
    }

    /// Library unload hook.
    pub fn on_unload(&self) {
        self.contexts.teardown();
    }

    pub fn context(&self) -> Result<Arc<BridgeContext<R>>, BridgeError> {
        self.contexts.get()
    }

    pub fn table(&self) -> Result<&Arc<T>, BridgeError> {
        self.table.get().ok_or(BridgeError::NotLoaded)
    }

    pub fn config(&self) -> Result<&BridgeConfig, BridgeError> {
        self.config.get().ok_or(BridgeError::NotLoaded)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.is_claimed()
    }

    /// Host entry point: install the gateway and register the script handler.
    pub fn initialize_and_register<E>(
        &'static self,
        env: &mut E,
        gateway: &E::Local,
        engine_name: &E::Local,
        config: &E::Local,
    ) where
        E: Interpreter<Runtime = R>,
    {
        let result = guarded(|| {
            let ctx = self.contexts.get()?;
            let table = self.table()?;
            let settings = self.config()?;
            let handler: Arc<dyn CallHandler> = Arc::new(ScriptGateway::new(&self.contexts));
            let args = Registration {
                gateway,
                engine_name,
                config,
            };
            inbound::initialize_and_register(&ctx, &**table, &self.registered, env, args, settings, handler)
        });
        if let Err(e) = result {
            self.raise(env, &e);
        }
    }

    /// Host entry point: run a native call. Returns the host's null value
    /// for an empty result and after raising an exception.
    pub fn dispatch_call<E>(&self, env: &mut E, name: &E::Local, payload: &E::Local) -> E::Local
    where
        E: Interpreter<Runtime = R>,
    {
        let result = guarded(|| {
            let table = self.table()?;
            inbound::dispatch_call(&**table, env, name, payload)
        });
        match result {
            Ok(Some(output)) => output,
            Ok(None) => env.null(),
            Err(e) => {
                self.raise(env, &e);
                env.null()
            }
        }
    }

    /// Native entry point: run a script through the registered gateway.
    pub fn run_script(&self, payload: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        guarded(|| {
            let ctx = self.contexts.get()?;
            outbound::run_script(&ctx, payload)
        })
    }

    fn raise<E>(&self, env: &mut E, err: &BridgeError)
    where
        E: Interpreter<Runtime = R>,
    {
        let message = err.trace();
        tracing::debug!(error = %message, "raising host exception");
        match self.contexts.current() {
            Some(ctx) => env.throw(ctx.exception_class(), &message),
            None => {
                let class = self
                    .config
                    .get()
                    .map(|c| c.names.fallback_exception_class.clone())
                    .unwrap_or_else(|| HostNames::default().fallback_exception_class);
                env.throw_by_name(&class, &message);
            }
        }
    }
}

/// Run `f`, turning a panic into an error so it cannot unwind into the host.
fn guarded<T>(f: impl FnOnce() -> Result<T, BridgeError>) -> Result<T, BridgeError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let reason = panic_message(&*payload);
        tracing::error!(reason, "panic at host boundary");
        Err(BridgeError::host(format!("Internal error: {reason}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
