//! Managed to native: registration and dispatch entry points.
//!
//! These functions report failures as [`BridgeError`]; turning them into
//! host exceptions is left to [`crate::bridge::Bridge`].

use std::sync::Arc;

use crate::codec;
use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::dispatch::{take_error, CallHandler, DispatchOutcome, DispatchTable, OwnedBuf};
use crate::error::BridgeError;
use crate::guard::RegistrationGuard;
use crate::host::{HostRuntime, Interpreter};

/// Arguments of the one-time registration, as received from the host.
pub struct Registration<'l, L> {
    pub gateway: &'l L,
    pub engine_name: &'l L,
    pub config: &'l L,
}

/// Install the gateway, initialize the dispatch table and register the
/// script handler under [`BridgeConfig::script_call_name`] of the engine.
///
/// Succeeds at most once per process. Later calls fail with
/// [`BridgeError::AlreadyInitialized`] and leave the first registration as is.
/// A failure past the claim is not rolled back.
pub fn initialize_and_register<R, E, T>(
    ctx: &BridgeContext<R>,
    table: &T,
    guard: &RegistrationGuard,
    env: &mut E,
    args: Registration<'_, E::Local>,
    settings: &BridgeConfig,
    handler: Arc<dyn CallHandler>,
) -> Result<String, BridgeError>
where
    R: HostRuntime,
    E: Interpreter<Runtime = R>,
    T: DispatchTable + ?Sized,
{
    if env.is_null(args.gateway) {
        return Err(BridgeError::NullArgument("gateway"));
    }
    if env.is_null(args.engine_name) {
        return Err(BridgeError::NullArgument("engineName"));
    }
    if env.is_null(args.config) {
        return Err(BridgeError::NullArgument("config"));
    }
    if !guard.try_claim() {
        return Err(BridgeError::AlreadyInitialized);
    }

    let engine = env.read_string(args.engine_name)?;
    let config = codec::decode(env, args.config)?;

    ctx.install_callback(env, args.gateway)?;

    if let Some(msg) = take_error(table, table.init(&config)) {
        return Err(BridgeError::NativeInit(msg).context(format!(
            "Dispatch table initialization error, conf: [{}]",
            String::from_utf8_lossy(&config)
        )));
    }

    let name = settings.script_call_name(&engine);
    if let Some(message) = take_error(table, table.register(&name, handler)) {
        return Err(BridgeError::NativeRegister { name, message });
    }
    tracing::info!(%name, "script gateway registered");
    Ok(name)
}

/// Run the native call `name` with `payload`.
///
/// `Ok(None)` is the empty result. Every buffer the table hands back is
/// released before this returns, on success and failure alike.
pub fn dispatch_call<E, T>(
    table: &T,
    env: &mut E,
    name: &E::Local,
    payload: &E::Local,
) -> Result<Option<E::Local>, BridgeError>
where
    E: Interpreter,
    T: DispatchTable + ?Sized,
{
    if env.is_null(name) {
        return Err(BridgeError::NullArgument("name"));
    }
    if env.is_null(payload) {
        return Err(BridgeError::NullArgument("data"));
    }
    let name = codec::decode(env, name)?;
    let payload = codec::decode(env, payload)?;

    match table.dispatch(&name, &payload) {
        DispatchOutcome::Output(buf) => {
            // SAFETY: output buffers from `dispatch` are owned by the caller.
            let output = unsafe { OwnedBuf::new(buf, table) };
            codec::encode(env, output.as_bytes()).map(Some)
        }
        DispatchOutcome::Empty => Ok(None),
        DispatchOutcome::Failed(buf) => {
            // SAFETY: as above, for the error buffer.
            let message = unsafe { OwnedBuf::new(buf, table) }.to_string_lossy();
            Err(BridgeError::NativeDispatch {
                name: String::from_utf8_lossy(&name).into_owned(),
                message,
            })
        }
    }
}
