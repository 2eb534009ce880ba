//! Native to managed: running a script through the registered gateway.

use crate::attach::current_interpreter;
use crate::codec;
use crate::context::{BridgeContext, ContextCell};
use crate::dispatch::CallHandler;
use crate::error::{BridgeError, DESCRIBE_ERROR_PLACEHOLDER};
use crate::host::{HostRuntime, Interpreter};

/// Send `payload` to the gateway's run-script method on the calling thread.
///
/// `Ok(None)` is the empty result: the gateway returned no value. A managed
/// exception becomes [`BridgeError::RemoteScript`] carrying the host's own
/// description of it.
pub fn run_script<R: HostRuntime>(
    ctx: &BridgeContext<R>,
    payload: &[u8],
) -> Result<Option<Vec<u8>>, BridgeError> {
    let gateway = ctx
        .callback()
        .ok_or_else(|| BridgeError::host("Script gateway is not registered"))?;
    let mut env = current_interpreter(&**ctx.runtime())?;

    let input = codec::encode(&mut env, payload)?;
    let result = env.call_method(gateway, ctx.run_script(), &input);
    env.delete_local(input);

    // a thrown exception is left pending, not signalled through `result`
    if let Some(exc) = env.pending_error() {
        env.clear_pending_error();
        let description = describe_error(ctx, &mut env, &exc);
        env.delete_local(exc);
        env.delete_local(result);
        return Err(BridgeError::RemoteScript(description));
    }

    if env.is_null(&result) {
        return Ok(None);
    }
    let output = codec::decode(&mut env, &result);
    env.delete_local(result);
    output.map(Some)
}

/// Ask the host to render `exc`, falling back to a fixed placeholder.
fn describe_error<R, E>(ctx: &BridgeContext<R>, env: &mut E, exc: &E::Local) -> String
where
    R: HostRuntime,
    E: Interpreter<Runtime = R>,
{
    let described = env.call_static_method(ctx.helper_class(), ctx.describe_error(), exc);
    if let Some(nested) = env.pending_error() {
        env.clear_pending_error();
        env.delete_local(nested);
        env.delete_local(described);
        return DESCRIBE_ERROR_PLACEHOLDER.to_string();
    }
    if env.is_null(&described) {
        return DESCRIBE_ERROR_PLACEHOLDER.to_string();
    }
    let text = env.read_string(&described);
    env.delete_local(described);
    text.unwrap_or_else(|_| DESCRIBE_ERROR_PLACEHOLDER.to_string())
}

/// Dispatch-table handler that forwards to [`run_script`] on the current context.
pub struct ScriptGateway<R: HostRuntime> {
    contexts: &'static ContextCell<R>,
}

impl<R: HostRuntime> ScriptGateway<R> {
    pub fn new(contexts: &'static ContextCell<R>) -> Self {
        Self { contexts }
    }
}

impl<R: HostRuntime> CallHandler for ScriptGateway<R> {
    fn call(&self, payload: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        let ctx = self.contexts.get()?;
        tracing::debug!(len = payload.len(), "runscript crossing into host");
        run_script(&ctx, payload)
    }
}
