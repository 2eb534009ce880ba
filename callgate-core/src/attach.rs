//! Per-thread interpreter acquisition.

use crate::error::BridgeError;
use crate::host::{EnvLookup, HostRuntime};

/// Interpreter handle for the calling thread, attaching the thread if needed.
///
/// The already-attached path is a single runtime query. The returned handle
/// borrows `runtime` and must not outlive the current call.
pub fn current_interpreter<R: HostRuntime>(runtime: &R) -> Result<R::Env<'_>, BridgeError> {
    match runtime.get_env() {
        EnvLookup::Attached(env) => Ok(env),
        EnvLookup::Detached => {
            tracing::debug!(thread = ?std::thread::current().id(), "attaching thread to host runtime");
            runtime
                .attach_current_thread()
                .map_err(BridgeError::EnvironmentUnavailable)
        }
        EnvLookup::Unavailable(reason) => Err(BridgeError::EnvironmentUnavailable(reason)),
    }
}
