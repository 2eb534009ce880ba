//! Resolution of the fixed host symbols the bridge depends on.

use std::sync::Arc;

use crate::config::HostNames;
use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::host::{HostRuntime, Interpreter};
use crate::pinned::{Liveness, Pinned};

/// Resolve every required class and method and pin the classes.
///
/// Any missing symbol is fatal and reported as [`BridgeError::Resolution`]
/// naming the symbol. Classes pinned before the failure are released.
/// Every pinned reference shares `liveness` with the rest of the process.
pub fn resolve<R, E>(
    runtime: &Arc<R>,
    env: &mut E,
    names: &HostNames,
    liveness: &Arc<Liveness>,
) -> Result<BridgeContext<R>, BridgeError>
where
    R: HostRuntime,
    E: Interpreter<Runtime = R>,
{
    let pin = |global| Pinned::new(global, runtime.clone(), liveness.clone());

    let helper_class = pin(find_class(env, &names.helper_class)?);
    let describe_error = env
        .static_method_id(
            helper_class.get(),
            &names.describe_method,
            &names.describe_signature,
        )
        .map_err(|e| resolution(&names.describe_method, e))?;

    let gateway_interface = pin(find_class(env, &names.gateway_interface)?);
    let run_script = env
        .method_id(
            gateway_interface.get(),
            &names.run_script_method,
            &names.run_script_signature,
        )
        .map_err(|e| resolution(&names.run_script_method, e))?;

    let exception_class = pin(find_class(env, &names.exception_class)?);

    tracing::debug!(
        helper = %names.helper_class,
        gateway = %names.gateway_interface,
        exception = %names.exception_class,
        "resolved host symbols"
    );

    Ok(BridgeContext::new(
        runtime.clone(),
        liveness.clone(),
        helper_class,
        describe_error,
        gateway_interface,
        run_script,
        exception_class,
    ))
}

fn find_class<E: Interpreter>(
    env: &mut E,
    name: &str,
) -> Result<crate::host::GlobalOf<E>, BridgeError> {
    env.find_class(name).map_err(|e| resolution(name, e))
}

fn resolution(name: &str, err: BridgeError) -> BridgeError {
    BridgeError::Resolution {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn live() -> Arc<Liveness> {
        Arc::new(Liveness::new())
    }

    #[test]
    fn test_resolves_all_symbols() {
        let runtime = Arc::new(FakeRuntime::new());
        let names = HostNames::default();
        let ctx = resolve(&runtime, &mut runtime.env(), &names, &live()).unwrap();
        // helper class, gateway interface, exception class
        assert_eq!(runtime.pin_count(), 3);
        assert_eq!(ctx.exception_class().name, "class:callgate/GateException");
        assert!(ctx.callback().is_none());
    }

    #[test]
    fn test_missing_class_names_symbol() {
        let runtime = Arc::new(FakeRuntime::new().without("callgate/ScriptGateway"));
        let names = HostNames::default();
        let err = resolve(&runtime, &mut runtime.env(), &names, &live()).err().unwrap();
        match err {
            BridgeError::Resolution { name, .. } => assert_eq!(name, "callgate/ScriptGateway"),
            other => panic!("unexpected error: {other:?}"),
        }
        // the helper class pinned before the failure is released again
        assert_eq!(runtime.pin_count(), 1);
        assert_eq!(runtime.release_count(), 1);
    }

    #[test]
    fn test_missing_method_names_symbol() {
        let runtime = Arc::new(FakeRuntime::new().without("describeThrowable"));
        let names = HostNames::default();
        let err = resolve(&runtime, &mut runtime.env(), &names, &live()).err().unwrap();
        assert!(matches!(
            err,
            BridgeError::Resolution { ref name, .. } if name == "describeThrowable"
        ));
        assert!(err.trace().contains("describeThrowable"));
    }

    #[test]
    fn test_context_drop_releases_pins() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = resolve(&runtime, &mut runtime.env(), &HostNames::default(), &live()).unwrap();
        drop(ctx);
        assert_eq!(runtime.release_count(), 3);
    }
}
