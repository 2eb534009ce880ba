//! callgate-jni: JVM entry points for the callgate bridge.
//!
//! Loaded by `System.loadLibrary("callgate_jni")` from `callgate.GateJni`,
//! which declares:
//!
//! ```java
//! static native void initializeAndRegister(ScriptGateway gateway, String engineName, String config);
//! static native String dispatchCall(String name, String data);
//! ```

pub mod jvm;
pub mod logging;

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use callgate_core::config::DISPATCH_LIB_ENV;
use callgate_core::{diagnostics, Bridge, BridgeConfig, BridgeError, NativeLibrary, LOAD_FAILED};
use jni::objects::{JClass, JObject, JString};
use jni::sys::{jint, jstring, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use once_cell::sync::Lazy;

use crate::jvm::{JvmEnv, JvmRuntime};

/// Process-wide bridge state shared by every entry point below.
static BRIDGE: Lazy<Bridge<JvmRuntime, NativeLibrary>> = Lazy::new(Bridge::new);

fn open_library(config: &BridgeConfig) -> Result<NativeLibrary, BridgeError> {
    let path = config.dispatch_library.as_deref().ok_or_else(|| {
        BridgeError::host(format!(
            "No dispatch library configured, set {DISPATCH_LIB_ENV} or 'dispatch_library'"
        ))
    })?;
    NativeLibrary::open(path, &config.symbols)
}

fn load(vm: JavaVM) -> jint {
    logging::init();
    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let message = format!("{e:#}\nBridge config error");
            tracing::error!(error = %message, "bridge load failed");
            diagnostics::dump_error(&BridgeConfig::default().error_dir, &message);
            return LOAD_FAILED;
        }
    };
    BRIDGE.on_load(Arc::new(JvmRuntime::new(vm)), config, open_library, JNI_VERSION_1_6)
}

// ─── Load / Unload ───────────────────────────────────────────────────

/// Called by the JVM when the library is loaded. Returns the JNI version
/// the library needs, or -1 to make `System.loadLibrary` fail.
#[unsafe(no_mangle)]
pub extern "system" fn JNI_OnLoad(vm: JavaVM, _reserved: *mut c_void) -> jint {
    catch_unwind(AssertUnwindSafe(|| load(vm))).unwrap_or(LOAD_FAILED)
}

/// Called by the JVM when the class loader holding the library is collected.
#[unsafe(no_mangle)]
pub extern "system" fn JNI_OnUnload(_vm: JavaVM, _reserved: *mut c_void) {
    let _ = catch_unwind(AssertUnwindSafe(|| BRIDGE.on_unload()));
}

// ─── Native methods of callgate.GateJni ──────────────────────────────

/// `GateJni.initializeAndRegister`. Throws `GateException` on failure,
/// including on any call after the first.
#[unsafe(no_mangle)]
pub extern "system" fn Java_callgate_GateJni_initializeAndRegister<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    gateway: JObject<'local>,
    engine_name: JString<'local>,
    config: JString<'local>,
) {
    let mut env = JvmEnv::new(env);
    BRIDGE.initialize_and_register(
        &mut env,
        &gateway,
        &JObject::from(engine_name),
        &JObject::from(config),
    );
}

/// `GateJni.dispatchCall`. Returns null for an empty result.
#[unsafe(no_mangle)]
pub extern "system" fn Java_callgate_GateJni_dispatchCall<'local>(
    env: JNIEnv<'local>,
    _class: JClass<'local>,
    name: JString<'local>,
    data: JString<'local>,
) -> jstring {
    let mut env = JvmEnv::new(env);
    BRIDGE
        .dispatch_call(&mut env, &JObject::from(name), &JObject::from(data))
        .into_raw()
}
