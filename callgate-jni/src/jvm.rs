//! [`HostRuntime`] and [`Interpreter`] on top of the `jni` crate.

use callgate_core::error::BridgeError;
use callgate_core::host::{EnvLookup, HostRuntime, Interpreter};
use jni::errors::{Error as JniError, JniError as JniCallError};
use jni::objects::{GlobalRef, JClass, JMethodID, JObject, JStaticMethodID, JString, JValue};
use jni::signature::ReturnType;
use jni::{JNIEnv, JavaVM};

pub struct JvmRuntime {
    vm: JavaVM,
}

impl JvmRuntime {
    pub fn new(vm: JavaVM) -> Self {
        Self { vm }
    }
}

impl HostRuntime for JvmRuntime {
    type Global = GlobalRef;
    type MethodId = JMethodID;
    type StaticMethodId = JStaticMethodID;
    type Env<'a> = JvmEnv<'a>
    where
        Self: 'a;

    fn get_env(&self) -> EnvLookup<JvmEnv<'_>> {
        match self.vm.get_env() {
            Ok(env) => EnvLookup::Attached(JvmEnv::new(env)),
            Err(JniError::JniCall(JniCallError::ThreadDetached)) => EnvLookup::Detached,
            Err(e) => EnvLookup::Unavailable(e.to_string()),
        }
    }

    fn attach_current_thread(&self) -> Result<JvmEnv<'_>, String> {
        // permanent: a native worker thread keeps its attachment until it exits
        self.vm
            .attach_current_thread_permanently()
            .map(JvmEnv::new)
            .map_err(|e| e.to_string())
    }
}

/// Borrow a pinned class reference as a `JClass` for a single call.
fn class_of(global: &GlobalRef) -> JClass<'_> {
    // SAFETY: the global reference outlives the returned borrow and JClass
    // does not delete the reference on drop.
    unsafe { JClass::from_raw(global.as_obj().as_raw()) }
}

pub struct JvmEnv<'a> {
    env: JNIEnv<'a>,
}

impl<'a> JvmEnv<'a> {
    pub fn new(env: JNIEnv<'a>) -> Self {
        Self { env }
    }

    /// Convert a failed JNI call, clearing the exception it left pending.
    fn failure(&mut self, what: String, err: JniError) -> BridgeError {
        if matches!(err, JniError::JavaException) {
            let _ = self.env.exception_clear();
        }
        BridgeError::host(format!("{what}: {err}"))
    }
}

impl<'a> Interpreter for JvmEnv<'a> {
    type Runtime = JvmRuntime;
    type Local = JObject<'a>;

    fn find_class(&mut self, name: &str) -> Result<GlobalRef, BridgeError> {
        let class = match self.env.find_class(name) {
            Ok(class) => class,
            Err(e) => return Err(self.failure(format!("Cannot load class, name: [{name}]"), e)),
        };
        let global = self.env.new_global_ref(&class);
        let _ = self.env.delete_local_ref(class);
        global.map_err(|e| self.failure(format!("Cannot pin class, name: [{name}]"), e))
    }

    fn method_id(
        &mut self,
        class: &GlobalRef,
        name: &str,
        signature: &str,
    ) -> Result<JMethodID, BridgeError> {
        let class = class_of(class);
        match self.env.get_method_id(&class, name, signature) {
            Ok(id) => Ok(id),
            Err(e) => Err(self.failure(
                format!("Cannot find method, name: [{name}], signature: [{signature}]"),
                e,
            )),
        }
    }

    fn static_method_id(
        &mut self,
        class: &GlobalRef,
        name: &str,
        signature: &str,
    ) -> Result<JStaticMethodID, BridgeError> {
        let class = class_of(class);
        match self.env.get_static_method_id(&class, name, signature) {
            Ok(id) => Ok(id),
            Err(e) => Err(self.failure(
                format!("Cannot find static method, name: [{name}], signature: [{signature}]"),
                e,
            )),
        }
    }

    fn pin(&mut self, value: &JObject<'a>) -> Result<GlobalRef, BridgeError> {
        match self.env.new_global_ref(value) {
            Ok(global) => Ok(global),
            Err(e) => Err(self.failure("NewGlobalRef failed".to_string(), e)),
        }
    }

    fn is_null(&self, value: &JObject<'a>) -> bool {
        value.is_null()
    }

    fn null(&self) -> JObject<'a> {
        JObject::null()
    }

    fn new_string(&mut self, text: &str) -> Result<JObject<'a>, BridgeError> {
        match self.env.new_string(text) {
            Ok(s) => Ok(JObject::from(s)),
            Err(e) => Err(self.failure("Cannot create host string".to_string(), e)),
        }
    }

    fn read_string(&mut self, value: &JObject<'a>) -> Result<String, BridgeError> {
        let jstr: &JString<'a> = value.into();
        match self.env.get_string(jstr) {
            Ok(s) => Ok(String::from(s)),
            Err(e) => Err(self.failure("Cannot read host string".to_string(), e)),
        }
    }

    fn call_method(&mut self, target: &GlobalRef, method: JMethodID, arg: &JObject<'a>) -> JObject<'a> {
        let args = [JValue::Object(arg).as_jni()];
        // SAFETY: `method` was resolved against the target's interface with a
        // one-reference-argument, reference-returning signature.
        let result = unsafe {
            self.env
                .call_method_unchecked(target.as_obj(), method, ReturnType::Object, &args)
        };
        // a thrown exception stays pending for the caller to check
        result.and_then(|v| v.l()).unwrap_or_else(|_| JObject::null())
    }

    fn call_static_method(
        &mut self,
        class: &GlobalRef,
        method: JStaticMethodID,
        arg: &JObject<'a>,
    ) -> JObject<'a> {
        let class = class_of(class);
        let args = [JValue::Object(arg).as_jni()];
        // SAFETY: as for `call_method`, with a static method of `class`.
        let result = unsafe {
            self.env
                .call_static_method_unchecked(&class, method, ReturnType::Object, &args)
        };
        result.and_then(|v| v.l()).unwrap_or_else(|_| JObject::null())
    }

    fn pending_error(&mut self) -> Option<JObject<'a>> {
        if !self.env.exception_check().unwrap_or(false) {
            return None;
        }
        self.env.exception_occurred().ok().map(JObject::from)
    }

    fn clear_pending_error(&mut self) {
        let _ = self.env.exception_clear();
    }

    fn delete_local(&mut self, value: JObject<'a>) {
        if !value.is_null() {
            let _ = self.env.delete_local_ref(value);
        }
    }

    fn throw(&mut self, class: &GlobalRef, message: &str) {
        let class = class_of(class);
        if let Err(e) = self.env.throw_new(&class, message) {
            tracing::warn!(error = %e, "ThrowNew failed");
        }
    }

    fn throw_by_name(&mut self, class_name: &str, message: &str) {
        if let Err(e) = self.env.throw_new(class_name, message) {
            tracing::warn!(error = %e, class = class_name, "ThrowNew failed");
        }
    }
}
