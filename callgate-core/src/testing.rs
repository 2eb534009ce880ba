//! In-memory host runtime used by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::error::BridgeError;
use crate::host::{EnvLookup, HostRuntime, Interpreter};

type GatewayFn = dyn Fn(&str) -> Result<Option<String>, String> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FakeLocal {
    Null,
    Str(String),
    Object(String),
    Throwable(String),
}

#[derive(Debug)]
pub(crate) struct FakeGlobal {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeMethod {
    RunScript,
    Describe,
    Other,
}

pub(crate) struct FakeRuntime {
    attached: Mutex<HashSet<ThreadId>>,
    attaches: AtomicUsize,
    shut_down: AtomicBool,
    refuse_attach: AtomicBool,
    missing: Mutex<HashSet<String>>,
    pins: AtomicUsize,
    releases: AtomicUsize,
    gateway: Mutex<Option<Arc<GatewayFn>>>,
    describe_fails: AtomicBool,
    thrown: Mutex<Vec<(String, String)>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            attached: Mutex::new(HashSet::new()),
            attaches: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            refuse_attach: AtomicBool::new(false),
            missing: Mutex::new(HashSet::new()),
            pins: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            gateway: Mutex::new(None),
            describe_fails: AtomicBool::new(false),
            thrown: Mutex::new(Vec::new()),
        }
    }

    /// Make a class or method name unresolvable.
    pub fn without(self, name: &str) -> Self {
        self.missing.lock().insert(name.to_string());
        self
    }

    pub fn with_gateway<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Result<Option<String>, String> + Send + Sync + 'static,
    {
        *self.gateway.lock() = Some(Arc::new(f));
        self
    }

    pub fn fail_describe(&self) {
        self.describe_fails.store(true, Ordering::SeqCst);
    }

    pub fn shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn refuse_attach(&self) {
        self.refuse_attach.store(true, Ordering::SeqCst);
    }

    /// Interpreter handle as handed to a native entry point by the host.
    pub fn env(&self) -> FakeEnv<'_> {
        FakeEnv {
            rt: self,
            pending: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.lock().contains(&std::thread::current().id())
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Messages of every exception thrown into the host, in order.
    pub fn thrown(&self) -> Vec<String> {
        self.thrown.lock().iter().map(|(_, msg)| msg.clone()).collect()
    }

    pub fn thrown_classes(&self) -> Vec<String> {
        self.thrown.lock().iter().map(|(class, _)| class.clone()).collect()
    }

    fn new_global(&self, name: String) -> FakeGlobal {
        self.pins.fetch_add(1, Ordering::SeqCst);
        FakeGlobal { name }
    }

    fn is_missing(&self, name: &str) -> bool {
        self.missing.lock().contains(name)
    }
}

impl HostRuntime for FakeRuntime {
    type Global = FakeGlobal;
    type MethodId = FakeMethod;
    type StaticMethodId = FakeMethod;
    type Env<'a> = FakeEnv<'a>
    where
        Self: 'a;

    fn get_env(&self) -> EnvLookup<FakeEnv<'_>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return EnvLookup::Unavailable("runtime is shutting down".to_string());
        }
        if self.is_attached() {
            EnvLookup::Attached(self.env())
        } else {
            EnvLookup::Detached
        }
    }

    fn attach_current_thread(&self) -> Result<FakeEnv<'_>, String> {
        if self.shut_down.load(Ordering::SeqCst) || self.refuse_attach.load(Ordering::SeqCst) {
            return Err("attach refused".to_string());
        }
        self.attached.lock().insert(std::thread::current().id());
        self.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(self.env())
    }

    fn release(&self, global: FakeGlobal) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        drop(global);
    }
}

pub(crate) struct FakeEnv<'a> {
    rt: &'a FakeRuntime,
    pending: Option<String>,
}

impl FakeEnv<'_> {
    pub fn string(text: &str) -> FakeLocal {
        FakeLocal::Str(text.to_string())
    }

    pub fn object(name: &str) -> FakeLocal {
        FakeLocal::Object(name.to_string())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Interpreter for FakeEnv<'_> {
    type Runtime = FakeRuntime;
    type Local = FakeLocal;

    fn find_class(&mut self, name: &str) -> Result<FakeGlobal, BridgeError> {
        if self.rt.is_missing(name) {
            return Err(BridgeError::host(format!("Cannot load class, name: [{name}]")));
        }
        Ok(self.rt.new_global(format!("class:{name}")))
    }

    fn method_id(
        &mut self,
        _class: &FakeGlobal,
        name: &str,
        signature: &str,
    ) -> Result<FakeMethod, BridgeError> {
        if self.rt.is_missing(name) {
            return Err(BridgeError::host(format!(
                "Cannot find method, name: [{name}], signature: [{signature}]"
            )));
        }
        Ok(if signature.starts_with("(Ljava/lang/String;)") {
            FakeMethod::RunScript
        } else {
            FakeMethod::Other
        })
    }

    fn static_method_id(
        &mut self,
        _class: &FakeGlobal,
        name: &str,
        signature: &str,
    ) -> Result<FakeMethod, BridgeError> {
        if self.rt.is_missing(name) {
            return Err(BridgeError::host(format!(
                "Cannot find static method, name: [{name}], signature: [{signature}]"
            )));
        }
        Ok(if signature.starts_with("(Ljava/lang/Throwable;)") {
            FakeMethod::Describe
        } else {
            FakeMethod::Other
        })
    }

    fn pin(&mut self, value: &FakeLocal) -> Result<FakeGlobal, BridgeError> {
        match value {
            FakeLocal::Null => Err(BridgeError::host("NewGlobalRef on null")),
            FakeLocal::Object(name) => Ok(self.rt.new_global(format!("object:{name}"))),
            other => Ok(self.rt.new_global(format!("{other:?}"))),
        }
    }

    fn is_null(&self, value: &FakeLocal) -> bool {
        *value == FakeLocal::Null
    }

    fn null(&self) -> FakeLocal {
        FakeLocal::Null
    }

    fn new_string(&mut self, text: &str) -> Result<FakeLocal, BridgeError> {
        Ok(FakeLocal::Str(text.to_string()))
    }

    fn read_string(&mut self, value: &FakeLocal) -> Result<String, BridgeError> {
        match value {
            FakeLocal::Str(s) => Ok(s.clone()),
            other => Err(BridgeError::host(format!("not a string: {other:?}"))),
        }
    }

    fn call_method(&mut self, target: &FakeGlobal, method: FakeMethod, arg: &FakeLocal) -> FakeLocal {
        if method != FakeMethod::RunScript || !target.name.starts_with("object:") {
            self.pending = Some("NoSuchMethodError".to_string());
            return FakeLocal::Null;
        }
        let Some(gateway) = self.rt.gateway.lock().clone() else {
            self.pending = Some("no gateway behaviour configured".to_string());
            return FakeLocal::Null;
        };
        let FakeLocal::Str(input) = arg else {
            self.pending = Some("ClassCastException".to_string());
            return FakeLocal::Null;
        };
        match gateway(input) {
            Ok(Some(out)) => FakeLocal::Str(out),
            Ok(None) => FakeLocal::Null,
            Err(msg) => {
                self.pending = Some(msg);
                FakeLocal::Null
            }
        }
    }

    fn call_static_method(
        &mut self,
        _class: &FakeGlobal,
        method: FakeMethod,
        arg: &FakeLocal,
    ) -> FakeLocal {
        if method != FakeMethod::Describe || self.rt.describe_fails.load(Ordering::SeqCst) {
            self.pending = Some("describe failed".to_string());
            return FakeLocal::Null;
        }
        match arg {
            FakeLocal::Throwable(msg) => FakeLocal::Str(format!("GatewayException: {msg}")),
            other => FakeLocal::Str(format!("{other:?}")),
        }
    }

    fn pending_error(&mut self) -> Option<FakeLocal> {
        self.pending.clone().map(FakeLocal::Throwable)
    }

    fn clear_pending_error(&mut self) {
        self.pending = None;
    }

    fn delete_local(&mut self, value: FakeLocal) {
        drop(value);
    }

    fn throw(&mut self, class: &FakeGlobal, message: &str) {
        self.rt
            .thrown
            .lock()
            .push((class.name.clone(), message.to_string()));
        self.pending = Some(message.to_string());
    }

    fn throw_by_name(&mut self, class_name: &str, message: &str) {
        self.rt
            .thrown
            .lock()
            .push((format!("class:{class_name}"), message.to_string()));
        self.pending = Some(message.to_string());
    }
}
