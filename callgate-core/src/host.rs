//! The managed runtime as seen by the bridge.
//!
//! [`HostRuntime`] is the process-wide runtime instance. It is borrowed, never
//! owned: the bridge keeps an `Arc` to the adapter, not to the runtime itself.
//! [`Interpreter`] is the thread-affine handle used for one crossing. It is
//! obtained per call (see [`crate::attach`]) and never stored.

use crate::error::BridgeError;

/// Result of asking the runtime for the calling thread's interpreter.
pub enum EnvLookup<E> {
    /// The thread is attached and `E` is its handle.
    Attached(E),
    /// The thread is not attached yet.
    Detached,
    /// The runtime refused for any other reason (shutdown, version mismatch, ...).
    Unavailable(String),
}

pub trait HostRuntime: Send + Sync + 'static {
    /// Pinned reference to a class or object, valid across calls and threads.
    type Global: Send + Sync;
    type MethodId: Copy + Send + Sync;
    type StaticMethodId: Copy + Send + Sync;
    /// Interpreter handle for the calling thread.
    type Env<'a>: Interpreter<Runtime = Self>
    where
        Self: 'a;

    fn get_env(&self) -> EnvLookup<Self::Env<'_>>;

    fn attach_current_thread(&self) -> Result<Self::Env<'_>, String>;

    /// Release a pinned reference. Only called while the runtime is live.
    fn release(&self, global: Self::Global) {
        drop(global);
    }
}

/// Pinned reference type of an interpreter's runtime.
pub type GlobalOf<E> = <<E as Interpreter>::Runtime as HostRuntime>::Global;
pub type MethodOf<E> = <<E as Interpreter>::Runtime as HostRuntime>::MethodId;
pub type StaticMethodOf<E> = <<E as Interpreter>::Runtime as HostRuntime>::StaticMethodId;

/// Operations the bridge performs through a thread-local interpreter handle.
///
/// `Local` values are transient references valid only for the current call.
pub trait Interpreter {
    type Runtime: HostRuntime;
    type Local;

    /// Look up a class and pin it, dropping the transient lookup reference.
    fn find_class(&mut self, name: &str) -> Result<GlobalOf<Self>, BridgeError>;

    fn method_id(
        &mut self,
        class: &GlobalOf<Self>,
        name: &str,
        signature: &str,
    ) -> Result<MethodOf<Self>, BridgeError>;

    fn static_method_id(
        &mut self,
        class: &GlobalOf<Self>,
        name: &str,
        signature: &str,
    ) -> Result<StaticMethodOf<Self>, BridgeError>;

    /// Promote a transient reference to a pinned one.
    fn pin(&mut self, value: &Self::Local) -> Result<GlobalOf<Self>, BridgeError>;

    fn is_null(&self, value: &Self::Local) -> bool;

    fn null(&self) -> Self::Local;

    fn new_string(&mut self, text: &str) -> Result<Self::Local, BridgeError>;

    fn read_string(&mut self, value: &Self::Local) -> Result<String, BridgeError>;

    /// Invoke an instance method taking one reference and returning one.
    ///
    /// A managed exception leaves the error pending and yields a null local;
    /// callers must check [`Interpreter::pending_error`].
    fn call_method(
        &mut self,
        target: &GlobalOf<Self>,
        method: MethodOf<Self>,
        arg: &Self::Local,
    ) -> Self::Local;

    /// Static counterpart of [`Interpreter::call_method`].
    fn call_static_method(
        &mut self,
        class: &GlobalOf<Self>,
        method: StaticMethodOf<Self>,
        arg: &Self::Local,
    ) -> Self::Local;

    /// The pending managed error, if any. Does not clear it.
    fn pending_error(&mut self) -> Option<Self::Local>;

    fn clear_pending_error(&mut self);

    fn delete_local(&mut self, value: Self::Local);

    /// Raise an exception of `class` that surfaces once control returns to the host.
    fn throw(&mut self, class: &GlobalOf<Self>, message: &str);

    /// Like [`Interpreter::throw`], looking the class up first.
    fn throw_by_name(&mut self, class_name: &str, message: &str);
}
