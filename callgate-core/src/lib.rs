//! callgate-core: bridge between a managed runtime and a native dispatch table.
//!
//! Two directions of travel:
//! - Managed to native: the host calls into a named native handler through
//!   the dispatch table ([`Bridge::dispatch_call`]).
//! - Native to managed: a native handler runs a script through the gateway
//!   object the host registered ([`Bridge::run_script`]).
//!
//! The host runtime is abstracted behind [`host::HostRuntime`] so this crate
//! carries no binding to a concrete runtime.

pub mod attach;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod host;
pub mod inbound;
pub mod native;
pub mod outbound;
pub mod pinned;
pub mod registry;
pub mod resolve;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, LOAD_FAILED};
pub use config::BridgeConfig;
pub use dispatch::{CallHandler, DispatchTable};
pub use error::{BridgeError, ResultExt};
pub use host::{EnvLookup, HostRuntime, Interpreter};
pub use native::NativeLibrary;
pub use registry::LocalDispatchTable;
