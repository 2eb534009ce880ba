//! Error taxonomy for both directions of the bridge.

use std::error::Error as _;

use thiserror::Error;

/// Description used when the host's describe-error helper itself fails.
pub const DESCRIBE_ERROR_PLACEHOLDER: &str = "EXC_DESCRIBE_ERROR";

/// Every failure the bridge can report.
///
/// Errors are translated into host exceptions at the boundary. The message a
/// host sees is [`BridgeError::trace`], which keeps the original message and
/// appends each layer of context below it.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required class or method could not be found in the host.
    #[error("Cannot resolve host symbol, name: [{name}]: {reason}")]
    Resolution { name: String, reason: String },

    /// A required cross-boundary argument was null.
    #[error("Null '{0}' parameter specified")]
    NullArgument(&'static str),

    /// A one-shot registration was attempted a second time.
    #[error("Script gateway is already registered: [{0}]")]
    AlreadyRegistered(String),

    /// `initialize_and_register` was called more than once.
    #[error("Bridge is already initialized")]
    AlreadyInitialized,

    /// No usable interpreter handle could be obtained for this thread.
    #[error("System error: cannot obtain host environment: {0}")]
    EnvironmentUnavailable(String),

    /// The host-side gateway raised an error during an outbound call.
    #[error("{0}")]
    RemoteScript(String),

    /// The native dispatch table reported a failure.
    #[error("{message}\n'dispatch' error for name: [{name}]")]
    NativeDispatch { name: String, message: String },

    /// The native dispatch table rejected its configuration.
    #[error("{0}")]
    NativeInit(String),

    /// The native dispatch table refused a handler registration.
    #[error("{message}\n'register' error for name: [{name}]")]
    NativeRegister { name: String, message: String },

    /// A host call failed for a reason other than a managed exception.
    #[error("Host call failed: {0}")]
    Host(String),

    /// Payload bytes could not be represented as host text.
    #[error("Invalid UTF-8 in cross-boundary payload: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// An entry point was reached before the bridge was loaded.
    #[error("Bridge is not loaded")]
    NotLoaded,

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },

    #[error(transparent)]
    Library(#[from] libloading::Error),
}

impl BridgeError {
    pub fn host(reason: impl Into<String>) -> Self {
        Self::Host(reason.into())
    }

    /// Wrap this error with an extra line of context.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Render the full chain, innermost message first.
    pub fn trace(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut cur = self.source();
        while let Some(err) = cur {
            lines.push(err.to_string());
            cur = err.source();
        }
        lines.reverse();
        lines.join("\n")
    }
}

/// Attach context to the error side of a [`Result`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, BridgeError>;

    fn with_context<F, S>(self, f: F) -> Result<T, BridgeError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T, BridgeError> {
    fn context(self, context: impl Into<String>) -> Result<T, BridgeError> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T, BridgeError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
