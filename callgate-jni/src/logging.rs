use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `callgate_core=debug`.
pub const LOG_ENV: &str = "CALLGATE_LOG";
/// Set to `1` for JSON log lines.
pub const LOG_JSON_ENV: &str = "CALLGATE_LOG_JSON";

/// Install a global subscriber for the library's lifetime.
///
/// The host process may already own the global subscriber, in which case
/// this one is silently skipped.
pub fn init() {
    // JSON logs when embedded in production (CALLGATE_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var(LOG_JSON_ENV).unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("callgate_core=info,callgate_jni=info"));
    let result = if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed by host");
    }
}
