//! Bridge configuration.
//!
//! Defaults cover a stock deployment. An optional JSON file named by
//! `CALLGATE_CONFIG` overrides them, and a few single-value environment
//! variables override the file.

use std::path::PathBuf;

use anyhow::Context as _;
use serde::Deserialize;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "CALLGATE_CONFIG";
/// Environment variable overriding [`BridgeConfig::error_dir`].
pub const ERROR_DIR_ENV: &str = "CALLGATE_ERROR_DIR";
/// Environment variable overriding [`BridgeConfig::dispatch_library`].
pub const DISPATCH_LIB_ENV: &str = "CALLGATE_DISPATCH_LIB";

/// Fully-qualified host symbols the bridge resolves at load time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostNames {
    /// Helper class exposing the static describe-error method.
    pub helper_class: String,
    pub describe_method: String,
    pub describe_signature: String,
    /// Interface implemented by the gateway object.
    pub gateway_interface: String,
    pub run_script_method: String,
    pub run_script_signature: String,
    /// Exception class thrown back into the host.
    pub exception_class: String,
    /// Thrown by name when no context has been resolved yet.
    pub fallback_exception_class: String,
}

impl Default for HostNames {
    fn default() -> Self {
        Self {
            helper_class: "callgate/GateJni".to_string(),
            describe_method: "describeThrowable".to_string(),
            describe_signature: "(Ljava/lang/Throwable;)Ljava/lang/String;".to_string(),
            gateway_interface: "callgate/ScriptGateway".to_string(),
            run_script_method: "runScript".to_string(),
            run_script_signature: "(Ljava/lang/String;)Ljava/lang/String;".to_string(),
            exception_class: "callgate/GateException".to_string(),
            fallback_exception_class: "java/lang/IllegalStateException".to_string(),
        }
    }
}

/// Exported symbol names of the native dispatch library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchSymbols {
    pub init: String,
    pub call: String,
    pub register: String,
    pub free: String,
    pub alloc: String,
}

impl Default for DispatchSymbols {
    fn default() -> Self {
        Self {
            init: "gate_init".to_string(),
            call: "gate_call".to_string(),
            register: "gate_register".to_string(),
            free: "gate_free".to_string(),
            alloc: "gate_alloc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub names: HostNames,
    /// Directory that receives startup diagnostic dumps.
    pub error_dir: PathBuf,
    /// Native dispatch library to bind at load time.
    pub dispatch_library: Option<PathBuf>,
    pub symbols: DispatchSymbols,
    /// Prefix composed with the engine name when registering the gateway.
    pub script_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            names: HostNames::default(),
            error_dir: PathBuf::from("."),
            dispatch_library: None,
            symbols: DispatchSymbols::default(),
            script_prefix: "runscript_".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from `CALLGATE_CONFIG` (if set) and apply env overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(ERROR_DIR_ENV) {
            config.error_dir = PathBuf::from(dir);
        }
        if let Some(lib) = std::env::var_os(DISPATCH_LIB_ENV) {
            config.dispatch_library = Some(PathBuf::from(lib));
        }
        Ok(config)
    }

    pub fn from_file(path: PathBuf) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("can't read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("bad config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Name under which the gateway for `engine` is registered.
    pub fn script_call_name(&self, engine: &str) -> String {
        format!("{}{}", self.script_prefix, engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.names.helper_class, "callgate/GateJni");
        assert_eq!(
            config.names.run_script_signature,
            "(Ljava/lang/String;)Ljava/lang/String;"
        );
        assert_eq!(config.error_dir, PathBuf::from("."));
        assert!(config.dispatch_library.is_none());
        assert_eq!(config.symbols.call, "gate_call");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BridgeConfig::from_json(
            r#"{"error_dir":"/var/log/gate","names":{"exception_class":"app/Boom"}}"#,
        )
        .unwrap();
        assert_eq!(config.error_dir, PathBuf::from("/var/log/gate"));
        assert_eq!(config.names.exception_class, "app/Boom");
        assert_eq!(config.names.gateway_interface, "callgate/ScriptGateway");
        assert_eq!(config.script_prefix, "runscript_");
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(BridgeConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        std::fs::write(&path, r#"{"dispatch_library":"/opt/lib/libgate.so"}"#).unwrap();
        let config = BridgeConfig::from_file(path).unwrap();
        assert_eq!(
            config.dispatch_library,
            Some(PathBuf::from("/opt/lib/libgate.so"))
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("can't read config"));
    }

    #[test]
    fn test_script_call_name() {
        let config = BridgeConfig::default();
        assert_eq!(config.script_call_name("rhino"), "runscript_rhino");
        assert_eq!(config.script_call_name("nashorn"), "runscript_nashorn");
    }
}
