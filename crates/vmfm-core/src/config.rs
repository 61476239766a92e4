//! Webhook configuration
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional YAML
//! file, environment variables, command-line overrides.

use crate::error::ConfigError;
use crate::policy::ErrorHandlingMode;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use vmfm_features::FeaturesConfig;
use vmfm_resource::{ConfigSource, PatchStrategy};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Full webhook configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Listen port
    pub port: u16,
    /// Directory holding `tls.crt` and `tls.key`
    pub cert_dir: PathBuf,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Rule failure handling
    pub error_handling: ErrorHandlingMode,
    /// Primary metadata namespace
    pub config_source: ConfigSource,
    /// Record `<feature>-applied` keys
    pub add_tracking_annotations: bool,
    /// Metadata patch strategy
    pub patch_strategy: PatchStrategy,
    /// Secret lookup budget per request, in milliseconds
    pub lookup_timeout_ms: u64,
    /// Reported webhook version
    pub webhook_version: String,
    /// Per-rule settings
    pub features: FeaturesConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            cert_dir: PathBuf::from("/etc/webhook/certs"),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            error_handling: ErrorHandlingMode::Reject,
            config_source: ConfigSource::Annotations,
            add_tracking_annotations: true,
            patch_strategy: PatchStrategy::Coarse,
            lookup_timeout_ms: 5000,
            webhook_version: "v0.1.0".to_string(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Values given on the command line; `None` leaves the lower layer in place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// `--port`
    pub port: Option<u16>,
    /// `--cert-dir`
    pub cert_dir: Option<PathBuf>,
    /// `--error-handling`
    pub error_handling: Option<String>,
    /// `--log-level`
    pub log_level: Option<String>,
    /// `--config-source`
    pub config_source: Option<String>,
}

impl WebhookConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all layers
    ///
    /// # Errors
    /// Returns error if the config file cannot be read or parsed, or the
    /// `--config-source` override is invalid.
    pub fn load(file: Option<&Path>, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
            .with_overrides(overrides)
    }

    /// Defaults overlaid with the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Read a YAML file; missing fields keep their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment values read through `lookup`
    ///
    /// Empty or unparseable values leave the current value in place.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        set_parsed(&mut self.port, "PORT", get("PORT"));
        if let Some(dir) = get("CERT_DIR") {
            self.cert_dir = PathBuf::from(dir);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }
        set_parsed(&mut self.log_format, "LOG_FORMAT", get("LOG_FORMAT"));
        if let Some(mode) = get("ERROR_HANDLING_MODE") {
            self.error_handling = ErrorHandlingMode::parse_lenient(&mode);
        }
        if let Some(source) = get("CONFIG_SOURCE") {
            self.config_source = ConfigSource::parse_or_default(&source);
        }
        set_bool(&mut self.add_tracking_annotations, "ADD_TRACKING_ANNOTATIONS", get("ADD_TRACKING_ANNOTATIONS"));
        set_parsed(&mut self.patch_strategy, "PATCH_STRATEGY", get("PATCH_STRATEGY"));
        set_parsed(&mut self.lookup_timeout_ms, "LOOKUP_TIMEOUT_MS", get("LOOKUP_TIMEOUT_MS"));
        if let Some(version) = get("WEBHOOK_VERSION") {
            self.webhook_version = version;
        }

        let features = &mut self.features;
        set_bool(&mut features.nested_virt.enabled, "FEATURE_NESTED_VIRT_ENABLED", get("FEATURE_NESTED_VIRT_ENABLED"));
        set_parsed(&mut features.nested_virt.cpu_feature, "NESTED_VIRT_CPU_FEATURE", get("NESTED_VIRT_CPU_FEATURE"));
        set_bool(&mut features.pci_passthrough.enabled, "FEATURE_PCI_PASSTHROUGH_ENABLED", get("FEATURE_PCI_PASSTHROUGH_ENABLED"));
        set_parsed(&mut features.pci_passthrough.max_devices, "PCI_MAX_DEVICES", get("PCI_MAX_DEVICES"));
        set_bool(&mut features.vbios_injection.enabled, "FEATURE_VBIOS_ENABLED", get("FEATURE_VBIOS_ENABLED"));
        if let Some(image) = get("VBIOS_SIDECAR_IMAGE_OVERRIDE") {
            features.vbios_injection.sidecar_image = image;
        }
        set_bool(&mut features.gpu_device_plugin.enabled, "FEATURE_GPU_DEVICE_PLUGIN_ENABLED", get("FEATURE_GPU_DEVICE_PLUGIN_ENABLED"));
        if let Some(plugins) = get("GPU_ALLOWED_PLUGINS") {
            features.gpu_device_plugin.allowed_plugins = plugins
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        self
    }

    /// Apply command-line overrides
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConfigSource`] for an unknown
    /// `--config-source`.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        if let Some(port) = overrides.port.filter(|p| *p != 0) {
            self.port = port;
        }
        if let Some(dir) = &overrides.cert_dir {
            self.cert_dir.clone_from(dir);
        }
        if let Some(mode) = overrides.error_handling.as_deref().filter(|m| !m.is_empty()) {
            self.error_handling = ErrorHandlingMode::parse_lenient(mode);
        }
        if let Some(level) = overrides.log_level.as_deref().filter(|l| !l.is_empty()) {
            self.log_level = level.to_string();
        }
        if let Some(source) = overrides.config_source.as_deref().filter(|s| !s.is_empty()) {
            self.config_source = source.parse()?;
        }
        Ok(self)
    }

    /// Secret lookup budget
    #[inline]
    #[must_use]
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Path of the serving certificate
    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join("tls.crt")
    }

    /// Path of the serving key
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join("tls.key")
    }
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = %value, "ignoring unparseable environment value"),
    }
}

fn set_bool(slot: &mut bool, key: &str, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match parse_bool(&value) {
        Some(parsed) => *slot = parsed,
        None => warn!(key, value = %value, "ignoring unparseable boolean environment value"),
    }
}

/// `1 t T TRUE true True` / `0 f F FALSE false False`
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use vmfm_features::CpuFeature;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.port, 8443);
        assert_eq!(config.cert_dir, PathBuf::from("/etc/webhook/certs"));
        assert_eq!(config.error_handling, ErrorHandlingMode::Reject);
        assert_eq!(config.config_source, ConfigSource::Annotations);
        assert!(config.add_tracking_annotations);
        assert_eq!(config.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.key_path(), PathBuf::from("/etc/webhook/certs/tls.key"));
    }

    #[test]
    fn env_overlays_values() {
        let config = WebhookConfig::default().with_env(env(&[
            ("PORT", "9443"),
            ("ERROR_HANDLING_MODE", "strip-label"),
            ("CONFIG_SOURCE", "labels"),
            ("ADD_TRACKING_ANNOTATIONS", "false"),
            ("PATCH_STRATEGY", "per-key"),
            ("NESTED_VIRT_CPU_FEATURE", "vmx"),
            ("PCI_MAX_DEVICES", "2"),
            ("GPU_ALLOWED_PLUGINS", "nvidia.com/gpu, amd.com/gpu,"),
            ("LOG_FORMAT", "json"),
        ]));

        assert_eq!(config.port, 9443);
        assert_eq!(config.error_handling, ErrorHandlingMode::StripLabel);
        assert_eq!(config.config_source, ConfigSource::Labels);
        assert!(!config.add_tracking_annotations);
        assert_eq!(config.patch_strategy, PatchStrategy::PerKey);
        assert_eq!(config.features.nested_virt.cpu_feature, CpuFeature::Vmx);
        assert_eq!(config.features.pci_passthrough.max_devices, 2);
        assert_eq!(
            config.features.gpu_device_plugin.allowed_plugins,
            vec!["nvidia.com/gpu".to_string(), "amd.com/gpu".to_string()]
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        let config = WebhookConfig::default().with_env(env(&[
            ("PORT", "not-a-port"),
            ("ADD_TRACKING_ANNOTATIONS", "maybe"),
            ("ERROR_HANDLING_MODE", "explode"),
            ("CONFIG_SOURCE", "spec"),
            ("PCI_MAX_DEVICES", "-1"),
            ("CERT_DIR", ""),
        ]));
        assert_eq!(config, WebhookConfig::default());
    }

    #[test]
    fn cli_overrides_win() {
        let config = WebhookConfig::default()
            .with_env(env(&[("PORT", "9443"), ("LOG_LEVEL", "warn")]))
            .with_overrides(&CliOverrides {
                port: Some(10443),
                error_handling: Some("allow-and-log".to_string()),
                config_source: Some("Labels".to_string()),
                ..CliOverrides::default()
            })
            .unwrap();

        assert_eq!(config.port, 10443);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.error_handling, ErrorHandlingMode::AllowAndLog);
        assert_eq!(config.config_source, ConfigSource::Labels);
    }

    #[test]
    fn invalid_cli_config_source_is_an_error() {
        let err = WebhookConfig::default()
            .with_overrides(&CliOverrides {
                config_source: Some("spec".to_string()),
                ..CliOverrides::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfigSource(_)));
    }

    #[test]
    fn bool_forms() {
        for t in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(t), Some(true));
        }
        for f in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(f), Some(false));
        }
        assert_eq!(parse_bool("yes"), None);
    }
}
