//! GPU device plugin
//!
//! Requests one unit of an extended resource (e.g. `nvidia.com/gpu`) so the
//! scheduler places the VM on a node exposing that device plugin.

use crate::config::GpuDevicePluginConfig;
use crate::feature::{Feature, FeatureError, MutationResult};
use crate::keys::{applied_key, GPU_DEVICE_PLUGIN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use vmfm_resource::{directive_key, tree, ConfigSource, VirtualMachine};

const LIMITS_PATH: [&str; 5] = ["template", "spec", "domain", "resources", "limits"];

static RESOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)+/[a-z0-9]([-a-z0-9]*[a-z0-9])?$",
    )
    .expect("extended resource regex is valid")
});

/// `vm-feature-manager.io/gpu-device-plugin`
#[derive(Debug, Clone)]
pub struct GpuDevicePlugin {
    config: GpuDevicePluginConfig,
    source: ConfigSource,
    key: String,
}

impl GpuDevicePlugin {
    /// Create rule reading from `source`
    #[must_use]
    pub fn new(config: GpuDevicePluginConfig, source: ConfigSource) -> Self {
        Self {
            config,
            source,
            key: directive_key(GPU_DEVICE_PLUGIN),
        }
    }

    fn is_allowed(&self, plugin: &str) -> bool {
        self.config.allowed_plugins.is_empty()
            || self.config.allowed_plugins.iter().any(|p| p == plugin)
    }
}

impl Feature for GpuDevicePlugin {
    fn name(&self) -> &'static str {
        GPU_DEVICE_PLUGIN
    }

    fn directive_key(&self) -> &str {
        &self.key
    }

    fn source(&self) -> ConfigSource {
        self.source
    }

    fn is_enabled(&self, vm: &VirtualMachine) -> bool {
        self.config.enabled && self.directive_value(vm).is_some_and(|v| !v.is_empty())
    }

    fn validate(&self, vm: &VirtualMachine) -> Result<(), FeatureError> {
        let Some(plugin) = self.directive_value(vm) else {
            return Ok(());
        };
        if plugin.is_empty() {
            return Err(FeatureError::invalid("GPU device plugin name cannot be empty"));
        }
        if !RESOURCE_NAME.is_match(plugin) {
            return Err(FeatureError::invalid(format!(
                "invalid device plugin name {plugin:?}: must be in format 'domain/resource' (e.g., nvidia.com/gpu)"
            )));
        }
        if !self.is_allowed(plugin) {
            return Err(FeatureError::invalid(format!(
                "device plugin {plugin:?} is not allowed (allowed: {})",
                self.config.allowed_plugins.join(", ")
            )));
        }
        Ok(())
    }

    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError> {
        if !vm.has_template() {
            return Err(FeatureError::MissingTemplate);
        }
        let Some(plugin) = self.directive_value(vm).map(str::to_string) else {
            return Ok(MutationResult::unchanged());
        };

        let limits = tree::ensure_object(&mut vm.spec, &LIMITS_PATH)?;
        if limits.contains_key(&plugin) {
            return Ok(MutationResult::unchanged());
        }
        limits.insert(plugin.clone(), Value::String("1".to_string()));

        tracing::info!(vm = vm.name(), plugin = %plugin, "GPU device plugin applied");
        Ok(MutationResult::applied()
            .with_message(format!("Requested 1 {plugin}"))
            .with_annotation(applied_key(GPU_DEVICE_PLUGIN), plugin))
    }
}
