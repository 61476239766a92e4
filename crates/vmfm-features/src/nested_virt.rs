//! Nested virtualization
//!
//! Requires the host's hardware virtualization flag on the guest CPU so the
//! VM can itself run hypervisors.

use crate::config::NestedVirtConfig;
use crate::feature::{Feature, FeatureError, MutationResult};
use crate::keys::{applied_key, is_negative, is_truthy, NESTED_VIRT};
use serde_json::{json, Value};
use vmfm_resource::{directive_key, tree, ConfigSource, VirtualMachine};

const CPU_FEATURES_PATH: [&str; 5] = ["template", "spec", "domain", "cpu", "features"];

/// `vm-feature-manager.io/nested-virt`
#[derive(Debug, Clone)]
pub struct NestedVirt {
    config: NestedVirtConfig,
    source: ConfigSource,
    key: String,
}

impl NestedVirt {
    /// Create rule reading from `source`
    #[must_use]
    pub fn new(config: NestedVirtConfig, source: ConfigSource) -> Self {
        Self {
            config,
            source,
            key: directive_key(NESTED_VIRT),
        }
    }
}

impl Feature for NestedVirt {
    fn name(&self) -> &'static str {
        NESTED_VIRT
    }

    fn directive_key(&self) -> &str {
        &self.key
    }

    fn source(&self) -> ConfigSource {
        self.source
    }

    fn is_enabled(&self, vm: &VirtualMachine) -> bool {
        self.config.enabled
            && self
                .directive_value(vm)
                .is_some_and(|v| !v.trim().is_empty() && !is_negative(v))
    }

    fn validate(&self, vm: &VirtualMachine) -> Result<(), FeatureError> {
        match self.directive_value(vm) {
            None => Ok(()),
            Some(value) if is_truthy(value) => Ok(()),
            Some(value) => Err(FeatureError::invalid(format!(
                "invalid value for {}: {value} (expected 'enabled')",
                self.key
            ))),
        }
    }

    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError> {
        let cpu_feature = self.config.cpu_feature.as_str();
        let features = tree::ensure_array(&mut vm.spec, &CPU_FEATURES_PATH)?;

        let present = features
            .iter()
            .any(|f| f.get("name").and_then(Value::as_str) == Some(cpu_feature));
        if present {
            return Ok(MutationResult::unchanged());
        }

        features.push(json!({"name": cpu_feature, "policy": "require"}));
        tracing::info!(vm = vm.name(), cpu_feature, "nested virtualization applied");

        Ok(MutationResult::applied()
            .with_annotation(applied_key(NESTED_VIRT), "true")
            .with_message(format!(
                "Enabled nested virtualization with {cpu_feature} CPU feature"
            )))
    }
}
