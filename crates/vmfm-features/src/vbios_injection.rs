//! vBIOS injection
//!
//! Mounts a ConfigMap holding a ROM image and registers the KubeVirt hook
//! sidecar that rewrites the domain XML to use it.

use crate::config::VbiosInjectionConfig;
use crate::feature::{Feature, FeatureError, MutationResult};
use crate::keys::{
    applied_key, HOOK_SIDECARS_ANNOTATION, SIDECAR_HOOK_TYPE, SIDECAR_HOOK_VERSION,
    SIDECAR_IMAGE_ANNOTATION, VBIOS_INJECTION, VBIOS_VOLUME_NAME,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use vmfm_resource::{directive_key, names, tree, ConfigSource, VirtualMachine};

/// Kubernetes object names are DNS subdomains of at most this length
pub const MAX_CONFIGMAP_NAME_LEN: usize = names::MAX_SUBDOMAIN_LEN;

static IMAGE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._/-]+:[a-zA-Z0-9._-]+$").expect("image reference regex is valid")
});

/// One entry of the `hooks.kubevirt.io/hookSidecars` annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSidecar {
    /// Sidecar image
    pub image: String,
    /// Pull policy
    pub image_pull_policy: String,
    /// Sidecar arguments
    pub args: Vec<String>,
}

impl HookSidecar {
    /// Domain-definition hook for `image`
    #[must_use]
    pub fn on_define_domain(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            image_pull_policy: "IfNotPresent".to_string(),
            args: vec![
                "--version".to_string(),
                SIDECAR_HOOK_VERSION.to_string(),
                "--hook-type".to_string(),
                SIDECAR_HOOK_TYPE.to_string(),
            ],
        }
    }
}

/// `vm-feature-manager.io/vbios-injection`
#[derive(Debug, Clone)]
pub struct VbiosInjection {
    config: VbiosInjectionConfig,
    source: ConfigSource,
    key: String,
}

impl VbiosInjection {
    /// Create rule reading from `source`
    #[must_use]
    pub fn new(config: VbiosInjectionConfig, source: ConfigSource) -> Self {
        Self {
            config,
            source,
            key: directive_key(VBIOS_INJECTION),
        }
    }

    /// Per-VM sidecar image override (annotations only)
    fn image_override(vm: &VirtualMachine) -> Option<&str> {
        vm.metadata
            .annotation(SIDECAR_IMAGE_ANNOTATION)
            .filter(|image| !image.is_empty())
    }

    fn sidecar_image<'a>(&'a self, vm: &'a VirtualMachine) -> &'a str {
        Self::image_override(vm).unwrap_or(&self.config.sidecar_image)
    }
}

impl Feature for VbiosInjection {
    fn name(&self) -> &'static str {
        VBIOS_INJECTION
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
        let Some(name) = self.directive_value(vm) else {
            return Ok(());
        };
        if name.is_empty() {
            return Err(FeatureError::invalid(format!(
                "empty ConfigMap name in {} configuration key",
                self.key
            )));
        }
        if name.len() > MAX_CONFIGMAP_NAME_LEN {
            return Err(FeatureError::invalid(format!(
                "ConfigMap name too long (max {MAX_CONFIGMAP_NAME_LEN} characters): {name}"
            )));
        }
        if !names::is_dns_subdomain(name) {
            return Err(FeatureError::invalid(format!(
                "invalid ConfigMap name format: {name} (must be a valid DNS subdomain)"
            )));
        }
        if let Some(image) = Self::image_override(vm) {
            if !IMAGE_REF.is_match(image) {
                return Err(FeatureError::invalid(format!(
                    "invalid sidecar image reference: {image}"
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError> {
        if !vm.has_template() {
            return Err(FeatureError::MissingTemplate);
        }
        let Some(config_map) = self.directive_value(vm).map(str::to_string) else {
            return Ok(MutationResult::unchanged());
        };
        let image = self.sidecar_image(vm).to_string();

        let volumes = tree::ensure_array(&mut vm.spec, &["template", "spec", "volumes"])?;
        let volume_added = if volumes
            .iter()
            .any(|v| v.get("name").and_then(Value::as_str) == Some(VBIOS_VOLUME_NAME))
        {
            false
        } else {
            volumes.push(json!({
                "name": VBIOS_VOLUME_NAME,
                "configMap": {"name": config_map},
            }));
            true
        };

        let annotations = tree::ensure_object(&mut vm.spec, &["template", "metadata", "annotations"])?;
        let hook_present = annotations
            .get(HOOK_SIDECARS_ANNOTATION)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        let hook_added = if hook_present {
            false
        } else {
            let hooks = serde_json::to_string(&[HookSidecar::on_define_domain(image.as_str())])
                .map_err(|source| FeatureError::Encode {
                    what: "hook sidecar configuration",
                    source,
                })?;
            annotations.insert(HOOK_SIDECARS_ANNOTATION.to_string(), Value::String(hooks));
            true
        };

        if !volume_added && !hook_added {
            return Ok(MutationResult::unchanged());
        }

        tracing::info!(vm = vm.name(), config_map = %config_map, image = %image, "vBIOS injection applied");
        Ok(MutationResult::applied()
            .with_message(format!("Configured vBIOS injection with ConfigMap {config_map}"))
            .with_annotation(applied_key(VBIOS_INJECTION), config_map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::DEFAULT_SIDECAR_IMAGE;
    use crate::testing::vm_with_annotations;
    use pretty_assertions::assert_eq;

    const KEY: &str = "vm-feature-manager.io/vbios-injection";

    fn rule() -> VbiosInjection {
        VbiosInjection::new(VbiosInjectionConfig::default(), ConfigSource::Annotations)
    }

    fn template() -> Value {
        json!({"template": {"spec": {"volumes": [{"name": "root", "containerDisk": {"image": "os"}}]}}})
    }

    #[test]
    fn validate_configmap_names() {
        assert!(rule().validate(&vm_with_annotations(&[(KEY, "gpu-rom.v1")], template())).is_ok());

        let long = "a".repeat(254);
        let cases = [
            ("Bad_Name", "invalid ConfigMap name format: Bad_Name"),
            ("-lead", "must be a valid DNS subdomain"),
            (long.as_str(), "ConfigMap name too long (max 253 characters)"),
        ];
        for (name, expected) in cases {
            let err = rule()
                .validate(&vm_with_annotations(&[(KEY, name)], template()))
                .unwrap_err()
                .to_string();
            assert!(err.contains(expected), "{name}: {err}");
        }
    }

    #[test]
    fn validate_sidecar_image() {
        let good = vm_with_annotations(
            &[(KEY, "rom"), (SIDECAR_IMAGE_ANNOTATION, "quay.io/me/shim:v2")],
            template(),
        );
        assert!(rule().validate(&good).is_ok());

        let bad = vm_with_annotations(
            &[(KEY, "rom"), (SIDECAR_IMAGE_ANNOTATION, "no-tag")],
            template(),
        );
        assert_eq!(
            rule().validate(&bad).unwrap_err().to_string(),
            "invalid sidecar image reference: no-tag"
        );
    }

    #[test]
    fn apply_adds_volume_and_hook() {
        let mut vm = vm_with_annotations(&[(KEY, "gpu-rom")], template());
        let result = rule().apply(&mut vm).unwrap();

        assert!(result.applied);
        assert_eq!(
            result.annotations.get("vm-feature-manager.io/vbios-injection-applied").map(String::as_str),
            Some("gpu-rom")
        );
        assert_eq!(
            tree::get_path(&vm.spec, &["template", "spec", "volumes"]),
            Some(&json!([
                {"name": "root", "containerDisk": {"image": "os"}},
                {"name": "vbios-rom", "configMap": {"name": "gpu-rom"}}
            ]))
        );

        let hook = tree::get_path(&vm.spec, &["template", "metadata", "annotations", HOOK_SIDECARS_ANNOTATION])
            .and_then(Value::as_str)
            .unwrap();
        let parsed: Value = serde_json::from_str(hook).unwrap();
        assert_eq!(
            parsed,
            json!([{
                "image": DEFAULT_SIDECAR_IMAGE,
                "imagePullPolicy": "IfNotPresent",
                "args": ["--version", "v1alpha2", "--hook-type", "onDefineDomain"]
            }])
        );
    }

    #[test]
    fn apply_uses_override_image() {
        let mut vm = vm_with_annotations(
            &[(KEY, "rom"), (SIDECAR_IMAGE_ANNOTATION, "quay.io/me/shim:v2")],
            template(),
        );
        rule().apply(&mut vm).unwrap();

        let hook = tree::get_path(&vm.spec, &["template", "metadata", "annotations", HOOK_SIDECARS_ANNOTATION])
            .and_then(Value::as_str)
            .unwrap();
        assert!(hook.contains("quay.io/me/shim:v2"));
    }

    #[test]
    fn apply_keeps_existing_hook() {
        let mut vm = vm_with_annotations(
            &[(KEY, "rom")],
            json!({"template": {"metadata": {"annotations": {"hooks.kubevirt.io/hookSidecars": "[custom]"}}, "spec": {}}}),
        );
        let result = rule().apply(&mut vm).unwrap();

        assert!(result.applied);
        assert_eq!(
            tree::get_path(&vm.spec, &["template", "metadata", "annotations", HOOK_SIDECARS_ANNOTATION]),
            Some(&json!("[custom]"))
        );
    }

    #[test]
    fn apply_requires_template() {
        let mut vm = vm_with_annotations(&[(KEY, "rom")], json!({}));
        assert!(matches!(rule().apply(&mut vm), Err(FeatureError::MissingTemplate)));
    }

    #[test]
    fn apply_is_idempotent() {
        let mut vm = vm_with_annotations(&[(KEY, "rom")], template());
        assert!(rule().apply(&mut vm).unwrap().applied);
        let snapshot = vm.clone();

        assert!(!rule().apply(&mut vm).unwrap().applied);
        assert_eq!(vm, snapshot);
    }
}
