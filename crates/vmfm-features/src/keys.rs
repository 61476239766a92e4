//! Directive keys and well-known names
//!
//! All feature directives live under the `vm-feature-manager.io/` domain.

use vmfm_resource::directive_key;

/// Nested virtualization feature name
pub const NESTED_VIRT: &str = "nested-virt";
/// PCI passthrough feature name
pub const PCI_PASSTHROUGH: &str = "pci-passthrough";
/// vBIOS injection feature name
pub const VBIOS_INJECTION: &str = "vbios-injection";
/// GPU device plugin feature name
pub const GPU_DEVICE_PLUGIN: &str = "gpu-device-plugin";

/// Sidecar image override, always read from annotations
pub const SIDECAR_IMAGE_ANNOTATION: &str = "vm-feature-manager.io/sidecar-image";

/// KubeVirt hook sidecar annotation on the VMI template
pub const HOOK_SIDECARS_ANNOTATION: &str = "hooks.kubevirt.io/hookSidecars";

/// Default hook sidecar image
pub const DEFAULT_SIDECAR_IMAGE: &str = "registry.k8s.io/kubevirt/sidecar-shim:v1.4.0";

/// Hook sidecar API version
pub const SIDECAR_HOOK_VERSION: &str = "v1alpha2";

/// Hook sidecar hook type
pub const SIDECAR_HOOK_TYPE: &str = "onDefineDomain";

/// Volume carrying the ROM ConfigMap
pub const VBIOS_VOLUME_NAME: &str = "vbios-rom";

/// Suffix appended to a feature name for its tracking key
pub const APPLIED_SUFFIX: &str = "-applied";

/// Tracking key for a feature (`<domain>/<feature>-applied`)
#[must_use]
pub fn applied_key(feature: &str) -> String {
    directive_key(&format!("{feature}{APPLIED_SUFFIX}"))
}

/// `true`, `enabled`, `yes`, `1` (case-insensitive)
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "enabled" | "yes" | "1"
    )
}

/// `false`, `disabled`, `no`, `0` (case-insensitive)
#[must_use]
pub fn is_negative(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "disabled" | "no" | "0"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_keys() {
        assert_eq!(
            applied_key(NESTED_VIRT),
            "vm-feature-manager.io/nested-virt-applied"
        );
    }

    #[test]
    fn truthiness() {
        for v in ["true", "Enabled", "YES", "1", " enabled "] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["false", "maybe", "", "2"] {
            assert!(!is_truthy(v), "{v}");
        }
        for v in ["false", "Disabled", "no", "0"] {
            assert!(is_negative(v), "{v}");
        }
        assert!(!is_negative("maybe"));
    }
}
