//! VMFM Feature Rules
//!
//! Small, independent mutations of a VirtualMachine, each keyed by one
//! `vm-feature-manager.io/<feature>` directive.
//!
//! # Core Concepts
//!
//! - [`Feature`]: Core trait every rule implements (enable, validate, apply)
//! - [`MutationResult`]: What an application changed and how to track it
//! - [`FeatureSet`]: Immutable, ordered rule list shared across requests
//! - [`NestedVirt`]: Guest hardware virtualization
//! - [`PciPassthrough`]: Host PCI devices
//! - [`VbiosInjection`]: ROM ConfigMap plus hook sidecar
//! - [`GpuDevicePlugin`]: Extended resource request
//!
//! # Example
//!
//! ```rust,ignore
//! use vmfm_features::{FeatureSet, FeaturesConfig};
//! use vmfm_resource::ConfigSource;
//!
//! let set = FeatureSet::from_config(&FeaturesConfig::default(), ConfigSource::Annotations);
//! for feature in set.enabled_for(&vm) {
//!     feature.validate(&vm)?;
//!     let result = feature.apply(&mut working)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod feature;
mod gpu_device_plugin;
pub mod keys;
mod nested_virt;
mod pci_passthrough;
mod set;
mod vbios_injection;

// Re-exports
pub use config::{
    CpuFeature, FeaturesConfig, GpuDevicePluginConfig, NestedVirtConfig, PciPassthroughConfig,
    VbiosInjectionConfig,
};
pub use feature::{Feature, FeatureError, MutationResult};
pub use gpu_device_plugin::GpuDevicePlugin;
pub use nested_virt::NestedVirt;
pub use pci_passthrough::{device_name, host_device_name, PciPassthrough};
pub use set::FeatureSet;
pub use vbios_injection::{HookSidecar, VbiosInjection, MAX_CONFIGMAP_NAME_LEN};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::testing::vm_with_annotations;
    use proptest::prelude::*;
    use serde_json::json;
    use vmfm_resource::ConfigSource;

    fn apply_all(set: &FeatureSet, vm: &mut vmfm_resource::VirtualMachine) -> Vec<bool> {
        let snapshot = vm.clone();
        let enabled: Vec<_> = set.enabled_for(&snapshot).collect();
        enabled
            .into_iter()
            .map(|f| {
                f.validate(&snapshot).unwrap();
                f.apply(vm).unwrap().applied
            })
            .collect()
    }

    #[test]
    fn all_rules_together_then_idempotent() {
        let set = FeatureSet::from_config(&FeaturesConfig::default(), ConfigSource::Annotations);
        let mut vm = vm_with_annotations(
            &[
                ("vm-feature-manager.io/nested-virt", "enabled"),
                ("vm-feature-manager.io/pci-passthrough", r#"{"devices":["0000:00:02.0"]}"#),
                ("vm-feature-manager.io/vbios-injection", "gpu-rom"),
                ("vm-feature-manager.io/gpu-device-plugin", "nvidia.com/gpu"),
            ],
            json!({"template": {"spec": {}}}),
        );

        assert_eq!(apply_all(&set, &mut vm), vec![true, true, true, true]);
        let once = vm.clone();
        assert_eq!(apply_all(&set, &mut vm), vec![false, false, false, false]);
        assert_eq!(vm, once);
    }

    proptest! {
        #[test]
        fn gpu_apply_idempotent_for_any_valid_name(
            domain in "[a-z][a-z0-9]{0,8}\\.[a-z]{2,4}",
            resource in "[a-z][a-z0-9-]{0,8}[a-z0-9]",
        ) {
            let plugin = format!("{domain}/{resource}");
            let rule = GpuDevicePlugin::new(GpuDevicePluginConfig::default(), ConfigSource::Annotations);
            let mut vm = vm_with_annotations(
                &[("vm-feature-manager.io/gpu-device-plugin", plugin.as_str())],
                json!({"template": {"spec": {}}}),
            );

            prop_assert!(rule.validate(&vm).is_ok());
            prop_assert!(rule.apply(&mut vm).unwrap().applied);
            let once = vm.clone();
            prop_assert!(!rule.apply(&mut vm).unwrap().applied);
            prop_assert_eq!(vm, once);
        }
    }
}
