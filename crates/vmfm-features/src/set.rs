//! Ordered feature set
//!
//! Provides [`FeatureSet`], the immutable list of rules shared by every
//! request. Registration order is application order.

use crate::config::FeaturesConfig;
use crate::feature::Feature;
use crate::gpu_device_plugin::GpuDevicePlugin;
use crate::nested_virt::NestedVirt;
use crate::pci_passthrough::PciPassthrough;
use crate::vbios_injection::VbiosInjection;
use vmfm_resource::{ConfigSource, VirtualMachine};

/// Rules in application order
#[derive(Debug, Default)]
pub struct FeatureSet {
    features: Vec<Box<dyn Feature>>,
}

impl FeatureSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// Built-in rules: nested-virt, pci-passthrough, vbios-injection,
    /// gpu-device-plugin
    #[must_use]
    pub fn from_config(config: &FeaturesConfig, source: ConfigSource) -> Self {
        Self::new()
            .with(NestedVirt::new(config.nested_virt.clone(), source))
            .with(PciPassthrough::new(config.pci_passthrough.clone(), source))
            .with(VbiosInjection::new(config.vbios_injection.clone(), source))
            .with(GpuDevicePlugin::new(config.gpu_device_plugin.clone(), source))
    }

    /// Append a rule
    #[must_use]
    pub fn with<F: Feature + 'static>(mut self, feature: F) -> Self {
        self.features.push(Box::new(feature));
        self
    }

    /// Append a boxed rule
    #[must_use]
    pub fn with_boxed(mut self, feature: Box<dyn Feature>) -> Self {
        self.features.push(feature);
        self
    }

    /// Iterate in application order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Feature> {
        self.features.iter().map(|f| &**f)
    }

    /// Rules enabled on `vm`, in application order
    pub fn enabled_for<'a>(&'a self, vm: &'a VirtualMachine) -> impl Iterator<Item = &'a dyn Feature> {
        self.iter().filter(move |f| f.is_enabled(vm))
    }

    /// Rule names in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.name()).collect()
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if no rules are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
