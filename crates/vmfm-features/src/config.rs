//! Per-feature configuration
//!
//! Every rule can be switched off globally. Missing fields in a config file
//! fall back to the defaults below.

use crate::keys::DEFAULT_SIDECAR_IMAGE;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Configuration for all built-in rules
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// nested-virt
    pub nested_virt: NestedVirtConfig,
    /// pci-passthrough
    pub pci_passthrough: PciPassthroughConfig,
    /// vbios-injection
    pub vbios_injection: VbiosInjectionConfig,
    /// gpu-device-plugin
    pub gpu_device_plugin: GpuDevicePluginConfig,
}

/// CPU flag exposing hardware virtualization to the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuFeature {
    /// AMD
    #[default]
    Svm,
    /// Intel
    Vmx,
}

impl CpuFeature {
    /// KubeVirt CPU feature name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svm => "svm",
            Self::Vmx => "vmx",
        }
    }
}

impl Display for CpuFeature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CpuFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svm" => Ok(Self::Svm),
            "vmx" => Ok(Self::Vmx),
            other => Err(format!("unknown CPU feature '{other}' (expected svm or vmx)")),
        }
    }
}

/// nested-virt settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestedVirtConfig {
    /// Rule is active
    pub enabled: bool,
    /// CPU flag to require
    pub cpu_feature: CpuFeature,
}

impl Default for NestedVirtConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_feature: CpuFeature::Svm,
        }
    }
}

/// pci-passthrough settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PciPassthroughConfig {
    /// Rule is active
    pub enabled: bool,
    /// Maximum devices per VM
    pub max_devices: usize,
}

impl Default for PciPassthroughConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_devices: 8,
        }
    }
}

/// vbios-injection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VbiosInjectionConfig {
    /// Rule is active
    pub enabled: bool,
    /// Sidecar image used when the VM does not override it
    pub sidecar_image: String,
}

impl Default for VbiosInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sidecar_image: DEFAULT_SIDECAR_IMAGE.to_string(),
        }
    }
}

/// gpu-device-plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuDevicePluginConfig {
    /// Rule is active
    pub enabled: bool,
    /// Permitted resource names; empty permits any
    pub allowed_plugins: Vec<String>,
}

impl Default for GpuDevicePluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_plugins: Vec::new(),
        }
    }
}
