//! PCI passthrough
//!
//! Directive value is JSON: `{"devices": ["0000:00:02.0", ...]}`. Each device
//! becomes a host device on the VMI template.

use crate::config::PciPassthroughConfig;
use crate::feature::{Feature, FeatureError, MutationResult};
use crate::keys::{applied_key, PCI_PASSTHROUGH};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use vmfm_resource::{directive_key, tree, ConfigSource, VirtualMachine};

const HOST_DEVICES_PATH: [&str; 5] = ["template", "spec", "domain", "devices", "hostDevices"];

static PCI_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{4}:[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.[0-7]$")
        .expect("PCI address regex is valid")
});

#[derive(Debug, Deserialize)]
struct PciRequest {
    #[serde(default)]
    devices: Vec<String>,
}

/// Host-device `deviceName` for a PCI address (`pci_0000_00_02_0`)
#[must_use]
pub fn device_name(address: &str) -> String {
    format!("pci_{}", address.replace([':', '.'], "_"))
}

/// Host-device `name` for a PCI address (`pci-0000-00-02-0`)
///
/// Derived from the address so re-applying yields the same entry.
#[must_use]
pub fn host_device_name(address: &str) -> String {
    format!("pci-{}", address.to_ascii_lowercase().replace([':', '.'], "-"))
}

/// `vm-feature-manager.io/pci-passthrough`
#[derive(Debug, Clone)]
pub struct PciPassthrough {
    config: PciPassthroughConfig,
    source: ConfigSource,
    key: String,
}

impl PciPassthrough {
    /// Create rule reading from `source`
    #[must_use]
    pub fn new(config: PciPassthroughConfig, source: ConfigSource) -> Self {
        Self {
            config,
            source,
            key: directive_key(PCI_PASSTHROUGH),
        }
    }

    fn parse(&self, value: &str) -> Result<Vec<String>, FeatureError> {
        serde_json::from_str::<PciRequest>(value)
            .map(|req| req.devices)
            .map_err(|err| FeatureError::invalid(format!("invalid JSON in {}: {err}", self.key)))
    }
}

impl Feature for PciPassthrough {
    fn name(&self) -> &'static str {
        PCI_PASSTHROUGH
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
        let Some(value) = self.directive_value(vm) else {
            return Ok(());
        };
        let devices = self.parse(value)?;

        if devices.is_empty() {
            return Err(FeatureError::invalid(format!("no devices specified in {}", self.key)));
        }
        if devices.len() > self.config.max_devices {
            return Err(FeatureError::invalid(format!(
                "too many PCI devices: {} (max {})",
                devices.len(),
                self.config.max_devices
            )));
        }

        let mut seen = HashSet::new();
        for device in &devices {
            if !seen.insert(device.as_str()) {
                return Err(FeatureError::invalid(format!("duplicate PCI device address: {device}")));
            }
            if !PCI_ADDRESS.is_match(device) {
                return Err(FeatureError::invalid(format!(
                    "invalid PCI address format: {device} (expected DDDD:BB:DD.F)"
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError> {
        if !vm.has_template() {
            return Err(FeatureError::MissingTemplate);
        }
        let devices = match self.directive_value(vm) {
            Some(value) => self.parse(value)?,
            None => return Ok(MutationResult::unchanged()),
        };

        let host_devices = tree::ensure_array(&mut vm.spec, &HOST_DEVICES_PATH)?;
        let existing: HashSet<String> = host_devices
            .iter()
            .filter_map(|d| d.get("deviceName").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let mut added = Vec::new();
        for address in &devices {
            let device = device_name(address);
            if existing.contains(&device) {
                tracing::debug!(address = %address, "PCI device already present, skipping");
                continue;
            }
            host_devices.push(json!({
                "name": host_device_name(address),
                "deviceName": device,
            }));
            added.push(address.clone());
        }

        if added.is_empty() {
            return Ok(MutationResult::unchanged());
        }

        let tracking = serde_json::to_string(&added).map_err(|source| FeatureError::Encode {
            what: "added PCI devices",
            source,
        })?;
        tracing::info!(vm = vm.name(), devices = ?added, "PCI passthrough applied");

        Ok(MutationResult::applied()
            .with_annotation(applied_key(PCI_PASSTHROUGH), tracking)
            .with_message(format!("Attached {} PCI device(s)", added.len())))
    }
}
