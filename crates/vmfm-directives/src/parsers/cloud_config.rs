//! `#cloud-config` feature block
//!
//! ```yaml
//! #cloud-config
//! x_kubevirt_features:
//!   nested_virt: true
//!   gpu_device_plugin: nvidia.com/gpu
//!   pci_passthrough:
//!     devices: ["0000:00:02.0"]
//! ```
//!
//! Keys have `_` mapped to `-`. Structured values are emitted as compact JSON
//! so rules see the same text a marker line would carry.

use super::{is_valid_feature_name, DirectiveParser, FeatureValues};
use crate::error::DirectiveParseError;
use serde_yaml::Value;

/// Top-level key holding the feature block
pub const FEATURES_FIELD: &str = "x_kubevirt_features";

const HEADER: &str = "#cloud-config";

/// Parser for the `x_kubevirt_features` mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudConfigParser;

impl CloudConfigParser {
    /// Whether the first non-blank line is the cloud-config header
    #[must_use]
    pub fn is_cloud_config(text: &str) -> bool {
        text.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| line == HEADER)
    }
}

impl DirectiveParser for CloudConfigParser {
    fn name(&self) -> &'static str {
        "cloud-config"
    }

    fn parse(&self, text: &str) -> Result<FeatureValues, DirectiveParseError> {
        let mut out = FeatureValues::new();
        if !Self::is_cloud_config(text) {
            return Ok(out);
        }

        let doc: Value = serde_yaml::from_str(text)?;
        let block = match doc.get(FEATURES_FIELD) {
            None | Some(Value::Null) => return Ok(out),
            Some(Value::Mapping(map)) => map,
            Some(other) => {
                return Err(DirectiveParseError::NotAMapping {
                    field: FEATURES_FIELD,
                    found: yaml_kind(other),
                })
            }
        };

        for (key, value) in block {
            let Some(key) = key.as_str() else {
                continue;
            };
            let name = key.trim().replace('_', "-");
            if !is_valid_feature_name(&name) {
                tracing::debug!(key, "ignoring invalid cloud-config feature key");
                continue;
            }
            if let Some(value) = render_value(value) {
                out.insert(name, value);
            }
        }
        Ok(out)
    }
}

/// Flatten a YAML value to directive text; `None` means "not requested"
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("enabled".to_string()),
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value).ok(),
        Value::Tagged(tagged) => render_value(&tagged.value),
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
