//! The KubeVirt `VirtualMachine` resource
//!
//! Typed envelope around an untyped `spec` body. Unknown top-level fields are
//! preserved so the working copy can be diffed against the original without
//! loss.

use crate::error::{kind_of, ResourceError};
use crate::metadata::{ConfigSource, Directives, ObjectMeta};
use crate::tree;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace used when the resource carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// A KubeVirt VirtualMachine as seen by the mutator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// API version (e.g. `kubevirt.io/v1`)
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind (e.g. `VirtualMachine`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Body, always an object after decoding
    #[serde(default = "empty_object")]
    pub spec: Value,

    /// Remaining top-level fields
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl VirtualMachine {
    /// Decode from raw JSON bytes
    ///
    /// # Errors
    /// Returns error if the payload is not a JSON object or `spec` is not an
    /// object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ResourceError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode from an already parsed JSON value
    ///
    /// # Errors
    /// Same conditions as [`VirtualMachine::from_slice`].
    pub fn from_value(value: Value) -> Result<Self, ResourceError> {
        let Value::Object(ref fields) = value else {
            return Err(ResourceError::NotAnObject(kind_of(&value)));
        };
        if let Some(spec) = fields.get("spec") {
            if !spec.is_object() {
                return Err(ResourceError::expected_object(&["spec"], spec));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode back to a JSON value
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_value(&self) -> Result<Value, ResourceError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Object name, empty when unset
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Object namespace, [`DEFAULT_NAMESPACE`] when unset or empty
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self.metadata.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => DEFAULT_NAMESPACE,
        }
    }

    /// Directive map for the given source
    #[inline]
    #[must_use]
    pub fn directives(&self, source: ConfigSource) -> Option<&Directives> {
        self.metadata.map(source)
    }

    /// Whether `spec.template` is present and non-null
    #[must_use]
    pub fn has_template(&self) -> bool {
        tree::get_path(&self.spec, &["template"]).is_some_and(|t| !t.is_null())
    }

    /// Volumes under `spec.template.spec.volumes`, in declaration order
    #[must_use]
    pub fn volumes(&self) -> &[Value] {
        tree::get_path(&self.spec, &["template", "spec", "volumes"])
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }
}
