//! Error types for the resource model
//!
//! Covers decoding of incoming objects and structural navigation of the
//! resource body.

/// Errors while decoding or navigating a [`VirtualMachine`](crate::VirtualMachine)
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Payload is not valid JSON or does not match the resource shape
    #[error("failed to decode resource: {0}")]
    Decode(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object
    #[error("resource must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field that must hold an object holds something else
    #[error("expected object at '{path}', found {found}")]
    ExpectedObject { path: String, found: &'static str },

    /// A field that must hold an array holds something else
    #[error("expected array at '{path}', found {found}")]
    ExpectedArray { path: String, found: &'static str },
}

impl ResourceError {
    /// Create expected-object error for a dotted path
    pub fn expected_object(path: &[&str], found: &serde_json::Value) -> Self {
        Self::ExpectedObject {
            path: path.join("."),
            found: kind_of(found),
        }
    }

    /// Create expected-array error for a dotted path
    pub fn expected_array(path: &[&str], found: &serde_json::Value) -> Self {
        Self::ExpectedArray {
            path: path.join("."),
            found: kind_of(found),
        }
    }
}

/// Human-readable JSON kind, used in error messages
#[must_use]
pub fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Errors while building or serializing a patch
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A patch value could not be converted to JSON
    #[error("failed to encode patch value for '{path}': {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The operation list could not be serialized
    #[error("failed to serialize patch: {0}")]
    Serialize(#[source] serde_json::Error),
}
