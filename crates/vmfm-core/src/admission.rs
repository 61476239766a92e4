//! Kubernetes `AdmissionReview` envelope (admission.k8s.io/v1)
//!
//! Only the fields the mutator reads or writes are modelled; everything else
//! in an incoming request is ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// `apiVersion` of every review this webhook returns
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// `kind` of every review this webhook returns
pub const ADMISSION_KIND: &str = "AdmissionReview";

/// Patch type for RFC 6902 patches
pub const JSON_PATCH: &str = "JSONPatch";

/// Review envelope, used for both directions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// API version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Inbound request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,

    /// Outbound response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

impl AdmissionReview {
    /// Decode from raw bytes
    ///
    /// # Errors
    /// Returns error if the bytes are not a JSON review.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Wrap a response in a v1 review
    #[must_use]
    pub fn from_response(response: AdmissionResponse) -> Self {
        Self {
            api_version: Some(ADMISSION_API_VERSION.to_string()),
            kind: Some(ADMISSION_KIND.to_string()),
            request: None,
            response: Some(response),
        }
    }
}

/// Admission operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Object creation
    Create,
    /// Object update
    Update,
    /// Object deletion
    Delete,
    /// Subresource connect
    Connect,
    /// Anything else
    #[default]
    #[serde(other)]
    Unknown,
}

impl Operation {
    /// Whether the mutator acts on this operation
    #[inline]
    #[must_use]
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Inbound request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Request identifier, echoed in the response
    #[serde(default)]
    pub uid: String,

    /// Operation
    #[serde(default)]
    pub operation: Operation,

    /// Namespace of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Object being admitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,

    /// Dry run flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

/// `status` block of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// HTTP-style code, omitted for allowed responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Outbound response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Echoed request uid
    pub uid: String,

    /// Admission decision
    pub allowed: bool,

    /// Base64-encoded JSON Patch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Always `JSONPatch` when a patch is present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,

    /// Outcome message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl AdmissionResponse {
    /// Allowed, no patch
    #[must_use]
    pub fn allow(uid: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            uid: uid.into(),
            allowed: true,
            patch: None,
            patch_type: None,
            status: (!message.is_empty()).then_some(Status {
                code: None,
                message,
            }),
        }
    }

    /// Allowed with an already serialized patch
    #[must_use]
    pub fn allow_with_patch(uid: impl Into<String>, patch: &[u8], message: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: true,
            patch: Some(STANDARD.encode(patch)),
            patch_type: Some(JSON_PATCH.to_string()),
            status: message.map(|message| Status {
                code: None,
                message,
            }),
        }
    }

    /// Denied with code and message
    #[must_use]
    pub fn deny(uid: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            allowed: false,
            patch: None,
            patch_type: None,
            status: Some(Status {
                code: Some(code),
                message: message.into(),
            }),
        }
    }

    /// Status message, empty if none
    #[must_use]
    pub fn message(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.message.as_str())
    }

    /// Status code, if any
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        self.status.as_ref().and_then(|s| s.code)
    }

    /// Decoded patch bytes
    ///
    /// # Errors
    /// Returns error if the stored patch is not valid base64.
    pub fn decoded_patch(&self) -> Result<Option<Vec<u8>>, base64::DecodeError> {
        self.patch.as_deref().map(|p| STANDARD.decode(p)).transpose()
    }
}
