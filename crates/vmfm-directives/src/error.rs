//! Error types for directive extraction
//!
//! Provides error handling for:
//! - Secret lookups (external capability)
//! - Resolving a single user-data location to text
//! - Parsing directive formats out of that text
//!
//! None of these abort a request. The extractor logs them and moves on.

/// Errors reported by a [`SecretLookup`](crate::SecretLookup) backend
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// Backend could not be reached or answered with an error
    #[error("secret {namespace}/{name} lookup failed: {message}")]
    Backend {
        namespace: String,
        name: String,
        message: String,
    },

    /// Backend answered but the payload was unusable
    #[error("secret {namespace}/{name} has malformed data: {message}")]
    Malformed {
        namespace: String,
        name: String,
        message: String,
    },

    /// Caller is not authorized to read the secret
    #[error("access to secret {namespace}/{name} denied")]
    Forbidden { namespace: String, name: String },

    /// Namespace or name is not a valid Kubernetes object name
    #[error("invalid secret reference {namespace}/{name}")]
    InvalidReference { namespace: String, name: String },
}

impl LookupError {
    /// Create backend error
    pub fn backend(namespace: &str, name: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Create invalid-reference error
    pub fn invalid_reference(namespace: &str, name: &str) -> Self {
        Self::InvalidReference {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Create malformed-data error
    pub fn malformed(namespace: &str, name: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Errors while resolving one user-data location
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// `userDataBase64` is not valid standard base64
    #[error("invalid base64 user data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not UTF-8
    #[error("user data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Lookup backend failed
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Referenced secret does not exist
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    /// Secret exists but has none of the well-known user-data keys
    #[error("no user data in secret {namespace}/{name} (tried keys: {tried})")]
    NoUserDataKey {
        namespace: String,
        name: String,
        tried: String,
    },

    /// Request deadline passed before the lookup completed
    #[error("deadline exceeded while fetching secret {namespace}/{name}")]
    DeadlineExceeded { namespace: String, name: String },
}

/// Errors from a single directive parser
#[derive(Debug, thiserror::Error)]
pub enum DirectiveParseError {
    /// Cloud-config body is not valid YAML
    #[error("invalid cloud-config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Feature block exists but is not a mapping
    #[error("'{field}' must be a mapping, found {found}")]
    NotAMapping {
        field: &'static str,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_error_display() {
        let err = LookupError::backend("ns", "s", "connection refused");
        assert_eq!(
            err.to_string(),
            "secret ns/s lookup failed: connection refused"
        );
    }

    #[test]
    fn extract_error_wraps_lookup_transparently() {
        let err: ExtractError = LookupError::backend("ns", "s", "boom").into();
        assert_eq!(err.to_string(), "secret ns/s lookup failed: boom");
    }

    #[test]
    fn no_user_data_key_display() {
        let err = ExtractError::NoUserDataKey {
            namespace: "default".to_string(),
            name: "cfg".to_string(),
            tried: "userdata, userData, user-data".to_string(),
        };
        assert!(err.to_string().contains("tried keys: userdata, userData, user-data"));
    }
}
