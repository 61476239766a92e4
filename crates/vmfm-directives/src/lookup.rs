//! Secret lookup capability
//!
//! The extractor never talks to the cluster directly. It is handed a
//! [`SecretLookup`] implementation, shared behind an `Arc`.

use crate::error::LookupError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Decoded secret payload: key → raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Read access to namespaced secrets
///
/// Implementations must be safe for concurrent use. `Ok(None)` means the
/// secret does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretLookup: Send + Sync {
    /// Fetch secret `name` in `namespace`
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, LookupError>;
}

/// In-memory lookup backed by a fixed map
///
/// Used when no cluster is reachable and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretLookup {
    secrets: BTreeMap<(String, String), SecretData>,
}

impl StaticSecretLookup {
    /// Create empty lookup (every secret is missing)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single key to a secret, creating the secret if needed
    #[must_use]
    pub fn with_entry(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.secrets
            .entry((namespace.into(), name.into()))
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// Number of stored secrets
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Check if no secrets are stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl SecretLookup for StaticSecretLookup {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, LookupError> {
        Ok(self
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lookup_is_namespaced() {
        let lookup = StaticSecretLookup::new().with_entry("tenant", "cfg", "userdata", "hello");

        let hit = lookup.get("tenant", "cfg").await.unwrap().unwrap();
        assert_eq!(hit.get("userdata").map(Vec::as_slice), Some(&b"hello"[..]));

        assert!(lookup.get("default", "cfg").await.unwrap().is_none());
        assert_eq!(lookup.len(), 1);
    }

    #[tokio::test]
    async fn static_lookup_merges_keys() {
        let lookup = StaticSecretLookup::new()
            .with_entry("ns", "s", "a", "1")
            .with_entry("ns", "s", "b", "2");

        let data = lookup.get("ns", "s").await.unwrap().unwrap();
        assert_eq!(data.len(), 2);
    }
}
