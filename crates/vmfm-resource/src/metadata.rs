//! Object metadata and directive namespaces
//!
//! Annotations and labels are two independent string maps. One of them is
//! chosen by configuration as the *primary* source of feature directives.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Domain shared by every directive key
pub const DIRECTIVE_DOMAIN: &str = "vm-feature-manager.io";

/// Ordered string map used for annotations, labels and directive sets
///
/// Ordering keeps serialized output byte-stable across runs.
pub type Directives = BTreeMap<String, String>;

/// Build a fully-qualified directive key from a feature name
///
/// `nested-virt` → `vm-feature-manager.io/nested-virt`
#[inline]
#[must_use]
pub fn directive_key(feature: &str) -> String {
    format!("{DIRECTIVE_DOMAIN}/{feature}")
}

/// Where feature directives are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// `metadata.annotations`
    #[default]
    Annotations,
    /// `metadata.labels`
    Labels,
}

impl ConfigSource {
    /// Field name under `metadata`
    #[inline]
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Annotations => "annotations",
            Self::Labels => "labels",
        }
    }

    /// Parse leniently, falling back to annotations
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl Display for ConfigSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Error for unknown config source strings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid config source '{0}' (expected 'annotations' or 'labels')")]
pub struct InvalidConfigSource(pub String);

impl FromStr for ConfigSource {
    type Err = InvalidConfigSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annotations" => Ok(Self::Annotations),
            "labels" => Ok(Self::Labels),
            _ => Err(InvalidConfigSource(s.to_string())),
        }
    }
}

/// Kubernetes object metadata
///
/// Only the fields the mutator reads are typed; everything else round-trips
/// through `other` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Object namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Directives>,

    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Directives>,

    /// Remaining metadata fields
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ObjectMeta {
    /// Map for the given source, if present
    #[inline]
    #[must_use]
    pub fn map(&self, source: ConfigSource) -> Option<&Directives> {
        match source {
            ConfigSource::Annotations => self.annotations.as_ref(),
            ConfigSource::Labels => self.labels.as_ref(),
        }
    }

    /// Mutable map for the given source, created empty when missing
    pub fn map_mut(&mut self, source: ConfigSource) -> &mut Directives {
        let slot = match source {
            ConfigSource::Annotations => &mut self.annotations,
            ConfigSource::Labels => &mut self.labels,
        };
        slot.get_or_insert_with(BTreeMap::new)
    }

    /// Look up a directive value in the given source
    #[inline]
    #[must_use]
    pub fn directive(&self, source: ConfigSource, key: &str) -> Option<&str> {
        self.map(source)?.get(key).map(String::as_str)
    }

    /// Look up an annotation regardless of configured source
    #[inline]
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.directive(ConfigSource::Annotations, key)
    }

    /// Remove a directive, returning its previous value
    pub fn remove_directive(&mut self, source: ConfigSource, key: &str) -> Option<String> {
        let slot = match source {
            ConfigSource::Annotations => &mut self.annotations,
            ConfigSource::Labels => &mut self.labels,
        };
        slot.as_mut()?.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_key_uses_domain() {
        assert_eq!(directive_key("nested-virt"), "vm-feature-manager.io/nested-virt");
    }

    #[test]
    fn config_source_parse() {
        assert_eq!("labels".parse::<ConfigSource>(), Ok(ConfigSource::Labels));
        assert_eq!(" Annotations ".parse::<ConfigSource>(), Ok(ConfigSource::Annotations));
        assert!("spec".parse::<ConfigSource>().is_err());
        assert_eq!(ConfigSource::parse_or_default("bogus"), ConfigSource::Annotations);
    }

    #[test]
    fn map_mut_initializes_missing_namespace() {
        let mut meta = ObjectMeta::default();
        assert!(meta.labels.is_none());

        meta.map_mut(ConfigSource::Labels)
            .insert("a".to_string(), "b".to_string());

        assert_eq!(meta.directive(ConfigSource::Labels, "a"), Some("b"));
        assert_eq!(meta.directive(ConfigSource::Annotations, "a"), None);
    }

    #[test]
    fn remove_directive_only_touches_source() {
        let mut meta = ObjectMeta::default();
        meta.map_mut(ConfigSource::Annotations)
            .insert("k".to_string(), "v".to_string());
        meta.map_mut(ConfigSource::Labels)
            .insert("k".to_string(), "v".to_string());

        assert_eq!(
            meta.remove_directive(ConfigSource::Labels, "k"),
            Some("v".to_string())
        );
        assert_eq!(meta.annotation("k"), Some("v"));
        assert_eq!(meta.remove_directive(ConfigSource::Labels, "k"), None);
    }

    #[test]
    fn unknown_metadata_fields_round_trip() {
        let raw = serde_json::json!({
            "name": "vm",
            "uid": "1234",
            "resourceVersion": "7"
        });
        let meta: ObjectMeta = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.name.as_deref(), Some("vm"));
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }
}
