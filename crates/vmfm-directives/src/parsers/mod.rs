//! Directive parsers for user-data text
//!
//! Two formats are understood:
//! - `#cloud-config` documents with an `x_kubevirt_features` mapping
//! - `# @kubevirt-feature: <key>=<value>` marker lines anywhere in the text
//!
//! Parsers return bare feature names. [`ParserChain`] qualifies them into
//! directive keys and enforces size limits.

use crate::error::DirectiveParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Debug;
use vmfm_resource::{directive_key, Directives};

mod cloud_config;
mod marker;

pub use cloud_config::{CloudConfigParser, FEATURES_FIELD};
pub use marker::MarkerParser;

/// Feature name → raw value, as produced by a single parser
pub type FeatureValues = BTreeMap<String, String>;

static FEATURE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("feature name regex is valid"));

/// Check a bare feature name against `[a-z0-9-]+`
#[inline]
#[must_use]
pub fn is_valid_feature_name(name: &str) -> bool {
    FEATURE_NAME.is_match(name)
}

/// Parser trait for extracting feature values from user-data text
///
/// Implement this trait to add support for new directive formats.
pub trait DirectiveParser: Send + Sync + Debug + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Extract feature values from `text`
    ///
    /// # Errors
    /// Returns error if the format is recognised but malformed. The chain
    /// skips this parser and keeps the others' results.
    fn parse(&self, text: &str) -> Result<FeatureValues, DirectiveParseError>;
}

/// Size bounds applied to every text and value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    /// Texts larger than this contribute nothing
    pub max_text_bytes: usize,
    /// Values larger than this are dropped
    pub max_value_bytes: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_text_bytes: 64 * 1024,
            max_value_bytes: 1024,
        }
    }
}

/// Ordered list of parsers; later parsers win on key collisions
#[derive(Debug)]
pub struct ParserChain {
    parsers: Vec<Box<dyn DirectiveParser>>,
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ParserChain {
    /// Create empty chain
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Cloud-config first, then marker lines
    #[must_use]
    pub fn standard() -> Self {
        let mut chain = Self::empty();
        chain.register(CloudConfigParser);
        chain.register(MarkerParser);
        chain
    }

    /// Append a parser
    pub fn register<P: DirectiveParser>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// Registered parser names, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Run every parser over `text` and merge qualified directives
    #[must_use]
    pub fn parse(&self, text: &str, limits: &ExtractionLimits) -> Directives {
        let mut out = Directives::new();
        if text.len() > limits.max_text_bytes {
            tracing::warn!(
                size = text.len(),
                limit = limits.max_text_bytes,
                "user data too large, ignoring"
            );
            return out;
        }

        for parser in &self.parsers {
            let values = match parser.parse(text) {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(parser = parser.name(), error = %err, "directive parser failed");
                    continue;
                }
            };
            for (name, value) in values {
                if value.len() > limits.max_value_bytes {
                    tracing::debug!(feature = %name, size = value.len(), "directive value too long, dropped");
                    continue;
                }
                out.insert(directive_key(&name), value);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct FixedParser(&'static str, &'static str);

    impl DirectiveParser for FixedParser {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn parse(&self, _text: &str) -> Result<FeatureValues, DirectiveParseError> {
            Ok(FeatureValues::from([(self.0.to_string(), self.1.to_string())]))
        }
    }

    #[test]
    fn feature_name_validation() {
        assert!(is_valid_feature_name("nested-virt"));
        assert!(is_valid_feature_name("gpu2"));
        assert!(!is_valid_feature_name("Nested"));
        assert!(!is_valid_feature_name("a_b"));
        assert!(!is_valid_feature_name(""));
    }

    #[test]
    fn later_parser_wins() {
        let mut chain = ParserChain::empty();
        chain.register(FixedParser("x", "first"));
        chain.register(FixedParser("x", "second"));

        let out = chain.parse("anything", &ExtractionLimits::default());
        assert_eq!(out.get("vm-feature-manager.io/x").map(String::as_str), Some("second"));
    }

    #[test]
    fn standard_chain_reads_feature_block() {
        let text = format!("#cloud-config\n{FEATURES_FIELD}:\n  nested_virt: true\n");
        let out = ParserChain::standard().parse(&text, &ExtractionLimits::default());
        assert_eq!(out.get("vm-feature-manager.io/nested-virt").map(String::as_str), Some("enabled"));
    }

    #[test]
    fn oversized_text_contributes_nothing() {
        let limits = ExtractionLimits {
            max_text_bytes: 8,
            max_value_bytes: 1024,
        };
        let text = "# @kubevirt-feature: a=b\n";
        assert!(ParserChain::standard().parse(text, &limits).is_empty());
    }

    #[test]
    fn oversized_value_dropped() {
        let long = "v".repeat(1025);
        let text = format!("# @kubevirt-feature: big={long}\n# @kubevirt-feature: small=ok\n");
        let out = ParserChain::standard().parse(&text, &ExtractionLimits::default());

        assert_eq!(out.len(), 1);
        assert_eq!(out.get("vm-feature-manager.io/small").map(String::as_str), Some("ok"));
    }

    #[test]
    fn value_at_limit_kept() {
        let exact = "v".repeat(1024);
        let text = format!("# @kubevirt-feature: edge={exact}\n");
        let out = ParserChain::standard().parse(&text, &ExtractionLimits::default());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn standard_chain_order() {
        assert_eq!(ParserChain::standard().names(), vec!["cloud-config", "marker"]);
    }
}
