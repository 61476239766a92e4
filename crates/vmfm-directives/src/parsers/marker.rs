//! Marker-line directives
//!
//! ```text
//! # @kubevirt-feature: nested-virt=enabled
//! # @kubevirt-feature: pci-passthrough={"devices":["0000:00:02.0"]}
//! ```

use super::{DirectiveParser, FeatureValues};
use crate::error::DirectiveParseError;
use once_cell::sync::Lazy;
use regex::Regex;

static MARKER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#[ \t]*@kubevirt-feature:[ \t]*([a-z0-9-]+)[ \t]*=[ \t]*([^\r\n]*?)[ \t\r]*$")
        .expect("marker regex is valid")
});

/// Parser for `# @kubevirt-feature:` lines
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerParser;

impl DirectiveParser for MarkerParser {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn parse(&self, text: &str) -> Result<FeatureValues, DirectiveParseError> {
        let mut out = FeatureValues::new();
        for caps in MARKER_LINE.captures_iter(text) {
            let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let value = value.as_str().trim();
            if value.is_empty() {
                continue;
            }
            out.insert(key.as_str().to_string(), value.to_string());
        }
        Ok(out)
    }
}
