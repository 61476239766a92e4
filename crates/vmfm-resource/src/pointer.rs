//! JSON pointers for addressing patch targets
//!
//! Provides [`JsonPointer`], an RFC 6901 pointer built from unescaped
//! segments.

use serde::{Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// RFC 6901 pointer into a JSON document
///
/// Segments are stored unescaped; escaping happens on display.
///
/// # Examples
/// - `["spec"]` → `/spec`
/// - `["metadata", "annotations", "a/b"]` → `/metadata/annotations/a~1b`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct JsonPointer(Vec<String>);

impl JsonPointer {
    /// Create pointer from unescaped segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Whole-document pointer (empty string)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Pointer with a single segment
    #[inline]
    #[must_use]
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Unescaped segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Check if pointer addresses the whole document
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment, returning new pointer
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Parent pointer (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }
}

/// Escape a single segment (`~` → `~0`, `/` → `~1`)
#[must_use]
pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape`]
#[must_use]
pub fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

impl Display for JsonPointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            write!(f, "/{}", escape(seg))?;
        }
        Ok(())
    }
}

impl FromStr for JsonPointer {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| PointerError::MissingLeadingSlash(s.to_string()))?;

        Ok(Self(rest.split('/').map(unescape).collect()))
    }
}

impl Serialize for JsonPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&[&str]> for JsonPointer {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| (*s).to_string()).collect())
    }
}

/// Errors related to JSON pointers
#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    /// Non-empty pointer without leading `/`
    #[error("pointer '{0}' must start with '/'")]
    MissingLeadingSlash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_display() {
        let ptr = JsonPointer::from(&["metadata", "annotations"][..]);
        assert_eq!(ptr.to_string(), "/metadata/annotations");
    }

    #[test]
    fn pointer_root_is_empty_string() {
        assert_eq!(JsonPointer::root().to_string(), "");
        assert!(JsonPointer::root().is_root());
    }

    #[test]
    fn pointer_escapes_domain_keys() {
        let ptr = JsonPointer::single("metadata")
            .child("annotations")
            .child("vm-feature-manager.io/nested-virt");
        assert_eq!(
            ptr.to_string(),
            "/metadata/annotations/vm-feature-manager.io~1nested-virt"
        );
    }

    #[test]
    fn escape_order_matters() {
        // "~1" literal must not decode to "/"
        assert_eq!(escape("~1"), "~01");
        assert_eq!(unescape("~01"), "~1");
    }

    #[test]
    fn pointer_from_str() {
        let ptr: JsonPointer = "/a~1b/c~0d".parse().unwrap();
        assert_eq!(ptr.segments(), &["a/b", "c~d"]);
        assert_eq!(ptr.to_string(), "/a~1b/c~0d");
    }

    #[test]
    fn pointer_from_str_requires_slash() {
        let result: Result<JsonPointer, _> = "spec".parse();
        assert!(matches!(result, Err(PointerError::MissingLeadingSlash(_))));
    }

    #[test]
    fn pointer_parent() {
        let ptr = JsonPointer::single("a").child("b");
        assert_eq!(ptr.parent(), Some(JsonPointer::single("a")));
        assert!(JsonPointer::root().parent().is_none());
    }

    #[test]
    fn pointer_serializes_as_string() {
        let ptr = JsonPointer::single("spec");
        assert_eq!(serde_json::to_string(&ptr).unwrap(), "\"/spec\"");
    }
}
