//! Feature rule trait and core types
//!
//! Provides the [`Feature`] trait implemented by every rule the mutator can
//! apply, plus the [`MutationResult`] each application reports.

use vmfm_resource::{ConfigSource, Directives, ResourceError, VirtualMachine};

/// A single admission-time mutation keyed by one directive
///
/// # Contract
/// - `is_enabled` is a pure read of directives plus config gating
/// - `validate` never mutates
/// - `apply` runs only after `validate` succeeded, and is idempotent: a
///   second application to its own output changes nothing and reports
///   `applied = false`
/// - rules create missing nested containers before writing
pub trait Feature: Send + Sync + std::fmt::Debug {
    /// Feature name (for logging and tracking keys)
    fn name(&self) -> &'static str;

    /// Fully-qualified directive key
    fn directive_key(&self) -> &str;

    /// Namespace the directive is read from
    fn source(&self) -> ConfigSource;

    /// Whether the rule is requested on this resource
    fn is_enabled(&self, vm: &VirtualMachine) -> bool;

    /// Check the directive value before any mutation
    ///
    /// # Errors
    /// Returns [`FeatureError`] describing why the request is invalid.
    fn validate(&self, vm: &VirtualMachine) -> Result<(), FeatureError>;

    /// Mutate the working copy
    ///
    /// # Errors
    /// Returns [`FeatureError`] if the resource cannot take the mutation.
    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError>;

    /// Raw directive value, if present
    fn directive_value<'a>(&self, vm: &'a VirtualMachine) -> Option<&'a str> {
        vm.metadata.directive(self.source(), self.directive_key())
    }
}

/// Outcome of one successful `apply`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationResult {
    /// Whether the resource changed
    pub applied: bool,

    /// Tracking annotations to record on the resource
    pub annotations: Directives,

    /// Informational messages
    pub messages: Vec<String>,
}

impl MutationResult {
    /// Result for a no-op application
    #[inline]
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Result for an application that changed the resource
    #[inline]
    #[must_use]
    pub fn applied() -> Self {
        Self {
            applied: true,
            ..Self::default()
        }
    }

    /// Add a tracking annotation
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Add an informational message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

/// Errors raised by feature rules
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// Directive value failed validation
    #[error("{0}")]
    Invalid(String),

    /// Rule needs `spec.template` but it is absent
    #[error("VM template is nil")]
    MissingTemplate,

    /// Resource body has an unexpected shape
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A generated value could not be encoded
    #[error("failed to encode {what}: {source}")]
    Encode {
        /// Value being encoded
        what: &'static str,
        /// Underlying encoder error
        #[source]
        source: serde_json::Error,
    },
}

impl FeatureError {
    /// Create validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
