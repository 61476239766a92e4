//! Failure policy
//!
//! Decides what happens to an admission when a feature rule fails its
//! validation or application. The decision is a pure function of the mode,
//! the failure and the (original, working copy) pair.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use tracing::{error, warn};
use vmfm_features::FeatureError;
use vmfm_resource::{ConfigSource, Patch, PatchBuilder, VirtualMachine};

/// How rule failures affect admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorHandlingMode {
    /// Deny the request
    #[default]
    Reject,
    /// Admit unmodified, log the error
    AllowAndLog,
    /// Remove the failing directive, admit with the rest of the patch
    StripLabel,
}

impl ErrorHandlingMode {
    /// Canonical name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::AllowAndLog => "allow-and-log",
            Self::StripLabel => "strip-label",
        }
    }

    /// Parse, falling back to [`ErrorHandlingMode::Reject`] with a warning
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|err: UnknownMode| {
            warn!(mode = %err.0, "unknown error handling mode, using reject");
            Self::Reject
        })
    }
}

impl Display for ErrorHandlingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized error handling mode
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error handling mode '{0}'")]
pub struct UnknownMode(pub String);

impl FromStr for ErrorHandlingMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "allow-and-log" | "allow" => Ok(Self::AllowAndLog),
            "strip-label" | "strip-directive" => Ok(Self::StripLabel),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

impl From<String> for ErrorHandlingMode {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<ErrorHandlingMode> for String {
    fn from(mode: ErrorHandlingMode) -> Self {
        mode.as_str().to_string()
    }
}

/// A rule that failed, and why
#[derive(Debug)]
pub struct FeatureFailure {
    /// Rule name
    pub feature: &'static str,
    /// Directive key of the rule
    pub directive_key: String,
    /// Phase that failed
    pub phase: FailurePhase,
    /// Underlying error
    pub error: FeatureError,
}

/// Which step of a rule failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// `validate`
    Validate,
    /// `apply`
    Apply,
}

impl Display for FailurePhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validate => "validation",
            Self::Apply => "application",
        })
    }
}

/// Result of the failure policy
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Deny admission
    Denied {
        /// HTTP-style code
        code: u16,
        /// Message for the API server
        message: String,
    },
    /// Admit with no patch
    Allowed {
        /// Message for the API server
        note: String,
    },
    /// Admit with a patch
    AllowedWithPatch {
        /// Patch against the original
        patch: Patch,
        /// Message for the API server
        note: String,
    },
}

/// Failure policy bound to a mode and metadata namespace
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    mode: ErrorHandlingMode,
    source: ConfigSource,
    builder: PatchBuilder,
}

impl FailurePolicy {
    /// Create policy; strip mode builds patches with `builder`
    #[must_use]
    pub fn new(mode: ErrorHandlingMode, source: ConfigSource, builder: PatchBuilder) -> Self {
        Self {
            mode,
            source,
            builder,
        }
    }

    /// Active mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ErrorHandlingMode {
        self.mode
    }

    /// Decide the outcome for `failure`
    ///
    /// `working` is consumed: strip mode edits it before diffing.
    #[must_use]
    pub fn decide(
        &self,
        failure: &FeatureFailure,
        original: &VirtualMachine,
        mut working: VirtualMachine,
    ) -> FailureOutcome {
        error!(
            feature = failure.feature,
            phase = %failure.phase,
            mode = %self.mode,
            error = %failure.error,
            "feature failed"
        );

        match self.mode {
            ErrorHandlingMode::Reject => FailureOutcome::Denied {
                code: 400,
                message: format!("feature {} failed: {}", failure.feature, failure.error),
            },
            ErrorHandlingMode::AllowAndLog => FailureOutcome::Allowed {
                note: format!("Feature {} failed but admission allowed", failure.feature),
            },
            ErrorHandlingMode::StripLabel => {
                working
                    .metadata
                    .remove_directive(self.source, &failure.directive_key);
                match self.builder.build(original, &working) {
                    Ok(patch) => FailureOutcome::AllowedWithPatch {
                        patch,
                        note: format!(
                            "Feature {} failed, directive {} stripped and admission allowed",
                            failure.feature, failure.directive_key
                        ),
                    },
                    Err(err) => {
                        error!(feature = failure.feature, error = %err, "failed to build patch after stripping directive");
                        FailureOutcome::Denied {
                            code: 500,
                            message: format!("failed to create patch: {err}"),
                        }
                    }
                }
            }
        }
    }
}
