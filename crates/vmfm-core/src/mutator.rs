//! Mutation pipeline
//!
//! The central flow of the webhook:
//! - Decodes the admitted VirtualMachine
//! - Merges user-data directives under primary directives (primary wins)
//! - Applies enabled rules in order to a deep copy
//! - Routes the first failure through the [`FailurePolicy`]
//! - Builds the patch from (original, working copy)

use crate::admission::{AdmissionRequest, AdmissionResponse};
use crate::config::WebhookConfig;
use crate::error::MutationError;
use crate::policy::{ErrorHandlingMode, FailureOutcome, FailurePhase, FailurePolicy, FeatureFailure};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};
use vmfm_directives::{DirectiveExtractor, SecretLookup};
use vmfm_features::FeatureSet;
use vmfm_resource::{names, ConfigSource, Directives, Patch, PatchBuilder, PatchStrategy, VirtualMachine};

/// Message returned when no rule is enabled
pub const NO_FEATURES_MESSAGE: &str = "No features requested";

/// Pipeline settings derived from [`WebhookConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutatorSettings {
    /// Primary metadata namespace
    pub source: ConfigSource,
    /// Rule failure handling
    pub error_handling: ErrorHandlingMode,
    /// Record `<feature>-applied` keys
    pub add_tracking: bool,
    /// Metadata patch strategy
    pub patch_strategy: PatchStrategy,
    /// Budget for secret lookups per request
    pub lookup_timeout: Duration,
}

impl Default for MutatorSettings {
    fn default() -> Self {
        Self {
            source: ConfigSource::Annotations,
            error_handling: ErrorHandlingMode::Reject,
            add_tracking: true,
            patch_strategy: PatchStrategy::Coarse,
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&WebhookConfig> for MutatorSettings {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            source: config.config_source,
            error_handling: config.error_handling,
            add_tracking: config.add_tracking_annotations,
            patch_strategy: config.patch_strategy,
            lookup_timeout: config.lookup_timeout(),
        }
    }
}

/// Successful run of every enabled rule
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReport {
    /// Rules that changed the resource, in order
    pub applied: Vec<&'static str>,
    /// Merged tracking keys of applied rules
    pub tracking: Directives,
    /// Informational messages of applied rules
    pub messages: Vec<String>,
    /// Final working copy
    pub resource: VirtualMachine,
}

/// Result of running the rules, before any patch is built
#[derive(Debug)]
pub enum Evaluation {
    /// No rule enabled on the merged view
    NothingRequested,
    /// Every enabled rule succeeded
    Completed(MutationReport),
    /// A rule failed; later rules did not run
    Failed {
        /// The failing rule
        failure: FeatureFailure,
        /// Working copy as of the failure
        working: VirtualMachine,
    },
}

/// Final decision for one request
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Deny admission
    Denied {
        /// HTTP-style code
        code: u16,
        /// Message
        message: String,
    },
    /// Admit unmodified
    Allowed {
        /// Message
        message: String,
    },
    /// Admit with patch
    Patched {
        /// Patch against the original
        patch: Patch,
        /// Optional message
        message: Option<String>,
    },
}

impl From<FailureOutcome> for Decision {
    fn from(outcome: FailureOutcome) -> Self {
        match outcome {
            FailureOutcome::Denied { code, message } => Self::Denied { code, message },
            FailureOutcome::Allowed { note } => Self::Allowed { message: note },
            FailureOutcome::AllowedWithPatch { patch, note } => Self::Patched {
                patch,
                message: Some(note),
            },
        }
    }
}

impl From<MutationError> for Decision {
    fn from(err: MutationError) -> Self {
        Self::Denied {
            code: err.status_code(),
            message: err.to_string(),
        }
    }
}

impl Decision {
    /// Whether admission is allowed
    #[inline]
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }

    /// Convert to a wire response; patch serialization failure denies with 500
    #[must_use]
    pub fn into_response(self, uid: &str) -> AdmissionResponse {
        match self {
            Self::Denied { code, message } => AdmissionResponse::deny(uid, code, message),
            Self::Allowed { message } => AdmissionResponse::allow(uid, message),
            Self::Patched { patch, message } => match patch.to_json_bytes() {
                Ok(bytes) => AdmissionResponse::allow_with_patch(uid, &bytes, message),
                Err(err) => {
                    error!(uid, error = %err, "failed to serialize patch");
                    let err = MutationError::from(err);
                    AdmissionResponse::deny(uid, err.status_code(), err.to_string())
                }
            },
        }
    }
}

/// Applies feature rules to admitted VirtualMachines
#[derive(Debug)]
pub struct Mutator {
    features: Arc<FeatureSet>,
    extractor: DirectiveExtractor,
    settings: MutatorSettings,
    builder: PatchBuilder,
    policy: FailurePolicy,
}

impl Mutator {
    /// Create mutator
    #[must_use]
    pub fn new(features: Arc<FeatureSet>, lookup: Arc<dyn SecretLookup>, settings: MutatorSettings) -> Self {
        let builder = PatchBuilder::new(settings.source).with_strategy(settings.patch_strategy);
        Self {
            features,
            extractor: DirectiveExtractor::new(lookup),
            policy: FailurePolicy::new(settings.error_handling, settings.source, builder),
            settings,
            builder,
        }
    }

    /// Replace the directive extractor
    #[must_use]
    pub fn with_extractor(mut self, extractor: DirectiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Active settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &MutatorSettings {
        &self.settings
    }

    /// Registered rules
    #[inline]
    #[must_use]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Handle one admission request
    ///
    /// Never fails: every error becomes a denial carrying the request uid.
    pub async fn review(&self, request: &AdmissionRequest) -> AdmissionResponse {
        let uid = request.uid.as_str();

        if !request.operation.is_mutating() {
            debug!(uid, operation = %request.operation, "operation not mutated");
            return AdmissionResponse::allow(uid, "");
        }

        let vm = match request
            .object
            .clone()
            .ok_or(MutationError::MissingObject)
            .and_then(|object| VirtualMachine::from_value(object).map_err(MutationError::from))
        {
            Ok(vm) => vm,
            Err(err) => {
                error!(uid, error = %err, "failed to decode admitted object");
                return Decision::from(err).into_response(uid);
            }
        };

        info!(
            uid,
            vm = vm.name(),
            namespace = vm.namespace(),
            operation = %request.operation,
            "processing VM mutation"
        );

        let deadline = Instant::now() + self.settings.lookup_timeout;
        self.decide(&vm, Some(deadline)).await.into_response(uid)
    }

    /// Run the pipeline and apply the failure policy
    pub async fn decide(&self, vm: &VirtualMachine, deadline: Option<Instant>) -> Decision {
        match self.evaluate(vm, deadline).await {
            Evaluation::NothingRequested => {
                info!(vm = vm.name(), "no features enabled");
                Decision::Allowed {
                    message: NO_FEATURES_MESSAGE.to_string(),
                }
            }
            Evaluation::Failed { failure, working } => self.policy.decide(&failure, vm, working).into(),
            Evaluation::Completed(report) => match self.builder.build(vm, &report.resource) {
                Ok(patch) => {
                    info!(vm = vm.name(), applied = ?report.applied, ops = patch.len(), "VM mutation successful");
                    Decision::Patched { patch, message: None }
                }
                Err(err) => {
                    error!(vm = vm.name(), error = %err, "failed to create patch");
                    MutationError::from(err).into()
                }
            },
        }
    }

    /// Run enabled rules against a working copy of `vm`
    pub async fn evaluate(&self, vm: &VirtualMachine, deadline: Option<Instant>) -> Evaluation {
        let source = self.settings.source;
        let mut working = vm.clone();

        let extracted = self.extractor.extract(vm, deadline).await;
        let merged = merge_secondary(&mut working, source, extracted);

        let requested: Vec<_> = self.features.enabled_for(&working).map(|f| f.name()).collect();
        if requested.is_empty() {
            return Evaluation::NothingRequested;
        }
        debug!(vm = vm.name(), features = ?requested, "features requested");

        let mut applied = Vec::new();
        let mut tracking = Directives::new();
        let mut messages = Vec::new();

        for feature in self.features.iter() {
            if !feature.is_enabled(&working) {
                debug!(feature = feature.name(), vm = vm.name(), "feature not requested");
                continue;
            }
            info!(feature = feature.name(), vm = vm.name(), "feature enabled");

            let fail = |phase, error| FeatureFailure {
                feature: feature.name(),
                directive_key: feature.directive_key().to_string(),
                phase,
                error,
            };

            if let Err(err) = feature.validate(&working) {
                keep_labels_valid(&mut working, source, &merged);
                return Evaluation::Failed {
                    failure: fail(FailurePhase::Validate, err),
                    working,
                };
            }

            match feature.apply(&mut working) {
                Ok(result) if result.applied => {
                    info!(feature = feature.name(), vm = vm.name(), messages = ?result.messages, "feature applied");
                    applied.push(feature.name());
                    tracking.extend(result.annotations);
                    messages.extend(result.messages);
                }
                Ok(_) => debug!(feature = feature.name(), vm = vm.name(), "feature already present"),
                Err(err) => {
                    keep_labels_valid(&mut working, source, &merged);
                    return Evaluation::Failed {
                        failure: fail(FailurePhase::Apply, err),
                        working,
                    };
                }
            }
        }

        keep_labels_valid(&mut working, source, &merged);
        if self.settings.add_tracking && !applied.is_empty() {
            let written = tracking.iter().map(|(key, value)| {
                let value = if source == ConfigSource::Labels && !names::is_label_value(value) {
                    "true".to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            });
            working.metadata.map_mut(source).extend(written);
        }

        Evaluation::Completed(MutationReport {
            applied,
            tracking,
            messages,
            resource: working,
        })
    }
}

/// Merge user-data directives into the primary namespace; existing keys win
///
/// Returns the keys that were inserted.
fn merge_secondary(working: &mut VirtualMachine, source: ConfigSource, extracted: Directives) -> Vec<String> {
    let mut merged = Vec::new();
    if extracted.is_empty() {
        return merged;
    }
    let vm = working.name().to_string();
    let primary = working.metadata.map_mut(source);
    for (key, value) in extracted {
        if primary.contains_key(&key) {
            debug!(vm = %vm, key = %key, "primary directive takes precedence over user data");
            continue;
        }
        debug!(vm = %vm, key = %key, value = %value, "applied user data directive");
        merged.push(key.clone());
        primary.insert(key, value);
    }
    merged
}

/// Drop merged user-data directives the API server would reject as labels
///
/// Rules have already read them; only the patched object loses them.
fn keep_labels_valid(working: &mut VirtualMachine, source: ConfigSource, merged: &[String]) {
    if source != ConfigSource::Labels {
        return;
    }
    let vm = working.name().to_string();
    let labels = working.metadata.map_mut(source);
    for key in merged {
        if labels.get(key).is_some_and(|value| !names::is_label_value(value)) {
            debug!(vm = %vm, key = %key, "user data directive is not a valid label value, left out of the patch");
            labels.remove(key);
        }
    }
}
