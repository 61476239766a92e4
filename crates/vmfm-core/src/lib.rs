//! VMFM Core - admission-time VirtualMachine mutation
//!
//! The pipeline that:
//! - Decodes the admitted VirtualMachine
//! - Merges directives found in cloud-init user data (primary wins)
//! - Applies enabled feature rules, in order, to a deep copy
//! - Handles rule failures per the configured [`ErrorHandlingMode`]
//! - Returns an `AdmissionResponse` carrying a JSON Patch
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmfm_core::{Mutator, MutatorSettings, WebhookConfig};
//! use vmfm_features::FeatureSet;
//!
//! # async fn example(lookup: Arc<dyn vmfm_directives::SecretLookup>, review: vmfm_core::AdmissionReview) {
//! let config = WebhookConfig::from_env();
//! let features = FeatureSet::from_config(&config.features, config.config_source);
//! let mutator = Mutator::new(Arc::new(features), lookup, MutatorSettings::from(&config));
//!
//! let response = mutator.review(review.request.as_ref().unwrap()).await;
//! println!("allowed: {}", response.allowed);
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

// Core modules
pub mod admission;
pub mod config;
pub mod error;
pub mod mutator;
pub mod policy;

// Re-exports for convenience
pub use admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, Operation, Status, ADMISSION_API_VERSION,
    ADMISSION_KIND, JSON_PATCH,
};
pub use config::{CliOverrides, LogFormat, WebhookConfig};
pub use error::{ConfigError, MutationError};
pub use mutator::{Decision, Evaluation, MutationReport, Mutator, MutatorSettings, NO_FEATURES_MESSAGE};
pub use policy::{
    ErrorHandlingMode, FailureOutcome, FailurePhase, FailurePolicy, FeatureFailure, UnknownMode,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with VMFM Core
    pub use crate::{
        AdmissionRequest, AdmissionResponse, AdmissionReview, Decision, ErrorHandlingMode, Mutator,
        MutatorSettings, WebhookConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
