//! Error types for VMFM Core
//!
//! Provides error handling for:
//! - Decoding the admitted object
//! - Building and serializing the patch
//! - Loading configuration

use std::path::PathBuf;
use vmfm_resource::{InvalidConfigSource, PatchError, ResourceError};

/// Errors raised while turning an admission request into a decision
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// Request carries no object
    #[error("admission request has no object")]
    MissingObject,

    /// Object is not a decodable VirtualMachine
    #[error("failed to decode VirtualMachine: {0}")]
    Decode(#[from] ResourceError),

    /// Patch could not be built or serialized
    #[error("failed to create patch: {0}")]
    Patch(#[from] PatchError),
}

impl MutationError {
    /// HTTP status code reported in the admission response
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingObject | Self::Decode(_) => 400,
            Self::Patch(_) => 500,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// `--config-source` flag has an unknown value
    #[error(transparent)]
    InvalidConfigSource(#[from] InvalidConfigSource),
}
