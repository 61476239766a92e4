//! VMFM Directive Extraction
//!
//! Secondary source of feature directives: cloud-init user data attached to
//! a VirtualMachine's volumes.
//!
//! # Core Operations
//!
//! - **Discover**: enumerate `cloudInitNoCloud` / `cloudInitConfigDrive`
//!   locations in volume order
//! - **Resolve**: inline text, base64 text, or a secret in the VM's own
//!   namespace via [`SecretLookup`]
//! - **Parse**: `#cloud-config` feature blocks and `# @kubevirt-feature:`
//!   marker lines
//!
//! # Architecture
//!
//! ```text
//! VirtualMachine → UserDataSource* → (inline | base64 | SecretLookup) → ParserChain → Directives
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmfm_directives::{DirectiveExtractor, StaticSecretLookup};
//!
//! let extractor = DirectiveExtractor::new(Arc::new(StaticSecretLookup::new()));
//! let directives = extractor.extract(&vm, None).await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod extractor;
pub mod lookup;
pub mod parsers;
pub mod source;

// Re-exports for convenience
pub use error::{DirectiveParseError, ExtractError, LookupError};
pub use extractor::{DirectiveExtractor, SECRET_USER_DATA_KEYS};
pub use lookup::{SecretData, SecretLookup, StaticSecretLookup};
pub use parsers::{ExtractionLimits, ParserChain};
pub use source::{CloudInitKind, UserDataRef, UserDataSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with directive extraction
    pub use crate::error::{ExtractError, LookupError};
    pub use crate::extractor::DirectiveExtractor;
    pub use crate::lookup::{SecretData, SecretLookup, StaticSecretLookup};
    pub use crate::parsers::{DirectiveParser, ExtractionLimits, ParserChain};
}
