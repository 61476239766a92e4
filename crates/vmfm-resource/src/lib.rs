//! VMFM Resource Model
//!
//! Typed view of KubeVirt `VirtualMachine` objects and JSON Patch
//! construction from an (original, mutated) pair.
//!
//! # Core Concepts
//!
//! - [`VirtualMachine`]: Decoded resource with an untyped `spec` body
//! - [`ObjectMeta`]: Annotations and labels as ordered string maps
//! - [`ConfigSource`]: Which metadata namespace carries feature directives
//! - [`JsonPointer`]: RFC 6901 addressing for patch targets
//! - [`PatchBuilder`]: Diff of original vs. working copy into a [`Patch`]
//!
//! # Example
//!
//! ```rust,ignore
//! use vmfm_resource::{ConfigSource, PatchBuilder, VirtualMachine};
//!
//! let original = VirtualMachine::from_slice(raw)?;
//! let mut working = original.clone();
//! working.spec["running"] = true.into();
//!
//! let patch = PatchBuilder::new(ConfigSource::Annotations).build(&original, &working)?;
//! let bytes = patch.to_json_bytes()?;
//! ```

#![warn(unreachable_pub)]

mod error;
mod metadata;
pub mod names;
mod patch;
mod pointer;
pub mod tree;
mod vm;

pub use error::{kind_of, PatchError, ResourceError};
pub use metadata::{
    directive_key, ConfigSource, Directives, InvalidConfigSource, ObjectMeta, DIRECTIVE_DOMAIN,
};
pub use patch::{Patch, PatchBuilder, PatchOp, PatchOperation, PatchStrategy};
pub use pointer::{escape, unescape, JsonPointer, PointerError};
pub use vm::{VirtualMachine, DEFAULT_NAMESPACE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
