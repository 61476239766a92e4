//! JSON Patch construction
//!
//! Provides [`PatchBuilder`] which diffs an original resource against its
//! mutated working copy and emits an RFC 6902 operation list.
//!
//! # Invariants
//! - The body is always emitted as a single `replace /spec`
//! - The primary metadata namespace is always emitted, even when unchanged
//! - Output depends only on the two inputs; map ordering is deterministic

use crate::error::PatchError;
use crate::metadata::{ConfigSource, Directives};
use crate::pointer::JsonPointer;
use crate::vm::VirtualMachine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// RFC 6902 operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Create a member (or overwrite it)
    Add,
    /// Delete a member
    Remove,
    /// Overwrite an existing member
    Replace,
}

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    /// Operation kind
    pub op: PatchOp,

    /// Target location
    pub path: JsonPointer,

    /// New value (absent for `remove`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    /// `add` operation
    #[inline]
    #[must_use]
    pub fn add(path: JsonPointer, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    /// `remove` operation
    #[inline]
    #[must_use]
    pub fn remove(path: JsonPointer) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    /// `replace` operation
    #[inline]
    #[must_use]
    pub fn replace(path: JsonPointer, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }
}

/// Ordered list of patch operations
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Patch(Vec<PatchOperation>);

impl Patch {
    /// Operations in application order
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    /// Number of operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if patch has no operations
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to compact JSON bytes
    ///
    /// # Errors
    /// Returns [`PatchError::Serialize`] if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PatchError> {
        serde_json::to_vec(&self.0).map_err(PatchError::Serialize)
    }
}

impl From<Vec<PatchOperation>> for Patch {
    fn from(ops: Vec<PatchOperation>) -> Self {
        Self(ops)
    }
}

/// How metadata changes are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchStrategy {
    /// Whole-namespace replace
    #[default]
    Coarse,
    /// One operation per changed key
    PerKey,
}

impl Display for PatchStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coarse => "coarse",
            Self::PerKey => "per-key",
        })
    }
}

impl FromStr for PatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coarse" => Ok(Self::Coarse),
            "per-key" | "perkey" | "per_key" => Ok(Self::PerKey),
            other => Err(format!("unknown patch strategy '{other}'")),
        }
    }
}

/// Builds a [`Patch`] from an (original, mutated) pair
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchBuilder {
    source: ConfigSource,
    strategy: PatchStrategy,
}

impl PatchBuilder {
    /// Create builder emitting the given metadata namespace
    #[inline]
    #[must_use]
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            strategy: PatchStrategy::Coarse,
        }
    }

    /// Set metadata strategy
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, strategy: PatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Build patch
    ///
    /// # Errors
    /// Returns [`PatchError::Encode`] if a metadata map cannot be converted to
    /// JSON.
    pub fn build(
        &self,
        original: &VirtualMachine,
        mutated: &VirtualMachine,
    ) -> Result<Patch, PatchError> {
        let mut ops = vec![PatchOperation::replace(
            JsonPointer::single("spec"),
            mutated.spec.clone(),
        )];

        let before = original.metadata.map(self.source);
        let after = mutated.metadata.map(self.source);
        let map_ptr = JsonPointer::single("metadata").child(self.source.field());

        match (self.strategy, before) {
            (PatchStrategy::PerKey, Some(before)) => {
                ops.extend(per_key_ops(&map_ptr, before, after));
            }
            (_, before) => {
                let value = encode_map(&map_ptr, after)?;
                if before.is_some() {
                    ops.push(PatchOperation::replace(map_ptr, value));
                } else {
                    ops.push(PatchOperation::add(map_ptr, value));
                }
            }
        }

        Ok(Patch(ops))
    }
}

fn encode_map(path: &JsonPointer, map: Option<&Directives>) -> Result<Value, PatchError> {
    match map {
        Some(map) => serde_json::to_value(map).map_err(|source| PatchError::Encode {
            path: path.to_string(),
            source,
        }),
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

/// Removals first, then additions and replacements in key order
fn per_key_ops(
    map_ptr: &JsonPointer,
    before: &Directives,
    after: Option<&Directives>,
) -> Vec<PatchOperation> {
    let empty = Directives::new();
    let after = after.unwrap_or(&empty);

    let removals = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .map(|key| PatchOperation::remove(map_ptr.child(key.as_str())));

    let upserts = after.iter().filter_map(|(key, value)| {
        let path = map_ptr.child(key.as_str());
        let value_json = Value::String(value.clone());
        match before.get(key) {
            None => Some(PatchOperation::add(path, value_json)),
            Some(old) if old != value => Some(PatchOperation::replace(path, value_json)),
            Some(_) => None,
        }
    });

    removals.chain(upserts).collect()
}
