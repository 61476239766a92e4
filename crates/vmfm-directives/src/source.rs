//! User-data locations inside a VirtualMachine
//!
//! Every volume under `spec.template.spec.volumes` may carry cloud-init user
//! data in one of two volume sources, and each source may hold the text
//! inline, base64-encoded, or behind a secret reference.

use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use vmfm_resource::VirtualMachine;

/// Cloud-init volume source kinds, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudInitKind {
    /// `cloudInitNoCloud`
    NoCloud,
    /// `cloudInitConfigDrive`
    ConfigDrive,
}

impl CloudInitKind {
    /// All kinds in processing order
    pub const ALL: [Self; 2] = [Self::NoCloud, Self::ConfigDrive];

    /// Field name on the volume object
    #[inline]
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::NoCloud => "cloudInitNoCloud",
            Self::ConfigDrive => "cloudInitConfigDrive",
        }
    }
}

impl Display for CloudInitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// How the user-data text is carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDataRef {
    /// `userData`
    Inline(String),
    /// `userDataBase64`, standard alphabet
    Base64(String),
    /// `secretRef.name`, resolved in the VM's namespace
    Secret(String),
}

/// One configuration-carrying location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataSource {
    /// Volume name (for logging)
    pub volume: String,
    /// Volume source kind
    pub kind: CloudInitKind,
    /// Chosen representation
    pub reference: UserDataRef,
}

impl UserDataSource {
    /// Enumerate locations in volume order, `NoCloud` before `ConfigDrive`
    #[must_use]
    pub fn discover(vm: &VirtualMachine) -> Vec<Self> {
        let mut sources = Vec::new();
        for volume in vm.volumes() {
            let name = volume
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            for kind in CloudInitKind::ALL {
                let Some(block) = volume.get(kind.field()) else {
                    continue;
                };
                if let Some(reference) = pick_reference(block) {
                    sources.push(Self {
                        volume: name.to_string(),
                        kind,
                        reference,
                    });
                }
            }
        }
        sources
    }
}

/// Inline > base64 > secret; empty strings count as absent
fn pick_reference(block: &Value) -> Option<UserDataRef> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(text) = non_empty(block.get("userData")) {
        return Some(UserDataRef::Inline(text));
    }
    if let Some(encoded) = non_empty(block.get("userDataBase64")) {
        return Some(UserDataRef::Base64(encoded));
    }
    non_empty(block.get("secretRef").and_then(|r| r.get("name"))).map(UserDataRef::Secret)
}
