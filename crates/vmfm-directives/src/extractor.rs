//! Secondary directive extraction
//!
//! Walks every cloud-init location of a VirtualMachine, resolves it to text
//! and runs the [`ParserChain`] over it. Extraction never fails as a whole:
//! a broken location is logged and skipped.

use crate::error::ExtractError;
use crate::lookup::SecretLookup;
use crate::parsers::{ExtractionLimits, ParserChain};
use crate::source::{UserDataRef, UserDataSource};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vmfm_resource::{Directives, VirtualMachine};

/// Secret keys tried, in order, when user data lives in a secret
pub const SECRET_USER_DATA_KEYS: [&str; 3] = ["userdata", "userData", "user-data"];

/// Extracts directives embedded in cloud-init user data
pub struct DirectiveExtractor {
    lookup: Arc<dyn SecretLookup>,
    parsers: ParserChain,
    limits: ExtractionLimits,
}

impl std::fmt::Debug for DirectiveExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveExtractor")
            .field("parsers", &self.parsers.names())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl DirectiveExtractor {
    /// Create extractor with the standard parser chain and default limits
    #[must_use]
    pub fn new(lookup: Arc<dyn SecretLookup>) -> Self {
        Self {
            lookup,
            parsers: ParserChain::standard(),
            limits: ExtractionLimits::default(),
        }
    }

    /// Override size limits
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: ExtractionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the parser chain
    #[inline]
    #[must_use]
    pub fn with_parsers(mut self, parsers: ParserChain) -> Self {
        self.parsers = parsers;
        self
    }

    /// Active limits
    #[inline]
    #[must_use]
    pub fn limits(&self) -> ExtractionLimits {
        self.limits
    }

    /// Collect directives from every user-data location
    ///
    /// Later locations overwrite earlier ones on key collision. Secret
    /// lookups are bounded by `deadline` when given.
    pub async fn extract(&self, vm: &VirtualMachine, deadline: Option<Instant>) -> Directives {
        let mut found = Directives::new();

        for source in UserDataSource::discover(vm) {
            let text = match self.resolve(&source, vm.namespace(), deadline).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        vm = vm.name(),
                        volume = %source.volume,
                        source = %source.kind,
                        error = %err,
                        "skipping user data location"
                    );
                    continue;
                }
            };

            let directives = self.parsers.parse(&text, &self.limits);
            if !directives.is_empty() {
                debug!(
                    vm = vm.name(),
                    volume = %source.volume,
                    keys = ?directives.keys().collect::<Vec<_>>(),
                    "found directives in user data"
                );
            }
            found.extend(directives);
        }

        if !found.is_empty() {
            info!(vm = vm.name(), count = found.len(), "extracted directives from user data");
        }
        found
    }

    async fn resolve(
        &self,
        source: &UserDataSource,
        namespace: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<String>, ExtractError> {
        match &source.reference {
            UserDataRef::Inline(text) => Ok(Some(text.clone())),
            UserDataRef::Base64(encoded) => {
                let bytes = STANDARD.decode(encoded)?;
                Ok(Some(String::from_utf8(bytes)?))
            }
            UserDataRef::Secret(name) => self.fetch_secret(namespace, name, deadline).await.map(Some),
        }
    }

    async fn fetch_secret(
        &self,
        namespace: &str,
        name: &str,
        deadline: Option<Instant>,
    ) -> Result<String, ExtractError> {
        let lookup = self.lookup.get(namespace, name);
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, lookup).await.map_err(|_| {
                ExtractError::DeadlineExceeded {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            })?,
            None => lookup.await,
        };

        let data = result?.ok_or_else(|| ExtractError::SecretNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        let Some((key, bytes)) = SECRET_USER_DATA_KEYS
            .iter()
            .find_map(|key| data.get(*key).map(|bytes| (*key, bytes)))
        else {
            return Err(ExtractError::NoUserDataKey {
                namespace: namespace.to_string(),
                name: name.to_string(),
                tried: SECRET_USER_DATA_KEYS.join(", "),
            });
        };

        debug!(namespace, secret = name, key, "found user data in secret");
        Ok(String::from_utf8(bytes.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::lookup::{MockSecretLookup, SecretData, StaticSecretLookup};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn vm(namespace: Option<&str>, volumes: Value) -> VirtualMachine {
        let mut meta = json!({"name": "vm"});
        if let Some(ns) = namespace {
            meta["namespace"] = json!(ns);
        }
        VirtualMachine::from_value(json!({
            "metadata": meta,
            "spec": {"template": {"spec": {"volumes": volumes}}}
        }))
        .unwrap()
    }

    fn extractor(lookup: impl SecretLookup + 'static) -> DirectiveExtractor {
        DirectiveExtractor::new(Arc::new(lookup))
    }

    fn get<'a>(d: &'a Directives, feature: &str) -> Option<&'a str> {
        d.get(&format!("vm-feature-manager.io/{feature}")).map(String::as_str)
    }

    #[tokio::test]
    async fn inline_marker_directives() {
        let vm = vm(None, json!([{
            "name": "ci",
            "cloudInitNoCloud": {"userData": "#!/bin/sh\n# @kubevirt-feature: nested-virt=enabled\n"}
        }]));

        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert_eq!(get(&found, "nested-virt"), Some("enabled"));
    }

    #[tokio::test]
    async fn base64_user_data() {
        let encoded = STANDARD.encode("# @kubevirt-feature: gpu-device-plugin=nvidia.com/gpu\n");
        let vm = vm(None, json!([{
            "name": "ci",
            "cloudInitConfigDrive": {"userDataBase64": encoded}
        }]));

        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert_eq!(get(&found, "gpu-device-plugin"), Some("nvidia.com/gpu"));
    }

    #[tokio::test]
    async fn bad_base64_is_skipped() {
        let vm = vm(None, json!([
            {"name": "bad", "cloudInitNoCloud": {"userDataBase64": "!!!not base64"}},
            {"name": "good", "cloudInitNoCloud": {"userData": "# @kubevirt-feature: a=1"}}
        ]));

        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(get(&found, "a"), Some("1"));
    }

    #[tokio::test]
    async fn secret_lookup_uses_vm_namespace() {
        let mut lookup = MockSecretLookup::new();
        lookup
            .expect_get()
            .withf(|ns, name| ns == "tenant" && name == "ci-secret")
            .times(1)
            .returning(|_, _| {
                let data = SecretData::from([(
                    "user-data".to_string(),
                    b"#cloud-config\nx_kubevirt_features:\n  nested_virt: true\n".to_vec(),
                )]);
                Ok(Some(data))
            });

        let vm = vm(Some("tenant"), json!([{
            "name": "ci",
            "cloudInitNoCloud": {"secretRef": {"name": "ci-secret"}}
        }]));

        let found = extractor(lookup).extract(&vm, None).await;
        assert_eq!(get(&found, "nested-virt"), Some("enabled"));
    }

    #[tokio::test]
    async fn secret_key_preference_order() {
        let lookup = StaticSecretLookup::new()
            .with_entry("default", "s", "user-data", "# @kubevirt-feature: k=third")
            .with_entry("default", "s", "userData", "# @kubevirt-feature: k=second")
            .with_entry("default", "s", "userdata", "# @kubevirt-feature: k=first");

        let vm = vm(None, json!([{"name": "ci", "cloudInitNoCloud": {"secretRef": {"name": "s"}}}]));
        let found = extractor(lookup).extract(&vm, None).await;
        assert_eq!(get(&found, "k"), Some("first"));
    }

    #[tokio::test]
    async fn missing_secret_and_lookup_errors_are_skipped() {
        let mut lookup = MockSecretLookup::new();
        lookup
            .expect_get()
            .withf(|_, name| name == "missing")
            .returning(|_, _| Ok(None));
        lookup
            .expect_get()
            .withf(|_, name| name == "broken")
            .returning(|ns, name| Err(LookupError::backend(ns, name, "connection refused")));
        lookup
            .expect_get()
            .withf(|_, name| name == "nokey")
            .returning(|_, _| Ok(Some(SecretData::from([("other".to_string(), b"x".to_vec())]))));

        let vm = vm(None, json!([
            {"name": "a", "cloudInitNoCloud": {"secretRef": {"name": "missing"}}},
            {"name": "b", "cloudInitNoCloud": {"secretRef": {"name": "broken"}}},
            {"name": "c", "cloudInitNoCloud": {"secretRef": {"name": "nokey"}}},
            {"name": "d", "cloudInitNoCloud": {"userData": "# @kubevirt-feature: ok=yes"}}
        ]));

        let found = extractor(lookup).extract(&vm, None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(get(&found, "ok"), Some("yes"));
    }

    #[tokio::test]
    async fn later_volume_wins() {
        let vm = vm(None, json!([
            {"name": "a", "cloudInitNoCloud": {"userData": "# @kubevirt-feature: x=first"}},
            {"name": "b", "cloudInitNoCloud": {"userData": "# @kubevirt-feature: x=second"}}
        ]));

        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert_eq!(get(&found, "x"), Some("second"));
    }

    #[tokio::test]
    async fn multiple_volumes_merge() {
        let vm = vm(None, json!([
            {"name": "a", "cloudInitNoCloud": {"userData": "#cloud-config\nx_kubevirt_features:\n  nested_virt: enabled\n"}},
            {"name": "b", "cloudInitConfigDrive": {"userData": "#cloud-config\nx_kubevirt_features:\n  gpu_device_plugin: nvidia.com/gpu\n"}}
        ]));

        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert_eq!(get(&found, "nested-virt"), Some("enabled"));
        assert_eq!(get(&found, "gpu-device-plugin"), Some("nvidia.com/gpu"));
    }

    #[derive(Debug)]
    struct SlowLookup;

    #[async_trait]
    impl SecretLookup for SlowLookup {
        async fn get(&self, _: &str, _: &str) -> Result<Option<SecretData>, LookupError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn deadline_bounds_lookup() {
        let vm = vm(None, json!([
            {"name": "slow", "cloudInitNoCloud": {"secretRef": {"name": "s"}}},
            {"name": "inline", "cloudInitNoCloud": {"userData": "# @kubevirt-feature: x=y"}}
        ]));

        let deadline = Instant::now() + Duration::from_millis(20);
        let found = extractor(SlowLookup).extract(&vm, Some(deadline)).await;
        assert_eq!(get(&found, "x"), Some("y"));
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn no_template_yields_nothing() {
        let vm = VirtualMachine::from_value(json!({"metadata": {"name": "vm"}})).unwrap();
        let found = extractor(StaticSecretLookup::new()).extract(&vm, None).await;
        assert!(found.is_empty());
    }
}
