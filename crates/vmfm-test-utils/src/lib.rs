//! Testing utilities for the VM feature manager workspace
//!
//! Shared fixtures: VirtualMachine builders, AdmissionReview payloads, patch
//! decoding, and a scriptable feature rule.

#![allow(missing_docs)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};
use vmfm_features::{Feature, FeatureError, MutationResult};
use vmfm_resource::{directive_key, ConfigSource, VirtualMachine};

/// Fluent VirtualMachine fixture
#[derive(Debug, Clone)]
pub struct VmBuilder {
    name: String,
    namespace: Option<String>,
    annotations: Option<Map<String, Value>>,
    labels: Option<Map<String, Value>>,
    spec: Value,
}

impl VmBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: Some("default".to_string()),
            annotations: None,
            labels: None,
            spec: json!({"running": false, "template": {"spec": {"domain": {"devices": {}}}}}),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), json!(value));
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), json!(value));
        self
    }

    /// Directive for `feature` in the given namespace
    pub fn directive(self, source: ConfigSource, feature: &str, value: &str) -> Self {
        let key = directive_key(feature);
        match source {
            ConfigSource::Annotations => self.annotation(&key, value),
            ConfigSource::Labels => self.label(&key, value),
        }
    }

    pub fn spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Replace the template volumes with a single NoCloud disk
    pub fn cloud_init_user_data(mut self, user_data: &str) -> Self {
        self.set_volumes(json!([{
            "name": "cloudinitdisk",
            "cloudInitNoCloud": {"userData": user_data}
        }]));
        self
    }

    /// Replace the template volumes with a secret-backed NoCloud disk
    pub fn cloud_init_secret(mut self, secret: &str) -> Self {
        self.set_volumes(json!([{
            "name": "cloudinitdisk",
            "cloudInitNoCloud": {"secretRef": {"name": secret}}
        }]));
        self
    }

    fn set_volumes(&mut self, volumes: Value) {
        if let Some(template) = self.spec.get_mut("template").and_then(Value::as_object_mut) {
            let spec = template.entry("spec").or_insert_with(|| json!({}));
            if let Some(spec) = spec.as_object_mut() {
                spec.insert("volumes".to_string(), volumes);
            }
        }
    }

    pub fn to_value(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert("name".to_string(), json!(self.name));
        if let Some(ns) = &self.namespace {
            metadata.insert("namespace".to_string(), json!(ns));
        }
        if let Some(annotations) = &self.annotations {
            metadata.insert("annotations".to_string(), Value::Object(annotations.clone()));
        }
        if let Some(labels) = &self.labels {
            metadata.insert("labels".to_string(), Value::Object(labels.clone()));
        }
        json!({
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachine",
            "metadata": metadata,
            "spec": self.spec,
        })
    }

    pub fn build(&self) -> VirtualMachine {
        VirtualMachine::from_value(self.to_value()).unwrap()
    }
}

/// AdmissionReview request envelope around `object`
pub fn admission_review(uid: &str, operation: &str, object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "kind": {"group": "kubevirt.io", "version": "v1", "kind": "VirtualMachine"},
            "resource": {"group": "kubevirt.io", "version": "v1", "resource": "virtualmachines"},
            "namespace": object.pointer("/metadata/namespace").cloned().unwrap_or(Value::Null),
            "operation": operation,
            "object": object,
        }
    })
}

/// Decode a base64 JSON Patch into its JSON form
pub fn decode_patch(encoded: &str) -> Value {
    let bytes = STANDARD.decode(encoded).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Apply a decoded JSON Patch (`add`/`replace`/`remove` on object members)
pub fn apply_patch(target: &Value, patch: &Value) -> Value {
    let mut doc = target.clone();
    for op in patch.as_array().unwrap() {
        let path = op["path"].as_str().unwrap();
        let segments: Vec<String> = path
            .split('/')
            .skip(1)
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect();
        let (last, parents) = segments.split_last().unwrap();
        let mut cursor = &mut doc;
        for segment in parents {
            cursor = cursor
                .as_object_mut()
                .unwrap()
                .entry(segment.clone())
                .or_insert_with(|| json!({}));
        }
        let object = cursor.as_object_mut().unwrap();
        match op["op"].as_str().unwrap() {
            "add" | "replace" => {
                object.insert(last.clone(), op["value"].clone());
            }
            "remove" => {
                object.remove(last);
            }
            other => panic!("unsupported op {other}"),
        }
    }
    doc
}

/// Failure injected by [`ScriptedFeature`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    FailValidate,
    FailApply,
}

/// Feature rule whose outcome is fixed up front
///
/// On success it sets `spec.<name>` to `true` and tracks `<name>-applied`.
#[derive(Debug, Clone)]
pub struct ScriptedFeature {
    name: &'static str,
    key: String,
    source: ConfigSource,
    script: Script,
}

impl ScriptedFeature {
    pub fn new(name: &'static str, script: Script) -> Self {
        Self {
            name,
            key: directive_key(name),
            source: ConfigSource::Annotations,
            script,
        }
    }

    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.source = source;
        self
    }
}

impl Feature for ScriptedFeature {
    fn name(&self) -> &'static str {
        self.name
    }

    fn directive_key(&self) -> &str {
        &self.key
    }

    fn source(&self) -> ConfigSource {
        self.source
    }

    fn is_enabled(&self, vm: &VirtualMachine) -> bool {
        self.directive_value(vm).is_some()
    }

    fn validate(&self, _vm: &VirtualMachine) -> Result<(), FeatureError> {
        match self.script {
            Script::FailValidate => Err(FeatureError::invalid(format!("{} rejected", self.name))),
            _ => Ok(()),
        }
    }

    fn apply(&self, vm: &mut VirtualMachine) -> Result<MutationResult, FeatureError> {
        if self.script == Script::FailApply {
            return Err(FeatureError::invalid(format!("{} could not apply", self.name)));
        }
        let spec = vm.spec.as_object_mut().unwrap();
        if spec.get(self.name) == Some(&Value::Bool(true)) {
            return Ok(MutationResult::unchanged());
        }
        spec.insert(self.name.to_string(), Value::Bool(true));
        Ok(MutationResult::applied().with_annotation(directive_key(&format!("{}-applied", self.name)), "true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_places_directives() {
        let vm = VmBuilder::new("vm")
            .directive(ConfigSource::Labels, "nested-virt", "enabled")
            .build();
        assert_eq!(
            vm.metadata.directive(ConfigSource::Labels, "vm-feature-manager.io/nested-virt"),
            Some("enabled")
        );
        assert!(vm.metadata.annotations.is_none());
    }

    #[test]
    fn apply_patch_handles_escaped_keys() {
        let doc = json!({"metadata": {"annotations": {"a": "1"}}});
        let patch = json!([
            {"op": "add", "path": "/metadata/annotations/x.io~1y", "value": "2"},
            {"op": "remove", "path": "/metadata/annotations/a"}
        ]);
        assert_eq!(
            apply_patch(&doc, &patch),
            json!({"metadata": {"annotations": {"x.io/y": "2"}}})
        );
    }
}
