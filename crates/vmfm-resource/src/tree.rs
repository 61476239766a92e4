//! Navigation helpers over untyped JSON bodies
//!
//! Rules write into deeply nested parts of `spec`. These helpers walk a path
//! of object keys and create missing containers on the way down.

use crate::error::ResourceError;
use serde_json::{Map, Value};

/// Read-only lookup of a nested value
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(*key))
}

/// Walk `path`, creating empty objects where keys are missing or null
///
/// # Errors
/// Returns [`ResourceError::ExpectedObject`] if an intermediate node exists
/// with a non-object value.
pub fn ensure_object<'a>(
    root: &'a mut Value,
    path: &[&str],
) -> Result<&'a mut Map<String, Value>, ResourceError> {
    let mut node = root;
    for (depth, key) in path.iter().enumerate() {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry((*key).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            other => return Err(ResourceError::expected_object(&path[..depth], other)),
        };
    }
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map),
        other => Err(ResourceError::expected_object(path, other)),
    }
}

/// Walk `path` to an array, creating containers and the array itself
///
/// # Errors
/// Returns an error if any node along the way has the wrong shape.
pub fn ensure_array<'a>(
    root: &'a mut Value,
    path: &[&str],
) -> Result<&'a mut Vec<Value>, ResourceError> {
    let Some((last, parents)) = path.split_last() else {
        return match root {
            Value::Array(items) => Ok(items),
            other => Err(ResourceError::expected_array(path, other)),
        };
    };

    let parent = ensure_object(root, parents)?;
    let slot = parent
        .entry((*last).to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => Ok(items),
        other => Err(ResourceError::expected_array(path, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn get_path_walks_objects() {
        let doc = json!({"a": {"b": {"c": 1}}});
        assert_eq!(get_path(&doc, &["a", "b", "c"]), Some(&json!(1)));
        assert_eq!(get_path(&doc, &["a", "x"]), None);
        assert_eq!(get_path(&doc, &[]), Some(&doc));
    }

    #[test]
    fn ensure_object_creates_missing() {
        let mut doc = json!({});
        ensure_object(&mut doc, &["template", "spec", "domain"])
            .unwrap()
            .insert("k".to_string(), json!("v"));
        assert_eq!(doc, json!({"template": {"spec": {"domain": {"k": "v"}}}}));
    }

    #[test]
    fn ensure_object_replaces_null() {
        let mut doc = json!({"template": null});
        ensure_object(&mut doc, &["template", "spec"]).unwrap();
        assert_eq!(doc, json!({"template": {"spec": {}}}));
    }

    #[test]
    fn ensure_object_rejects_wrong_shape() {
        let mut doc = json!({"template": {"spec": []}});
        let err = ensure_object(&mut doc, &["template", "spec", "domain"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected object at 'template.spec', found array"
        );
    }

    #[test]
    fn ensure_array_creates_and_keeps_entries() {
        let mut doc = json!({"cpu": {"features": [{"name": "x"}]}});
        let items = ensure_array(&mut doc, &["cpu", "features"]).unwrap();
        items.push(json!({"name": "y"}));
        assert_eq!(doc, json!({"cpu": {"features": [{"name": "x"}, {"name": "y"}]}}));

        let mut empty = json!({});
        ensure_array(&mut empty, &["devices", "hostDevices"]).unwrap();
        assert_eq!(empty, json!({"devices": {"hostDevices": []}}));
    }

    #[test]
    fn ensure_array_rejects_object() {
        let mut doc = json!({"volumes": {}});
        assert!(matches!(
            ensure_array(&mut doc, &["volumes"]),
            Err(ResourceError::ExpectedArray { .. })
        ));
    }
}
