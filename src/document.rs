//! Dynamically-typed resource documents
//!
//! Every resource the engine touches is a JSON value tree. Nothing here knows
//! about particular kinds; accessors only read the fields shared by all
//! Kubernetes objects (`apiVersion`, `kind`, `metadata`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single resource as a generic JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDocument(Value);

impl ResourceDocument {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// JSON pointer lookup, e.g. `doc.pointer("/status/phase")`
    #[must_use]
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        self.0.pointer(path)
    }

    /// String at a JSON pointer, if present and a string
    #[must_use]
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.0.pointer(path).and_then(Value::as_str)
    }

    #[must_use]
    pub fn api_version(&self) -> Option<&str> {
        self.str_at("/apiVersion")
    }

    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.str_at("/kind")
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_at("/metadata/name")
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.str_at("/metadata/namespace").filter(|ns| !ns.is_empty())
    }

    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        self.str_at("/metadata/resourceVersion")
    }

    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.string_map("labels")
    }

    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.string_map("annotations")
    }

    fn string_map(&self, field: &str) -> BTreeMap<String, String> {
        self.0
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `true` when the document is `null` or an object with no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    pub fn set_resource_version(&mut self, version: Option<&str>) {
        let metadata = self.metadata_mut();
        match version {
            Some(v) => {
                metadata.insert("resourceVersion".to_string(), Value::String(v.to_string()));
            }
            None => {
                metadata.remove("resourceVersion");
            }
        }
    }

    /// Merge entries into `metadata.<field>`, overwriting existing keys
    pub fn merge_metadata_map(&mut self, field: &str, entries: &BTreeMap<String, String>) {
        let slot = self
            .metadata_mut()
            .entry(field.to_string())
            .or_insert(Value::Null);
        let map = ensure_object(slot);
        for (k, v) in entries {
            map.insert(k.clone(), Value::String(v.clone()));
        }
    }

    /// Set a value at `path` (object keys only), creating intermediate objects
    pub fn set_path(&mut self, path: &[&str], value: Value) {
        let mut cursor = &mut self.0;
        for key in path {
            cursor = ensure_object(cursor)
                .entry((*key).to_string())
                .or_insert(Value::Null);
        }
        *cursor = value;
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let metadata = ensure_object(&mut self.0)
            .entry("metadata".to_string())
            .or_insert(Value::Null);
        ensure_object(metadata)
    }
}

/// Replace any non-object value with an empty object and borrow the map
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

impl From<Value> for ResourceDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A page of listed resources plus the list's own metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceList {
    pub items: Vec<ResourceDocument>,
    /// `metadata.resourceVersion` of the list
    pub resource_version: Option<String>,
    /// `metadata.continue` token when the server paginated
    pub continue_token: Option<String>,
}

impl ResourceList {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Names of all items, in list order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().filter_map(ResourceDocument::name).collect()
    }
}

/// Filter criteria for listing and waiting
///
/// `label_selector` and `field_selector` are evaluated by the API server;
/// `name_prefix` is applied client-side after the list returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOptions {
    pub name_prefix: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl WaitOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// Human-readable summary used in logs and timeout errors
    #[must_use]
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(prefix) = &self.name_prefix {
            parts.push(format!("namePrefix={prefix}"));
        }
        if let Some(labels) = &self.label_selector {
            parts.push(format!("labels={labels}"));
        }
        if let Some(fields) = &self.field_selector {
            parts.push(format!("fields={fields}"));
        }
        if parts.is_empty() {
            "all".to_string()
        } else {
            parts.join(", ")
        }
    }
}
