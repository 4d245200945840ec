//! Accessors for structured documents.
//!
//! Documents are plain `serde_json::Value` objects shaped with the usual
//! `apiVersion`, `kind` and `metadata` fields.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::descriptor::{GroupVersion, GroupVersionKind};
use crate::error::{CoreError, Result};

pub fn api_version(doc: &Value) -> Option<&str> {
    doc.get("apiVersion").and_then(Value::as_str)
}

pub fn kind(doc: &Value) -> Option<&str> {
    doc.get("kind").and_then(Value::as_str)
}

/// Reads the group version kind stamped on a document.
pub fn gvk(doc: &Value) -> Option<GroupVersionKind> {
    let gv = GroupVersion::parse(api_version(doc)?).ok()?;
    Some(gv.with_kind(kind(doc)?))
}

/// Overwrites `apiVersion` and `kind`.
pub fn stamp(doc: &mut Value, gvk: &GroupVersionKind) -> Result<()> {
    let obj = doc.as_object_mut().ok_or(CoreError::NotAnObject)?;
    obj.insert("apiVersion".into(), Value::String(gvk.api_version()));
    obj.insert("kind".into(), Value::String(gvk.kind.clone()));
    Ok(())
}

fn metadata(doc: &Value) -> Option<&Map<String, Value>> {
    doc.get("metadata").and_then(Value::as_object)
}

fn metadata_mut(doc: &mut Value) -> Result<&mut Map<String, Value>> {
    let obj = doc.as_object_mut().ok_or(CoreError::NotAnObject)?;
    let meta = obj
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    meta.as_object_mut().ok_or(CoreError::NotAnObject)
}

pub fn name(doc: &Value) -> Option<&str> {
    metadata(doc)?.get("name").and_then(Value::as_str)
}

pub fn set_name(doc: &mut Value, name: &str) -> Result<()> {
    metadata_mut(doc)?.insert("name".into(), Value::String(name.to_string()));
    Ok(())
}

pub fn namespace(doc: &Value) -> Option<&str> {
    metadata(doc)?.get("namespace").and_then(Value::as_str)
}

pub fn set_namespace(doc: &mut Value, namespace: &str) -> Result<()> {
    metadata_mut(doc)?.insert("namespace".into(), Value::String(namespace.to_string()));
    Ok(())
}

pub fn resource_version(doc: &Value) -> Option<&str> {
    metadata(doc)?.get("resourceVersion").and_then(Value::as_str)
}

pub fn set_resource_version(doc: &mut Value, version: &str) -> Result<()> {
    metadata_mut(doc)?.insert("resourceVersion".into(), Value::String(version.to_string()));
    Ok(())
}

/// Labels as a sorted map; non-string values are skipped.
pub fn labels(doc: &Value) -> BTreeMap<String, String> {
    metadata(doc)
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn set_labels(doc: &mut Value, labels: &BTreeMap<String, String>) -> Result<()> {
    let labels: Map<String, Value> = labels
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    metadata_mut(doc)?.insert("labels".into(), Value::Object(labels));
    Ok(())
}

pub fn creation_timestamp(doc: &Value) -> Option<&str> {
    metadata(doc)?.get("creationTimestamp").and_then(Value::as_str)
}

/// Sets `metadata.creationTimestamp` to `at`, RFC 3339 formatted.
pub fn set_creation_timestamp(doc: &mut Value, at: OffsetDateTime) -> Result<()> {
    let formatted = at
        .format(&Rfc3339)
        .map_err(|e| CoreError::InvalidTimestamp(e.to_string()))?;
    metadata_mut(doc)?.insert("creationTimestamp".into(), Value::String(formatted));
    Ok(())
}
