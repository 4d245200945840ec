use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dynapi_core::{TypeDescriptor, document};
use dynapi_storage::{BackingStore, ListOptions, ObjectKey, StorageError};
use serde_json::Value;
use time::OffsetDateTime;

/// Storage key: `(group/version/resource, namespace, name)`.
type StoreKey = (String, Option<String>, String);

/// In-memory backing store.
///
/// Documents are keyed by the target's group, version and resource plus the
/// object key. Every write bumps a store-wide resource version counter.
#[derive(Debug)]
pub struct InMemoryStore {
    data: DashMap<StoreKey, Value>,
    version_counter: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            version_counter: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    fn store_key(target: &TypeDescriptor, key: &ObjectKey) -> StoreKey {
        let namespace = if target.namespaced() {
            key.namespace.clone()
        } else {
            None
        };
        (target.gvr().to_string(), namespace, key.name.clone())
    }

    fn key_of(target: &TypeDescriptor, doc: &Value) -> Result<ObjectKey, StorageError> {
        if !doc.is_object() {
            return Err(StorageError::invalid("document must be an object"));
        }
        let name = document::name(doc)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StorageError::invalid("metadata.name is required"))?;
        let namespace = match (target.namespaced(), document::namespace(doc)) {
            (false, _) => None,
            (true, Some(ns)) if !ns.is_empty() => Some(ns),
            (true, _) => {
                return Err(StorageError::invalid(format!(
                    "metadata.namespace is required for {}",
                    target.resource()
                )));
            }
        };
        Ok(ObjectKey::new(namespace, name))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn internal(err: impl std::fmt::Display) -> StorageError {
    StorageError::internal(err.to_string())
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn get(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<Value, StorageError> {
        self.data
            .get(&Self::store_key(target, key))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::not_found(target.resource(), &key.name))
    }

    async fn list(
        &self,
        target: &TypeDescriptor,
        options: &ListOptions,
    ) -> Result<Vec<Value>, StorageError> {
        let gvr = target.gvr().to_string();
        let namespace = options.namespace.as_deref().filter(|_| target.namespaced());
        let mut matched: Vec<(StoreKey, Value)> = self
            .data
            .iter()
            .filter(|entry| {
                let (entry_gvr, entry_ns, _) = entry.key();
                *entry_gvr == gvr && namespace.is_none_or(|ns| entry_ns.as_deref() == Some(ns))
            })
            .filter(|entry| options.label_selector.matches_document(entry.value()))
            .filter(|entry| options.field_selector.matches(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));

        let limit = options.limit.filter(|&n| n > 0).unwrap_or(usize::MAX);
        Ok(matched.into_iter().take(limit).map(|(_, v)| v).collect())
    }

    async fn create(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError> {
        let key = Self::key_of(target, doc)?;
        let store_key = Self::store_key(target, &key);

        let mut stored = doc.clone();
        document::set_resource_version(&mut stored, &self.next_version()).map_err(internal)?;
        document::set_creation_timestamp(&mut stored, OffsetDateTime::now_utc()).map_err(internal)?;
        if let Some(meta) = stored.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("uid".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }

        match self.data.entry(store_key) {
            Entry::Occupied(_) => {
                Err(StorageError::already_exists(target.resource(), &key.name))
            }
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
                tracing::debug!(resource = %target, key = %key, "Created document");
                Ok(stored)
            }
        }
    }

    async fn update(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError> {
        let key = Self::key_of(target, doc)?;
        let mut entry = self
            .data
            .get_mut(&Self::store_key(target, &key))
            .ok_or_else(|| StorageError::not_found(target.resource(), &key.name))?;

        let current = entry.value();
        let current_version = document::resource_version(current).unwrap_or_default().to_string();
        if let Some(expected) = document::resource_version(doc).filter(|v| !v.is_empty()) {
            if expected != current_version {
                return Err(StorageError::conflict(format!(
                    "the object {key} has been modified: expected resourceVersion {expected}, found {current_version}"
                )));
            }
        }

        let mut stored = doc.clone();
        let preserved: Vec<(&str, Value)> = ["uid", "creationTimestamp"]
            .into_iter()
            .filter_map(|field| current.get("metadata")?.get(field).cloned().map(|v| (field, v)))
            .collect();
        if let Some(meta) = stored.get_mut("metadata").and_then(Value::as_object_mut) {
            for (field, value) in preserved {
                meta.insert(field.to_string(), value);
            }
        }
        document::set_resource_version(&mut stored, &self.next_version()).map_err(internal)?;

        *entry.value_mut() = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<(), StorageError> {
        self.data
            .remove(&Self::store_key(target, key))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(target.resource(), &key.name))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
