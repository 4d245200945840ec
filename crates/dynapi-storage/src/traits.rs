//! The backing-store contract.

use async_trait::async_trait;
use dynapi_core::TypeDescriptor;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{ListOptions, ObjectKey};

/// Client for the system that stores documents of a codec's target type.
///
/// Documents are full objects including `apiVersion`, `kind` and `metadata`.
/// Implementations must be thread-safe and must not retry on their own
/// unless they can do so safely.
///
/// # Example
///
/// ```ignore
/// let stored = store.create(&target, &doc).await?;
/// let fetched = store.get(&target, &ObjectKey::namespaced("default", "example")).await?;
/// ```
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Reads one document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    async fn get(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<Value, StorageError>;

    /// Lists documents matching `options`.
    async fn list(
        &self,
        target: &TypeDescriptor,
        options: &ListOptions,
    ) -> Result<Vec<Value>, StorageError>;

    /// Creates a document and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a document with the same name exists.
    async fn create(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError>;

    /// Replaces an existing document and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist and
    /// `StorageError::Conflict` if `metadata.resourceVersion` is stale.
    async fn update(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError>;

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    async fn delete(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<(), StorageError>;

    /// Returns the name of the backend (e.g. "memory", "http").
    fn backend_name(&self) -> &'static str;
}
