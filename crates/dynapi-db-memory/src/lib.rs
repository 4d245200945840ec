//! In-memory backing store for DynAPI.
//!
//! This crate provides an in-memory implementation of the `BackingStore` trait
//! from `dynapi-storage`, using `dashmap` for concurrent access. It is meant
//! for local development and tests.
//!
//! # Example
//!
//! ```ignore
//! use dynapi_db_memory::InMemoryStore;
//! use dynapi_storage::BackingStore;
//!
//! let store = InMemoryStore::new();
//! let created = store.create(&target, &serde_json::json!({
//!     "apiVersion": "v1",
//!     "kind": "ConfigMap",
//!     "metadata": {"name": "example", "namespace": "default"}
//! })).await?;
//! ```

mod storage;

pub use dynapi_storage::{BackingStore, StorageError};
pub use storage::InMemoryStore;

/// Type alias for a shareable backing store.
pub type DynBackingStore = std::sync::Arc<dyn BackingStore>;

/// Creates a new in-memory store behind an `Arc`.
pub fn create_memory_store() -> DynBackingStore {
    std::sync::Arc::new(InMemoryStore::new())
}
