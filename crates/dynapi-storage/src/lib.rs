//! # dynapi-storage
//!
//! Backing-store abstraction for DynAPI.
//!
//! Dynamic resources keep their documents in some other system, addressed by
//! the codec's target type. This crate defines the contract such a system's
//! client must implement. Implementations live in separate crates.
//!
//! ## Example
//!
//! ```ignore
//! use dynapi_storage::{BackingStore, ObjectKey, StorageError};
//!
//! async fn fetch(store: &dyn BackingStore, target: &TypeDescriptor) -> Result<Value, StorageError> {
//!     store.get(target, &ObjectKey::namespaced("default", "example")).await
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::BackingStore;
pub use types::{ListOptions, ObjectKey};
