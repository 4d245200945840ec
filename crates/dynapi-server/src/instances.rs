//! Named backing-store instances addressed by the parent part of compound names.

use std::collections::BTreeMap;
use std::sync::Arc;

use dynapi_core::subresource::DEFAULT_PARENT_RESOURCE_NAME;
use dynapi_db_memory::DynBackingStore;

use crate::config::{BackendConfig, BackendKind};
use crate::upstream::HttpStore;

/// Label key selecting the instance on list and create requests.
pub const INSTANCE_LABEL_KEY: &str = "dynapi.io/instance";

/// Name of the single instance created for the in-memory backend.
pub const LOCAL_INSTANCE: &str = "local";

/// Backing stores by instance name, with one of them serving plain names.
#[derive(Clone)]
pub struct StoreSet {
    stores: BTreeMap<String, DynBackingStore>,
    default_instance: String,
}

impl StoreSet {
    /// A set with one instance, used for plain names too.
    pub fn single(name: impl Into<String>, store: DynBackingStore) -> Self {
        let name = name.into();
        let mut stores = BTreeMap::new();
        stores.insert(name.clone(), store);
        Self {
            stores,
            default_instance: name,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, store: DynBackingStore) {
        self.stores.insert(name.into(), store);
    }

    /// Builds the stores described by `config`.
    pub fn from_config(config: &BackendConfig) -> Result<Self, String> {
        match config.kind {
            BackendKind::Memory => Ok(Self::single(
                LOCAL_INSTANCE,
                dynapi_db_memory::create_memory_store(),
            )),
            BackendKind::Http => {
                let mut instances = config.instances.iter();
                let first = instances
                    .next()
                    .ok_or_else(|| "no backend instances configured".to_string())?;
                let mut set = Self::single(
                    first.name.clone(),
                    Arc::new(HttpStore::new(&first.url, first.token.clone(), config.timeout())?),
                );
                for instance in instances {
                    set.insert(
                        instance.name.clone(),
                        Arc::new(HttpStore::new(&instance.url, instance.token.clone(), config.timeout())?),
                    );
                }
                if let Some(default) = &config.default_instance {
                    set.default_instance = default.clone();
                }
                Ok(set)
            }
        }
    }

    /// Store for `parent`; the default parent maps to the default instance.
    pub fn resolve(&self, parent: &str) -> Option<&DynBackingStore> {
        if parent == DEFAULT_PARENT_RESOURCE_NAME {
            return self.stores.get(&self.default_instance);
        }
        self.stores.get(parent)
    }

    /// Whether `parent` addresses the default instance.
    pub fn is_default(&self, parent: &str) -> bool {
        parent == DEFAULT_PARENT_RESOURCE_NAME || parent == self.default_instance
    }

    pub fn default_instance(&self) -> &str {
        &self.default_instance
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
