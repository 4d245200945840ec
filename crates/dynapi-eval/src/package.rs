//! Provider packages: a named set of functions plus their signature manifest.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::PackageError;
use crate::function::ProviderFn;

/// Named collection of provider functions.
///
/// The manifest is a YAML mapping from function name to a signature
/// skeleton. Skeleton fields act as defaults for call nodes targeting the
/// function; templates fill them in before evaluation.
pub struct ProviderPackage {
    name: String,
    signatures: BTreeMap<String, Value>,
    functions: HashMap<String, Arc<dyn ProviderFn>>,
}

impl ProviderPackage {
    pub fn new(
        name: impl Into<String>,
        manifest: &str,
        functions: HashMap<String, Arc<dyn ProviderFn>>,
    ) -> Result<Self, PackageError> {
        let name = name.into();
        let parsed: Value = if manifest.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_yaml::from_str(manifest).map_err(|source| PackageError::Manifest {
                provider: name.clone(),
                source,
            })?
        };
        let Value::Object(entries) = parsed else {
            return Err(PackageError::NotAMapping(name));
        };
        let signatures: BTreeMap<String, Value> = entries.into_iter().collect();

        if let Some(function) = functions.keys().find(|f| !signatures.contains_key(*f)) {
            return Err(PackageError::MissingSignature {
                provider: name,
                function: function.clone(),
            });
        }
        if let Some(function) = signatures.keys().find(|f| !functions.contains_key(*f)) {
            return Err(PackageError::MissingFunction {
                provider: name,
                function: function.clone(),
            });
        }

        Ok(Self {
            name,
            signatures,
            functions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<Arc<dyn ProviderFn>> {
        self.functions.get(name).cloned()
    }

    pub fn signature(&self, function: &str) -> Option<&Value> {
        self.signatures.get(function)
    }

    /// Function names in sorted order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProviderPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderPackage")
            .field("name", &self.name)
            .field("functions", &self.signatures.keys().collect::<Vec<_>>())
            .finish()
    }
}
