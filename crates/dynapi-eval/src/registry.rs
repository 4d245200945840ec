//! Thread-safe provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::EvalError;
use crate::function::ProviderFn;
use crate::package::ProviderPackage;

/// Name to [`ProviderPackage`] map shared by all evaluations.
///
/// Registration takes the write lock; lookups only take the read lock for
/// the duration of the map access.
#[derive(Default)]
pub struct ProviderRegistry {
    packages: RwLock<HashMap<String, Arc<ProviderPackage>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `package`, replacing any package with the same name.
    pub fn register(&self, package: ProviderPackage) {
        let name = package.name().to_string();
        tracing::debug!(provider = %name, "Registering provider package");
        self.packages.write().insert(name, Arc::new(package));
    }

    pub fn package(&self, name: &str) -> Option<Arc<ProviderPackage>> {
        self.packages.read().get(name).cloned()
    }

    /// Resolves `function` in `provider`.
    pub fn function(&self, provider: &str, function: &str) -> Result<Arc<dyn ProviderFn>, EvalError> {
        let package = self
            .package(provider)
            .ok_or_else(|| EvalError::ProviderNotFound(provider.to_string()))?;
        package
            .function(function)
            .ok_or_else(|| EvalError::FunctionNotFound {
                provider: provider.to_string(),
                function: function.to_string(),
            })
    }

    /// Signature skeleton of `provider.function`, if both are known.
    pub fn signature(&self, provider: &str, function: &str) -> Option<Value> {
        self.package(provider)?.signature(function).cloned()
    }

    /// Registered package names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.packages.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.packages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.read().is_empty()
    }

    /// Independent registry holding the same packages.
    ///
    /// Later registrations on either side are not visible to the other.
    pub fn snapshot(&self) -> Self {
        Self {
            packages: RwLock::new(self.packages.read().clone()),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("packages", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::function::typed;

    fn package(name: &str) -> ProviderPackage {
        ProviderPackage::new(
            name,
            "do: {}\n",
            HashMap::from([(
                "do".to_string(),
                typed(|_ctx, params: Value| async move { Ok::<_, ProviderError>(params) }),
            )]),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_errors() {
        let registry = ProviderRegistry::new();
        registry.register(package("test"));

        assert!(registry.function("test", "do").is_ok());
        assert_eq!(
            registry.function("missing", "do").err().map(|e| e.to_string()),
            Some("provider missing not found".to_string())
        );
        assert_eq!(
            registry.function("test", "undo").err().map(|e| e.to_string()),
            Some("function undo not found in provider test".to_string())
        );
    }

    #[test]
    fn test_snapshot_is_independent() {
        let registry = ProviderRegistry::new();
        registry.register(package("a"));
        let copy = registry.snapshot();
        copy.register(package("b"));

        assert_eq!(registry.names(), vec!["a"]);
        assert_eq!(copy.names(), vec!["a", "b"]);
        assert_eq!(copy.len(), 2);
    }
}
