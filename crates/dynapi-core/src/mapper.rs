//! Resolution of kinds to resource names and scope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::GroupVersionKind;

/// Resource name and scope for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub resource: String,
    pub namespaced: bool,
}

impl ResourceMapping {
    /// The fallback rule: `lowercase(kind) + "s"`, namespaced.
    pub fn default_for(kind: &str) -> Self {
        Self {
            resource: format!("{}s", kind.to_lowercase()),
            namespaced: true,
        }
    }
}

/// Maps kinds to REST resources.
pub trait RestMapper: Send + Sync {
    fn resolve(&self, gvk: &GroupVersionKind) -> ResourceMapping;
}

/// Mapper that always applies the fallback rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRestMapper;

impl RestMapper for DefaultRestMapper {
    fn resolve(&self, gvk: &GroupVersionKind) -> ResourceMapping {
        ResourceMapping::default_for(&gvk.kind)
    }
}

/// Mapper backed by a fixed table, falling back to the default rule for unknown kinds.
///
/// Comes pre-populated with a handful of well-known core kinds whose
/// resource names or scope differ from the fallback.
#[derive(Debug, Clone)]
pub struct StaticRestMapper {
    mappings: HashMap<(String, String), ResourceMapping>,
}

impl StaticRestMapper {
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    /// A mapper knowing the common core kinds.
    pub fn with_core_kinds() -> Self {
        let mut mapper = Self::new();
        for (kind, resource, namespaced) in [
            ("ConfigMap", "configmaps", true),
            ("Secret", "secrets", true),
            ("Service", "services", true),
            ("Pod", "pods", true),
            ("Namespace", "namespaces", false),
            ("Node", "nodes", false),
            ("Endpoints", "endpoints", true),
        ] {
            mapper.insert("v1", kind, resource, namespaced);
        }
        mapper
    }

    /// Adds or replaces a mapping for `apiVersion`/`kind`.
    pub fn insert(
        &mut self,
        api_version: impl Into<String>,
        kind: impl Into<String>,
        resource: impl Into<String>,
        namespaced: bool,
    ) {
        self.mappings.insert(
            (api_version.into(), kind.into()),
            ResourceMapping {
                resource: resource.into(),
                namespaced,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for StaticRestMapper {
    fn default() -> Self {
        Self::with_core_kinds()
    }
}

impl RestMapper for StaticRestMapper {
    fn resolve(&self, gvk: &GroupVersionKind) -> ResourceMapping {
        self.mappings
            .get(&(gvk.api_version(), gvk.kind.clone()))
            .cloned()
            .unwrap_or_else(|| ResourceMapping::default_for(&gvk.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::GroupVersion;

    #[test]
    fn test_default_mapper() {
        let gvk = GroupVersion::new("x.io", "v1").with_kind("Foo");
        assert_eq!(
            DefaultRestMapper.resolve(&gvk),
            ResourceMapping {
                resource: "foos".into(),
                namespaced: true
            }
        );
    }

    #[test]
    fn test_static_mapper_known_and_fallback() {
        let mut mapper = StaticRestMapper::with_core_kinds();
        mapper.insert("x.io/v1", "Policy", "policies", false);

        let ns = mapper.resolve(&GroupVersion::new("", "v1").with_kind("Namespace"));
        assert_eq!(ns.resource, "namespaces");
        assert!(!ns.namespaced);

        let policy = mapper.resolve(&GroupVersion::new("x.io", "v1").with_kind("Policy"));
        assert_eq!(policy.resource, "policies");
        assert!(!policy.namespaced);

        let unknown = mapper.resolve(&GroupVersion::new("x.io", "v1").with_kind("Widget"));
        assert_eq!(unknown.resource, "widgets");
        assert!(unknown.namespaced);
    }
}
