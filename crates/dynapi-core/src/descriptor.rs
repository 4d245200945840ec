//! Type descriptors identifying document schemas.
//!
//! A [`TypeDescriptor`] names a schema by group, version and kind, plus the
//! derived list kind and the pluralized resource name used in URLs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::mapper::RestMapper;

/// API group and version pair. The core group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersion {
    pub group: String,
    pub version: String,
}

impl GroupVersion {
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// Parses an `apiVersion` value: `"group/version"` or `"version"` for the core group.
    pub fn parse(api_version: &str) -> Result<Self> {
        let api_version = api_version.trim();
        if api_version.is_empty() {
            return Err(CoreError::invalid_group_version(api_version));
        }
        let mut parts = api_version.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(version), None, None) => Ok(Self::new("", version)),
            (Some(group), Some(version), None) if !group.is_empty() && !version.is_empty() => {
                Ok(Self::new(group, version))
            }
            _ => Err(CoreError::invalid_group_version(api_version)),
        }
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    pub fn with_kind(&self, kind: impl Into<String>) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: kind.into(),
        }
    }

    pub fn with_resource(&self, resource: impl Into<String>) -> GroupVersionResource {
        GroupVersionResource {
            group: self.group.clone(),
            version: self.version.clone(),
            resource: resource.into(),
        }
    }

    /// URL prefix under which the group version is served.
    pub fn api_prefix(&self) -> String {
        if self.is_core() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}/{}", self.group, self.version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }

    pub fn api_version(&self) -> String {
        self.group_version().to_string()
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.group_version(), self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Resource={}", self.group_version(), self.resource)
    }
}

/// Identifies a document schema.
///
/// Kind and list kind share the same group version. The resource name and
/// scope come from a [`RestMapper`], which falls back to `lowercase(kind) + "s"`
/// and namespaced scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    group_version: GroupVersion,
    kind: String,
    list_kind: String,
    resource: String,
    namespaced: bool,
}

impl TypeDescriptor {
    /// Builds a descriptor from an `apiVersion`/`kind` pair.
    pub fn new(api_version: &str, kind: &str, mapper: &dyn RestMapper) -> Result<Self> {
        let group_version = GroupVersion::parse(api_version)?;
        if kind.trim().is_empty() {
            return Err(CoreError::InvalidKind);
        }
        let mapping = mapper.resolve(&group_version.with_kind(kind));
        Ok(Self {
            list_kind: format!("{kind}List"),
            kind: kind.to_string(),
            resource: mapping.resource,
            namespaced: mapping.namespaced,
            group_version,
        })
    }

    pub fn group_version(&self) -> &GroupVersion {
        &self.group_version
    }

    pub fn group(&self) -> &str {
        &self.group_version.group
    }

    pub fn version(&self) -> &str {
        &self.group_version.version
    }

    pub fn api_version(&self) -> String {
        self.group_version.to_string()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn list_kind(&self) -> &str {
        &self.list_kind
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Singular resource name, lowercase kind.
    pub fn singular(&self) -> String {
        self.kind.to_lowercase()
    }

    pub fn namespaced(&self) -> bool {
        self.namespaced
    }

    pub fn gvk(&self) -> GroupVersionKind {
        self.group_version.with_kind(self.kind.clone())
    }

    pub fn list_gvk(&self) -> GroupVersionKind {
        self.group_version.with_kind(self.list_kind.clone())
    }

    pub fn gvr(&self) -> GroupVersionResource {
        self.group_version.with_resource(self.resource.clone())
    }

    /// Whether the two descriptors name the same group, version and kind.
    pub fn same_type(&self, other: &TypeDescriptor) -> bool {
        self.group_version == other.group_version && self.kind == other.kind
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.group_version)
    }
}
