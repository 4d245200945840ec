//! Mutable resource routing and discovery state.
//!
//! Writers serialize on one lock and publish a fresh [`MountTable`] through
//! an atomic pointer. Readers load the current table without locking, so a
//! request sees either the table before a registration change or the one
//! after it, never a half-mounted group version.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dynapi_api::{ApiGroup, ApiGroupList, ApiResource, ApiResourceList, ApiVersions, RESOURCE_VERBS};
use dynapi_core::{GroupVersion, GroupVersionKind, TypeDescriptor};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::handler::ResourceHandler;

pub type DynResourceHandler = Arc<dyn ResourceHandler>;

/// Discovery entry for one API group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDiscovery {
    /// Versions in registration order.
    pub versions: Vec<String>,
    pub preferred: String,
}

/// Snapshot of everything the router serves.
#[derive(Clone, Default)]
pub struct MountTable {
    scheme: HashMap<GroupVersionKind, TypeDescriptor>,
    routes: HashMap<GroupVersion, BTreeMap<String, DynResourceHandler>>,
    discovery: BTreeMap<String, GroupDiscovery>,
}

impl MountTable {
    /// Handler mounted for `resource` in `gv`.
    pub fn handler(&self, gv: &GroupVersion, resource: &str) -> Option<&DynResourceHandler> {
        self.routes.get(gv)?.get(resource)
    }

    pub fn is_mounted(&self, gv: &GroupVersion) -> bool {
        self.routes.contains_key(gv)
    }

    /// Type registered for `gvk`, covering both kinds and list kinds.
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> Option<&TypeDescriptor> {
        self.scheme.get(gvk)
    }

    pub fn group(&self, name: &str) -> Option<&GroupDiscovery> {
        self.discovery.get(name)
    }

    pub fn mounted_group_versions(&self) -> usize {
        self.routes.len()
    }

    /// `/apis` document. The core group is served under `/api` and left out.
    pub fn group_list(&self) -> ApiGroupList {
        ApiGroupList::new(
            self.discovery
                .iter()
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, entry)| ApiGroup::new(name, &entry.versions, &entry.preferred))
                .collect(),
        )
    }

    pub fn api_group(&self, name: &str) -> Option<ApiGroup> {
        self.discovery
            .get(name)
            .map(|entry| ApiGroup::new(name, &entry.versions, &entry.preferred))
    }

    /// `/api` document listing the core group versions.
    pub fn core_versions(&self) -> ApiVersions {
        ApiVersions::new(
            self.discovery
                .get("")
                .map(|entry| entry.versions.clone())
                .unwrap_or_default(),
        )
    }

    pub fn resource_list(&self, gv: &GroupVersion) -> Option<ApiResourceList> {
        let handlers = self.routes.get(gv)?;
        let resources = handlers
            .iter()
            .map(|(name, handler)| {
                let descriptor = handler.descriptor();
                ApiResource {
                    name: name.clone(),
                    singular_name: descriptor.singular(),
                    namespaced: descriptor.namespaced(),
                    kind: descriptor.kind().to_string(),
                    verbs: RESOURCE_VERBS.iter().map(|v| v.to_string()).collect(),
                }
            })
            .collect();
        Some(ApiResourceList::new(gv.to_string(), resources))
    }

    fn mount(&mut self, descriptor: &TypeDescriptor, handler: DynResourceHandler) {
        let gv = descriptor.group_version().clone();
        self.scheme.insert(descriptor.gvk(), descriptor.clone());
        self.scheme.insert(descriptor.list_gvk(), descriptor.clone());

        match self.discovery.get_mut(&gv.group) {
            None => {
                self.discovery.insert(
                    gv.group.clone(),
                    GroupDiscovery {
                        versions: vec![gv.version.clone()],
                        preferred: gv.version.clone(),
                    },
                );
            }
            Some(entry) => {
                if !entry.versions.contains(&gv.version) {
                    entry.versions.push(gv.version.clone());
                }
            }
        }

        self.routes
            .entry(gv)
            .or_default()
            .insert(descriptor.resource().to_string(), handler);
    }

    /// Returns whether a handler was mounted for `descriptor`.
    fn unmount(&mut self, descriptor: &TypeDescriptor) -> bool {
        let gv = descriptor.group_version();
        self.scheme.remove(&descriptor.gvk());
        self.scheme.remove(&descriptor.list_gvk());

        let Some(handlers) = self.routes.get_mut(gv) else {
            return false;
        };
        let removed = handlers.remove(descriptor.resource()).is_some();
        if !handlers.is_empty() {
            return removed;
        }
        self.routes.remove(gv);

        if let Some(entry) = self.discovery.get_mut(&gv.group) {
            entry.versions.retain(|v| v != &gv.version);
            if entry.versions.is_empty() {
                self.discovery.remove(&gv.group);
            } else if entry.preferred == gv.version {
                entry.preferred = entry.versions[0].clone();
            }
        }
        removed
    }
}

/// Owns the route table, discovery catalog and type scheme.
pub struct DynamicApiServer {
    write_lock: Mutex<()>,
    table: ArcSwap<MountTable>,
}

impl DynamicApiServer {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            table: ArcSwap::from_pointee(MountTable::default()),
        }
    }

    /// Current table. Holding it does not block registration changes.
    pub fn snapshot(&self) -> Arc<MountTable> {
        self.table.load_full()
    }

    /// Mounts `handler` under its descriptor's group, version and resource,
    /// replacing any handler already mounted there.
    #[instrument(skip(self, handler), fields(group = %handler.descriptor().group(), version = %handler.descriptor().version(), resource = %handler.descriptor().resource()))]
    pub fn add_resource(&self, handler: DynResourceHandler) {
        let descriptor = handler.descriptor().clone();
        let _guard = self.write_lock.lock();
        let mut next = MountTable::clone(&self.table.load());
        next.mount(&descriptor, handler);
        self.table.store(Arc::new(next));
        info!(kind = %descriptor.kind(), "Mounted resource");
    }

    /// Unmounts the resource named by `descriptor`. Returns whether it was mounted.
    #[instrument(skip(self, descriptor), fields(group = %descriptor.group(), version = %descriptor.version(), resource = %descriptor.resource()))]
    pub fn remove_resource(&self, descriptor: &TypeDescriptor) -> bool {
        let _guard = self.write_lock.lock();
        let mut next = MountTable::clone(&self.table.load());
        let removed = next.unmount(descriptor);
        self.table.store(Arc::new(next));
        if removed {
            info!("Unmounted resource");
        } else {
            debug!("Resource was not mounted");
        }
        removed
    }

    /// Replaces `old` with `handler` in two ordered steps.
    pub fn update_resource(&self, old: &TypeDescriptor, handler: DynResourceHandler) {
        self.remove_resource(old);
        self.add_resource(handler);
    }
}

impl Default for DynamicApiServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apiserver::handler::{DeleteOutcome, HandlerError, ListQuery, RequestContext, UpdatePatch};
    use async_trait::async_trait;
    use dynapi_core::DefaultRestMapper;
    use serde_json::Value;

    struct Stub(TypeDescriptor);

    #[async_trait]
    impl ResourceHandler for Stub {
        fn descriptor(&self) -> &TypeDescriptor {
            &self.0
        }
        async fn get(&self, _: &RequestContext, name: &str) -> Result<Value, HandlerError> {
            Err(HandlerError::not_found(name))
        }
        async fn list(&self, _: &RequestContext, _: &ListQuery) -> Result<Vec<Value>, HandlerError> {
            Ok(Vec::new())
        }
        async fn create(&self, _: &RequestContext, doc: Value) -> Result<Value, HandlerError> {
            Ok(doc)
        }
        async fn update(&self, _: &RequestContext, name: &str, _: UpdatePatch) -> Result<Value, HandlerError> {
            Err(HandlerError::not_found(name))
        }
        async fn delete(&self, _: &RequestContext, _: &str) -> Result<DeleteOutcome, HandlerError> {
            Ok(DeleteOutcome::AlreadyGone)
        }
    }

    fn descriptor(api_version: &str, kind: &str) -> TypeDescriptor {
        TypeDescriptor::new(api_version, kind, &DefaultRestMapper).unwrap()
    }

    fn stub(api_version: &str, kind: &str) -> DynResourceHandler {
        Arc::new(Stub(descriptor(api_version, kind)))
    }

    #[test]
    fn test_versions_follow_registration() {
        let server = DynamicApiServer::new();
        server.add_resource(stub("g/v1", "R1"));
        let table = server.snapshot();
        let group = table.group("g").unwrap();
        assert_eq!(group.versions, vec!["v1"]);
        assert_eq!(group.preferred, "v1");

        server.add_resource(stub("g/v2", "R2"));
        let group = server.snapshot().group("g").cloned().unwrap();
        assert_eq!(group.versions, vec!["v1", "v2"]);
        assert_eq!(group.preferred, "v1");

        assert!(server.remove_resource(&descriptor("g/v1", "R1")));
        let group = server.snapshot().group("g").cloned().unwrap();
        assert_eq!(group.versions, vec!["v2"]);
        assert_eq!(group.preferred, "v2");

        // the snapshot taken earlier is unaffected
        assert!(table.handler(&GroupVersion::new("g", "v1"), "r1s").is_some());
    }

    #[test]
    fn test_last_resource_removes_version_and_group() {
        let server = DynamicApiServer::new();
        server.add_resource(stub("g/v1", "Foo"));
        server.add_resource(stub("g/v1", "Bar"));
        let gv = GroupVersion::new("g", "v1");

        assert!(server.remove_resource(&descriptor("g/v1", "Foo")));
        let table = server.snapshot();
        assert!(table.is_mounted(&gv));
        assert!(table.handler(&gv, "foos").is_none());
        assert!(table.handler(&gv, "bars").is_some());

        assert!(server.remove_resource(&descriptor("g/v1", "Bar")));
        let table = server.snapshot();
        assert!(!table.is_mounted(&gv));
        assert!(table.group("g").is_none());
        assert!(table.group_list().groups.is_empty());
    }

    #[test]
    fn test_group_present_iff_routes_present() {
        let server = DynamicApiServer::new();
        let ops: &[(bool, &str, &str)] = &[
            (true, "a/v1", "X"),
            (true, "a/v2", "X"),
            (true, "b/v1", "Y"),
            (false, "a/v1", "X"),
            (true, "a/v1", "Z"),
            (false, "a/v2", "X"),
            (false, "b/v1", "Y"),
            (false, "a/v1", "Z"),
            (false, "a/v1", "Z"),
        ];
        for (add, api_version, kind) in ops {
            if *add {
                server.add_resource(stub(api_version, kind));
            } else {
                server.remove_resource(&descriptor(api_version, kind));
            }
            let table = server.snapshot();
            for group in ["a", "b"] {
                let has_routes = table.routes.keys().any(|gv| gv.group == group);
                assert_eq!(table.group(group).is_some(), has_routes, "group {group}");
                if let Some(entry) = table.group(group) {
                    assert!(entry.versions.contains(&entry.preferred));
                    for v in &entry.versions {
                        assert!(table.is_mounted(&GroupVersion::new(group, v.as_str())));
                    }
                }
            }
        }
        assert_eq!(server.snapshot().mounted_group_versions(), 0);
    }

    #[test]
    fn test_scheme_tracks_kinds() {
        let server = DynamicApiServer::new();
        let d = descriptor("g/v1", "Foo");
        server.add_resource(stub("g/v1", "Foo"));
        assert!(server.snapshot().recognizes(&d.gvk()).is_some());
        assert!(server.snapshot().recognizes(&d.list_gvk()).is_some());
        server.remove_resource(&d);
        assert!(server.snapshot().recognizes(&d.gvk()).is_none());
    }

    #[test]
    fn test_update_handles_rename() {
        let server = DynamicApiServer::new();
        let old = descriptor("g/v1", "Foo");
        server.add_resource(stub("g/v1", "Foo"));
        server.update_resource(&old, stub("h/v1", "Foo"));
        let table = server.snapshot();
        assert!(table.group("g").is_none());
        assert_eq!(table.group("h").unwrap().preferred, "v1");
    }

    #[test]
    fn test_discovery_documents() {
        let server = DynamicApiServer::new();
        server.add_resource(stub("g/v1", "Foo"));
        server.add_resource(stub("v1", "Bar"));
        let table = server.snapshot();

        let list = table.group_list();
        assert_eq!(list.groups.len(), 1);
        assert_eq!(list.groups[0].name, "g");
        assert_eq!(table.core_versions().versions, vec!["v1"]);

        let resources = table.resource_list(&GroupVersion::new("g", "v1")).unwrap();
        assert_eq!(resources.group_version, "g/v1");
        assert_eq!(resources.resources[0].name, "foos");
        assert_eq!(resources.resources[0].kind, "Foo");
        assert_eq!(resources.resources[0].singular_name, "foo");
    }
}
