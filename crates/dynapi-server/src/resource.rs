//! Resources whose documents live in another system, converted by a codec.
//!
//! Inbound documents are encoded to the codec's target type before they
//! reach the store; everything read back is decoded to the source type.
//! Names may carry an instance (`sub@parent`), which picks the store and is
//! stripped from the name the store sees.

use async_trait::async_trait;
use dynapi_core::{
    CompoundName, LabelSelector, Requirement, SelectorOperator, TypeDescriptor, document,
    subresource::{parent_from_selector, resolve_parent},
};
use dynapi_db_memory::DynBackingStore;
use dynapi_storage::{ListOptions, ObjectKey};
use dynapi_template::TransformationCodec;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::apiserver::{DeleteOutcome, HandlerError, ListQuery, RequestContext, ResourceHandler, UpdatePatch};
use crate::instances::{INSTANCE_LABEL_KEY, StoreSet};

const DEFAULT_NAMESPACE: &str = "default";

pub struct DynamicResource {
    codec: TransformationCodec,
    stores: StoreSet,
}

impl DynamicResource {
    pub fn new(codec: TransformationCodec, stores: StoreSet) -> Self {
        Self { codec, stores }
    }

    pub fn codec(&self) -> &TransformationCodec {
        &self.codec
    }

    fn target(&self) -> &TypeDescriptor {
        self.codec.target()
    }

    fn store_for(&self, parent: &str) -> Result<&DynBackingStore, HandlerError> {
        self.stores
            .resolve(parent)
            .ok_or_else(|| HandlerError::not_found(format!("instance \"{parent}\" is not configured")))
    }

    /// Namespace the target document lives in.
    fn target_namespace(&self, ctx: &RequestContext, doc: Option<&Value>) -> Option<String> {
        if !self.target().namespaced() {
            return None;
        }
        ctx.namespace()
            .or_else(|| doc.and_then(document::namespace))
            .or(Some(DEFAULT_NAMESPACE))
            .map(str::to_string)
    }

    fn key(&self, ctx: &RequestContext, name: &CompoundName) -> ObjectKey {
        ObjectKey::new(self.target_namespace(ctx, None).as_deref(), name.sub.clone())
    }

    /// Forces the store-side identity onto an encoded document.
    fn place(&self, encoded: &mut Value, name: &CompoundName, namespace: Option<&str>) -> Result<(), HandlerError> {
        document::set_name(encoded, &name.sub)?;
        if let Some(ns) = namespace {
            document::set_namespace(encoded, ns)?;
        }
        Ok(())
    }

    /// Decodes a stored document and restores the API-side name.
    async fn decode(&self, ctx: &RequestContext, stored: &Value, name: &CompoundName) -> Result<Value, HandlerError> {
        let mut decoded = self.codec.decode(stored, &ctx.cancel).await?;
        if !self.stores.is_default(&name.parent) {
            let sub = document::name(&decoded).unwrap_or(&name.sub).to_string();
            document::set_name(&mut decoded, &CompoundName::new(sub, name.parent.clone()).to_string())?;
        }
        Ok(decoded)
    }
}

fn instance_selector(doc: &Value) -> LabelSelector {
    match document::labels(doc).remove(INSTANCE_LABEL_KEY) {
        Some(parent) => LabelSelector::from_requirements(vec![Requirement {
            key: INSTANCE_LABEL_KEY.to_string(),
            operator: SelectorOperator::Equals,
            values: [parent].into_iter().collect(),
        }]),
        None => LabelSelector::everything(),
    }
}

#[async_trait]
impl ResourceHandler for DynamicResource {
    fn descriptor(&self) -> &TypeDescriptor {
        self.codec.source()
    }

    #[instrument(skip(self, ctx), fields(resource = %self.descriptor().resource()))]
    async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Value, HandlerError> {
        let name = CompoundName::parse(name);
        let store = self.store_for(&name.parent)?;
        let stored = store.get(self.target(), &self.key(ctx, &name)).await?;
        self.decode(ctx, &stored, &name).await
    }

    #[instrument(skip(self, ctx, query), fields(resource = %self.descriptor().resource()))]
    async fn list(&self, ctx: &RequestContext, query: &ListQuery) -> Result<Vec<Value>, HandlerError> {
        let parent = parent_from_selector(&query.label_selector, INSTANCE_LABEL_KEY);
        let store = self.store_for(&parent)?;

        let mut options = ListOptions::new()
            .with_label_selector(query.label_selector.without(INSTANCE_LABEL_KEY));
        if self.target().namespaced() {
            options = options.in_namespace(ctx.namespace());
        }
        // zero means no limit
        let limit = query.limit.filter(|&n| n > 0);
        let filter_names = !query.field_selector.is_empty();
        if let (false, Some(limit)) = (filter_names, limit) {
            options = options.with_limit(limit);
        }

        let stored = store.list(self.target(), &options).await?;
        let mut items = Vec::with_capacity(stored.len());
        for doc in &stored {
            let sub = document::name(doc).unwrap_or_default();
            let decoded = self
                .decode(ctx, doc, &CompoundName::new(sub, parent.clone()))
                .await?;
            if query.field_selector.matches(&decoded) {
                items.push(decoded);
            }
        }
        if let (true, Some(limit)) = (filter_names, limit) {
            items.truncate(limit);
        }
        debug!(count = items.len(), "Listed dynamic resources");
        Ok(items)
    }

    #[instrument(skip(self, ctx, doc), fields(resource = %self.descriptor().resource()))]
    async fn create(&self, ctx: &RequestContext, mut doc: Value) -> Result<Value, HandlerError> {
        let requested = document::name(&doc)
            .ok_or_else(|| HandlerError::bad_request("metadata.name is required"))?
            .to_string();
        let name = resolve_parent(Some(&requested), &instance_selector(&doc), INSTANCE_LABEL_KEY)?;
        let store = self.store_for(&name.parent)?;

        if self.descriptor().namespaced() {
            match (ctx.namespace(), document::namespace(&doc)) {
                (Some(url_ns), Some(doc_ns)) if url_ns != doc_ns => {
                    return Err(HandlerError::bad_request(format!(
                        "the namespace of the object ({doc_ns}) does not match the namespace on the request ({url_ns})"
                    )));
                }
                (Some(url_ns), None) => document::set_namespace(&mut doc, url_ns)?,
                _ => {}
            }
        }
        document::set_name(&mut doc, &name.sub)?;

        let namespace = self.target_namespace(ctx, Some(&doc));
        let mut encoded = self.codec.encode(&doc, &ctx.cancel).await?;
        self.place(&mut encoded, &name, namespace.as_deref())?;
        let stored = store.create(self.target(), &encoded).await?;
        self.decode(ctx, &stored, &name).await
    }

    #[instrument(skip(self, ctx, patch), fields(resource = %self.descriptor().resource()))]
    async fn update(&self, ctx: &RequestContext, name: &str, patch: UpdatePatch) -> Result<Value, HandlerError> {
        let requested = name;
        let name = CompoundName::parse(name);
        let store = self.store_for(&name.parent)?;
        let key = self.key(ctx, &name);

        let stored = store.get(self.target(), &key).await?;
        let current = self.decode(ctx, &stored, &name).await?;
        let mut updated = patch.apply(current)?;

        let source = self.descriptor();
        if document::api_version(&updated) != Some(source.api_version().as_str())
            || document::kind(&updated) != Some(source.kind())
        {
            return Err(HandlerError::bad_request("apiVersion and kind cannot be changed"));
        }
        match document::name(&updated) {
            Some(n) if n == requested || n == name.sub => {}
            Some(n) => {
                return Err(HandlerError::bad_request(format!(
                    "metadata.name cannot be changed from {requested} to {n}"
                )));
            }
            None => {}
        }
        document::set_name(&mut updated, &name.sub)?;

        let mut encoded = self.codec.encode(&updated, &ctx.cancel).await?;
        self.place(&mut encoded, &name, key.namespace.as_deref())?;
        if document::resource_version(&encoded).is_none() {
            if let Some(version) = document::resource_version(&stored) {
                document::set_resource_version(&mut encoded, version)?;
            }
        }
        let stored = store.update(self.target(), &encoded).await?;
        self.decode(ctx, &stored, &name).await
    }

    #[instrument(skip(self, ctx), fields(resource = %self.descriptor().resource()))]
    async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<DeleteOutcome, HandlerError> {
        let name = CompoundName::parse(name);
        let store = self.store_for(&name.parent)?;
        let key = self.key(ctx, &name);

        let existing = match store.get(self.target(), &key).await {
            Ok(stored) => Some(self.decode(ctx, &stored, &name).await?),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        match (store.delete(self.target(), &key).await, existing) {
            (Ok(()), Some(doc)) => Ok(DeleteOutcome::Deleted(doc)),
            (Ok(()), None) => Ok(DeleteOutcome::AlreadyGone),
            (Err(e), None) if e.is_not_found() => Ok(DeleteOutcome::AlreadyGone),
            (Err(e), _) => Err(e.into()),
        }
    }
}
