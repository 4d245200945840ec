//! HTTP surface of the dynamic API: discovery plus CRUD on mounted resources.
//!
//! Everything below `/api` and `/apis` goes through catch-all routes and is
//! resolved against the router's current mount table on each request.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use dynapi_api::{ApiError, ApiResponse, PatchFormat, Status};
use dynapi_core::{FieldSelector, GroupVersion, LabelSelector, TypeDescriptor, document};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::handler::{DeleteOutcome, ListQuery, RequestContext, ResourceHandler, UpdatePatch};
use crate::server::AppState;

/// What a request path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Group(String),
    ResourceList(GroupVersion),
    Collection {
        gv: GroupVersion,
        resource: String,
        namespace: Option<String>,
    },
    Item {
        gv: GroupVersion,
        resource: String,
        namespace: Option<String>,
        name: String,
    },
}

impl Target {
    /// Parses the part after `/apis/` (`core = false`) or `/api/` (`core = true`).
    pub fn parse(rest: &str, core: bool) -> Option<Self> {
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let (gv, tail) = if core {
            let (version, tail) = segments.split_first()?;
            (GroupVersion::new("", *version), tail)
        } else {
            match segments.as_slice() {
                [group] => return Some(Target::Group(group.to_string())),
                [group, version, tail @ ..] => (GroupVersion::new(*group, *version), tail),
                _ => return None,
            }
        };

        let (namespace, tail) = match tail {
            ["namespaces", ns, rest @ ..] if !rest.is_empty() => (Some(ns.to_string()), rest),
            _ => (None, tail),
        };
        match tail {
            [] if namespace.is_none() => Some(Target::ResourceList(gv)),
            [resource] => Some(Target::Collection {
                gv,
                resource: resource.to_string(),
                namespace,
            }),
            [resource, name] => Some(Target::Item {
                gv,
                resource: resource.to_string(),
                namespace,
                name: name.to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<usize>,
}

impl ResourceQuery {
    fn to_list_query(&self) -> Result<ListQuery, ApiError> {
        let label_selector = match self.label_selector.as_deref() {
            Some(s) => LabelSelector::parse(s).map_err(|e| ApiError::bad_request(e.to_string()))?,
            None => LabelSelector::everything(),
        };
        let field_selector = match self.field_selector.as_deref() {
            Some(s) => FieldSelector::parse(s).map_err(|e| ApiError::bad_request(e.to_string()))?,
            None => FieldSelector::default(),
        };
        Ok(ListQuery {
            label_selector,
            field_selector,
            limit: self.limit,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api", get(core_versions))
        .route("/apis", get(group_list))
        .route("/api/{*rest}", any(dispatch_core))
        .route("/apis/{*rest}", any(dispatch_named))
}

async fn core_versions(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.api.snapshot().core_versions()).into_response()
}

async fn group_list(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.api.snapshot().group_list()).into_response()
}

async fn dispatch_core(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<ResourceQuery>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let target = Target::parse(&rest, true).ok_or_else(|| not_found_path(&rest))?;
    dispatch(&state, target, &query, method, &headers, body).await
}

async fn dispatch_named(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<ResourceQuery>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let target = Target::parse(&rest, false).ok_or_else(|| not_found_path(&rest))?;
    dispatch(&state, target, &query, method, &headers, body).await
}

fn not_found_path(path: &str) -> ApiError {
    ApiError::not_found(format!("the server could not find the requested resource: {path}"))
}

async fn dispatch(
    state: &AppState,
    target: Target,
    query: &ResourceQuery,
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    debug!(method = %method, target = ?target, "Dispatching dynamic API request");
    let table = state.api.snapshot();

    match target {
        Target::Group(name) => {
            only_get(&method)?;
            let group = table
                .api_group(&name)
                .ok_or_else(|| not_found_path(&name))?;
            Ok(ApiResponse::ok(group).into_response())
        }
        Target::ResourceList(gv) => {
            only_get(&method)?;
            let list = table
                .resource_list(&gv)
                .ok_or_else(|| not_found_path(&gv.to_string()))?;
            Ok(ApiResponse::ok(list).into_response())
        }
        Target::Collection {
            gv,
            resource,
            namespace,
        } => {
            let handler = table
                .handler(&gv, &resource)
                .cloned()
                .ok_or_else(|| not_found_path(&resource))?;
            drop(table);
            check_scope(handler.descriptor(), namespace.as_deref(), None)?;
            let ctx = RequestContext::new(namespace);
            let _cancel_on_drop = ctx.cancel.clone().drop_guard();

            match method {
                Method::GET => list(handler, &ctx, query, headers).await,
                Method::POST => {
                    let doc = parse_document(&body, handler.descriptor())?;
                    let created = handler.create(&ctx, doc).await?;
                    let mut response = ApiResponse::created(created.clone());
                    if let Some(location) = location_of(handler.descriptor(), &ctx, &created) {
                        response = response.with_header(header::LOCATION, location);
                    }
                    Ok(response.into_response())
                }
                other => Err(method_not_allowed(&other, &resource)),
            }
        }
        Target::Item {
            gv,
            resource,
            namespace,
            name,
        } => {
            let handler = table
                .handler(&gv, &resource)
                .cloned()
                .ok_or_else(|| not_found_path(&resource))?;
            drop(table);
            check_scope(handler.descriptor(), namespace.as_deref(), Some(&name))?;
            let ctx = RequestContext::new(namespace);
            let _cancel_on_drop = ctx.cancel.clone().drop_guard();

            match method {
                Method::GET => Ok(ApiResponse::ok(handler.get(&ctx, &name).await?).into_response()),
                Method::PUT => {
                    let mut doc = parse_document(&body, handler.descriptor())?;
                    match document::name(&doc) {
                        Some(body_name) if body_name != name => {
                            return Err(ApiError::bad_request(format!(
                                "the name of the object ({body_name}) does not match the name on the URL ({name})"
                            )));
                        }
                        Some(_) => {}
                        None => document::set_name(&mut doc, &name)
                            .map_err(|e| ApiError::bad_request(e.to_string()))?,
                    }
                    let updated = handler.update(&ctx, &name, UpdatePatch::Replace(doc)).await?;
                    Ok(ApiResponse::ok(updated).into_response())
                }
                Method::PATCH => {
                    let patch = match dynapi_api::patch_format(headers)? {
                        PatchFormat::Merge => UpdatePatch::MergePatch(parse_json(&body)?),
                        PatchFormat::Json => UpdatePatch::JsonPatch(
                            serde_json::from_slice(&body)
                                .map_err(|e| ApiError::bad_request(format!("invalid JSON patch: {e}")))?,
                        ),
                    };
                    let updated = handler.update(&ctx, &name, patch).await?;
                    Ok(ApiResponse::ok(updated).into_response())
                }
                Method::DELETE => match handler.delete(&ctx, &name).await? {
                    DeleteOutcome::Deleted(doc) => Ok(ApiResponse::ok(doc).into_response()),
                    DeleteOutcome::AlreadyGone => Ok(ApiResponse::ok(Status::success(format!(
                        "{resource} \"{name}\" already deleted"
                    )))
                    .into_response()),
                },
                other => Err(method_not_allowed(&other, &resource)),
            }
        }
    }
}

async fn list(
    handler: Arc<dyn ResourceHandler>,
    ctx: &RequestContext,
    query: &ResourceQuery,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let items = handler.list(ctx, &query.to_list_query()?).await?;
    if dynapi_api::wants_table(headers) {
        return Ok(ApiResponse::ok(handler.convert_to_table(&items)).into_response());
    }
    let descriptor = handler.descriptor();
    Ok(ApiResponse::ok(json!({
        "apiVersion": descriptor.api_version(),
        "kind": descriptor.list_kind(),
        "metadata": {},
        "items": items,
    }))
    .into_response())
}

fn only_get(method: &Method) -> Result<(), ApiError> {
    if *method == Method::GET {
        Ok(())
    } else {
        Err(ApiError::method_not_allowed(format!("{method} is not supported on discovery documents")))
    }
}

fn method_not_allowed(method: &Method, resource: &str) -> ApiError {
    ApiError::method_not_allowed(format!("{method} is not supported on {resource}"))
}

fn check_scope(descriptor: &TypeDescriptor, namespace: Option<&str>, name: Option<&str>) -> Result<(), ApiError> {
    if namespace.is_some() && !descriptor.namespaced() {
        return Err(ApiError::not_found(format!(
            "{} is cluster scoped and cannot be addressed in a namespace",
            descriptor.resource()
        )));
    }
    if name.is_some() && namespace.is_none() && descriptor.namespaced() {
        return Err(ApiError::not_found(format!(
            "{} is namespaced; use /namespaces/{{namespace}}/{}",
            descriptor.resource(),
            descriptor.resource()
        )));
    }
    Ok(())
}

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is empty"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

/// Parses a request body and checks its type stamp, filling it in when absent.
fn parse_document(body: &Bytes, descriptor: &TypeDescriptor) -> Result<Value, ApiError> {
    let mut doc = parse_json(body)?;
    if !doc.is_object() {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    }
    let api_version = descriptor.api_version();
    match (document::api_version(&doc), document::kind(&doc)) {
        (None, None) => {
            document::stamp(&mut doc, &descriptor.gvk()).map_err(|e| ApiError::bad_request(e.to_string()))?;
        }
        (Some(v), Some(k)) if v == api_version && k == descriptor.kind() => {}
        (v, k) => {
            return Err(ApiError::bad_request(format!(
                "expected {api_version}, Kind={}, got {}, Kind={}",
                descriptor.kind(),
                v.unwrap_or("<none>"),
                k.unwrap_or("<none>")
            )));
        }
    }
    Ok(doc)
}

fn location_of(descriptor: &TypeDescriptor, ctx: &RequestContext, created: &Value) -> Option<HeaderValue> {
    let name = document::name(created)?;
    let prefix = descriptor.group_version().api_prefix();
    let path = match ctx.namespace() {
        Some(ns) => format!("{prefix}/namespaces/{ns}/{}/{name}", descriptor.resource()),
        None => format!("{prefix}/{}/{name}", descriptor.resource()),
    };
    HeaderValue::from_str(&path).ok()
}
