//! The capability interface every mounted resource implements.

use async_trait::async_trait;
use dynapi_api::{ApiError, Table, TableColumnDefinition, TableRow};
use dynapi_core::{CoreError, FieldSelector, LabelSelector, TypeDescriptor, document};
use dynapi_eval::{CancellationToken, EvalError};
use dynapi_storage::{ErrorCategory, StorageError};
use dynapi_template::CodecError;
use serde_json::Value;

/// Per-request scope handed to resource handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Namespace from the request path, if any.
    pub namespace: Option<String>,
    /// Cancelled when the client goes away or the request times out.
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(namespace: Option<String>) -> Self {
        Self {
            namespace,
            cancel: CancellationToken::new(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// Parsed list query parameters.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub label_selector: LabelSelector,
    pub field_selector: FieldSelector,
    pub limit: Option<usize>,
}

/// How an update modifies the current object.
#[derive(Debug, Clone)]
pub enum UpdatePatch {
    /// Full replacement (PUT).
    Replace(Value),
    /// RFC 7386 merge patch.
    MergePatch(Value),
    /// RFC 6902 JSON patch.
    JsonPatch(json_patch::Patch),
}

impl UpdatePatch {
    /// Applies the patch to `current`, returning the updated object.
    pub fn apply(self, mut current: Value) -> Result<Value, HandlerError> {
        match self {
            UpdatePatch::Replace(doc) => Ok(doc),
            UpdatePatch::MergePatch(patch) => {
                json_patch::merge(&mut current, &patch);
                Ok(current)
            }
            UpdatePatch::JsonPatch(patch) => {
                json_patch::patch(&mut current, &patch)
                    .map_err(|e| HandlerError::bad_request(format!("invalid JSON patch: {e}")))?;
                Ok(current)
            }
        }
    }
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The object as it was before deletion.
    Deleted(Value),
    /// Nothing was there, before or at deletion time.
    AlreadyGone,
}

/// Errors raised by resource handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    MethodNotSupported(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn method_not_supported(message: impl Into<String>) -> Self {
        Self::MethodNotSupported(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<HandlerError> for ApiError {
    fn from(err: HandlerError) -> Self {
        let message = err.to_string();
        match err {
            HandlerError::BadRequest(_) => ApiError::bad_request(message),
            HandlerError::NotFound(_) => ApiError::not_found(message),
            HandlerError::MethodNotSupported(_) => ApiError::method_not_allowed(message),
            HandlerError::Core(_) => ApiError::bad_request(message),
            HandlerError::Codec(codec) => {
                if codec.is_client_error() {
                    ApiError::bad_request(message)
                } else if matches!(codec, CodecError::Evaluation(EvalError::Cancelled)) {
                    ApiError::internal("request cancelled before completion")
                } else {
                    ApiError::internal(message)
                }
            }
            HandlerError::Storage(storage) => match storage.category() {
                ErrorCategory::NotFound => ApiError::not_found(message),
                ErrorCategory::Conflict => ApiError::conflict(message),
                ErrorCategory::Unauthorized => ApiError::unauthorized(message),
                ErrorCategory::Forbidden => ApiError::forbidden(message),
                ErrorCategory::Validation => ApiError::bad_request(message),
                ErrorCategory::Infrastructure | ErrorCategory::Internal => {
                    ApiError::internal(message)
                }
            },
        }
    }
}

/// A resource type mounted on the router.
///
/// The router only knows this interface; it never inspects concrete types.
/// All documents are shaped as [`ResourceHandler::descriptor`].
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn descriptor(&self) -> &TypeDescriptor;

    async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Value, HandlerError>;

    async fn list(&self, ctx: &RequestContext, query: &ListQuery) -> Result<Vec<Value>, HandlerError>;

    async fn create(&self, ctx: &RequestContext, doc: Value) -> Result<Value, HandlerError>;

    /// Fetches the current object, applies `patch` and replaces it.
    async fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        patch: UpdatePatch,
    ) -> Result<Value, HandlerError>;

    async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<DeleteOutcome, HandlerError>;

    /// Renders objects as a table with name and creation time columns.
    fn convert_to_table(&self, objects: &[Value]) -> Table {
        let columns = vec![
            TableColumnDefinition::new("Name", "string", "name", "Name must be unique within a namespace."),
            TableColumnDefinition::new("Created At", "string", "date-time", "Time the object was created."),
        ];
        let rows = objects
            .iter()
            .map(|obj| TableRow {
                cells: vec![
                    document::name(obj).map(Value::from).unwrap_or(Value::Null),
                    document::creation_timestamp(obj)
                        .map(Value::from)
                        .unwrap_or(Value::Null),
                ],
                object: obj.clone(),
            })
            .collect();
        Table::new(columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_merge_patch_keeps_untouched_fields() {
        let current = json!({"metadata": {"name": "a"}, "spec": {"x": 1, "y": 2}});
        let updated = UpdatePatch::MergePatch(json!({"spec": {"y": null, "z": 3}}))
            .apply(current)
            .unwrap();
        assert_eq!(updated, json!({"metadata": {"name": "a"}, "spec": {"x": 1, "z": 3}}));
    }

    #[test]
    fn test_json_patch_failure_is_bad_request() {
        let patch: json_patch::Patch =
            serde_json::from_value(json!([{"op": "remove", "path": "/missing"}])).unwrap();
        let err = UpdatePatch::JsonPatch(patch).apply(json!({})).unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));
    }

    #[test]
    fn test_error_mapping() {
        let cases: Vec<(HandlerError, StatusCode)> = vec![
            (StorageError::not_found("foos", "a").into(), StatusCode::NOT_FOUND),
            (StorageError::already_exists("foos", "a").into(), StatusCode::CONFLICT),
            (StorageError::conflict("stale").into(), StatusCode::CONFLICT),
            (StorageError::unauthorized("token").into(), StatusCode::UNAUTHORIZED),
            (StorageError::forbidden("denied").into(), StatusCode::FORBIDDEN),
            (StorageError::connection("down").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (CodecError::unmarshal("bad").into(), StatusCode::BAD_REQUEST),
            (CodecError::marshal("bad").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (
                CodecError::from(EvalError::ProviderNotFound("x".into())).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CoreError::ConflictingParent {
                    from_name: "a".into(),
                    from_selector: "b".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (HandlerError::method_not_supported("watch"), StatusCode::METHOD_NOT_ALLOWED),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_storage_message_is_kept() {
        let err: HandlerError = StorageError::not_found("foos", "a").into();
        assert_eq!(ApiError::from(err).message(), "foos \"a\" not found");
    }
}
