//! Wire types shared by the DynAPI HTTP surface.
//!
//! Errors render as `Status` documents, discovery endpoints return the
//! `APIGroupList`/`APIGroup`/`APIResourceList`/`APIVersions` shapes, and
//! clients asking for `as=Table` receive a `Table`.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

// -------------------------
// Status
// -------------------------

/// Failure document returned for every request-time error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Status {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub metadata: Value,
    pub status: String,
    pub message: String,
    pub reason: String,
    pub code: u16,
}

impl Status {
    pub fn failure(reason: &str, message: impl Into<String>, code: StatusCode) -> Self {
        Self {
            kind: "Status".into(),
            api_version: "v1".into(),
            metadata: Value::Object(Default::default()),
            status: "Failure".into(),
            message: message.into(),
            reason: reason.into(),
            code: code.as_u16(),
        }
    }

    /// Returned for operations that succeed without an object to show.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "Success".into(),
            reason: String::new(),
            ..Self::failure("", message, StatusCode::OK)
        }
    }
}

/// Errors surfaced to API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::MethodNotAllowed(msg.into())
    }
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason carried in the Status document.
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::MethodNotAllowed(_) => "MethodNotAllowed",
            ApiError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::MethodNotAllowed(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Internal(msg) => msg,
        }
    }

    pub fn to_status(&self) -> Status {
        Status::failure(self.reason(), self.message(), self.status_code())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        ApiResponse::new(self.to_status(), status).into_response()
    }
}


// -------------------------
// API Response Wrapper
// -------------------------

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl<T> ApiResponse<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self {
            value,
            status,
            headers: Vec::new(),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(value, StatusCode::OK)
    }

    pub fn created(value: T) -> Self {
        Self::new(value, StatusCode::CREATED)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let (status, body) = match serde_json::to_vec(&self.value) {
            Ok(b) => (self.status, b),
            Err(e) => {
                let fallback = Status::failure(
                    "InternalError",
                    format!("serialization failure: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec()),
                )
            }
        };
        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
        for (n, v) in self.headers.into_iter() {
            headers.insert(n, v);
        }
        response
    }
}


// -------------------------
// Content Negotiation
// -------------------------

fn header_lower(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| v.to_str().unwrap_or("").to_ascii_lowercase())
}

/// Validate the Accept header: JSON or anything.
pub fn validate_accept(headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(val) = header_lower(headers, header::ACCEPT) {
        let allowed = val.is_empty() || val.contains("application/json") || val.contains("*/*");
        if !allowed {
            return Err(ApiError::unsupported_media_type(format!(
                "Unsupported Accept: {val}. Only application/json is supported."
            )));
        }
    }
    Ok(())
}

/// Validate Content-Type for create and replace requests.
pub fn validate_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(val) = header_lower(headers, header::CONTENT_TYPE) {
        if !val.starts_with(JSON_CONTENT_TYPE) {
            return Err(ApiError::unsupported_media_type(format!(
                "Unsupported Content-Type: {val}. Only application/json is supported."
            )));
        }
    }
    Ok(())
}

/// How a PATCH body is to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    /// RFC 7386
    Merge,
    /// RFC 6902
    Json,
}

/// Determines the patch format from Content-Type.
pub fn patch_format(headers: &HeaderMap) -> Result<PatchFormat, ApiError> {
    match header_lower(headers, header::CONTENT_TYPE).as_deref() {
        Some(v) if v.starts_with(MERGE_PATCH_CONTENT_TYPE) => Ok(PatchFormat::Merge),
        Some(v) if v.starts_with(JSON_PATCH_CONTENT_TYPE) => Ok(PatchFormat::Json),
        other => Err(ApiError::unsupported_media_type(format!(
            "Unsupported patch Content-Type: {}. Use {MERGE_PATCH_CONTENT_TYPE} or {JSON_PATCH_CONTENT_TYPE}.",
            other.unwrap_or("<none>")
        ))),
    }
}

/// Returns true when the client asks for a `Table` rendering (`Accept: application/json;as=Table`).
pub fn wants_table(headers: &HeaderMap) -> bool {
    header_lower(headers, header::ACCEPT).is_some_and(|accept| {
        accept
            .split(',')
            .any(|part| part.split(';').any(|param| param.trim() == "as=table"))
    })
}

#[cfg(test)]
mod content_tests {
    use super::*;

    fn headers(name: HeaderName, value: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_static(value));
        h
    }

    #[test]
    fn test_accept_validation() {
        assert!(validate_accept(&HeaderMap::new()).is_ok());
        assert!(validate_accept(&headers(header::ACCEPT, "application/json")).is_ok());
        assert!(validate_accept(&headers(header::ACCEPT, "*/*")).is_ok());
        assert!(validate_accept(&headers(header::ACCEPT, "text/html")).is_err());
    }

    #[test]
    fn test_content_type_validation() {
        assert!(
            validate_content_type(&headers(header::CONTENT_TYPE, "application/json; charset=utf-8"))
                .is_ok()
        );
        let err = validate_content_type(&headers(header::CONTENT_TYPE, "text/plain")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_patch_format_detection() {
        assert_eq!(
            patch_format(&headers(header::CONTENT_TYPE, MERGE_PATCH_CONTENT_TYPE)).unwrap(),
            PatchFormat::Merge
        );
        assert_eq!(
            patch_format(&headers(header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)).unwrap(),
            PatchFormat::Json
        );
        assert!(patch_format(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_table_negotiation() {
        assert!(wants_table(&headers(
            header::ACCEPT,
            "application/json;as=Table;v=v1;g=meta.k8s.io,application/json"
        )));
        assert!(!wants_table(&headers(header::ACCEPT, "application/json")));
        assert!(!wants_table(&HeaderMap::new()));
    }
}

// -------------------------
// Discovery
// -------------------------

/// Response of `GET /api`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiVersions {
    pub kind: String,
    pub versions: Vec<String>,
}

impl ApiVersions {
    pub fn new(versions: Vec<String>) -> Self {
        Self {
            kind: "APIVersions".into(),
            versions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupVersionForDiscovery {
    #[serde(rename = "groupVersion")]
    pub group_version: String,
    pub version: String,
}

impl GroupVersionForDiscovery {
    pub fn new(group: &str, version: &str) -> Self {
        let group_version = if group.is_empty() {
            version.to_string()
        } else {
            format!("{group}/{version}")
        };
        Self {
            group_version,
            version: version.to_string(),
        }
    }
}

/// One group with its versions, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGroup {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub name: String,
    pub versions: Vec<GroupVersionForDiscovery>,
    #[serde(rename = "preferredVersion")]
    pub preferred_version: GroupVersionForDiscovery,
}

impl ApiGroup {
    pub fn new(name: &str, versions: &[String], preferred: &str) -> Self {
        Self {
            kind: "APIGroup".into(),
            api_version: "v1".into(),
            name: name.to_string(),
            versions: versions
                .iter()
                .map(|v| GroupVersionForDiscovery::new(name, v))
                .collect(),
            preferred_version: GroupVersionForDiscovery::new(name, preferred),
        }
    }
}

/// Response of `GET /apis`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGroupList {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub groups: Vec<ApiGroup>,
}

impl ApiGroupList {
    pub fn new(groups: Vec<ApiGroup>) -> Self {
        Self {
            kind: "APIGroupList".into(),
            api_version: "v1".into(),
            groups,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResource {
    pub name: String,
    #[serde(rename = "singularName")]
    pub singular_name: String,
    pub namespaced: bool,
    pub kind: String,
    pub verbs: Vec<String>,
}

/// Response of `GET /apis/{group}/{version}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResourceList {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "groupVersion")]
    pub group_version: String,
    pub resources: Vec<ApiResource>,
}

impl ApiResourceList {
    pub fn new(group_version: impl Into<String>, resources: Vec<ApiResource>) -> Self {
        Self {
            kind: "APIResourceList".into(),
            api_version: "v1".into(),
            group_version: group_version.into(),
            resources,
        }
    }
}

/// Verbs every dynamic resource supports.
pub const RESOURCE_VERBS: &[&str] = &["get", "list", "create", "update", "patch", "delete"];

// -------------------------
// Table
// -------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
}

impl TableColumnDefinition {
    pub fn new(name: &str, type_: &str, format: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            type_: type_.into(),
            format: format.into(),
            description: description.into(),
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRow {
    pub cells: Vec<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub object: Value,
}

/// Tabular rendering of one or more objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(rename = "columnDefinitions")]
    pub column_definitions: Vec<TableColumnDefinition>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn new(column_definitions: Vec<TableColumnDefinition>, rows: Vec<TableRow>) -> Self {
        Self {
            kind: "Table".into(),
            api_version: "meta.k8s.io/v1".into(),
            metadata: Value::Object(Default::default()),
            column_definitions,
            rows,
        }
    }
}
