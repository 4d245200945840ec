//! `POST /eval`: evaluates a template document and returns the value at a path.
//!
//! Useful for trying out templates and provider calls without registering a
//! resource. Without `compile` the document is only parsed.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use dynapi_api::{ApiError, ApiResponse};
use dynapi_eval::{CancellationToken, NodePath};
use dynapi_template::{Template, strip_hidden_keys};
use serde::Deserialize;
use tracing::debug;

use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EvalQuery {
    /// Dotted path of the value to return; the whole document when empty.
    pub path: Option<String>,
    /// Any value other than `false` or `0` evaluates the template.
    pub compile: Option<String>,
}

impl EvalQuery {
    fn compile(&self) -> bool {
        self.compile
            .as_deref()
            .is_some_and(|v| !matches!(v, "false" | "0"))
    }
}

pub async fn eval_handler(
    State(state): State<AppState>,
    Query(query): Query<EvalQuery>,
    body: String,
) -> Result<Response, ApiError> {
    let raw_path = query.path.as_deref().unwrap_or_default();
    let path = NodePath::parse(raw_path)
        .ok_or_else(|| ApiError::bad_request(format!("invalid path: {raw_path}")))?;
    let mut template = Template::parse(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;

    if !query.compile() {
        let value = path
            .lookup(template.doc())
            .cloned()
            .ok_or_else(|| ApiError::bad_request(format!("can't find path {raw_path}")))?;
        return Ok(ApiResponse::ok(value).into_response());
    }

    let evaluator = state.compiler.evaluator();
    template.apply_signatures(evaluator);
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let rendered = template
        .render(evaluator, None, &cancel)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    debug!(calls = rendered.calls, path = %path, "Evaluated template");

    if let Some(site) = rendered.unresolved_under(&path).next() {
        return Err(ApiError::bad_request(format!(
            "{}: unresolved reference {}",
            site.path,
            site.source()
        )));
    }
    let mut value = rendered
        .lookup(&path)
        .cloned()
        .ok_or_else(|| ApiError::bad_request(format!("can't find path {raw_path}")))?;
    strip_hidden_keys(&mut value);
    Ok(ApiResponse::ok(value).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_flag() {
        let q = |v: Option<&str>| EvalQuery {
            path: None,
            compile: v.map(str::to_string),
        };
        assert!(!q(None).compile());
        assert!(q(Some("true")).compile());
        assert!(q(Some("1")).compile());
        assert!(!q(Some("false")).compile());
        assert!(!q(Some("0")).compile());
    }
}
