//! Built-in `http` provider.
//!
//! `do` performs one HTTP request and exposes the response under `response`:
//!
//! ```yaml
//! resp:
//!   "#do": do
//!   "#provider": http
//!   method: POST
//!   url: http://backend/api
//!   request:
//!     body: '{"a": 1}'
//!   header:
//!     Content-Type: [application/json]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{PackageError, ProviderError};
use crate::function::{ProviderContext, ProviderFn, typed};
use crate::package::ProviderPackage;

pub const PROVIDER_NAME: &str = "http";

const MANIFEST: &str = r##"
do:
  "#do": do
  "#provider": http
  method: GET
  request:
    body: ""
  header: {}
  trailer: {}
"##;

/// Multi-valued header map, as carried in call nodes.
pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Deserialize)]
pub struct DoParams {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub request: DoRequest,
    #[serde(default)]
    pub header: Headers,
    /// Accepted for symmetry with responses; trailers are not sent.
    #[serde(default)]
    pub trailer: Headers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoReturns {
    pub response: DoResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoResponse {
    pub body: String,
    pub header: Headers,
    pub trailer: Headers,
    pub status_code: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Builds the `http` package around `client`.
pub fn package(client: reqwest::Client) -> Result<ProviderPackage, PackageError> {
    let client = Arc::new(client);
    let call: Arc<dyn ProviderFn> = typed(move |ctx: ProviderContext, params: DoParams| {
        let client = client.clone();
        async move { send(&client, &ctx, params).await }
    });
    ProviderPackage::new(PROVIDER_NAME, MANIFEST, HashMap::from([("do".to_string(), call)]))
}

/// Builds the `http` package with a client using `timeout` per request.
pub fn package_with_timeout(timeout: Duration) -> Result<ProviderPackage, PackageError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build http provider client, using defaults");
            reqwest::Client::new()
        });
    package(client)
}

async fn send(
    client: &reqwest::Client,
    ctx: &ProviderContext,
    params: DoParams,
) -> Result<DoReturns, ProviderError> {
    let method = reqwest::Method::from_bytes(params.method.to_uppercase().as_bytes())
        .map_err(|_| ProviderError::InvalidParameters(format!("invalid method {}", params.method)))?;
    let headers = to_header_map(&params.header)?;

    tracing::debug!(method = %method, url = %params.url, "http provider request");
    let request = client
        .request(method, &params.url)
        .headers(headers)
        .body(params.request.body)
        .send();

    let response = tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => return Err(ProviderError::Cancelled),
        response = request => response?,
    };

    let status_code = response.status().as_u16();
    let header = from_header_map(response.headers());
    let body = response.text().await?;
    Ok(DoReturns {
        response: DoResponse {
            body,
            header,
            trailer: Headers::new(),
            status_code,
        },
    })
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, ProviderError> {
    let mut map = HeaderMap::new();
    for (name, values) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProviderError::InvalidParameters(format!("header {name}: {e}")))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProviderError::InvalidParameters(format!("header {name}: {e}")))?;
            map.append(name.clone(), value);
        }
    }
    Ok(map)
}

fn from_header_map(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(value.to_string());
        }
    }
    out
}

// `content-type` -> `Content-Type`
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Evaluator, ProviderRegistry};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn evaluator() -> Evaluator {
        let registry = ProviderRegistry::new();
        registry.register(package(reqwest::Client::new()).unwrap());
        Evaluator::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_do_post_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("x-token", "abc"))
            .and(body_string("ping"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-reply", "yes")
                    .set_body_string("pong"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut tree = json!({
            "call": {
                "#do": "do",
                "#provider": "http",
                "method": "post",
                "url": format!("{}/echo", server.uri()),
                "request": {"body": "ping"},
                "header": {"x-token": ["abc"]},
            }
        });
        evaluator()
            .evaluate(&mut tree, &CancellationToken::new())
            .await
            .unwrap();

        let response = &tree["call"]["response"];
        assert_eq!(response["statusCode"], 201);
        assert_eq!(response["body"], "pong");
        assert_eq!(response["header"]["X-Reply"], json!(["yes"]));
    }

    #[tokio::test]
    async fn test_do_defaults_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let mut tree = json!({
            "#do": "do",
            "#provider": "http",
            "url": format!("{}/items", server.uri()),
        });
        evaluator()
            .evaluate(&mut tree, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tree["response"]["body"], "[]");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_execution_error() {
        let mut tree = json!({
            "call": {"#do": "do", "#provider": "http", "url": "http://127.0.0.1:1/nothing"}
        });
        let err = evaluator()
            .evaluate(&mut tree, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::EvalError::Execution { ref path, .. } if path == "call"));
        assert!(tree["call"].get("response").is_none());
    }

    #[test]
    fn test_manifest_signature() {
        let pkg = package(reqwest::Client::new()).unwrap();
        assert_eq!(pkg.signature("do").unwrap()["method"], "GET");
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
    }
}
