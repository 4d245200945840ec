//! Backing store reached over a Kubernetes-style REST API.

use std::time::Duration;

use async_trait::async_trait;
use dynapi_core::{TypeDescriptor, document};
use dynapi_storage::{BackingStore, ListOptions, ObjectKey, StorageError};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

pub struct HttpStore {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self, String> {
        let base = Url::parse(base).map_err(|e| format!("invalid backend url {base}: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self { client, base, token })
    }

    fn url(&self, target: &TypeDescriptor, namespace: Option<&str>, name: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::internal(format!("backend url {} cannot be a base", self.base)))?;
            segments.pop_if_empty();
            if target.group().is_empty() {
                segments.extend(["api", target.version()]);
            } else {
                segments.extend(["apis", target.group(), target.version()]);
            }
            if let Some(ns) = namespace {
                segments.extend(["namespaces", ns]);
            }
            segments.push(target.resource());
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        target: &TypeDescriptor,
        name: &str,
    ) -> Result<Value, StorageError> {
        debug!(method = %method, url = %url, "Backend request");
        let mut request = self.client.request(method.clone(), url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::connection(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StorageError::connection(e.to_string()))?;
        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|e| StorageError::internal(format!("invalid backend response: {e}")));
        }

        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::not_found(target.resource(), name),
            StatusCode::CONFLICT if method == Method::POST => {
                StorageError::already_exists(target.resource(), name)
            }
            StatusCode::CONFLICT => StorageError::conflict(message),
            StatusCode::UNAUTHORIZED => StorageError::unauthorized(message),
            StatusCode::FORBIDDEN => StorageError::forbidden(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StorageError::invalid(message),
            other => StorageError::internal(format!("backend returned {other}: {message}")),
        })
    }

    fn write_target(target: &TypeDescriptor, doc: &Value) -> Result<(String, Option<String>), StorageError> {
        let name = document::name(doc)
            .ok_or_else(|| StorageError::invalid("metadata.name is required"))?
            .to_string();
        let namespace = if target.namespaced() {
            Some(
                document::namespace(doc)
                    .ok_or_else(|| StorageError::invalid("metadata.namespace is required"))?
                    .to_string(),
            )
        } else {
            None
        };
        Ok((name, namespace))
    }
}

#[async_trait]
impl BackingStore for HttpStore {
    async fn get(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<Value, StorageError> {
        let url = self.url(target, key.namespace.as_deref(), Some(&key.name))?;
        self.send(Method::GET, url, None, target, &key.name).await
    }

    async fn list(&self, target: &TypeDescriptor, options: &ListOptions) -> Result<Vec<Value>, StorageError> {
        let mut url = self.url(target, options.namespace.as_deref(), None)?;
        {
            let mut query = url.query_pairs_mut();
            if !options.label_selector.is_empty() {
                query.append_pair("labelSelector", &options.label_selector.to_string());
            }
            let mut fields = Vec::new();
            if let Some(name) = &options.field_selector.name {
                fields.push(format!("metadata.name={name}"));
            }
            if let Some(ns) = &options.field_selector.namespace {
                fields.push(format!("metadata.namespace={ns}"));
            }
            if !fields.is_empty() {
                query.append_pair("fieldSelector", &fields.join(","));
            }
            if let Some(limit) = options.limit.filter(|&n| n > 0) {
                query.append_pair("limit", &limit.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let list = self.send(Method::GET, url, None, target, "").await?;
        let items = match list.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(StorageError::internal("backend list items is not an array")),
        };
        // list items usually come without a type stamp
        items
            .into_iter()
            .map(|mut item| {
                if document::kind(&item).is_none() {
                    document::stamp(&mut item, &target.gvk())
                        .map_err(|e| StorageError::internal(e.to_string()))?;
                }
                Ok(item)
            })
            .collect()
    }

    async fn create(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError> {
        let (name, namespace) = Self::write_target(target, doc)?;
        let url = self.url(target, namespace.as_deref(), None)?;
        self.send(Method::POST, url, Some(doc), target, &name).await
    }

    async fn update(&self, target: &TypeDescriptor, doc: &Value) -> Result<Value, StorageError> {
        let (name, namespace) = Self::write_target(target, doc)?;
        let url = self.url(target, namespace.as_deref(), Some(&name))?;
        self.send(Method::PUT, url, Some(doc), target, &name).await
    }

    async fn delete(&self, target: &TypeDescriptor, key: &ObjectKey) -> Result<(), StorageError> {
        let url = self.url(target, key.namespace.as_deref(), Some(&key.name))?;
        self.send(Method::DELETE, url, None, target, &key.name).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynapi_core::{DefaultRestMapper, LabelSelector};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn configmaps() -> TypeDescriptor {
        TypeDescriptor::new("v1", "ConfigMap", &DefaultRestMapper).unwrap()
    }

    fn store(server: &MockServer) -> HttpStore {
        HttpStore::new(&server.uri(), Some("secret".into()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_builds_resource_urls() {
        let store = HttpStore::new("http://backend.example/prefix/", None, Duration::from_secs(1)).unwrap();
        let core = configmaps();
        assert_eq!(
            store.url(&core, Some("ns"), Some("a b")).unwrap().as_str(),
            "http://backend.example/prefix/api/v1/namespaces/ns/configmaps/a%20b"
        );
        let named = TypeDescriptor::new("apps.example/v2", "Widget", &DefaultRestMapper).unwrap();
        assert_eq!(
            store.url(&named, None, None).unwrap().as_str(),
            "http://backend.example/prefix/apis/apps.example/v2/widgets"
        );
    }

    #[tokio::test]
    async fn test_get_sends_token_and_maps_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/ns/configmaps/a"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a", "namespace": "ns"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/ns/configmaps/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"kind": "Status", "message": "gone"})))
            .mount(&server)
            .await;

        let store = store(&server);
        let doc = store.get(&configmaps(), &ObjectKey::namespaced("ns", "a")).await.unwrap();
        assert_eq!(doc["metadata"]["name"], "a");

        let err = store
            .get(&configmaps(), &ObjectKey::namespaced("ns", "missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_forwards_selectors_and_stamps_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/ns/configmaps"))
            .and(query_param("labelSelector", "app=web"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "ConfigMapList",
                "items": [{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}]
            })))
            .mount(&server)
            .await;

        let options = ListOptions::new()
            .in_namespace(Some("ns"))
            .with_label_selector(LabelSelector::parse("app=web").unwrap())
            .with_limit(2);
        let items = store(&server).list(&configmaps(), &options).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["kind"], "ConfigMap");
        assert_eq!(items[1]["apiVersion"], "v1");
    }

    #[tokio::test]
    async fn test_write_errors_are_classified() {
        let server = MockServer::start().await;
        let doc = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a", "namespace": "ns"}});
        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/ns/configmaps"))
            .and(body_json(doc.clone()))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/namespaces/ns/configmaps/a"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "stale resourceVersion"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/ns/configmaps/a"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "denied"})))
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(store.create(&configmaps(), &doc).await.unwrap_err().is_already_exists());

        let err = store.update(&configmaps(), &doc).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { ref message } if message == "stale resourceVersion"));

        let err = store
            .delete(&configmaps(), &ObjectKey::namespaced("ns", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Forbidden { .. }));

        let err = store
            .create(&configmaps(), &json!({"metadata": {"name": "b"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_connection_error() {
        let store = HttpStore::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        let err = store
            .get(&configmaps(), &ObjectKey::namespaced("ns", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Connection { .. }));
    }
}
