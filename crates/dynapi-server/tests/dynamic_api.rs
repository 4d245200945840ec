//! End-to-end tests against a server bound to an ephemeral port, backed by
//! the in-memory store.

use assert_json_diff::assert_json_eq;
use dynapi_server::{AppConfig, AppState, TemplatePair, build_app};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

const WIDGETS: &str = r#"
encoder = """
parameter:
  apiVersion: example.io/v1
  kind: Widget
  metadata: <object>
  spec: <object>
output:
  apiVersion: v1
  kind: ConfigMap
  metadata: ${parameter.metadata}
  data: ${parameter.spec}
"""
decoder = """
parameter:
  apiVersion: v1
  kind: ConfigMap
  metadata: <object>
  data: <object>
output:
  apiVersion: example.io/v1
  kind: Widget
  metadata: ${parameter.metadata}
  spec: ${parameter.data}
"""
"#;

fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.providers.http_enabled = false;
    cfg
}

/// Pair for a bare `kind` in `apiVersion`, stored as ConfigMaps.
fn pair_for(api_version: &str, kind: &str) -> TemplatePair {
    let widgets = TemplatePair::from_toml(WIDGETS).unwrap();
    TemplatePair {
        encoder: widgets
            .encoder
            .replace("example.io/v1", api_version)
            .replace("kind: Widget", &format!("kind: {kind}")),
        decoder: widgets
            .decoder
            .replace("example.io/v1", api_version)
            .replace("kind: Widget", &format!("kind: {kind}")),
    }
}

async fn start_server(state: AppState) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn get_json(client: &reqwest::Client, url: &str) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn test_discovery_follows_registrations() {
    let state = AppState::from_config(&config()).unwrap();
    let registrar = state.registrar.clone();
    let (base, shutdown, server) = start_server(state).await;
    let client = reqwest::Client::new();

    registrar.add("r1", Some(&pair_for("g/v1", "Foo"))).unwrap();
    let (status, group) = get_json(&client, &format!("{base}/apis/g")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["versions"], json!([{"groupVersion": "g/v1", "version": "v1"}]));
    assert_eq!(group["preferredVersion"]["version"], "v1");

    registrar.add("r2", Some(&pair_for("g/v2", "Foo"))).unwrap();
    let (_, group) = get_json(&client, &format!("{base}/apis/g")).await;
    let versions: Vec<&str> = group["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, ["v1", "v2"]);

    registrar.delete("r1");
    let (_, group) = get_json(&client, &format!("{base}/apis/g")).await;
    assert_eq!(group["versions"], json!([{"groupVersion": "g/v2", "version": "v2"}]));
    assert_eq!(group["preferredVersion"]["version"], "v2");

    let (status, _) = get_json(&client, &format!("{base}/apis/g/v1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, resources) = get_json(&client, &format!("{base}/apis/g/v2")).await;
    assert_eq!(resources["groupVersion"], "g/v2");
    assert_eq!(resources["resources"][0]["name"], "foos");

    let (_, groups) = get_json(&client, &format!("{base}/apis")).await;
    assert_eq!(groups["kind"], "APIGroupList");
    assert_eq!(groups["groups"][0]["name"], "g");

    registrar.delete("r2");
    let (status, _) = get_json(&client, &format!("{base}/apis/g")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn test_widget_lifecycle() {
    let state = AppState::from_config(&config()).unwrap();
    state
        .registrar
        .add("widgets", TemplatePair::from_toml(WIDGETS).as_ref())
        .unwrap();
    let (base, shutdown, server) = start_server(state).await;
    let client = reqwest::Client::new();
    let collection = format!("{base}/apis/example.io/v1/namespaces/ns/widgets");

    let res = client
        .post(&collection)
        .json(&json!({
            "apiVersion": "example.io/v1",
            "kind": "Widget",
            "metadata": {"name": "a", "labels": {"tier": "front"}},
            "spec": {"size": "3"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/apis/example.io/v1/namespaces/ns/widgets/a"
    );
    assert!(res.headers().get("x-request-id").is_some());
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["metadata"]["namespace"], "ns");

    let res = client
        .post(&collection)
        .json(&json!({"metadata": {"name": "a"}, "spec": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["kind"], "Status");
    assert_eq!(status["reason"], "Conflict");

    let (status, list) = get_json(&client, &format!("{collection}?labelSelector=tier%3Dfront")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["kind"], "WidgetList");
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
    let (_, list) = get_json(&client, &format!("{collection}?labelSelector=tier%3Dback")).await;
    assert!(list["items"].as_array().unwrap().is_empty());

    let table: Value = client
        .get(&collection)
        .header("accept", "application/json;as=Table;v=v1;g=meta.k8s.io")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(table["kind"], "Table");
    assert_eq!(table["rows"][0]["cells"][0], "a");

    let patched: Value = client
        .patch(format!("{collection}/a"))
        .header("content-type", "application/merge-patch+json")
        .body(r#"{"spec": {"color": "red"}}"#)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_json_eq!(patched["spec"], json!({"size": "3", "color": "red"}));

    let res = client
        .put(format!("{collection}/a"))
        .json(&json!({"apiVersion": "example.io/v1", "kind": "Widget", "metadata": {"name": "b"}, "spec": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .patch(format!("{collection}/a"))
        .header("content-type", "text/plain")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = client.delete(format!("{collection}/a")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let (status, _) = get_json(&client, &format!("{collection}/a")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let res = client.delete(format!("{collection}/a")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let gone: Value = res.json().await.unwrap();
    assert_eq!(gone["status"], "Success");

    let res = client
        .delete(format!("{base}/apis/example.io/v1/widgets/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn test_unknown_resources_and_methods() {
    let state = AppState::from_config(&config()).unwrap();
    state
        .registrar
        .add("widgets", TemplatePair::from_toml(WIDGETS).as_ref())
        .unwrap();
    let (base, shutdown, server) = start_server(state).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{base}/apis/example.io/v1/namespaces/ns/gadgets")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let res = client
        .put(format!("{base}/apis/example.io/v1/namespaces/ns/widgets"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = client
        .get(format!("{base}/apis"))
        .header("accept", "text/html")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, root) = get_json(&client, &base).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(root["backend"], "memory");
    assert_eq!(root["mountedGroupVersions"], 1);

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn test_eval_endpoint() {
    let state = AppState::from_config(&config()).unwrap();
    let (base, shutdown, server) = start_server(state).await;
    let client = reqwest::Client::new();

    let template = "middle:\n  k: v\noutput:\n  full: ${middle}\n";
    let res = client
        .post(format!("{base}/eval?path=output.full&compile=true"))
        .body(template)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"k": "v"}));

    let res = client
        .post(format!("{base}/eval?path=middle.k"))
        .body(template)
        .send()
        .await
        .unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), "v");

    let res = client
        .post(format!("{base}/eval?path=output&compile=true"))
        .body("output:\n  a: ${output.b}\n  b: ${output.a}\n")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("{base}/eval?path=missing"))
        .body(template)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let _ = shutdown.send(());
    let _ = server.await;
}
