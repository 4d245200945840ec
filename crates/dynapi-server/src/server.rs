use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use dynapi_core::StaticRestMapper;
use dynapi_eval::{Evaluator, ProviderRegistry, providers};
use dynapi_template::TemplateCompiler;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::{
    apiserver::{DynamicApiServer, dispatch},
    config::AppConfig,
    eval, handlers,
    instances::StoreSet,
    middleware::{self as app_middleware, RequestId},
    registration::{Registrar, RegistrationDir},
};

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api: Arc<DynamicApiServer>,
    pub compiler: TemplateCompiler,
    pub registrar: Arc<Registrar>,
}

impl AppState {
    /// Wires the provider registry, template compiler, stores and router from `cfg`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, String> {
        let registry = Arc::new(ProviderRegistry::new());
        if cfg.providers.http_enabled {
            providers::register_builtin(&registry, cfg.providers.http_timeout())
                .map_err(|e| format!("failed to register built-in providers: {e}"))?;
        }

        let mut mapper = StaticRestMapper::with_core_kinds();
        for mapping in &cfg.mappings {
            mapper.insert(
                mapping.api_version.clone(),
                mapping.kind.clone(),
                mapping.resource.clone(),
                mapping.namespaced,
            );
        }
        let compiler = TemplateCompiler::new(Evaluator::new(registry)).with_mapper(Arc::new(mapper));

        let stores = StoreSet::from_config(&cfg.backend)?;
        tracing::info!(
            backend = %cfg.backend.kind,
            instances = stores.len(),
            default_instance = %stores.default_instance(),
            "Backing stores configured"
        );

        let api = Arc::new(DynamicApiServer::new());
        let registrar = Arc::new(Registrar::new(api.clone(), compiler.clone(), stores));
        Ok(Self {
            config: Arc::new(cfg.clone()),
            api,
            compiler,
            registrar,
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let timeout = state.config.request_timeout();
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/eval", post(eval::eval_handler))
        // Discovery and mounted resources
        .merge(dispatch::router())
        .with_state(state)
        // Middleware stack (outermost last: request id -> trace -> compression/cors -> timeout -> content negotiation)
        .layer(middleware::from_fn(app_middleware::content_negotiation))
        .layer(TimeoutLayer::new(timeout))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct DynapiServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    registrations: Option<RegistrationDir>,
    watch: bool,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> Result<DynapiServer, String> {
        let state = AppState::from_config(&self.config)?;
        let registrations = self
            .config
            .registrations
            .dir
            .as_ref()
            .map(|dir| RegistrationDir::new(dir, self.config.registrations.debounce()));
        Ok(DynapiServer {
            addr: self.addr,
            app: build_app(state.clone()),
            state,
            registrations,
            watch: self.config.registrations.watch,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynapiServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let watcher = match &self.registrations {
            Some(source) => {
                source.scan(&self.state.registrar);
                self.watch
                    .then(|| source.clone().watch(self.state.registrar.clone()))
            }
            None => {
                tracing::warn!("no registrations directory configured; no resources will be mounted");
                None
            }
        };

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
