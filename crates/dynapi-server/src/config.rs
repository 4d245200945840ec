use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Where codec registrations are read from
    #[serde(default)]
    pub registrations: RegistrationsConfig,
    /// Systems that store the target documents
    #[serde(default)]
    pub backend: BackendConfig,
    /// Static kind → resource mappings
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Backend validation
        if self.backend.kind == BackendKind::Http {
            if self.backend.instances.is_empty() {
                return Err("backend.kind = \"http\" requires at least one backend.instances entry".into());
            }
            for instance in &self.backend.instances {
                if instance.name.is_empty() {
                    return Err("backend.instances[].name must not be empty".into());
                }
                if url::Url::parse(&instance.url).is_err() {
                    return Err(format!(
                        "backend.instances[{}].url is not a valid URL: {}",
                        instance.name, instance.url
                    ));
                }
            }
            if let Some(default) = &self.backend.default_instance {
                if !self.backend.instances.iter().any(|i| &i.name == default) {
                    return Err(format!(
                        "backend.default_instance '{default}' is not listed in backend.instances"
                    ));
                }
            }
        }
        // Mapping validation
        for mapping in &self.mappings {
            if mapping.kind.is_empty() || mapping.resource.is_empty() {
                return Err("mappings[] require both kind and resource".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Request timeout, raised to `min_request_timeout_s` when configured lower.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms).max(self.min_request_timeout())
    }

    pub fn min_request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.min_request_timeout_s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Upper bound for a single request, including provider calls.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Lower bound for the effective request timeout.
    #[serde(default = "default_min_request_timeout_s")]
    pub min_request_timeout_s: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    3 * 1024 * 1024
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_min_request_timeout_s() -> u64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            min_request_timeout_s: default_min_request_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationsConfig {
    /// Directory of `*.toml` files with `encoder` and `decoder` keys
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_watch")]
    pub watch: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_watch() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    500
}

impl Default for RegistrationsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl RegistrationsConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Http,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// External system instances, addressed as the parent in `name@instance`
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
    /// Instance serving plain names; the first instance when unset
    #[serde(default)]
    pub default_instance: Option<String>,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            instances: Vec::new(),
            default_instance: None,
            timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Bearer token sent to the instance
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub api_version: String,
    pub kind: String,
    pub resource: String,
    #[serde(default = "default_namespaced")]
    pub namespaced: bool,
}

fn default_namespaced() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Register the built-in `http` provider
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_http_enabled() -> bool {
    true
}
fn default_http_timeout_ms() -> u64 {
    30_000
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            http_enabled: default_http_enabled(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl ProvidersConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::{Path, PathBuf};

    pub const DEFAULT_CONFIG_PATH: &str = "dynapi.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        }
        // Environment variable overrides, e.g., DYNAPI__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("DYNAPI")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
