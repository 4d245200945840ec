pub mod apiserver;
pub mod config;
pub mod eval;
pub mod handlers;
pub mod instances;
pub mod middleware;
pub mod observability;
pub mod registration;
pub mod resource;
pub mod server;
pub mod upstream;

pub use apiserver::{DynamicApiServer, ResourceHandler};
pub use config::{AppConfig, BackendConfig, BackendKind, ServerConfig};
pub use observability::{init_tracing, shutdown_tracing};
pub use registration::{Registrar, RegistrationDir, TemplatePair};
pub use server::{AppState, DynapiServer, ServerBuilder, build_app};
