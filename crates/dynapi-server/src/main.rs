use std::path::PathBuf;

use clap::Parser;
use dynapi_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use dynapi_server::{ServerBuilder, shutdown_tracing};

/// Serves dynamically registered resource types over a REST API.
#[derive(Debug, Parser)]
#[command(name = "dynapi-server", version, about)]
struct Args {
    /// Configuration file
    #[arg(long, env = "DYNAPI_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Directory of encoder/decoder registrations
    #[arg(long)]
    registrations_dir: Option<PathBuf>,

    /// Upper bound for a single request, in milliseconds
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Lower bound for the effective request timeout, in seconds
    #[arg(long)]
    min_request_timeout: Option<u64>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    dynapi_server::observability::init_tracing();
    let args = Args::parse();

    let mut cfg = match load_config(Some(&args.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(dir) = args.registrations_dir {
        cfg.registrations.dir = Some(dir);
    }
    if let Some(ms) = args.request_timeout {
        cfg.server.request_timeout_ms = ms;
    }
    if let Some(secs) = args.min_request_timeout {
        cfg.server.min_request_timeout_s = secs;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        std::process::exit(2);
    }

    tracing::info!(path = %args.config, "Configuration loaded");
    dynapi_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
    }

    shutdown_tracing();
}
