//! Provider packages shipped with the evaluator.

pub mod http;

use std::time::Duration;

use crate::error::PackageError;
use crate::registry::ProviderRegistry;

/// Registers every built-in package into `registry`.
pub fn register_builtin(registry: &ProviderRegistry, http_timeout: Duration) -> Result<(), PackageError> {
    registry.register(http::package_with_timeout(http_timeout)?);
    Ok(())
}
