//! Error types for provider calls and evaluation.

use thiserror::Error;

/// Failure reported by a provider function.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The call node does not fit the function's parameter shape.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The function produced something that cannot be merged back.
    #[error("invalid result: {0}")]
    InvalidResult(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("call cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

impl ProviderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors returned by [`crate::Evaluator`].
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("provider {0} not found")]
    ProviderNotFound(String),

    #[error("function {function} not found in provider {provider}")]
    FunctionNotFound { provider: String, function: String },

    #[error("parameters of {provider}.{function} at {path} do not match: {message}")]
    ParameterShape {
        path: String,
        provider: String,
        function: String,
        message: String,
    },

    #[error("execute error for {path}: {source} (value: {value})")]
    Execution {
        path: String,
        value: String,
        #[source]
        source: ProviderError,
    },

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotFound(_) | Self::FunctionNotFound { .. }
        )
    }
}

/// Errors raised while assembling a provider package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("invalid manifest for provider {provider}: {source}")]
    Manifest {
        provider: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest for provider {0} must be a mapping of function signatures")]
    NotAMapping(String),

    #[error("function {function} of provider {provider} has no signature in the manifest")]
    MissingSignature { provider: String, function: String },

    #[error("signature {function} of provider {provider} has no implementation")]
    MissingFunction { provider: String, function: String },
}
