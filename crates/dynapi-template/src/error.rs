use dynapi_eval::EvalError;
use thiserror::Error;

/// Errors raised while compiling templates or converting documents.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Template text is not valid YAML/JSON or contains malformed references.
    #[error("template compile error: {0}")]
    Compile(String),

    /// Template lacks a slot or declares a non-literal type.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Encode and decode templates disagree on source and target types.
    #[error("template type mismatch: {template} template {slot} declares {found}, expected {expected}")]
    TemplateTypeMismatch {
        template: &'static str,
        slot: &'static str,
        expected: String,
        found: String,
    },

    /// Output could not be turned into a document.
    #[error("marshal error: {0}")]
    Marshal(String),

    /// Input document does not fit the parameter schema.
    #[error("unmarshal error: {0}")]
    Unmarshal(String),

    #[error(transparent)]
    Evaluation(#[from] EvalError),
}

impl CodecError {
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    pub fn invalid_template(message: impl Into<String>) -> Self {
        Self::InvalidTemplate(message.into())
    }

    pub fn marshal(message: impl Into<String>) -> Self {
        Self::Marshal(message.into())
    }

    pub fn unmarshal(message: impl Into<String>) -> Self {
        Self::Unmarshal(message.into())
    }

    /// Whether the caller supplied a document that cannot be converted.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Unmarshal(_))
            || matches!(
                self,
                Self::Evaluation(EvalError::ParameterShape { .. })
            )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
