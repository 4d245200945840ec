use thiserror::Error;

/// Core error types for DynAPI descriptors and documents
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid group version: {0}")]
    InvalidGroupVersion(String),

    #[error("Invalid kind: kind must not be empty")]
    InvalidKind,

    #[error("Invalid label selector '{selector}': {message}")]
    InvalidLabelSelector { selector: String, message: String },

    #[error("Invalid field selector '{selector}': {message}")]
    InvalidFieldSelector { selector: String, message: String },

    #[error("Conflicting parent resource: name says '{from_name}', selector says '{from_selector}'")]
    ConflictingParent {
        from_name: String,
        from_selector: String,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Document is not an object")]
    NotAnObject,
}

impl CoreError {
    /// Create a new InvalidGroupVersion error
    pub fn invalid_group_version(value: impl Into<String>) -> Self {
        Self::InvalidGroupVersion(value.into())
    }

    /// Create a new InvalidLabelSelector error
    pub fn invalid_label_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLabelSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidFieldSelector error
    pub fn invalid_field_selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFieldSelector {
            selector: selector.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
