//! # dynapi-template
//!
//! Template-driven transformation between an API-facing document type and the
//! type stored in a backing system.
//!
//! A codec is compiled from two templates, one per direction. Each template is
//! a YAML document with a `parameter` slot describing the accepted input and
//! an `output` slot producing the converted document:
//!
//! ```yaml
//! parameter:
//!   apiVersion: x/v1
//!   kind: Foo
//!   metadata: <object>
//! output:
//!   apiVersion: v1
//!   kind: ConfigMap
//!   metadata: ${parameter.metadata}
//! ```
//!
//! Templates may embed provider calls which are executed by
//! [`dynapi_eval::Evaluator`] while rendering.

mod codec;
mod error;
pub mod reference;
pub mod schema;
mod template;

pub use codec::{TemplateCompiler, TransformationCodec};
pub use error::{CodecError, Result};
pub use template::{
    OUTPUT_KEY, PARAMETER_KEY, ReferenceSite, Rendered, Template, strip_hidden_keys,
};
