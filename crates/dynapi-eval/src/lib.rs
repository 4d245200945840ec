//! # dynapi-eval
//!
//! Declarative expression evaluator and the provider registry it calls into.
//!
//! A value tree may embed *call nodes*: objects tagged with an operation and a
//! provider name. [`Evaluator::evaluate`] executes each of them against a
//! [`ProviderRegistry`] and unifies the results back into the tree.
//!
//! ```ignore
//! let registry = Arc::new(ProviderRegistry::new());
//! providers::register_builtin(&registry, Duration::from_secs(30))?;
//!
//! let mut tree = serde_json::json!({
//!     "resp": {"#do": "do", "#provider": "http", "url": "http://localhost:8080/"}
//! });
//! Evaluator::new(registry).evaluate(&mut tree, &CancellationToken::new()).await?;
//! ```

mod error;
mod evaluator;
mod function;
mod package;
pub mod path;
pub mod providers;
mod registry;
pub mod unify;

pub use error::{EvalError, PackageError, ProviderError};
pub use evaluator::{
    CallTags, DEFAULT_OPERATION_TAG, DEFAULT_PROVIDER_TAG, EvaluationState, Evaluator,
};
pub use function::{ProviderContext, ProviderFn, TypedFn, typed};
pub use package::ProviderPackage;
pub use path::{NodePath, Segment};
pub use registry::ProviderRegistry;
pub use tokio_util::sync::CancellationToken;
