//! Provider functions and their calling context.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::path::NodePath;

/// Per-call context handed to provider functions.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    cancel: CancellationToken,
    path: NodePath,
}

impl ProviderContext {
    pub fn new(cancel: CancellationToken, path: NodePath) -> Self {
        Self { cancel, path }
    }

    /// Token cancelled when the caller gives up on the evaluation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Path of the call node being executed.
    pub fn path(&self) -> &NodePath {
        &self.path
    }
}

/// A callable exposed by a provider package.
///
/// Receives the call node as a canonical JSON document and returns the value
/// to unify back into that node.
#[async_trait]
pub trait ProviderFn: Send + Sync {
    async fn call(&self, ctx: &ProviderContext, params: Value) -> Result<Value, ProviderError>;
}

/// Adapter turning a strongly typed async function into a [`ProviderFn`].
pub struct TypedFn<T, U, F> {
    f: F,
    _marker: PhantomData<fn(T) -> U>,
}

/// Wraps `f` so that the call node is deserialized into `T` and the result
/// serialized from `U`.
///
/// ```ignore
/// let fns = HashMap::from([(
///     "echo".to_string(),
///     typed(|_ctx, params: EchoParams| async move { Ok(EchoReturns { value: params.key }) }),
/// )]);
/// ```
pub fn typed<T, U, F, Fut>(f: F) -> Arc<dyn ProviderFn>
where
    T: DeserializeOwned + Send + 'static,
    U: Serialize + Send + 'static,
    F: Fn(ProviderContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, ProviderError>> + Send + 'static,
{
    Arc::new(TypedFn {
        f,
        _marker: PhantomData,
    })
}

#[async_trait]
impl<T, U, F, Fut> ProviderFn for TypedFn<T, U, F>
where
    T: DeserializeOwned + Send + 'static,
    U: Serialize + Send + 'static,
    F: Fn(ProviderContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<U, ProviderError>> + Send + 'static,
{
    async fn call(&self, ctx: &ProviderContext, params: Value) -> Result<Value, ProviderError> {
        let params: T = serde_json::from_value(params)
            .map_err(|e| ProviderError::InvalidParameters(e.to_string()))?;
        let returns = (self.f)(ctx.clone(), params).await?;
        serde_json::to_value(returns).map_err(|e| ProviderError::InvalidResult(e.to_string()))
    }
}
