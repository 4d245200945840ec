//! Resolution of provider-call nodes embedded in a value tree.
//!
//! A call node is an object carrying an operation tag and a provider tag,
//! `#do` and `#provider` by default:
//!
//! ```yaml
//! response:
//!   "#do": do
//!   "#provider": http
//!   method: GET
//!   url: https://example.com
//! ```
//!
//! The evaluator repeatedly picks the first pending call node in depth-first
//! order (children before parents), invokes the provider function and unifies
//! the result back into the node. Each execution may reveal new call nodes
//! anywhere in the tree, so the scan restarts from the root every time.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{EvalError, ProviderError};
use crate::function::ProviderContext;
use crate::path::NodePath;
use crate::registry::ProviderRegistry;
use crate::unify::unify;

pub const DEFAULT_OPERATION_TAG: &str = "#do";
pub const DEFAULT_PROVIDER_TAG: &str = "#provider";

/// Keys marking a call node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTags {
    pub operation: String,
    pub provider: String,
}

impl Default for CallTags {
    fn default() -> Self {
        Self {
            operation: DEFAULT_OPERATION_TAG.to_string(),
            provider: DEFAULT_PROVIDER_TAG.to_string(),
        }
    }
}

impl CallTags {
    /// Returns `(operation, provider)` when `node` is a call node.
    pub fn call_of<'a>(&self, node: &'a Value) -> Option<(&'a str, &'a str)> {
        let obj = node.as_object()?;
        let operation = obj.get(&self.operation)?.as_str()?;
        let provider = obj.get(&self.provider)?.as_str()?;
        (!operation.is_empty()).then_some((operation, provider))
    }
}

/// Working state of one evaluation: the set of already executed node paths.
///
/// Kept outside the tree so callers that interleave evaluation with their own
/// rewriting can resume without re-running calls.
#[derive(Debug, Clone, Default)]
pub struct EvaluationState {
    executed: HashSet<NodePath>,
}

impl EvaluationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_executed(&self, path: &NodePath) -> bool {
        self.executed.contains(path)
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }
}

/// Evaluator bound to a provider registry.
#[derive(Debug, Clone)]
pub struct Evaluator {
    registry: Arc<ProviderRegistry>,
    tags: CallTags,
}

impl Evaluator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            tags: CallTags::default(),
        }
    }

    /// Uses custom keys for the operation and provider tags.
    pub fn with_tags(mut self, operation: impl Into<String>, provider: impl Into<String>) -> Self {
        self.tags = CallTags {
            operation: operation.into(),
            provider: provider.into(),
        };
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn tags(&self) -> &CallTags {
        &self.tags
    }

    /// Executes every call node in `tree`, returning how many ran.
    ///
    /// On error the tree holds the results of all calls that completed before
    /// the failing one; the failing node itself is left untouched.
    pub async fn evaluate(&self, tree: &mut Value, cancel: &CancellationToken) -> Result<usize, EvalError> {
        let mut state = EvaluationState::new();
        self.evaluate_with(tree, &mut state, &|_, _| true, cancel).await
    }

    /// Executes pending call nodes accepted by `ready` until none is left.
    ///
    /// A node rejected by `ready` stays pending and is offered again on the
    /// next call with the same `state`.
    #[instrument(level = "debug", skip_all)]
    pub async fn evaluate_with(
        &self,
        tree: &mut Value,
        state: &mut EvaluationState,
        ready: &(dyn Fn(&NodePath, &Value) -> bool + Sync),
        cancel: &CancellationToken,
    ) -> Result<usize, EvalError> {
        let mut executed = 0;
        while let Some(call) = self.next_pending(tree, state, ready) {
            if cancel.is_cancelled() {
                return Err(EvalError::Cancelled);
            }
            let Some(node) = call.path.lookup(tree) else {
                break;
            };
            let result = self.execute(&call, node.clone(), cancel).await?;
            let path = call.path;
            if let Some(slot) = path.lookup_mut(tree) {
                unify(slot, result);
            }
            state.executed.insert(path);
            executed += 1;
        }
        Ok(executed)
    }

    async fn execute(
        &self,
        call: &PendingCall,
        node: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, EvalError> {
        let PendingCall {
            path,
            operation,
            provider,
        } = call;
        let function = self.registry.function(provider, operation)?;

        debug!(path = %path, provider = %provider, function = %operation, "Executing provider call");
        let ctx = ProviderContext::new(cancel.child_token(), path.clone());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EvalError::Cancelled),
            outcome = function.call(&ctx, node.clone()) => outcome,
        };

        let execution_error = |source: ProviderError| EvalError::Execution {
            path: path.to_string(),
            value: render(&node),
            source,
        };
        match outcome {
            Ok(result @ Value::Object(_)) => Ok(result),
            Ok(Value::Null) => Ok(Value::Object(Default::default())),
            Ok(other) => Err(execution_error(ProviderError::InvalidResult(format!(
                "expected an object, got {other}"
            )))),
            Err(ProviderError::InvalidParameters(message)) => Err(EvalError::ParameterShape {
                path: path.to_string(),
                provider: provider.clone(),
                function: operation.clone(),
                message,
            }),
            Err(ProviderError::Cancelled) => Err(EvalError::Cancelled),
            Err(source) => Err(execution_error(source)),
        }
    }

    fn next_pending(
        &self,
        tree: &Value,
        state: &EvaluationState,
        ready: &(dyn Fn(&NodePath, &Value) -> bool + Sync),
    ) -> Option<PendingCall> {
        let mut found = None;
        walk(tree, NodePath::root(), &mut |path, node| {
            let Some((operation, provider)) = self.tags.call_of(node) else {
                return false;
            };
            if state.is_executed(path) || !ready(path, node) {
                return false;
            }
            found = Some(PendingCall {
                path: path.clone(),
                operation: operation.to_string(),
                provider: provider.to_string(),
            });
            true
        });
        found
    }
}

struct PendingCall {
    path: NodePath,
    operation: String,
    provider: String,
}

/// Depth-first walk visiting children before their parent.
/// Stops as soon as `visit` returns `true`.
fn walk(value: &Value, path: NodePath, visit: &mut dyn FnMut(&NodePath, &Value) -> bool) -> bool {
    let stopped = match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, child)| walk(child, path.field(key.clone()), visit)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .any(|(i, child)| walk(child, path.index(i), visit)),
        _ => false,
    };
    stopped || visit(&path, value)
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| e.to_string())
}
