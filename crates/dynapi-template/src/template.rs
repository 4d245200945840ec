//! Parsed templates and their evaluation.
//!
//! A template is a YAML (or JSON) document. String leaves may reference other
//! parts of the document with `${path}`; objects tagged as provider calls are
//! executed by the [`Evaluator`]. Rendering alternates reference substitution
//! and provider execution until neither makes progress:
//!
//! - a reference is substituted once its target exists and is settled: no
//!   pending reference inside it and no unexecuted call at or above it;
//! - a call executes once no pending reference remains inside it.
//!
//! Call nodes under `parameter` never execute, and values copied through a
//! reference lose their `#` keys, so input documents cannot trigger calls.

use dynapi_eval::{CancellationToken, EvaluationState, Evaluator, NodePath, Segment, unify::unify};
use serde_json::Value;
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::reference::{self, Piece};
use crate::schema;

pub const PARAMETER_KEY: &str = "parameter";
pub const OUTPUT_KEY: &str = "output";

/// A string leaf holding references, located by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSite {
    pub path: NodePath,
    pub pieces: Vec<Piece>,
}

impl ReferenceSite {
    pub fn source(&self) -> String {
        reference::render(&self.pieces)
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    doc: Value,
    sites: Vec<ReferenceSite>,
}

/// Result of rendering a template.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub doc: Value,
    /// References that could not be substituted.
    pub unresolved: Vec<ReferenceSite>,
    /// Number of provider calls executed.
    pub calls: usize,
}

impl Rendered {
    /// Value at `path` in the rendered document.
    pub fn lookup(&self, path: &NodePath) -> Option<&Value> {
        path.lookup(&self.doc)
    }

    pub fn unresolved_under(&self, prefix: &NodePath) -> impl Iterator<Item = &ReferenceSite> {
        self.unresolved
            .iter()
            .filter(move |site| site.path.starts_with(prefix))
    }
}

impl Template {
    /// Parses template text. Whitespace-only text yields an empty document.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: Value = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_yaml::from_str(text).map_err(|e| CodecError::compile(e.to_string()))?
        };
        Self::from_value(doc)
    }

    /// Builds a template from an already parsed document.
    pub fn from_value(mut doc: Value) -> Result<Self> {
        let mut sites = Vec::new();
        collect_sites(&mut doc, NodePath::root(), &mut sites)?;
        Ok(Self { doc, sites })
    }

    pub fn doc(&self) -> &Value {
        &self.doc
    }

    pub fn sites(&self) -> &[ReferenceSite] {
        &self.sites
    }

    /// Value of `slot` (`parameter` or `output`) as declared in the template.
    pub fn slot(&self, slot: &str) -> Option<&Value> {
        self.doc.get(slot)
    }

    /// Fills call nodes with the defaults from their provider signature.
    /// Fields set in the template take precedence.
    pub fn apply_signatures(&mut self, evaluator: &Evaluator) {
        let tags = evaluator.tags().clone();
        let registry = evaluator.registry().clone();
        visit_mut(&mut self.doc, &mut |node| {
            let Some((operation, provider)) = tags
                .call_of(node)
                .map(|(o, p)| (o.to_string(), p.to_string()))
            else {
                return;
            };
            if let Some(signature) = registry.signature(&provider, &operation) {
                unify(node, signature);
            }
        });
    }

    /// Renders the template with `input` bound to the parameter slot.
    ///
    /// Without input the template is rendered as written.
    pub async fn render(
        &self,
        evaluator: &Evaluator,
        input: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<Rendered> {
        let mut doc = self.doc.clone();
        if let Some(input) = input {
            let parameter_path = NodePath::root().field(PARAMETER_KEY);
            let schema = self
                .slot(PARAMETER_KEY)
                .cloned()
                .unwrap_or(Value::String("<any>".into()));
            let bound = schema::bind(&schema, Some(input), &parameter_path)?;
            if let (Some(obj), Some(bound)) = (doc.as_object_mut(), bound) {
                obj.insert(PARAMETER_KEY.into(), bound);
            }
        }

        let mut pending = self.sites.clone();
        let mut state = EvaluationState::new();
        let mut calls = 0;
        loop {
            let resolved = resolve_pass(&mut doc, &mut pending, &state, evaluator)?;
            let ready = |path: &NodePath, _: &Value| {
                path.head_field() != Some(PARAMETER_KEY)
                    && !pending.iter().any(|site| site.path.starts_with(path))
            };
            let executed = evaluator
                .evaluate_with(&mut doc, &mut state, &ready, cancel)
                .await?;
            calls += executed;
            if resolved == 0 && executed == 0 {
                break;
            }
        }

        if !pending.is_empty() {
            debug!(unresolved = pending.len(), "Template rendered with unresolved references");
        }
        Ok(Rendered {
            doc,
            unresolved: pending,
            calls,
        })
    }
}

fn collect_sites(value: &mut Value, path: NodePath, sites: &mut Vec<ReferenceSite>) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                collect_sites(child, path.field(key.clone()), sites)?;
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter_mut().enumerate() {
                collect_sites(child, path.index(i), sites)?;
            }
        }
        Value::String(text) => {
            let pieces = reference::parse(text)?;
            if reference::has_refs(&pieces) {
                if path.head_field() == Some(PARAMETER_KEY) {
                    return Err(CodecError::invalid_template(format!(
                        "{path}: references are not allowed in the parameter schema"
                    )));
                }
                sites.push(ReferenceSite { path, pieces });
            } else if let [Piece::Text(unescaped)] = pieces.as_slice() {
                *text = unescaped.clone();
            }
        }
        _ => {}
    }
    Ok(())
}

/// Substitutes every reference whose targets are settled. Returns how many.
fn resolve_pass(
    doc: &mut Value,
    pending: &mut Vec<ReferenceSite>,
    state: &EvaluationState,
    evaluator: &Evaluator,
) -> Result<usize> {
    let mut resolved = 0;
    let mut i = 0;
    while i < pending.len() {
        let ready = reference::targets(&pending[i].pieces)
            .all(|target| is_settled(doc, target, pending, state, evaluator));
        if !ready {
            i += 1;
            continue;
        }
        let site = pending.remove(i);
        let value = match reference::exact(&site.pieces) {
            Some(target) => target
                .lookup(doc)
                .cloned()
                .map(|v| strip_hidden(v, evaluator))
                .unwrap_or(Value::Null),
            None => Value::String(reference::interpolate(&site.pieces, |p| p.lookup(doc).cloned())?),
        };
        if let Some(slot) = site.path.lookup_mut(doc) {
            *slot = value;
        }
        resolved += 1;
    }
    Ok(resolved)
}

fn is_settled(
    doc: &Value,
    target: &NodePath,
    pending: &[ReferenceSite],
    state: &EvaluationState,
    evaluator: &Evaluator,
) -> bool {
    let Some(value) = target.lookup(doc) else {
        return false;
    };
    if pending.iter().any(|site| site.path.starts_with(target)) {
        return false;
    }
    let mut ancestor = NodePath::root();
    if is_live_call(doc, &ancestor, state, evaluator) {
        return false;
    }
    for segment in target.segments() {
        ancestor = match segment {
            Segment::Field(name) => ancestor.field(name.clone()),
            Segment::Index(i) => ancestor.index(*i),
        };
        match ancestor.lookup(doc) {
            Some(node) if is_live_call(node, &ancestor, state, evaluator) => return false,
            Some(_) => {}
            None => return false,
        }
    }
    !contains_unexecuted_call(value, target.clone(), state, evaluator)
}

/// A call node that will still execute: outside `parameter` and not yet run.
fn is_live_call(node: &Value, path: &NodePath, state: &EvaluationState, evaluator: &Evaluator) -> bool {
    path.head_field() != Some(PARAMETER_KEY)
        && evaluator.tags().call_of(node).is_some()
        && !state.is_executed(path)
}

fn contains_unexecuted_call(
    value: &Value,
    path: NodePath,
    state: &EvaluationState,
    evaluator: &Evaluator,
) -> bool {
    if is_live_call(value, &path, state, evaluator) {
        return true;
    }
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| contains_unexecuted_call(v, path.field(k.clone()), state, evaluator)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .any(|(i, v)| contains_unexecuted_call(v, path.index(i), state, evaluator)),
        _ => false,
    }
}

fn strip_hidden(mut value: Value, evaluator: &Evaluator) -> Value {
    let tags = evaluator.tags().clone();
    visit_mut(&mut value, &mut |node| {
        if let Value::Object(map) = node {
            map.retain(|k, _| !k.starts_with('#') && *k != tags.operation && *k != tags.provider);
        }
    });
    value
}

/// Removes `#`-prefixed keys at every depth.
pub fn strip_hidden_keys(value: &mut Value) {
    visit_mut(value, &mut |node| {
        if let Value::Object(map) = node {
            map.retain(|k, _| !k.starts_with('#'));
        }
    });
}

// Pre-order: `f` sees a node before its children.
fn visit_mut(value: &mut Value, f: &mut dyn FnMut(&mut Value)) {
    f(value);
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| visit_mut(v, f)),
        Value::Array(items) => items.iter_mut().for_each(|v| visit_mut(v, f)),
        _ => {}
    }
}
