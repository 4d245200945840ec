//! `${path}` references inside template strings.
//!
//! A string that is exactly one reference takes the referenced value with its
//! type. References embedded in longer text interpolate scalars. `$$` stands
//! for a literal `$`.

use dynapi_eval::NodePath;
use serde_json::Value;

use crate::error::{CodecError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Ref(NodePath),
}

/// Splits `text` into literal text and references.
pub fn parse(text: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '$' {
            literal.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                literal.push('$');
            }
            Some((_, '{')) => {
                let body_start = start + 2;
                let end = text[body_start..]
                    .find('}')
                    .map(|offset| body_start + offset)
                    .ok_or_else(|| CodecError::compile(format!("unterminated reference in {text:?}")))?;
                let raw = text[body_start..end].trim();
                let path = NodePath::parse(raw)
                    .filter(|p| !p.is_root())
                    .ok_or_else(|| CodecError::compile(format!("invalid reference ${{{raw}}} in {text:?}")))?;
                if !literal.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Ref(path));
                while chars.peek().is_some_and(|(i, _)| *i <= end) {
                    chars.next();
                }
            }
            _ => literal.push('$'),
        }
    }
    if !literal.is_empty() || pieces.is_empty() {
        pieces.push(Piece::Text(literal));
    }
    Ok(pieces)
}

pub fn has_refs(pieces: &[Piece]) -> bool {
    pieces.iter().any(|p| matches!(p, Piece::Ref(_)))
}

/// The reference when `pieces` is exactly one.
pub fn exact(pieces: &[Piece]) -> Option<&NodePath> {
    match pieces {
        [Piece::Ref(path)] => Some(path),
        _ => None,
    }
}

pub fn targets(pieces: &[Piece]) -> impl Iterator<Item = &NodePath> {
    pieces.iter().filter_map(|p| match p {
        Piece::Ref(path) => Some(path),
        Piece::Text(_) => None,
    })
}

/// Concatenates text with the scalar value of each reference.
pub fn interpolate(pieces: &[Piece], lookup: impl Fn(&NodePath) -> Option<Value>) -> Result<String> {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Ref(path) => match lookup(path) {
                Some(Value::String(s)) => out.push_str(&s),
                Some(Value::Number(n)) => out.push_str(&n.to_string()),
                Some(Value::Bool(b)) => out.push_str(&b.to_string()),
                Some(Value::Null) => out.push_str("null"),
                Some(_) => {
                    return Err(CodecError::marshal(format!(
                        "cannot interpolate non-scalar value of ${{{path}}}"
                    )));
                }
                None => {
                    return Err(CodecError::marshal(format!("unresolved reference ${{{path}}}")));
                }
            },
        }
    }
    Ok(out)
}

/// Renders pieces back to template syntax.
pub fn render(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|piece| match piece {
            Piece::Text(text) => text.replace('$', "$$"),
            Piece::Ref(path) => format!("${{{path}}}"),
        })
        .collect()
}
