//! Label and field selectors used by list requests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use crate::document;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// One clause of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: SelectorOperator,
    pub values: BTreeSet<String>,
}

impl Requirement {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::Equals | SelectorOperator::In => {
                value.is_some_and(|v| self.values.contains(v))
            }
            SelectorOperator::NotEquals | SelectorOperator::NotIn => {
                value.is_none_or(|v| !self.values.contains(v))
            }
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }

    /// The value of an `=`/`==` clause.
    pub fn single_value(&self) -> Option<&str> {
        match self.operator {
            SelectorOperator::Equals if self.values.len() == 1 => {
                self.values.iter().next().map(String::as_str)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            SelectorOperator::Equals => write!(f, "{}={}", self.key, joined()),
            SelectorOperator::NotEquals => write!(f, "{}!={}", self.key, joined()),
            SelectorOperator::In => write!(f, "{} in ({})", self.key, joined()),
            SelectorOperator::NotIn => write!(f, "{} notin ({})", self.key, joined()),
            SelectorOperator::Exists => write!(f, "{}", self.key),
            SelectorOperator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Conjunction of label requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parses the `labelSelector` query syntax.
    pub fn parse(selector: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for clause in split_clauses(selector) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            requirements.push(parse_requirement(selector, clause)?);
        }
        Ok(Self { requirements })
    }

    pub fn from_requirements(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn matches_document(&self, doc: &Value) -> bool {
        self.is_empty() || self.matches(&document::labels(doc))
    }

    /// Requirements on `key`.
    pub fn requirements_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Requirement> {
        self.requirements.iter().filter(move |r| r.key == key)
    }

    /// Returns a copy without any requirement on `key`.
    pub fn without(&self, key: &str) -> Self {
        Self {
            requirements: self
                .requirements
                .iter()
                .filter(|r| r.key != key)
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        write!(f, "{}", clauses.join(","))
    }
}

// Commas inside `in (...)` groups do not separate clauses.
fn split_clauses(selector: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                clauses.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&selector[start..]);
    clauses
}

fn parse_requirement(selector: &str, clause: &str) -> Result<Requirement> {
    let invalid = |message: &str| CoreError::invalid_label_selector(selector, message);

    if let Some(key) = clause.strip_prefix('!') {
        let key = validate_key(selector, key.trim())?;
        return Ok(Requirement {
            key,
            operator: SelectorOperator::DoesNotExist,
            values: BTreeSet::new(),
        });
    }

    for (token, operator) in [
        ("!=", SelectorOperator::NotEquals),
        ("==", SelectorOperator::Equals),
        ("=", SelectorOperator::Equals),
    ] {
        if let Some((key, value)) = clause.split_once(token) {
            let key = validate_key(selector, key.trim())?;
            let value = value.trim();
            if value.contains(['=', '!', '(', ')', ' ']) {
                return Err(invalid(&format!("invalid value '{value}'")));
            }
            return Ok(Requirement {
                key,
                operator,
                values: BTreeSet::from([value.to_string()]),
            });
        }
    }

    let mut words = clause.splitn(2, char::is_whitespace);
    let key = words.next().unwrap_or_default();
    let rest = words.next().map(str::trim).unwrap_or_default();
    if rest.is_empty() {
        return Ok(Requirement {
            key: validate_key(selector, key)?,
            operator: SelectorOperator::Exists,
            values: BTreeSet::new(),
        });
    }

    let (operator, list) = if let Some(list) = rest.strip_prefix("notin") {
        (SelectorOperator::NotIn, list)
    } else if let Some(list) = rest.strip_prefix("in") {
        (SelectorOperator::In, list)
    } else {
        return Err(invalid(&format!("unknown operator in '{clause}'")));
    };
    let list = list
        .trim()
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .ok_or_else(|| invalid("set values must be enclosed in parentheses"))?;
    let values: BTreeSet<String> = list
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() {
        return Err(invalid("set must contain at least one value"));
    }
    Ok(Requirement {
        key: validate_key(selector, key)?,
        operator,
        values,
    })
}

fn validate_key(selector: &str, key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(CoreError::invalid_label_selector(selector, "empty key"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(CoreError::invalid_label_selector(
            selector,
            format!("invalid key '{key}'"),
        ));
    }
    Ok(key.to_string())
}

/// Exact-match field selector over `metadata.name` and `metadata.namespace`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl FieldSelector {
    pub fn parse(selector: &str) -> Result<Self> {
        let mut parsed = Self::default();
        for clause in selector.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (field, value) = clause
                .split_once("==")
                .or_else(|| clause.split_once('='))
                .ok_or_else(|| {
                    CoreError::invalid_field_selector(selector, format!("expected field=value in '{clause}'"))
                })?;
            let value = value.trim().to_string();
            match field.trim() {
                "metadata.name" => parsed.name = Some(value),
                "metadata.namespace" => parsed.namespace = Some(value),
                other => {
                    return Err(CoreError::invalid_field_selector(
                        selector,
                        format!("field '{other}' is not supported"),
                    ));
                }
            }
        }
        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.namespace.is_none()
    }

    pub fn matches(&self, doc: &Value) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|n| document::name(doc) == Some(n));
        let namespace_ok = self
            .namespace
            .as_deref()
            .is_none_or(|ns| document::namespace(doc).unwrap_or_default() == ns);
        name_ok && namespace_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_all_operators() {
        let selector =
            LabelSelector::parse("app=web, tier==front,env!=prod,zone in (a, b),x notin (y),team,!legacy")
                .unwrap();
        let ops: Vec<_> = selector.requirements().iter().map(|r| r.operator).collect();
        assert_eq!(
            ops,
            vec![
                SelectorOperator::Equals,
                SelectorOperator::Equals,
                SelectorOperator::NotEquals,
                SelectorOperator::In,
                SelectorOperator::NotIn,
                SelectorOperator::Exists,
                SelectorOperator::DoesNotExist,
            ]
        );
        assert_eq!(selector.requirements()[3].values.len(), 2);
    }

    #[test]
    fn test_matches() {
        let selector = LabelSelector::parse("app=web,zone in (a,b),!legacy").unwrap();
        assert!(selector.matches(&labels(&[("app", "web"), ("zone", "b")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("zone", "c")])));
        assert!(!selector.matches(&labels(&[("app", "web"), ("zone", "a"), ("legacy", "1")])));

        let not_equal = LabelSelector::parse("env!=prod").unwrap();
        assert!(not_equal.matches(&labels(&[])));
        assert!(!not_equal.matches(&labels(&[("env", "prod")])));

        assert!(LabelSelector::everything().matches(&labels(&[("any", "thing")])));
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(LabelSelector::parse("=value").is_err());
        assert!(LabelSelector::parse("zone in a,b").is_err());
        assert!(LabelSelector::parse("zone in ()").is_err());
        assert!(LabelSelector::parse("zone between (a)").is_err());
        assert!(LabelSelector::parse("a b=c").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let text = "app=web,zone in (a,b),!legacy";
        let selector = LabelSelector::parse(text).unwrap();
        assert_eq!(selector.to_string(), text);
        assert_eq!(LabelSelector::parse(&selector.to_string()).unwrap(), selector);
    }

    #[test]
    fn test_single_value_and_without() {
        let selector = LabelSelector::parse("dynapi.io/instance=east,app=web").unwrap();
        let req = selector.requirements_for("dynapi.io/instance").next().unwrap();
        assert_eq!(req.single_value(), Some("east"));
        assert_eq!(selector.without("dynapi.io/instance").to_string(), "app=web");
    }

    #[test]
    fn test_field_selector() {
        let selector = FieldSelector::parse("metadata.name=foo,metadata.namespace==ns").unwrap();
        assert!(selector.matches(&json!({"metadata": {"name": "foo", "namespace": "ns"}})));
        assert!(!selector.matches(&json!({"metadata": {"name": "bar", "namespace": "ns"}})));
        assert!(FieldSelector::parse("").unwrap().is_empty());
        assert!(matches!(
            FieldSelector::parse("spec.x=1"),
            Err(CoreError::InvalidFieldSelector { .. })
        ));
    }
}
