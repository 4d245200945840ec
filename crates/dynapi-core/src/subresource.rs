//! Names of resources living under a parent resource.
//!
//! A sub-resource is addressed as `sub@parent`. Plain names belong to the
//! `default` parent. List requests pick the parent through a label requirement.

use std::fmt;

use crate::error::{CoreError, Result};
use crate::selector::LabelSelector;

pub const COMPOUND_NAME_SEPARATOR: &str = "@";
pub const DEFAULT_PARENT_RESOURCE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundName {
    pub parent: String,
    pub sub: String,
}

impl CompoundName {
    pub fn new(sub: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            sub: sub.into(),
        }
    }

    /// Splits on the first separator; names without one use the default parent.
    pub fn parse(name: &str) -> Self {
        match name.split_once(COMPOUND_NAME_SEPARATOR) {
            Some((sub, parent)) => Self::new(sub, parent),
            None => Self::new(name, DEFAULT_PARENT_RESOURCE_NAME),
        }
    }

    /// Whether `name` carries an explicit parent.
    pub fn is_compound(name: &str) -> bool {
        name.contains(COMPOUND_NAME_SEPARATOR)
    }

    pub fn has_default_parent(&self) -> bool {
        self.parent == DEFAULT_PARENT_RESOURCE_NAME
    }
}

impl fmt::Display for CompoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.sub, COMPOUND_NAME_SEPARATOR, self.parent)
    }
}

/// Parent named by a single-valued equality requirement on `key`, if any.
pub fn explicit_parent_from_selector(selector: &LabelSelector, key: &str) -> Option<String> {
    selector
        .requirements_for(key)
        .find_map(|r| r.single_value().map(str::to_string))
}

/// Parent named by the selector, or the default parent.
pub fn parent_from_selector(selector: &LabelSelector, key: &str) -> String {
    explicit_parent_from_selector(selector, key)
        .unwrap_or_else(|| DEFAULT_PARENT_RESOURCE_NAME.to_string())
}

/// Resolves the parent for a request carrying an optional name and a selector.
///
/// An explicit compound name wins over the selector, the selector wins over
/// the default. Two explicit parents that disagree are rejected.
pub fn resolve_parent(name: Option<&str>, selector: &LabelSelector, key: &str) -> Result<CompoundName> {
    let from_selector = explicit_parent_from_selector(selector, key);
    match name {
        Some(name) if CompoundName::is_compound(name) => {
            let compound = CompoundName::parse(name);
            match from_selector {
                Some(parent) if parent != compound.parent => Err(CoreError::ConflictingParent {
                    from_name: compound.parent,
                    from_selector: parent,
                }),
                _ => Ok(compound),
            }
        }
        Some(name) => Ok(CompoundName::new(
            name,
            from_selector.unwrap_or_else(|| DEFAULT_PARENT_RESOURCE_NAME.to_string()),
        )),
        None => Ok(CompoundName::new(
            "",
            from_selector.unwrap_or_else(|| DEFAULT_PARENT_RESOURCE_NAME.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_name() {
        let name = CompoundName::parse("dashboard@east");
        assert_eq!(name, CompoundName::new("dashboard", "east"));
        assert_eq!(name.to_string(), "dashboard@east");

        let plain = CompoundName::parse("dashboard");
        assert_eq!(plain.parent, DEFAULT_PARENT_RESOURCE_NAME);
        assert!(plain.has_default_parent());

        let nested = CompoundName::parse("a@b@c");
        assert_eq!(nested, CompoundName::new("a", "b@c"));
    }

    #[test]
    fn test_parent_from_selector() {
        let key = "dynapi.io/instance";
        let selector = LabelSelector::parse("dynapi.io/instance=east").unwrap();
        assert_eq!(parent_from_selector(&selector, key), "east");

        let set = LabelSelector::parse("dynapi.io/instance in (east,west)").unwrap();
        assert_eq!(parent_from_selector(&set, key), DEFAULT_PARENT_RESOURCE_NAME);

        let other = LabelSelector::parse("dynapi.io/instance!=east").unwrap();
        assert_eq!(parent_from_selector(&other, key), DEFAULT_PARENT_RESOURCE_NAME);
    }

    #[test]
    fn test_resolve_parent_precedence() {
        let key = "dynapi.io/instance";
        let east = LabelSelector::parse("dynapi.io/instance=east").unwrap();
        let empty = LabelSelector::everything();

        assert_eq!(
            resolve_parent(Some("dash@west"), &empty, key).unwrap(),
            CompoundName::new("dash", "west")
        );
        assert_eq!(
            resolve_parent(Some("dash"), &east, key).unwrap(),
            CompoundName::new("dash", "east")
        );
        assert_eq!(
            resolve_parent(Some("dash@east"), &east, key).unwrap(),
            CompoundName::new("dash", "east")
        );
        assert_eq!(resolve_parent(None, &empty, key).unwrap().parent, "default");
        assert!(matches!(
            resolve_parent(Some("dash@west"), &east, key),
            Err(CoreError::ConflictingParent { .. })
        ));
    }
}
