pub mod descriptor;
pub mod document;
pub mod error;
pub mod mapper;
pub mod selector;
pub mod subresource;

pub use descriptor::{GroupVersion, GroupVersionKind, GroupVersionResource, TypeDescriptor};
pub use error::{CoreError, Result};
pub use mapper::{DefaultRestMapper, ResourceMapping, RestMapper, StaticRestMapper};
pub use selector::{FieldSelector, LabelSelector, Requirement, SelectorOperator};
pub use subresource::{
    COMPOUND_NAME_SEPARATOR, CompoundName, DEFAULT_PARENT_RESOURCE_NAME, parent_from_selector,
    resolve_parent,
};
