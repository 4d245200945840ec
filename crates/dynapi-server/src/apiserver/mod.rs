//! Dynamic API server: resource handlers, the mutable router and HTTP dispatch.
//!
//! ```text
//! registration ──add/remove──▶ DynamicApiServer ──snapshot──▶ dispatch
//!                                   │                            │
//!                              MountTable                  ResourceHandler
//!                    (scheme, routes, discovery)        (get/list/create/...)
//! ```

pub mod dispatch;
pub mod handler;
pub mod router;

pub use handler::{DeleteOutcome, HandlerError, ListQuery, RequestContext, ResourceHandler, UpdatePatch};
pub use router::{DynResourceHandler, DynamicApiServer, GroupDiscovery, MountTable};
