//! Request dispatch.
//!
//! Normalize the path, pick the route-table entry, enforce the auth gate on
//! mutating entries, then hand off to the registered handler.

mod router;
pub mod table;

pub use router::{RegistryRoutes, dispatch};
pub use table::{ROUTES, RouteEntry, Verb};
