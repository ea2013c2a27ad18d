//! HTTP plumbing shared by every route.
//!
//! Path normalization into canonical parameters, projection of handler
//! outcomes onto responses, and the RouteModule trait for organizing routes.

pub mod params;
pub mod response;
pub mod routes;

pub use params::{CanonicalRequestParams, Kind, Shape, is_version, major_of, normalize};
pub use response::{NoStore, project};
pub use routes::RouteModule;
