//! Declarative route table.
//!
//! Every registry path is normalized first, so an entry matches on the route
//! kind, the [`Shape`] of the canonical parameters and the method. One entry
//! covers both the plain and the scoped form of a name.

use crate::error::{AssetwayError, Result};
use crate::http::{Kind, Shape};
use crate::registry::Operation;
use axum::http::Method;
use serde::Serialize;
use std::fmt;

/// Methods the registry routes answer to. `HEAD` is served as `GET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Put,
    Post,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        if method == Method::GET || method == Method::HEAD {
            Some(Verb::Get)
        } else if method == Method::PUT {
            Some(Verb::Put)
        } else if method == Method::POST {
            Some(Verb::Post)
        } else if method == Method::DELETE {
            Some(Verb::Delete)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Post => "POST",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the route table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteEntry {
    pub operation: Operation,
    pub verb: Verb,
    pub kinds: &'static [Kind],
    pub shapes: &'static [Shape],
    /// Requires a verified bearer token before the handler runs
    pub mutating: bool,
}

impl RouteEntry {
    fn serves(&self, kind: Kind, shape: Shape) -> bool {
        self.kinds.contains(&kind) && self.shapes.contains(&shape)
    }
}

const PACKAGES: &[Kind] = &[Kind::Pkg, Kind::Npm];
const MAPS: &[Kind] = &[Kind::Map];
const ANY_KIND: &[Kind] = &Kind::ALL;

pub static ROUTES: &[RouteEntry] = &[
    RouteEntry {
        operation: Operation::PackageVersions,
        verb: Verb::Get,
        kinds: PACKAGES,
        shapes: &[Shape::Name],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::PackageOverview,
        verb: Verb::Get,
        kinds: PACKAGES,
        shapes: &[Shape::Version],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::PackageContent,
        verb: Verb::Get,
        kinds: PACKAGES,
        shapes: &[Shape::VersionExtras],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::PackageUpload,
        verb: Verb::Put,
        kinds: PACKAGES,
        shapes: &[Shape::Version],
        mutating: true,
    },
    RouteEntry {
        operation: Operation::MapVersions,
        verb: Verb::Get,
        kinds: MAPS,
        shapes: &[Shape::Name],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::MapGet,
        verb: Verb::Get,
        kinds: MAPS,
        shapes: &[Shape::Version],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::MapUpload,
        verb: Verb::Put,
        kinds: MAPS,
        shapes: &[Shape::Version],
        mutating: true,
    },
    RouteEntry {
        operation: Operation::AliasGet,
        verb: Verb::Get,
        kinds: ANY_KIND,
        shapes: &[Shape::Alias, Shape::AliasExtras],
        mutating: false,
    },
    RouteEntry {
        operation: Operation::AliasCreate,
        verb: Verb::Post,
        kinds: ANY_KIND,
        shapes: &[Shape::Alias],
        mutating: true,
    },
    RouteEntry {
        operation: Operation::AliasUpdate,
        verb: Verb::Put,
        kinds: ANY_KIND,
        shapes: &[Shape::Alias],
        mutating: true,
    },
    RouteEntry {
        operation: Operation::AliasDelete,
        verb: Verb::Delete,
        kinds: ANY_KIND,
        shapes: &[Shape::Alias],
        mutating: true,
    },
];

/// Pick the entry for a request.
///
/// A shape no entry serves is `NotFound`; a shape served only under other
/// methods is `MethodNotAllowed`.
pub fn find(kind: Kind, shape: Shape, method: &Method) -> Result<&'static RouteEntry> {
    let candidates: Vec<&'static RouteEntry> = ROUTES
        .iter()
        .filter(|entry| entry.serves(kind, shape))
        .collect();

    if candidates.is_empty() {
        return Err(AssetwayError::not_found(format!(
            "no {} resource has this form",
            kind
        )));
    }

    let verb = Verb::from_method(method);
    if let Some(entry) = candidates.iter().copied().find(|entry| Some(entry.verb) == verb) {
        return Ok(entry);
    }

    Err(AssetwayError::method_not_allowed(format!(
        "{} is not supported here; allowed: {}",
        method,
        allowed(&candidates)
    )))
}

/// Methods accepted for a kind and shape, as an `Allow` header value.
pub fn allowed_methods(kind: Kind, shape: Shape) -> String {
    let candidates: Vec<&RouteEntry> = ROUTES
        .iter()
        .filter(|entry| entry.serves(kind, shape))
        .collect();
    allowed(&candidates)
}

fn allowed(entries: &[&RouteEntry]) -> String {
    let mut verbs: Vec<&str> = entries.iter().map(|entry| entry.verb.as_str()).collect();
    if verbs.contains(&"GET") {
        verbs.push("HEAD");
    }
    verbs.join(", ")
}
