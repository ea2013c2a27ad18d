//! Interface to the package registry engine.
//!
//! The dispatcher never decides what a package version contains. It hands a
//! [`HandlerRequest`] and the canonical parameters to the [`RequestHandler`]
//! registered for the matched [`Operation`] and projects the returned
//! [`HandlerOutcome`] onto the HTTP response.

pub mod memory;

use crate::auth::Claims;
use crate::error::Result;
use crate::http::CanonicalRequestParams;
use crate::metrics::{EventStream, Multiplexer, SourceId};
use crate::tenancy::OrganizationMapping;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Logical operations a route can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PackageVersions,
    PackageOverview,
    PackageContent,
    PackageUpload,
    MapVersions,
    MapGet,
    MapUpload,
    AliasGet,
    AliasCreate,
    AliasUpdate,
    AliasDelete,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::PackageVersions,
        Operation::PackageOverview,
        Operation::PackageContent,
        Operation::PackageUpload,
        Operation::MapVersions,
        Operation::MapGet,
        Operation::MapUpload,
        Operation::AliasGet,
        Operation::AliasCreate,
        Operation::AliasUpdate,
        Operation::AliasDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PackageVersions => "package_versions",
            Operation::PackageOverview => "package_overview",
            Operation::PackageContent => "package_content",
            Operation::PackageUpload => "package_upload",
            Operation::MapVersions => "map_versions",
            Operation::MapGet => "map_get",
            Operation::MapUpload => "map_upload",
            Operation::AliasGet => "alias_get",
            Operation::AliasCreate => "alias_create",
            Operation::AliasUpdate => "alias_update",
            Operation::AliasDelete => "alias_delete",
        }
    }
}

/// The parts of the inbound request a handler may look at.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub method: Method,
    pub uri: Uri,
    /// Host header value with any port removed
    pub host: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response body produced by a handler.
pub enum OutcomeBody {
    Empty,
    Bytes(Bytes),
    Json(serde_json::Value),
    Stream(BoxStream<'static, std::result::Result<Bytes, std::io::Error>>),
}

impl std::fmt::Debug for OutcomeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeBody::Empty => f.write_str("Empty"),
            OutcomeBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            OutcomeBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            OutcomeBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// What a handler asks the dispatcher to send back.
#[derive(Debug)]
pub struct HandlerOutcome {
    pub status: StatusCode,
    pub mime_type: String,
    pub cache_control: String,
    pub etag: Option<String>,
    pub location: Option<String>,
    pub body: OutcomeBody,
}

impl HandlerOutcome {
    pub fn new(status: StatusCode, mime_type: impl Into<String>, body: OutcomeBody) -> Self {
        Self {
            status,
            mime_type: mime_type.into(),
            cache_control: "no-store".to_string(),
            etag: None,
            location: None,
            body,
        }
    }

    /// 200 with a body streamed from a single buffer.
    pub fn stream(mime_type: impl Into<String>, bytes: Bytes) -> Self {
        let body = futures::stream::once(async move { Ok(bytes) }).boxed();
        Self::new(StatusCode::OK, mime_type, OutcomeBody::Stream(body))
    }

    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self::new(status, "application/json", OutcomeBody::Json(value))
    }

    pub fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
        let mut outcome = Self::new(status, "text/plain", OutcomeBody::Empty);
        outcome.location = Some(location.into());
        outcome
    }

    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = value.into();
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// One delegated route-family handler.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Name used to tag this handler's telemetry.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        request: HandlerRequest,
        params: &CanonicalRequestParams,
        organizations: &OrganizationMapping,
        claims: Option<&Claims>,
    ) -> Result<HandlerOutcome>;

    /// This handler's event stream. Yields `Some` only on the first call.
    fn metrics(&self) -> Option<EventStream>;
}

/// Handlers keyed by the operation they serve.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<Operation, Arc<dyn RequestHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, operation: Operation, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.insert(operation, handler);
        self
    }

    pub fn get(&self, operation: Operation) -> Option<&Arc<dyn RequestHandler>> {
        self.handlers.get(&operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.handlers.keys().copied()
    }

    /// Attach every distinct handler's event stream to the multiplexer.
    pub fn attach_metrics(&self, multiplexer: &Multiplexer) -> Vec<SourceId> {
        let mut seen: Vec<*const ()> = Vec::new();
        let mut ids = Vec::new();
        for handler in self.handlers.values() {
            let ptr = Arc::as_ptr(handler) as *const ();
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
            if let Some(stream) = handler.metrics() {
                ids.push(multiplexer.attach(handler.name().to_string(), stream));
            }
        }
        ids
    }
}
