//! In-memory registry engine.
//!
//! Packages, import maps and aliases live in process memory and vanish on
//! restart. `pkg` and `npm` share one package namespace; `map` has its own.
//! Every operation emits one [`MetricsEvent`] on the handler's stream.

use super::{HandlerOutcome, HandlerRequest, HandlerSet, Operation, OutcomeBody, RequestHandler};
use crate::auth::Claims;
use crate::error::{AssetwayError, Result};
use crate::http::{CanonicalRequestParams, Kind, is_version, major_of};
use crate::metrics::{EventStream, MetricsEmitter, MetricsEvent};
use crate::tenancy::OrganizationMapping;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const REVALIDATE: &str = "no-cache";
pub const ALIAS_REDIRECT: &str = "public, max-age=310";

/// Organization key used when no hostname mapping is configured.
const UNRESTRICTED: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
    Package,
    Map,
}

impl From<Kind> for Namespace {
    fn from(kind: Kind) -> Self {
        if kind.is_package() {
            Namespace::Package
        } else {
            Namespace::Map
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NameKey {
    organization: String,
    namespace: Namespace,
    name: String,
}

enum Payload {
    Files(BTreeMap<String, Bytes>),
    Map(Bytes),
}

struct StoredVersion {
    version: String,
    payload: Payload,
}

#[derive(Default)]
struct Store {
    /// Versions in upload order.
    versions: HashMap<NameKey, Vec<StoredVersion>>,
    aliases: HashMap<(NameKey, String), String>,
}

impl Store {
    fn find(&self, key: &NameKey, version: &str) -> Option<&StoredVersion> {
        self.versions
            .get(key)?
            .iter()
            .find(|stored| stored.version == version)
    }
}

/// Shared storage behind every memory handler.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Store>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Deserialize)]
struct PackageUpload {
    files: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AliasUpload {
    version: String,
}

/// Handler for one operation, backed by a [`MemoryStore`].
pub struct MemoryHandler {
    name: String,
    operation: Operation,
    store: Arc<MemoryStore>,
    emitter: MetricsEmitter,
    events: Mutex<Option<EventStream>>,
}

impl MemoryHandler {
    pub fn new(operation: Operation, store: Arc<MemoryStore>) -> Self {
        let (emitter, events) = MetricsEmitter::channel();
        Self {
            name: format!("memory.{}", operation.as_str()),
            operation,
            store,
            emitter,
            events: Mutex::new(Some(events)),
        }
    }

    fn perform(
        &self,
        request: &HandlerRequest,
        params: &CanonicalRequestParams,
        organizations: &OrganizationMapping,
        claims: Option<&Claims>,
    ) -> Result<HandlerOutcome> {
        let key = NameKey {
            organization: organization_for(request, organizations, claims)?,
            namespace: params.kind.into(),
            name: params.full_name(),
        };

        match self.operation {
            Operation::PackageVersions | Operation::MapVersions => self.versions(&key, params),
            Operation::PackageOverview => self.overview(&key, params),
            Operation::PackageContent => self.content(&key, params),
            Operation::PackageUpload => self.upload_package(&key, params, &request.body),
            Operation::MapGet => self.map(&key, params),
            Operation::MapUpload => self.upload_map(&key, params, &request.body),
            Operation::AliasGet => self.alias_redirect(&key, params),
            Operation::AliasCreate => self.put_alias(&key, params, &request.body, false),
            Operation::AliasUpdate => self.put_alias(&key, params, &request.body, true),
            Operation::AliasDelete => self.delete_alias(&key, params),
        }
    }

    fn versions(&self, key: &NameKey, params: &CanonicalRequestParams) -> Result<HandlerOutcome> {
        let store = self.store.read();
        let versions: Vec<&str> = store
            .versions
            .get(key)
            .map(|list| list.iter().map(|stored| stored.version.as_str()).collect())
            .unwrap_or_default();
        if versions.is_empty() {
            return Err(AssetwayError::not_found(format!("'{}' has no versions", key.name)));
        }

        json_document(
            &json!({ "name": params.full_name(), "versions": versions }),
            REVALIDATE,
        )
    }

    fn overview(&self, key: &NameKey, params: &CanonicalRequestParams) -> Result<HandlerOutcome> {
        let version = required(&params.version, "version")?;
        let store = self.store.read();
        let stored = store
            .find(key, version)
            .ok_or_else(|| version_not_found(key, version))?;
        let Payload::Files(files) = &stored.payload else {
            return Err(version_not_found(key, version));
        };

        json_document(
            &json!({
                "name": params.full_name(),
                "version": version,
                "files": files.keys().collect::<Vec<_>>(),
            }),
            IMMUTABLE,
        )
    }

    fn content(&self, key: &NameKey, params: &CanonicalRequestParams) -> Result<HandlerOutcome> {
        let version = required(&params.version, "version")?;
        let path = required(&params.extras, "file path")?;
        let store = self.store.read();
        let stored = store
            .find(key, version)
            .ok_or_else(|| version_not_found(key, version))?;
        let Payload::Files(files) = &stored.payload else {
            return Err(version_not_found(key, version));
        };
        let bytes = files
            .get(path)
            .ok_or_else(|| AssetwayError::not_found(format!("file '{}' not found", path)))?;

        Ok(HandlerOutcome::stream(mime_for(path), bytes.clone())
            .with_cache_control(IMMUTABLE)
            .with_etag(etag(bytes)))
    }

    fn map(&self, key: &NameKey, params: &CanonicalRequestParams) -> Result<HandlerOutcome> {
        let version = required(&params.version, "version")?;
        let store = self.store.read();
        let stored = store
            .find(key, version)
            .ok_or_else(|| version_not_found(key, version))?;
        let Payload::Map(bytes) = &stored.payload else {
            return Err(version_not_found(key, version));
        };

        Ok(HandlerOutcome::stream("application/json", bytes.clone())
            .with_cache_control(IMMUTABLE)
            .with_etag(etag(bytes)))
    }

    fn upload_package(
        &self,
        key: &NameKey,
        params: &CanonicalRequestParams,
        body: &Bytes,
    ) -> Result<HandlerOutcome> {
        let version = required(&params.version, "version")?;
        let upload: PackageUpload = serde_json::from_slice(body)?;
        if upload.files.is_empty() {
            return Err(AssetwayError::bad_request("upload contains no files"));
        }
        if let Some(bad) = upload.files.keys().find(|path| !is_file_path(path)) {
            return Err(AssetwayError::bad_request(format!("invalid file path '{}'", bad)));
        }

        let files = upload
            .files
            .into_iter()
            .map(|(path, content)| (path, Bytes::from(content)))
            .collect();
        self.insert_version(key, version, Payload::Files(files))?;

        tracing::info!(package = %key.name, version, "Package version published");
        Ok(HandlerOutcome::redirect(StatusCode::SEE_OTHER, params.to_path()))
    }

    fn upload_map(
        &self,
        key: &NameKey,
        params: &CanonicalRequestParams,
        body: &Bytes,
    ) -> Result<HandlerOutcome> {
        let version = required(&params.version, "version")?;
        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(body)?;
        self.insert_version(key, version, Payload::Map(body.clone()))?;

        tracing::info!(map = %key.name, version, "Import map published");
        Ok(HandlerOutcome::redirect(StatusCode::SEE_OTHER, params.to_path()))
    }

    fn insert_version(&self, key: &NameKey, version: &str, payload: Payload) -> Result<()> {
        let mut store = self.store.write();
        if store.find(key, version).is_some() {
            return Err(AssetwayError::with_status(
                StatusCode::CONFLICT,
                format!("'{}' version {} already exists", key.name, version),
            ));
        }
        store
            .versions
            .entry(key.clone())
            .or_default()
            .push(StoredVersion {
                version: version.to_string(),
                payload,
            });
        Ok(())
    }

    fn alias_redirect(
        &self,
        key: &NameKey,
        params: &CanonicalRequestParams,
    ) -> Result<HandlerOutcome> {
        let alias = required(&params.alias, "alias")?;
        let version = self
            .store
            .read()
            .aliases
            .get(&(key.clone(), alias.to_string()))
            .cloned()
            .ok_or_else(|| alias_not_found(key, alias))?;

        let target = CanonicalRequestParams {
            version: Some(version),
            alias: None,
            ..params.clone()
        }
        .to_path();

        Ok(HandlerOutcome::redirect(StatusCode::FOUND, target.clone())
            .with_cache_control(ALIAS_REDIRECT)
            .with_etag(etag(target.as_bytes())))
    }

    fn put_alias(
        &self,
        key: &NameKey,
        params: &CanonicalRequestParams,
        body: &Bytes,
        replace: bool,
    ) -> Result<HandlerOutcome> {
        let alias = required(&params.alias, "alias")?;
        let upload: AliasUpload = serde_json::from_slice(body)?;
        if !is_version(&upload.version) {
            return Err(AssetwayError::bad_request(format!(
                "'{}' is not a version",
                upload.version
            )));
        }
        if major_of(&upload.version) != Some(alias) {
            return Err(AssetwayError::bad_request(format!(
                "version {} does not belong to alias v{}",
                upload.version, alias
            )));
        }

        let mut store = self.store.write();
        if store.find(key, &upload.version).is_none() {
            return Err(version_not_found(key, &upload.version));
        }
        let slot = (key.clone(), alias.to_string());
        match (store.aliases.contains_key(&slot), replace) {
            (true, false) => {
                return Err(AssetwayError::with_status(
                    StatusCode::CONFLICT,
                    format!("alias v{} of '{}' already exists", alias, key.name),
                ));
            }
            (false, true) => return Err(alias_not_found(key, alias)),
            _ => {}
        }
        store.aliases.insert(slot, upload.version.clone());
        drop(store);

        tracing::info!(package = %key.name, alias, version = %upload.version, "Alias updated");
        Ok(HandlerOutcome::redirect(StatusCode::SEE_OTHER, params.to_path()))
    }

    fn delete_alias(&self, key: &NameKey, params: &CanonicalRequestParams) -> Result<HandlerOutcome> {
        let alias = required(&params.alias, "alias")?;
        self.store
            .write()
            .aliases
            .remove(&(key.clone(), alias.to_string()))
            .ok_or_else(|| alias_not_found(key, alias))?;

        tracing::info!(package = %key.name, alias, "Alias deleted");
        Ok(HandlerOutcome::json(
            StatusCode::OK,
            json!({ "name": params.full_name(), "alias": alias, "deleted": true }),
        ))
    }
}

#[async_trait]
impl RequestHandler for MemoryHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: HandlerRequest,
        params: &CanonicalRequestParams,
        organizations: &OrganizationMapping,
        claims: Option<&Claims>,
    ) -> Result<HandlerOutcome> {
        let started = Instant::now();
        let result = self.perform(&request, params, organizations, claims);

        let status = match &result {
            Ok(outcome) => outcome.status,
            Err(error) => error.status_code(),
        };
        self.emitter.emit(MetricsEvent::new(
            self.name.clone(),
            self.operation.as_str(),
            status.as_u16(),
            started.elapsed(),
        ));

        result
    }

    fn metrics(&self) -> Option<EventStream> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// One memory handler per operation, all sharing `store`.
pub fn handlers(store: Arc<MemoryStore>) -> HandlerSet {
    Operation::ALL
        .into_iter()
        .fold(HandlerSet::new(), |set, operation| {
            set.with(operation, Arc::new(MemoryHandler::new(operation, store.clone())))
        })
}

fn organization_for(
    request: &HandlerRequest,
    organizations: &OrganizationMapping,
    claims: Option<&Claims>,
) -> Result<String> {
    if !organizations.is_enforced() {
        return Ok(UNRESTRICTED.to_string());
    }

    let organization = request
        .host
        .as_deref()
        .and_then(|host| organizations.lookup(host))
        .ok_or_else(|| AssetwayError::bad_request("organization not found for host"))?;

    if claims.is_some_and(|claims| claims.org != organization) {
        return Err(AssetwayError::with_status(
            StatusCode::FORBIDDEN,
            "token was issued for another organization",
        ));
    }

    Ok(organization.to_string())
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| AssetwayError::internal(format!("route delivered no {}", what)))
}

fn json_document(value: &serde_json::Value, cache_control: &str) -> Result<HandlerOutcome> {
    let bytes = Bytes::from(serde_json::to_vec(value)?);
    let tag = etag(&bytes);
    Ok(
        HandlerOutcome::new(StatusCode::OK, "application/json", OutcomeBody::Bytes(bytes))
            .with_cache_control(cache_control)
            .with_etag(tag),
    )
}

fn version_not_found(key: &NameKey, version: &str) -> AssetwayError {
    AssetwayError::not_found(format!("'{}' version {} not found", key.name, version))
}

fn alias_not_found(key: &NameKey, alias: &str) -> AssetwayError {
    AssetwayError::not_found(format!("alias v{} of '{}' not found", alias, key.name))
}

fn etag(bytes: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(bytes))
}

fn is_file_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn mime_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("js" | "mjs" | "cjs") => "application/javascript",
        Some("css") => "text/css",
        Some("json" | "map") => "application/json",
        Some("html" | "htm") => "text/html",
        Some("txt" | "md") => "text/plain",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::normalize;
    use axum::http::{HeaderMap, Method, Uri};
    use futures::StreamExt;

    struct Fixture {
        handlers: HandlerSet,
        organizations: OrganizationMapping,
        claims: Claims,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                handlers: handlers(Arc::new(MemoryStore::new())),
                organizations: OrganizationMapping::resolve(["localhost"], "local"),
                claims: Claims {
                    sub: "bootstrap".to_string(),
                    org: "local".to_string(),
                    iss: "assetway".to_string(),
                    iat: 0,
                    exp: u64::MAX,
                    jti: "test".to_string(),
                },
            }
        }

        async fn call(
            &self,
            operation: Operation,
            method: Method,
            path: &str,
            host: &str,
            body: &str,
        ) -> Result<HandlerOutcome> {
            let params = normalize(path)?;
            let request = HandlerRequest {
                method,
                uri: path.parse::<Uri>().unwrap(),
                host: Some(host.to_string()),
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_string()),
            };
            self.handlers
                .get(operation)
                .unwrap()
                .handle(request, &params, &self.organizations, Some(&self.claims))
                .await
        }

        async fn publish(&self, path: &str) {
            let outcome = self
                .call(
                    Operation::PackageUpload,
                    Method::PUT,
                    path,
                    "localhost",
                    r#"{"files":{"index.js":"export default 1;","main/index.js":"export {};"}}"#,
                )
                .await
                .unwrap();
            assert_eq!(outcome.status, StatusCode::SEE_OTHER);
        }
    }

    async fn body_bytes(outcome: HandlerOutcome) -> Bytes {
        match outcome.body {
            OutcomeBody::Bytes(bytes) => bytes,
            OutcomeBody::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk.unwrap());
                }
                Bytes::from(out)
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_then_read_content() {
        let fx = Fixture::new();
        fx.publish("/pkg/@cuz/fuzz/8.4.1").await;

        let outcome = fx
            .call(
                Operation::PackageContent,
                Method::GET,
                "/pkg/@cuz/fuzz/8.4.1/main/index.js",
                "localhost",
                "",
            )
            .await
            .unwrap();
        assert_eq!(outcome.mime_type, "application/javascript");
        assert_eq!(outcome.cache_control, IMMUTABLE);
        assert!(outcome.etag.is_some());
        assert_eq!(body_bytes(outcome).await, Bytes::from_static(b"export {};"));
    }

    #[tokio::test]
    async fn test_pkg_and_npm_share_packages() {
        let fx = Fixture::new();
        fx.publish("/npm/fuzz/1.0.0").await;

        let outcome = fx
            .call(Operation::PackageVersions, Method::GET, "/pkg/fuzz", "localhost", "")
            .await
            .unwrap();
        assert_eq!(outcome.cache_control, REVALIDATE);
        let listing: serde_json::Value =
            serde_json::from_slice(&body_bytes(outcome).await).unwrap();
        assert_eq!(listing["versions"], json!(["1.0.0"]));
    }

    #[tokio::test]
    async fn test_duplicate_version_conflicts() {
        let fx = Fixture::new();
        fx.publish("/pkg/fuzz/1.0.0").await;

        let err = fx
            .call(
                Operation::PackageUpload,
                Method::PUT,
                "/npm/fuzz/1.0.0",
                "localhost",
                r#"{"files":{"a.js":"1"}}"#,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_host_rejected() {
        let fx = Fixture::new();
        let err = fx
            .call(Operation::PackageVersions, Method::GET, "/pkg/fuzz", "evil.example", "")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("organization not found for host"));
    }

    #[tokio::test]
    async fn test_alias_lifecycle() {
        let fx = Fixture::new();
        fx.publish("/pkg/fuzz/8.4.1").await;

        let created = fx
            .call(
                Operation::AliasCreate,
                Method::POST,
                "/pkg/fuzz/v8",
                "localhost",
                r#"{"version":"8.4.1"}"#,
            )
            .await
            .unwrap();
        assert_eq!(created.status, StatusCode::SEE_OTHER);
        assert_eq!(created.location.as_deref(), Some("/pkg/fuzz/v8"));

        let redirect = fx
            .call(
                Operation::AliasGet,
                Method::GET,
                "/npm/fuzz/v8/main/index.js",
                "localhost:4001",
                "",
            )
            .await
            .unwrap();
        assert_eq!(redirect.status, StatusCode::FOUND);
        assert_eq!(
            redirect.location.as_deref(),
            Some("/npm/fuzz/8.4.1/main/index.js")
        );
        assert_eq!(redirect.cache_control, ALIAS_REDIRECT);

        let deleted = fx
            .call(Operation::AliasDelete, Method::DELETE, "/pkg/fuzz/v8", "localhost", "")
            .await
            .unwrap();
        assert_eq!(deleted.status, StatusCode::OK);

        let err = fx
            .call(Operation::AliasGet, Method::GET, "/pkg/fuzz/v8", "localhost", "")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alias_must_match_major() {
        let fx = Fixture::new();
        fx.publish("/pkg/fuzz/8.4.1").await;

        let err = fx
            .call(
                Operation::AliasCreate,
                Method::POST,
                "/pkg/fuzz/v9",
                "localhost",
                r#"{"version":"8.4.1"}"#,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alias_update_requires_existing_alias() {
        let fx = Fixture::new();
        fx.publish("/pkg/fuzz/8.4.1").await;

        let err = fx
            .call(
                Operation::AliasUpdate,
                Method::PUT,
                "/pkg/fuzz/v8",
                "localhost",
                r#"{"version":"8.4.1"}"#,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_map_upload_requires_json_object() {
        let fx = Fixture::new();
        let err = fx
            .call(Operation::MapUpload, Method::PUT, "/map/site/1.0.0", "localhost", "[1,2]")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = r#"{"imports":{"fuzz":"/pkg/fuzz/v8/index.js"}}"#;
        fx.call(Operation::MapUpload, Method::PUT, "/map/site/1.0.0", "localhost", body)
            .await
            .unwrap();
        let outcome = fx
            .call(Operation::MapGet, Method::GET, "/map/site/1.0.0", "localhost", "")
            .await
            .unwrap();
        assert_eq!(body_bytes(outcome).await, Bytes::from(body));
    }

    #[tokio::test]
    async fn test_each_call_emits_one_event() {
        let fx = Fixture::new();
        let mut events = fx
            .handlers
            .get(Operation::PackageVersions)
            .unwrap()
            .metrics()
            .unwrap();

        let _ = fx
            .call(Operation::PackageVersions, Method::GET, "/pkg/missing", "localhost", "")
            .await;

        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.operation, "package_versions");
        assert_eq!(event.status, 404);
        assert!(fx.handlers.get(Operation::PackageVersions).unwrap().metrics().is_none());
    }

    #[test]
    fn test_file_path_rules() {
        assert!(is_file_path("main/index.js"));
        assert!(!is_file_path("/index.js"));
        assert!(!is_file_path("../secret"));
        assert!(!is_file_path(""));
    }
}
