//! Alba-style HTTP testing utilities for Axum applications
//!
//! Drives a router in-process with `tower::ServiceExt::oneshot`, so no server
//! or socket is involved.
//!
//! # Example
//!
//! ```rust,ignore
//! use assetway::testing;
//!
//! #[tokio::test]
//! async fn test_versions_require_a_known_package() {
//!     let app = testing::test_app().await;
//!
//!     testing::get(app, "/pkg/fuzz")
//!         .host("localhost")
//!         .execute()
//!         .await
//!         .assert_not_found()
//!         .assert_json();
//! }
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;

/// Alba-style test scenario builder for easy endpoint testing
pub struct Scenario {
    app: Router,
    request: Request<Body>,
}

impl Scenario {
    /// Create a new test scenario with the given app
    pub fn new(app: Router) -> Self {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = Method::GET;
        Self { app, request }
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        *self.request.method_mut() = method;
        self
    }

    /// Set the request target, path and optional query
    pub fn uri(mut self, uri: &str) -> Self {
        *self.request.uri_mut() = uri.parse().expect("invalid request target in test");
        self
    }

    /// Add a header
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes()).expect("invalid header name in test"),
            HeaderValue::from_str(value).expect("invalid header value in test"),
        );
        self
    }

    /// Set the `Host` header
    pub fn host(self, host: &str) -> Self {
        self.header("host", host)
    }

    /// Set the Authorization header with Bearer token
    pub fn bearer_token(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    /// Set JSON body from a serializable type
    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_vec(body).expect("test body must serialize");
        *self.request.body_mut() = Body::from(json);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Set an `application/x-www-form-urlencoded` body
    pub fn form_body(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        *self.request.body_mut() = Body::from(encoded);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self
    }

    /// Set a raw body without touching the content type
    pub fn raw_body(mut self, body: impl Into<Body>) -> Self {
        *self.request.body_mut() = body.into();
        self
    }

    /// Execute the request and get an assertion builder
    pub async fn execute(self) -> ScenarioAssert {
        let response = self
            .app
            .oneshot(self.request)
            .await
            .unwrap_or_else(|never| match never {});
        ScenarioAssert { response }
    }
}

/// Assertion builder for test responses
pub struct ScenarioAssert {
    response: Response,
}

impl ScenarioAssert {
    /// Assert the response status code
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    /// Assert status is 200 OK
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert status is 400 Bad Request
    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    /// Assert status is 401 Unauthorized
    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    /// Assert status is 404 Not Found
    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    /// Assert a redirect with the given status to `location`
    pub fn assert_redirect(self, status: StatusCode, location: &str) -> Self {
        self.assert_status(status).assert_header("location", location)
    }

    /// Assert a header exists with the given value
    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .header(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key));
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    /// Assert a header is present, whatever its value
    pub fn assert_header_present(self, key: &str) -> Self {
        assert!(self.header(key).is_some(), "Header '{}' not found", key);
        self
    }

    /// Assert a header is absent
    pub fn assert_header_absent(self, key: &str) -> Self {
        assert!(
            self.header(key).is_none(),
            "Header '{}' unexpectedly present",
            key
        );
        self
    }

    /// Assert the response content type is JSON
    pub fn assert_json(self) -> Self {
        let content_type = self
            .header(header::CONTENT_TYPE.as_str())
            .expect("Content-Type header not found");
        assert!(
            content_type.contains("application/json"),
            "Expected JSON content type, got: {}",
            content_type
        );
        self
    }

    /// Value of a response header, if present and ASCII
    pub fn header(&self, key: &str) -> Option<String> {
        self.response
            .headers()
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Get the response body as bytes
    pub async fn body_bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec()
    }

    /// Get the response body as a string
    pub async fn body_string(self) -> String {
        String::from_utf8(self.body_bytes().await).expect("Response body is not UTF-8")
    }

    /// Parse the JSON response body into a type
    pub async fn json<T: for<'de> Deserialize<'de>>(self) -> T {
        let bytes = self.body_bytes().await;
        serde_json::from_slice(&bytes).expect("Failed to parse JSON response")
    }

    /// Assert JSON field equals a value using dot notation, e.g. `checks.0.status`
    pub async fn assert_json_path(self, path: &str, expected: serde_json::Value) -> Self {
        let (parts, body) = self.response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("Failed to read response body");
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).expect("Failed to parse JSON response");

        let actual = json_path_get(&json, path)
            .unwrap_or_else(|| panic!("Path '{}' not found in JSON: {}", path, json));
        assert_eq!(actual, &expected, "JSON path '{}' value mismatch", path);

        Self {
            response: Response::from_parts(parts, Body::from(bytes)),
        }
    }

    /// Assert the response body contains the given text
    pub async fn assert_contains(self, text: &str) -> Self {
        let (parts, body) = self.response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .expect("Failed to read response body");
        let body = String::from_utf8_lossy(&bytes);
        assert!(
            body.contains(text),
            "Response body does not contain '{}'. Body: {}",
            text,
            body
        );
        Self {
            response: Response::from_parts(parts, Body::from(bytes)),
        }
    }

    /// Get the underlying response for custom assertions
    pub fn response(self) -> Response {
        self.response
    }
}

/// Simple JSON path getter (dot notation with numeric array indexes)
fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = json;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(part)?,
        };
    }
    Some(current)
}

/// Convenience function to create a GET request scenario
pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::GET).uri(uri)
}

/// Convenience function to create a POST request scenario
pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::POST).uri(uri)
}

/// Convenience function to create a PUT request scenario
pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::PUT).uri(uri)
}

/// Convenience function to create a DELETE request scenario
pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::DELETE).uri(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, routing::get as axum_get};
    use serde_json::json;

    async fn hello_handler() -> Json<serde_json::Value> {
        Json(json!({"checks": [{"name": "dispatcher"}]}))
    }

    async fn echo_host(headers: axum::http::HeaderMap) -> String {
        headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_basic_get() {
        let app = Router::new().route("/hello", axum_get(hello_handler));

        get(app, "/hello")
            .execute()
            .await
            .assert_ok()
            .assert_json()
            .assert_json_path("checks.0.name", json!("dispatcher"))
            .await
            .assert_header("content-type", "application/json");
    }

    #[tokio::test]
    async fn test_host_header_is_sent() {
        let app = Router::new().route("/host", axum_get(echo_host));

        get(app, "/host")
            .host("assets.example.com:4001")
            .execute()
            .await
            .assert_ok()
            .assert_contains("assets.example.com:4001")
            .await;
    }

    #[test]
    fn test_json_path_get() {
        let value = json!({"a": {"b": [1, {"c": true}]}});
        assert_eq!(json_path_get(&value, "a.b.1.c"), Some(&json!(true)));
        assert_eq!(json_path_get(&value, "a.x"), None);
    }
}
