//! Testing utilities for the dispatch layer
//!
//! This module provides:
//! - Alba-style HTTP endpoint testing without running a server
//! - Fixed test configuration, a ready app and a login helper
//! - Fluent assertion APIs
//!
//! # Example
//!
//! ```rust,ignore
//! use assetway::testing::{self, TEST_HOST};
//!
//! #[tokio::test]
//! async fn test_publish_requires_token() {
//!     let app = testing::test_app().await;
//!
//!     testing::put(app, "/pkg/fuzz/1.0.0")
//!         .host(TEST_HOST)
//!         .json_body(&serde_json::json!({"files": {"index.js": ""}}))
//!         .execute()
//!         .await
//!         .assert_unauthorized();
//! }
//! ```

mod fixtures;
mod scenario;

pub use fixtures::{
    TEST_AUTH_KEY, TEST_HOST, TEST_JWT_SECRET, TEST_ORG, app_from, login, test_app,
    test_app_with_handlers, test_config,
};
pub use scenario::{Scenario, ScenarioAssert, delete, get, post, put};
