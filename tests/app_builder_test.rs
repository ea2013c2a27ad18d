use assetway::http::RouteModule;
use assetway::testing;
use assetway::{App, AppContext, ConfigBuilder};
use axum::{Router, routing::get};
use serde_json::json;

struct StatusModule;

impl RouteModule for StatusModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/status", get(|| async { "up" }))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/internal")
    }
}

#[tokio::test]
async fn test_app_with_default_config() {
    let app = App::with_config(ConfigBuilder::new().build().unwrap())
        .unwrap()
        .into_test_router();

    testing::get(app, "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("status", json!("healthy"))
        .await;
}

#[tokio::test]
async fn test_register_extra_module() {
    let context = AppContext::builder(ConfigBuilder::new().build().unwrap())
        .build()
        .unwrap();
    let app = App::with_context(context)
        .register_module(StatusModule)
        .into_test_router();

    testing::get(app, "/internal/status")
        .execute()
        .await
        .assert_ok()
        .assert_contains("up")
        .await;
}

#[tokio::test]
async fn test_default_config_serves_localhost() {
    let app = App::with_config(ConfigBuilder::new().build().unwrap())
        .unwrap()
        .into_test_router();

    testing::get(app.clone(), "/pkg/fuzz")
        .host("localhost:4001")
        .execute()
        .await
        .assert_not_found();

    testing::get(app, "/pkg/fuzz")
        .host("assets.example.com")
        .execute()
        .await
        .assert_bad_request();
}

#[test]
fn test_config_validation_failures() {
    assert!(ConfigBuilder::new().with_host("invalid..host").build().is_err());
    assert!(ConfigBuilder::new().with_port(0).build().is_err());
    assert!(ConfigBuilder::new().with_max_body_size(0).build().is_err());
    assert!(ConfigBuilder::new().with_organization("  ").build().is_err());
    assert!(ConfigBuilder::new().with_auth_key("").build().is_err());
}
