//! Ready-made configuration and apps for endpoint tests.

use crate::app::AppContext;
use crate::auth::LoginResponse;
use crate::config::{Config, ConfigBuilder};
use crate::core::App;
use crate::registry::HandlerSet;
use axum::Router;
use serde_json::json;

/// Bootstrap credential used by [`test_config`].
pub const TEST_AUTH_KEY: &str = "test-bootstrap-key";

/// Token-signing secret used by [`test_config`].
pub const TEST_JWT_SECRET: &str = "test-signing-secret";

/// Hostname mapped to [`TEST_ORG`].
pub const TEST_HOST: &str = "assets.test";

pub const TEST_ORG: &str = "test-org";

/// Configuration with fixed secrets and a single mapped hostname.
pub fn test_config() -> ConfigBuilder {
    ConfigBuilder::new()
        .with_auth_key(TEST_AUTH_KEY)
        .with_jwt_secret(TEST_JWT_SECRET)
        .with_organization(TEST_ORG)
        .with_hostnames([TEST_HOST])
}

/// Router over the in-memory sink with [`test_config`] settings.
pub async fn test_app() -> Router {
    app_from(test_config().build().expect("test config is valid"), None)
}

/// Router over custom handlers with [`test_config`] settings.
pub async fn test_app_with_handlers(handlers: HandlerSet) -> Router {
    app_from(
        test_config().build().expect("test config is valid"),
        Some(handlers),
    )
}

/// Router for an arbitrary configuration.
pub fn app_from(config: Config, handlers: Option<HandlerSet>) -> Router {
    let mut builder = AppContext::builder(config);
    if let Some(handlers) = handlers {
        builder = builder.with_handlers(handlers);
    }
    let context = builder.build().expect("test context builds");
    App::with_context(context).into_test_router()
}

/// Exchange [`TEST_AUTH_KEY`] for a token.
pub async fn login(app: &Router) -> String {
    let response: LoginResponse = super::post(app.clone(), "/auth/login")
        .host(TEST_HOST)
        .json_body(&json!({ "key": TEST_AUTH_KEY }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    response.token
}
