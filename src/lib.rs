//! Assetway - HTTP dispatch layer for a package, import-map and alias registry
//!
//! Sits between raw HTTP traffic and a pluggable registry engine. Every
//! request under `/pkg`, `/npm` and `/map` is normalized into canonical
//! parameters, checked against the tenancy and auth rules, and handed to the
//! handler registered for its operation.
//!
//! # Features
//!
//! - **Dispatch**: declarative route table over normalized parameters
//! - **Tenancy**: hostname to organization resolution
//! - **Authentication**: bootstrap credential exchanged for a 7-day HS256 token
//! - **Metrics**: fan-in of per-handler event streams, optional Prometheus exposition
//! - **Testing**: Alba-style HTTP testing utilities
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use assetway::{App, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> assetway::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     assetway::init_tracing_with_config(&config);
//!
//!     App::with_config(config)?.serve().await
//! }
//! ```

mod app;
pub mod auth;
mod config;
mod core;
pub mod dispatch;
mod error;
pub mod health;
pub mod http;
pub mod metrics;
mod middleware;
pub mod registry;
pub mod tenancy;
pub mod testing;
mod utils;

// Re-exports for public API
pub use app::{AppContext, AppContextBuilder};
pub use auth::{AuthGate, Claims, TokenExtractor};
pub use config::{
    AuthConfig, Config, ConfigBuilder, LoggingConfig, MetricsConfig, OrganizationConfig,
    ServerConfig, ServiceConfig, SinkConfig,
};
pub use core::App;
pub use error::{AssetwayError, ErrorResponse, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::{CanonicalRequestParams, Kind, RouteModule, Shape, normalize};
pub use metrics::{MetricsEmitter, MetricsEvent, Multiplexer};
#[cfg(feature = "metrics")]
pub use metrics::MetricsCollector;
pub use registry::{
    HandlerOutcome, HandlerRequest, HandlerSet, Operation, OutcomeBody, RequestHandler,
};
pub use tenancy::OrganizationMapping;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main()
/// before creating the App.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "assetway=debug")
/// - `ASSETWAY_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("ASSETWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    install(env_filter, json_logs);
}

/// Initialize tracing from the logging section of a built configuration
///
/// `RUST_LOG`, when set, still takes precedence over the configured level.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    install(env_filter, config.logging.json);
}

fn install(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
