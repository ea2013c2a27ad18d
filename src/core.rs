use crate::{
    app::AppContext,
    auth::AuthRoutes,
    config::Config,
    dispatch::RegistryRoutes,
    error::{AssetwayError, Result},
    health,
    http::RouteModule,
    middleware,
};
use axum::{Router, routing::get};
use std::time::Duration;
use tokio::signal;

#[cfg(feature = "metrics")]
use crate::metrics::metrics_handler;

/// The HTTP dispatch application.
pub struct App {
    router: Router<AppContext>,
    config: Config,
    context: AppContext,
}

impl App {
    /// Create an app serving the configured sink.
    ///
    /// Must be called inside a tokio runtime.
    pub fn with_config(config: Config) -> Result<Self> {
        let context = AppContext::builder(config).build()?;
        Ok(Self::with_context(context))
    }

    /// Create an app around an already-built context.
    pub fn with_context(context: AppContext) -> Self {
        let config = (*context.config).clone();
        let router = Self::build_router(&config);
        Self {
            router,
            config,
            context,
        }
    }

    fn build_router(config: &Config) -> Router<AppContext> {
        let mut router = Router::<AppContext>::new().route("/health", get(health::health_handler));

        #[cfg(feature = "metrics")]
        if config.metrics.enabled {
            router = router.route(config.metrics.path.as_str(), get(metrics_handler));
        }
        #[cfg(not(feature = "metrics"))]
        let _ = config;

        router = AuthRoutes.register(router);
        router = RegistryRoutes.register(router);
        router.fallback(not_found)
    }

    /// Register an additional route module
    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// Router with middleware and state applied, for driving requests in tests.
    pub fn into_test_router(self) -> Router {
        let app = self.with_middleware();
        app.router.with_state(app.context)
    }

    /// Apply middleware stack and prepare for serving
    fn with_middleware(mut self) -> Self {
        self.router = middleware::apply(self.router, &self.config.server);
        self
    }

    /// Start the application server
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.server.addr().map_err(|e| {
            AssetwayError::internal(format!("Invalid server address in config: {}", e))
        })?;

        let app = self.with_middleware();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AssetwayError::internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(
            organization = %app.config.organization.name,
            sink = %app.config.sink.kind,
            "Server starting on http://{}",
            addr
        );
        tracing::info!("Health check available at http://{}/health", addr);

        let router = app.router.with_state(app.context);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AssetwayError::internal(format!("Server error: {}", e)))
    }
}

async fn not_found() -> AssetwayError {
    AssetwayError::not_found("no route matches this path")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give connections a grace period to close
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
