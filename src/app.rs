use std::sync::Arc;

use crate::auth::AuthGate;
use crate::config::Config;
use crate::error::{AssetwayError, Result};
use crate::metrics::Multiplexer;
use crate::registry::{HandlerSet, memory};
use crate::tenancy::OrganizationMapping;

#[cfg(feature = "metrics")]
use crate::metrics::MetricsCollector;

/// Shared state handed to every route.
///
/// Built once at startup; everything in it is read-only or internally
/// synchronized, so clones are cheap and safe across concurrent requests.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub auth: Arc<AuthGate>,
    pub organizations: Arc<OrganizationMapping>,
    pub handlers: Arc<HandlerSet>,
    pub multiplexer: Arc<Multiplexer>,

    /// Present when metrics are enabled in configuration
    #[cfg(feature = "metrics")]
    pub collector: Option<Arc<MetricsCollector>>,
}

impl AppContext {
    /// Builder pattern for constructing AppContext
    pub fn builder(config: Config) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }
}

/// Builder for AppContext with fluent API
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    config: Config,
    handlers: Option<HandlerSet>,
}

impl AppContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: None,
        }
    }

    /// Use these handlers instead of the ones the configured sink provides.
    pub fn with_handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Resolve tenancy, create the auth gate and wire handler telemetry.
    ///
    /// Attaching metrics sources spawns tasks, so this must run inside a
    /// tokio runtime.
    pub fn build(self) -> Result<AppContext> {
        let config = self.config;

        let organizations = OrganizationMapping::from_config(&config.organization);
        if organizations.is_enforced() {
            tracing::info!(
                organization = %config.organization.name,
                hostnames = ?config.organization.hostnames,
                "Tenancy resolved"
            );
        } else {
            tracing::warn!("No hostnames configured; tenancy check disabled");
        }

        AuthGate::warn_on_default_secrets(&config.auth);
        let auth = AuthGate::new(&config.auth, &config.service.name, &config.organization.name);

        let handlers = match self.handlers {
            Some(handlers) => handlers,
            None => sink_handlers(&config.sink.kind)?,
        };

        let multiplexer = Arc::new(Multiplexer::new());
        let attached = handlers.attach_metrics(&multiplexer);
        tracing::debug!(sources = attached.len(), "Handler metrics attached");

        #[cfg(feature = "metrics")]
        let collector = if config.metrics.enabled {
            let collector = Arc::new(MetricsCollector::new().map_err(|e| {
                AssetwayError::internal(format!("Failed to create metrics collector: {}", e))
            })?);
            if let Some(stream) = multiplexer.take_stream() {
                collector.clone().consume(stream);
            }
            Some(collector)
        } else {
            None
        };

        Ok(AppContext {
            config: Arc::new(config),
            auth: Arc::new(auth),
            organizations: Arc::new(organizations),
            handlers: Arc::new(handlers),
            multiplexer,
            #[cfg(feature = "metrics")]
            collector,
        })
    }
}

fn sink_handlers(kind: &str) -> Result<HandlerSet> {
    match kind {
        "memory" => Ok(memory::handlers(Arc::new(memory::MemoryStore::new()))),
        other => Err(AssetwayError::internal(format!("Unsupported sink: {}", other))),
    }
}
