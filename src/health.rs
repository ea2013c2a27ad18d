use crate::app::AppContext;
use crate::metrics::Multiplexer;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

/// Trait for implementing health checks
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>>;
}

/// Reports the dispatcher as up whenever it can answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherHealthCheck;

impl HealthCheck for DispatcherHealthCheck {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>> {
        Box::pin(async {
            ComponentHealth {
                name: self.name().to_string(),
                status: HealthStatus::Healthy,
                message: Some("Accepting requests".to_string()),
            }
        })
    }
}

/// Degraded when no handler is feeding the metrics multiplexer.
pub struct MetricsSourcesHealthCheck {
    multiplexer: Arc<Multiplexer>,
}

impl MetricsSourcesHealthCheck {
    pub fn new(multiplexer: Arc<Multiplexer>) -> Self {
        Self { multiplexer }
    }
}

impl HealthCheck for MetricsSourcesHealthCheck {
    fn name(&self) -> &str {
        "metrics"
    }

    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>> {
        Box::pin(async {
            let attached = self.multiplexer.attached();
            let (status, message) = if attached == 0 {
                (HealthStatus::Degraded, "No metrics sources attached".to_string())
            } else {
                (
                    HealthStatus::Healthy,
                    format!(
                        "{} sources attached, capacity {}",
                        attached,
                        self.multiplexer.capacity()
                    ),
                )
            };
            ComponentHealth {
                name: self.name().to_string(),
                status,
                message: Some(message),
            }
        })
    }
}

/// Health check manager that runs all registered checks
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(DispatcherHealthCheck)],
        }
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the health endpoint
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    HealthChecker::new()
        .with_check(Arc::new(MetricsSourcesHealthCheck::new(ctx.multiplexer.clone())))
        .check_health()
        .await
}
