use super::event::MetricsEvent;
use super::multiplexer::MergedStream;
use futures::StreamExt;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Prometheus view of the merged handler telemetry
#[derive(Clone)]
pub struct MetricsCollector {
    /// Completed handler operations by operation and outcome
    pub handler_operations_total: IntCounterVec,

    /// Handler operation duration in seconds
    pub handler_duration_seconds: HistogramVec,

    /// Metrics sources currently attached to the multiplexer
    pub sources_attached: IntGauge,

    registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let handler_operations_total = IntCounterVec::new(
            Opts::new(
                "handler_operations_total",
                "Total number of completed handler operations",
            )
            .namespace("assetway"),
            &["operation", "outcome"],
        )?;

        let handler_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "handler_duration_seconds",
                "Handler operation duration in seconds",
            )
            .namespace("assetway")
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["operation"],
        )?;

        let sources_attached = IntGauge::with_opts(
            Opts::new(
                "metrics_sources_attached",
                "Number of metrics sources attached to the multiplexer",
            )
            .namespace("assetway"),
        )?;

        registry.register(Box::new(handler_operations_total.clone()))?;
        registry.register(Box::new(handler_duration_seconds.clone()))?;
        registry.register(Box::new(sources_attached.clone()))?;

        Ok(Self {
            handler_operations_total,
            handler_duration_seconds,
            sources_attached,
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one handler event
    pub fn record(&self, event: &MetricsEvent) {
        self.handler_operations_total
            .with_label_values(&[event.operation.as_str(), event.outcome.as_str()])
            .inc();

        self.handler_duration_seconds
            .with_label_values(&[event.operation.as_str()])
            .observe(event.duration.as_secs_f64());
    }

    /// Drain the merged stream into the registry until it ends.
    pub fn consume(self: Arc<Self>, mut stream: MergedStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                self.record(&event);
            }
            tracing::debug!("Merged metrics stream ended");
        })
    }
}
