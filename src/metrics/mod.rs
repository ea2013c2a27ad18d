//! Handler telemetry.
//!
//! Every delegated handler owns an event stream. The [`Multiplexer`] merges
//! them into one stream; with the `metrics` feature, a prometheus collector
//! consumes that stream and is exposed over HTTP.

mod event;
mod multiplexer;

#[cfg(feature = "metrics")]
mod collector;
#[cfg(feature = "metrics")]
mod handler;

pub use event::{EventStream, MetricsEmitter, MetricsError, MetricsEvent, Outcome};
pub use multiplexer::{BASE_CAPACITY, MergedStream, Multiplexer, SourceId, merge};

#[cfg(feature = "metrics")]
pub use collector::MetricsCollector;
#[cfg(feature = "metrics")]
pub use handler::metrics_handler;
