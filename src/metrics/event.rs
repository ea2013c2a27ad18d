use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    ClientError,
    ServerError,
}

impl Outcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Outcome::ServerError,
            400..=499 => Outcome::ClientError,
            _ => Outcome::Success,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ClientError => "client_error",
            Outcome::ServerError => "server_error",
        }
    }
}

/// One completed operation, as reported by the handler that performed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsEvent {
    /// Name of the emitting handler
    pub source: String,
    /// Operation that completed, e.g. `package_content`
    pub operation: String,
    pub outcome: Outcome,
    pub status: u16,
    pub duration: Duration,
    pub at: SystemTime,
}

impl MetricsEvent {
    pub fn new(
        source: impl Into<String>,
        operation: impl Into<String>,
        status: u16,
        duration: Duration,
    ) -> Self {
        Self {
            source: source.into(),
            operation: operation.into(),
            outcome: Outcome::from_status(status),
            status,
            duration,
            at: SystemTime::now(),
        }
    }
}

/// Failure of a telemetry source. Ends that source only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics source failed: {0}")]
    Source(String),
}

/// Stream of events produced by one handler.
pub type EventStream = BoxStream<'static, Result<MetricsEvent, MetricsError>>;

/// Producer side of a handler's event stream.
#[derive(Debug, Clone)]
pub struct MetricsEmitter {
    sender: UnboundedSender<Result<MetricsEvent, MetricsError>>,
}

impl MetricsEmitter {
    /// Create an emitter and the stream it feeds.
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver.boxed())
    }

    /// Publish an event. Dropped silently once nobody is listening.
    pub fn emit(&self, event: MetricsEvent) {
        let _ = self.sender.unbounded_send(Ok(event));
    }

    /// Report a failure; the consumer stops reading this source.
    pub fn fail(&self, error: MetricsError) {
        let _ = self.sender.unbounded_send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(Outcome::from_status(200), Outcome::Success);
        assert_eq!(Outcome::from_status(302), Outcome::Success);
        assert_eq!(Outcome::from_status(404), Outcome::ClientError);
        assert_eq!(Outcome::from_status(503), Outcome::ServerError);
    }

    #[tokio::test]
    async fn test_emitter_feeds_stream() {
        let (emitter, mut stream) = MetricsEmitter::channel();
        emitter.emit(MetricsEvent::new("pkg", "package_content", 200, Duration::from_millis(3)));
        drop(emitter);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.source, "pkg");
        assert_eq!(event.outcome, Outcome::Success);
        assert!(stream.next().await.is_none());
    }
}
