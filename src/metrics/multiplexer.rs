//! Fan-in of per-handler telemetry streams.
//!
//! Each attached source is forwarded by its own task into one shared sink, so
//! the merged stream yields events in arrival order across all sources. A
//! source that errors is logged and detached; the others keep flowing.
//!
//! Fan-in capacity follows the number of attached sources: attaching raises
//! it by one and detaching lowers it by one, so a dynamic number of producers
//! never trips the over-capacity warning. A multiplexer built with
//! [`Multiplexer::with_fixed_capacity`] keeps its limit and warns once the
//! attached count goes past it.
//!
//! Until the merged output has been taken, relayed events are counted and
//! dropped instead of queued.

use super::event::{EventStream, MetricsEvent};
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

/// Fan-in capacity available before any source is attached.
pub const BASE_CAPACITY: usize = 10;

/// The single downstream stream of merged events.
pub type MergedStream = UnboundedReceiver<MetricsEvent>;

/// Identifies an attached source for a later [`Multiplexer::detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

struct Source {
    name: String,
    task: Option<AbortHandle>,
}

struct Inner {
    sink: UnboundedSender<MetricsEvent>,
    sources: Mutex<HashMap<u64, Source>>,
    attached: AtomicUsize,
    capacity: AtomicUsize,
    adjusts_capacity: bool,
    warnings: AtomicUsize,
    consumed: AtomicBool,
    dropped: AtomicU64,
    next_id: AtomicU64,
}

impl Inner {
    fn sources(&self) -> MutexGuard<'_, HashMap<u64, Source>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a source and release its capacity. Only the first call for an id counts.
    fn release(&self, id: u64) -> Option<Source> {
        let source = self.sources().remove(&id)?;
        self.attached.fetch_sub(1, Ordering::SeqCst);
        if self.adjusts_capacity {
            self.capacity.fetch_sub(1, Ordering::SeqCst);
        }
        tracing::debug!(source = %source.name, "Metrics source detached");
        Some(source)
    }
}

/// Merges any number of metrics sources into one stream.
///
/// Must be used from within a tokio runtime; every attached source is driven
/// by a spawned task.
pub struct Multiplexer {
    inner: Arc<Inner>,
    output: Mutex<Option<MergedStream>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::build(BASE_CAPACITY, true)
    }

    /// A multiplexer whose capacity never moves. Attaching past it raises a warning.
    pub fn with_fixed_capacity(capacity: usize) -> Self {
        Self::build(capacity, false)
    }

    fn build(capacity: usize, adjusts_capacity: bool) -> Self {
        let (sink, output) = unbounded();
        Self {
            inner: Arc::new(Inner {
                sink,
                sources: Mutex::new(HashMap::new()),
                attached: AtomicUsize::new(0),
                capacity: AtomicUsize::new(capacity),
                adjusts_capacity,
                warnings: AtomicUsize::new(0),
                consumed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
            }),
            output: Mutex::new(Some(output)),
        }
    }

    /// Take the merged output. Only the first caller receives it.
    ///
    /// Events relayed before this call are dropped.
    pub fn take_stream(&self) -> Option<MergedStream> {
        let output = self
            .output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if output.is_some() {
            self.inner.consumed.store(true, Ordering::Release);
        }
        output
    }

    /// Start relaying a source into the merged output.
    pub fn attach(&self, name: impl Into<String>, stream: EventStream) -> SourceId {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let attached = self.inner.attached.fetch_add(1, Ordering::SeqCst) + 1;
        let capacity = if self.inner.adjusts_capacity {
            self.inner.capacity.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.inner.capacity.load(Ordering::SeqCst)
        };
        if attached > capacity {
            self.inner.warnings.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(attached, capacity, "Too many metrics sources attached");
        }

        self.inner.sources().insert(
            id,
            Source {
                name: name.clone(),
                task: None,
            },
        );
        tracing::debug!(source = %name, attached, "Metrics source attached");

        let task = tokio::spawn(forward(self.inner.clone(), id, name, stream));

        // The task may already have finished and removed its entry.
        if let Some(source) = self.inner.sources().get_mut(&id) {
            source.task = Some(task.abort_handle());
        }

        SourceId(id)
    }

    /// Stop relaying a source. Returns false if it was already gone.
    pub fn detach(&self, id: SourceId) -> bool {
        match self.inner.release(id.0) {
            Some(source) => {
                if let Some(task) = source.task {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Number of sources currently attached.
    pub fn attached(&self) -> usize {
        self.inner.attached.load(Ordering::SeqCst)
    }

    /// Current fan-in capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::SeqCst)
    }

    /// How many over-capacity warnings have been raised.
    pub fn warnings(&self) -> usize {
        self.inner.warnings.load(Ordering::Relaxed)
    }

    /// Events dropped because nobody had taken the merged output yet.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Names of the attached sources, in no particular order.
    pub fn source_names(&self) -> Vec<String> {
        self.inner
            .sources()
            .values()
            .map(|source| source.name.clone())
            .collect()
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        for (_, source) in self.inner.sources().drain() {
            if let Some(task) = source.task {
                task.abort();
            }
        }
    }
}

/// Merge a fixed set of sources. The returned multiplexer keeps them attached.
pub fn merge<I, S>(streams: I) -> (Multiplexer, MergedStream)
where
    I: IntoIterator<Item = (S, EventStream)>,
    S: Into<String>,
{
    let multiplexer = Multiplexer::new();
    let output = multiplexer
        .take_stream()
        .unwrap_or_else(|| unreachable!("fresh multiplexer owns its output"));
    for (name, stream) in streams {
        multiplexer.attach(name, stream);
    }
    (multiplexer, output)
}

async fn forward(inner: Arc<Inner>, id: u64, name: String, mut stream: EventStream) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(_) if !inner.consumed.load(Ordering::Acquire) => {
                inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(event) => {
                if inner.sink.unbounded_send(event).is_err() {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(source = %name, error = %error, "Metrics source failed; detaching it");
                break;
            }
        }
    }
    inner.release(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::event::{MetricsEmitter, MetricsError};
    use std::collections::HashMap;
    use std::time::Duration;

    fn event(source: &str) -> MetricsEvent {
        MetricsEvent::new(source, "package_content", 200, Duration::from_millis(1))
    }

    async fn next_event(stream: &mut MergedStream) -> MetricsEvent {
        tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("merged stream ended")
    }

    async fn wait_for_attached(mux: &Multiplexer, expected: usize) {
        for _ in 0..200 {
            if mux.attached() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} attached sources, found {}", expected, mux.attached());
    }

    #[tokio::test]
    async fn test_merges_in_arrival_order() {
        let (a, a_stream) = MetricsEmitter::channel();
        let (b, b_stream) = MetricsEmitter::channel();
        let (mux, mut merged) = merge([("a", a_stream), ("b", b_stream)]);
        assert_eq!(mux.attached(), 2);

        a.emit(event("a"));
        assert_eq!(next_event(&mut merged).await.source, "a");
        b.emit(event("b"));
        assert_eq!(next_event(&mut merged).await.source, "b");
        a.emit(event("a"));
        assert_eq!(next_event(&mut merged).await.source, "a");
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let (bad, bad_stream) = MetricsEmitter::channel();
        let (good, good_stream) = MetricsEmitter::channel();
        let (mux, mut merged) = merge([("bad", bad_stream), ("good", good_stream)]);

        bad.fail(MetricsError::Source("disk full".to_string()));
        wait_for_attached(&mux, 1).await;
        assert_eq!(mux.source_names(), vec!["good".to_string()]);

        bad.emit(event("bad"));
        good.emit(event("good"));
        assert_eq!(next_event(&mut merged).await.source, "good");
        assert_eq!(mux.capacity(), BASE_CAPACITY + 1);
    }

    #[tokio::test]
    async fn test_ended_source_detaches_itself() {
        let (emitter, stream) = MetricsEmitter::channel();
        let mux = Multiplexer::new();
        mux.attach("short-lived", stream);
        drop(emitter);

        wait_for_attached(&mux, 0).await;
        assert_eq!(mux.capacity(), BASE_CAPACITY);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let (_emitter, stream) = MetricsEmitter::channel();
        let mux = Multiplexer::new();
        let id = mux.attach("once", stream);

        assert!(mux.detach(id));
        assert!(!mux.detach(id));
        assert_eq!(mux.attached(), 0);
        assert_eq!(mux.capacity(), BASE_CAPACITY);
    }

    #[tokio::test]
    async fn test_fifty_sources_attach_and_detach_without_warning() {
        let mux = Multiplexer::new();
        let mut merged = mux.take_stream().unwrap();

        let mut sources = Vec::new();
        for i in 0..50 {
            let (emitter, stream) = MetricsEmitter::channel();
            let name = format!("source-{}", i);
            let id = mux.attach(name.clone(), stream);
            sources.push((name, emitter, id));
        }
        assert_eq!(mux.attached(), 50);
        assert_eq!(mux.capacity(), BASE_CAPACITY + 50);
        assert_eq!(mux.warnings(), 0);

        let (detached, still_attached) = sources.split_at(25);
        for (_, _, id) in detached {
            assert!(mux.detach(*id));
        }
        assert_eq!(mux.attached(), 25);

        for (name, emitter, _) in still_attached {
            emitter.emit(event(name));
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        for _ in 0..25 {
            *seen.entry(next_event(&mut merged).await.source).or_default() += 1;
        }
        assert_eq!(seen.len(), 25);
        assert!(seen.values().all(|count| *count == 1));
        for (name, _, _) in still_attached {
            assert_eq!(seen.get(name), Some(&1));
        }

        for (_, _, id) in still_attached {
            assert!(mux.detach(*id));
        }
        assert_eq!(mux.attached(), 0);
        assert_eq!(mux.capacity(), BASE_CAPACITY);
        assert_eq!(mux.warnings(), 0);

        let extra = tokio::time::timeout(Duration::from_millis(50), merged.next()).await;
        assert!(extra.is_err(), "no further events expected");
    }

    #[tokio::test]
    async fn test_fixed_capacity_warns_past_its_limit() {
        let mux = Multiplexer::with_fixed_capacity(BASE_CAPACITY);
        let mut emitters = Vec::new();
        for i in 0..50 {
            let (emitter, stream) = MetricsEmitter::channel();
            mux.attach(format!("source-{}", i), stream);
            emitters.push(emitter);
        }

        assert_eq!(mux.attached(), 50);
        assert_eq!(mux.capacity(), BASE_CAPACITY);
        assert_eq!(mux.warnings(), 50 - BASE_CAPACITY);
    }

    #[tokio::test]
    async fn test_events_are_dropped_until_output_is_taken() {
        let (emitter, stream) = MetricsEmitter::channel();
        let mux = Multiplexer::new();
        mux.attach("unread", stream);

        for _ in 0..1000 {
            emitter.emit(event("unread"));
        }
        for _ in 0..200 {
            if mux.dropped() == 1000 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mux.dropped(), 1000);

        let mut merged = mux.take_stream().unwrap();
        assert!(merged.try_next().is_err(), "nothing should be queued");

        emitter.emit(event("unread"));
        assert_eq!(next_event(&mut merged).await.source, "unread");
        assert_eq!(mux.dropped(), 1000);
    }

    #[tokio::test]
    async fn test_output_taken_once() {
        let mux = Multiplexer::new();
        assert!(mux.take_stream().is_some());
        assert!(mux.take_stream().is_none());
    }
}
