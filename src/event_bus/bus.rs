use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::{sync::oneshot, task};

use super::diagnostics::{DiagnosticsStream, SinkDiagnostic};
use super::emitter::EventEmitter;
use super::hub::{EventHub, EventStream};
use super::sink::{EventSink, StdOutSink};

const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 256;

/// Central event broadcasting system for workflow execution events.
///
/// `EventBus` receives events from workflow nodes and broadcasts them to multiple
/// sinks (stdout, channels, files, monitoring systems, etc.). It's the backbone
/// of Weavegraph's observability and streaming capabilities.
///
/// # Architecture
///
/// The EventBus is built by [`App`](crate::app::App) from [`RuntimeConfig`](crate::runtimes::RuntimeConfig)
/// and handed to the [`Executor`](crate::executor::Executor) that drives one invocation. This allows:
/// - Per-invocation event isolation (each call to `App::invoke` builds its own bus)
/// - Flexible sink composition
///
/// ```text
/// Workflow Nodes
///     │ ctx.emit()
///     ▼
/// EventBus
///     │ broadcast
///     ├─────┬─────┬─────┐
///     ▼     ▼     ▼     ▼
/// StdOut Channel File Custom
///  Sink   Sink   Sink  Sink
/// ```
///
/// # Usage Patterns
///
/// ## Default EventBus (Stdout Only)
///
/// When using [`App::invoke()`](crate::app::App::invoke), a default EventBus
/// with stdout sink is created automatically:
///
/// ```rust,no_run
/// # use pregelflow::app::App;
/// # use pregelflow::state::State;
/// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
/// // Events automatically go to stdout
/// let result = app.invoke(State::new_with_user_message("Hello")).await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Custom EventBus (Streaming to Web Clients)
///
/// For streaming events to web clients, build an [`Executor`](crate::executor::Executor)
/// directly with a custom EventBus instead of going through [`App`](crate::app::App):
///
/// ```rust,no_run
/// use pregelflow::event_bus::{EventBus, ChannelSink, StdOutSink};
/// use pregelflow::executor::Executor;
/// use pregelflow::graph::Graph;
/// use pregelflow::state::State;
/// use std::sync::Arc;
/// # async fn example(graph: Graph) -> Result<(), Box<dyn std::error::Error>> {
///
/// // Create channel for streaming
/// let (tx, rx) = flume::unbounded();
///
/// // Create EventBus with multiple sinks
/// let bus = Arc::new(EventBus::with_sinks(vec![
///     Box::new(StdOutSink::default()),  // Server logs
///     Box::new(ChannelSink::new(tx)),   // Client streaming
/// ]));
///
/// let executor = Executor::new(Arc::new(graph), bus);
///
/// // Consume events from channel
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv_async().await {
///         // Send to web client via SSE, WebSocket, etc.
///         println!("Event: {:?}", event);
///     }
/// });
///
/// executor.invoke(State::new_with_user_message("Process this"), "client-123").await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Per-Request Isolation (Web Server Pattern)
///
/// Build a fresh EventBus (and Executor) per request to isolate events:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pregelflow::event_bus::{EventBus, ChannelSink};
/// use pregelflow::executor::Executor;
/// use pregelflow::graph::Graph;
/// use pregelflow::state::State;
/// # async fn handle_request(graph: Arc<Graph>, request_id: String) -> Result<(), Box<dyn std::error::Error>> {
///
/// // Each request gets its own EventBus and channel
/// let (tx, rx) = flume::unbounded();
/// let bus = Arc::new(EventBus::with_sinks(vec![Box::new(ChannelSink::new(tx))]));
///
/// let executor = Executor::new(graph, bus);
///
/// // Run workflow - events are isolated to this request
/// let lineage_id = format!("request-{request_id}");
/// executor.invoke(State::new_with_user_message("User query"), lineage_id).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Available Sinks
///
/// - [`StdOutSink`](crate::event_bus::StdOutSink) - Write to stdout (default)
/// - [`ChannelSink`](crate::event_bus::ChannelSink) - Stream to async channels
/// - [`MemorySink`](crate::event_bus::MemorySink) - Capture for testing
/// - Custom sinks implementing [`EventSink`](crate::event_bus::EventSink)
///
/// # See Also
///
/// - [`Executor::new()`](crate::executor::Executor::new) - How to use a custom EventBus
/// - [`ChannelSink`](crate::event_bus::ChannelSink) - For streaming events
const DEFAULT_BUFFER_CAPACITY: usize = 1024;

pub struct EventBus {
    sinks: Arc<Mutex<Vec<SinkEntry>>>,
    hub: Arc<EventHub>,
    started: AtomicBool,
    diagnostics: broadcast::Sender<SinkDiagnostic>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self::with_capacity(sinks, DEFAULT_BUFFER_CAPACITY)
    }

    pub(crate) fn with_capacity(sinks: Vec<Box<dyn EventSink>>, buffer_capacity: usize) -> Self {
        let hub = EventHub::new(buffer_capacity);
        let entries = sinks.into_iter().map(SinkEntry::new).collect();
        let (diagnostics, _) = broadcast::channel(DEFAULT_DIAGNOSTICS_CAPACITY);
        Self {
            sinks: Arc::new(Mutex::new(entries)),
            hub,
            started: AtomicBool::new(false),
            diagnostics,
        }
    }

    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.add_boxed_sink(Box::new(sink));
    }

    pub fn add_boxed_sink(&self, sink: Box<dyn EventSink>) {
        let mut sinks = self.sinks.lock().unwrap();
        let mut entry = SinkEntry::new(sink);
        if self.started.load(Ordering::SeqCst) {
            entry.spawn_worker(self.hub.clone(), self.diagnostics.clone());
        }
        sinks.push(entry);
    }

    pub fn get_emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::new(self.hub.emitter())
    }

    pub fn subscribe(&self) -> EventStream {
        self.hub.subscribe()
    }

    /// Subscribes to [`SinkDiagnostic`]s reported when a sink's `handle` call
    /// errors, so a caller can surface sink failures (a full disk, a dropped
    /// channel receiver) instead of only seeing them on stderr.
    pub fn subscribe_diagnostics(&self) -> DiagnosticsStream {
        DiagnosticsStream::new(self.diagnostics.subscribe())
    }

    pub fn listen_for_events(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock().unwrap();
        for entry in sinks.iter_mut() {
            entry.spawn_worker(self.hub.clone(), self.diagnostics.clone());
        }
    }

    pub async fn stop_listener(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut sinks = self.sinks.lock().unwrap();
        for entry in sinks.iter_mut() {
            entry.stop_worker().await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if self.started.load(Ordering::SeqCst) {
            if let Ok(mut sinks) = self.sinks.lock() {
                for entry in sinks.iter_mut() {
                    entry.abort_worker();
                }
            }
        }
    }
}

struct SinkEntry {
    sink: Arc<Mutex<Box<dyn EventSink>>>,
    occurrences: Arc<AtomicU64>,
    worker: Option<SinkWorker>,
}

impl SinkEntry {
    fn new(sink: Box<dyn EventSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            occurrences: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    fn spawn_worker(&mut self, hub: Arc<EventHub>, diagnostics: broadcast::Sender<SinkDiagnostic>) {
        if self.worker.is_some() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        let occurrences = Arc::clone(&self.occurrences);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut stream = hub.subscribe();
        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = stream.recv() => match event {
                        Ok(event) => {
                            let outcome = sink.lock().ok().map(|mut guard| guard.handle(&event));
                            if let Some(Err(err)) = outcome {
                                let sink_name = sink.lock().map(|guard| guard.name()).unwrap_or_default();
                                let occurrence = occurrences.fetch_add(1, Ordering::Relaxed) + 1;
                                tracing::warn!(sink = %sink_name, %err, occurrence, "event sink handle failed");
                                let _ = diagnostics.send(SinkDiagnostic {
                                    sink: sink_name,
                                    error: err.to_string(),
                                    when: chrono::Utc::now(),
                                    occurrence,
                                });
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
        self.worker = Some(SinkWorker {
            shutdown: shutdown_tx,
            handle,
        });
    }

    async fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            let _ = worker.handle.await;
        }
    }

    fn abort_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            worker.handle.abort();
        }
    }
}

struct SinkWorker {
    shutdown: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::event::Event;
    use std::io;
    use std::time::Duration;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn handle(&mut self, _event: &Event) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "sink exploded"))
        }

        fn name(&self) -> String {
            "FailingSink".to_string()
        }
    }

    #[tokio::test]
    async fn a_sink_error_is_reported_as_a_diagnostic() {
        let bus = EventBus::with_sink(FailingSink);
        let mut diagnostics = bus.subscribe_diagnostics();
        bus.listen_for_events();

        bus.get_emitter()
            .emit(Event::diagnostic("test", "hello"))
            .unwrap();

        let diag = diagnostics
            .next_timeout(Duration::from_secs(1))
            .await
            .expect("expected a diagnostic after the sink failed");
        assert_eq!(diag.sink, "FailingSink");
        assert_eq!(diag.error, "sink exploded");
        assert_eq!(diag.occurrence, 1);
    }
}
