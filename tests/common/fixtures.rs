use std::sync::Arc;

use pregelflow::event_bus::{EventBus, MemorySink};

/// An [`EventBus`] backed by a [`MemorySink`] so tests can assert on the
/// events an invocation emitted.
pub fn memory_bus() -> (Arc<EventBus>, MemorySink) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    (Arc::new(bus), sink)
}
