//! Event bus: trait for emitting sequence lifecycle events from the engine.
//!
//! Engine components accept an `Arc<dyn EventSink>`; the binary wires a
//! tracing-backed sink, tests wire a capture sink.

use crate::types::{SequenceEvent, SequenceEventType};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Trait for emitting sequence events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SequenceEvent);
}

/// No-op sink for tests and callers that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: SequenceEvent) {}
}

/// Writes every event to the tracing pipeline at debug level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SequenceEvent) {
        tracing::debug!(
            event_type = ?event.event_type,
            sequence_id = %event.sequence_id,
            assignment_id = ?event.assignment_id,
            prospect_id = ?event.prospect_id,
            step_number = ?event.step_number,
            "Sequence event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<SequenceEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SequenceEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: SequenceEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: SequenceEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for a `SequenceEvent` with minimal boilerplate.
pub fn make_event(
    event_type: SequenceEventType,
    sequence_id: Uuid,
    assignment_id: Option<Uuid>,
    prospect_id: Option<String>,
    step_number: Option<u32>,
) -> SequenceEvent {
    SequenceEvent {
        event_id: Uuid::new_v4(),
        event_type,
        sequence_id,
        assignment_id,
        prospect_id,
        step_number,
        node_id: "local".into(),
        timestamp: Utc::now(),
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let sequence_id = Uuid::new_v4();
        sink.emit(make_event(
            SequenceEventType::ProspectAssigned,
            sequence_id,
            Some(Uuid::new_v4()),
            Some("prospect-1".into()),
            None,
        ));
        sink.emit(make_event(
            SequenceEventType::ActivityScheduled,
            sequence_id,
            None,
            None,
            Some(1),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(SequenceEventType::ProspectAssigned), 1);
        assert_eq!(sink.count_type(SequenceEventType::AssignmentCompleted), 0);

        let events = sink.events();
        assert_eq!(events[0].prospect_id.as_deref(), Some("prospect-1"));
        assert_eq!(events[1].step_number, Some(1));

        sink.clear();
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_noop_and_tracing_sinks() {
        let event = make_event(SequenceEventType::SequenceCreated, Uuid::new_v4(), None, None, None);
        noop_sink().emit(event.clone());
        TracingSink.emit(event);
    }
}
