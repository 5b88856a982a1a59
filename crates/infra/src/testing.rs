//! Test doubles shared by the infra test modules.

use serde_json::Value as JsonValue;

use tipjar_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

/// Bus that refuses to publish the listed event types and delivers the rest.
#[derive(Debug, Default)]
pub(crate) struct FailingBus {
    failing: Vec<String>,
    inner: InMemoryEventBus<EventEnvelope<JsonValue>>,
}

impl FailingBus {
    pub(crate) fn failing_on(event_types: &[&str]) -> Self {
        Self {
            failing: event_types.iter().map(|t| t.to_string()).collect(),
            inner: InMemoryEventBus::new(),
        }
    }
}

impl EventBus<EventEnvelope<JsonValue>> for FailingBus {
    type Error = String;

    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        if self.failing.iter().any(|t| t == message.event_type()) {
            return Err(format!("bus down for {}", message.event_type()));
        }
        self.inner.publish(message).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.inner.subscribe()
    }
}
