use std::sync::Mutex;

use serde_json::Value;
use tracing::info;

/// Outbound announcement of a user state change.
///
/// Emission is fire-and-forget: the core never waits on delivery and a failing
/// bus must not fail the flow that triggered the event.
pub trait EventPublisher: Send + Sync {
    fn emit(&self, topic: &str, payload: Value);
}

/// Topics emitted by the auth flows.
pub const USER_REGISTERED: &str = "user.registered";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

/// Announces events on the application log stream.
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn emit(&self, topic: &str, payload: Value) {
        info!(topic = %topic, payload = %payload, "event emitted");
    }
}

/// Captures emitted events in memory; used by `AppState::fake()`.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.emitted().into_iter().map(|(t, _)| t).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn emit(&self, topic: &str, payload: Value) {
        self.events
            .lock()
            .expect("events lock")
            .push((topic.to_string(), payload));
    }
}
