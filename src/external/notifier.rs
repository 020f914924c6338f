use uuid::Uuid;

/// Fire-and-forget notification dispatch. The engine calls this after
/// state transitions and never blocks on or inspects the outcome.
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: Uuid, event_type: &str, payload: serde_json::Value);
}

/// Default dispatcher that writes notifications to the log stream.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: Uuid, event_type: &str, payload: serde_json::Value) {
        tracing::info!(%user_id, event_type, %payload, "notification dispatched");
    }
}
