//! Log broadcasting for a live log panel.
//!
//! [`LogBroadcaster`] doubles as a `tracing_subscriber` layer: install it
//! next to the fmt layer (see `logging::init`) and every event, including
//! `log` records bridged by `tracing-log`, is fanned out to subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: &str, target: &str, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.to_string(),
            target: target.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEvent>,
}

impl LogBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: LogEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    pub fn log(&self, level: &str, target: &str, message: &str) {
        self.send(LogEvent::new(level, target, message));
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if !field.name().starts_with("log.") {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if !field.name().starts_with("log.") {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl<S> Layer<S> for LogBroadcaster
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&visitor.fields.join(" "));
        }

        let metadata = event.metadata();
        self.log(&metadata.level().to_string(), metadata.target(), &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_log_event_creation() {
        let event = LogEvent::new("INFO", "test", "Hello world");
        assert_eq!(event.level, "INFO");
        assert_eq!(event.target, "test");
        assert_eq!(event.message, "Hello world");
    }

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = LogBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        broadcaster.log("INFO", "test", "Hello");

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.level, "INFO");
        assert_eq!(event.message, "Hello");
    }

    #[test]
    fn test_layer_forwards_tracing_events() {
        let broadcaster = LogBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();
        let subscriber = tracing_subscriber::registry().with(broadcaster.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(
                target: "subflow::stems",
                step = "separate_stems",
                "using silent placeholders"
            );
        });

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.level, "WARN");
        assert_eq!(event.target, "subflow::stems");
        assert_eq!(event.message, "using silent placeholders step=separate_stems");
    }
}
