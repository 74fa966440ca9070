//! Forwards log events to a Telegram chat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::telegram::Transport;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BUFFERED: usize = 50;
const MAX_CHARS: usize = 4000;
const TRANSPORT_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::telegram");

/// Log message with priority.
enum LogMessage {
    /// WARN/ERROR, sent immediately
    Urgent(String),
    /// INFO, batched
    Info(String),
}

/// Forwards INFO and above to a Telegram chat.
pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl TelegramLogLayer {
    pub fn new(transport: Arc<dyn Transport>, chat_id: i64) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();

        tokio::spawn(async move {
            let mut info_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => {
                                send_log(transport.as_ref(), chat_id, &text).await;
                            }
                            Some(LogMessage::Info(text)) => {
                                info_buffer.push(text);
                                if info_buffer.len() >= MAX_BUFFERED {
                                    flush_buffer(transport.as_ref(), chat_id, &mut info_buffer).await;
                                }
                            }
                            None => {
                                flush_buffer(transport.as_ref(), chat_id, &mut info_buffer).await;
                                break;
                            }
                        }
                    }
                    _ = interval.tick() => {
                        flush_buffer(transport.as_ref(), chat_id, &mut info_buffer).await;
                    }
                }
            }
        });

        Self { tx }
    }
}

/// Events from the transport itself are not forwarded, or a failing send
/// would log a warning that triggers another send.
fn is_forwardable(target: &str) -> bool {
    match target.strip_prefix(TRANSPORT_TARGET) {
        Some(rest) => !(rest.is_empty() || rest.starts_with("::")),
        None => true,
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_CHARS {
        let truncated: String = text.chars().take(MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

async fn send_log(transport: &dyn Transport, chat_id: i64, text: &str) {
    if let Err(e) = transport.send_text(chat_id, &truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

async fn flush_buffer(transport: &dyn Transport, chat_id: i64, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(transport, chat_id, &combined).await;
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level > Level::INFO || !is_forwardable(metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let msg = match level {
            Level::ERROR => LogMessage::Urgent(format!("❌ {}", visitor.message)),
            Level::WARN => LogMessage::Urgent(format!("⚠️ {}", visitor.message)),
            _ => LogMessage::Info(visitor.message),
        };

        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::MockTransport;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short"), "short");
        let long = "é".repeat(MAX_CHARS + 10);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_CHARS + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_transport_events_not_forwarded() {
        assert!(!is_forwardable(TRANSPORT_TARGET));
        assert!(!is_forwardable(&format!("{TRANSPORT_TARGET}::mock")));
        assert!(is_forwardable(&format!("{TRANSPORT_TARGET}_log")));
        assert!(is_forwardable(concat!(env!("CARGO_CRATE_NAME"), "::status")));
    }

    #[tokio::test]
    async fn test_warnings_sent_immediately() {
        let transport = Arc::new(MockTransport::new());
        let layer = TelegramLogLayer::new(transport.clone(), -42);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("queue stalled");
            tracing::debug!("not forwarded");
        });

        for _ in 0..100 {
            if !transport.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.sent(), vec![(-42, "⚠️ queue stalled".to_string())]);
    }
}
