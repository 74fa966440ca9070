//! Chat transport boundary and its teloxide implementation.

use std::fmt;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tracing::warn;

/// The bot's own account, as reported by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
    pub first_name: String,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// What the bot needs from a chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError>;

    async fn get_me(&self) -> Result<BotIdentity, TransportError>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to send to {chat_id}: {e}");
                warn!("{}", msg);
                TransportError(msg)
            })
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(|e| TransportError(format!("Failed to send typing to {chat_id}: {e}")))
    }

    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TransportError(format!("Failed to get bot info: {e}")))?;

        Ok(BotIdentity {
            id: me.id.0,
            username: me.username().to_string(),
            first_name: me.user.first_name.clone(),
            last_name: me.user.last_name.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording transport for tests.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<(i64, String)>>,
        pub typing: Mutex<Vec<i64>>,
        failing: Mutex<HashSet<i64>>,
        send_delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Each send sleeps for `delay`, so overlapping sends would be visible.
        pub fn with_send_delay(delay: Duration) -> Self {
            Self { send_delay: Some(delay), ..Self::default() }
        }

        pub fn fail_chat(&self, chat_id: i64) {
            self.failing.lock().unwrap().insert(chat_id);
        }

        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(id, _)| *id == chat_id)
                .map(|(_, text)| text)
                .collect()
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.send_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().contains(&chat_id) {
                return Err(TransportError(format!("chat {chat_id} unreachable")));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
            self.typing.lock().unwrap().push(chat_id);
            Ok(())
        }

        async fn get_me(&self) -> Result<BotIdentity, TransportError> {
            Ok(BotIdentity {
                id: 42,
                username: "FridayTestBot".to_string(),
                first_name: "Friday".to_string(),
                last_name: None,
            })
        }
    }
}
