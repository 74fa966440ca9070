//! `.command` dispatch and the free-text reply path.

use std::sync::Arc;

use teloxide::types::UserId;
use tracing::{debug, info, warn};

use crate::classifier::is_syllabus_query;
use crate::config::{COMMAND_PREFIX, Config};
use crate::exam::ExamCountdown;
use crate::responder::Responder;
use crate::status::{StatusService, StatusSnapshot};
use crate::telegram::Transport;

pub const ADMIN_ONLY: &str = "This command is restricted to admins only.";
pub const EMPTY_BROADCAST: &str = "Please provide a message to broadcast.";

/// A text message as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: Option<UserId>,
    pub text: String,
    /// The bot's @username appears as a mention.
    pub mentions_bot: bool,
    /// The message replies to one of the bot's own messages.
    pub replies_to_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Days,
    Help,
    Broadcast(String),
    Stats,
    Status,
}

impl Command {
    /// Map a command name and its arguments. Unknown names yield `None`.
    pub fn parse(name: &str, args: &[&str]) -> Option<Self> {
        match name {
            "days" => Some(Self::Days),
            "help" => Some(Self::Help),
            "broadcast" => Some(Self::Broadcast(args.join(" "))),
            "stats" => Some(Self::Stats),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(self, Self::Broadcast(_) | Self::Stats | Self::Status)
    }
}

/// Split `.name arg1 arg2` into the command name and its arguments.
///
/// Arguments are separated by single spaces so line breaks inside a
/// broadcast survive the round trip through `join(" ")`.
pub fn parse_command(text: &str, prefix: char) -> Option<(&str, Vec<&str>)> {
    let rest = text.strip_prefix(prefix)?;
    let (name, args) = match rest.find(char::is_whitespace) {
        Some(i) => {
            let ws_len = rest[i..].chars().next().map_or(1, char::len_utf8);
            (&rest[..i], &rest[i + ws_len..])
        }
        None => (rest, ""),
    };
    let args = args.split(' ').filter(|a| !a.is_empty()).collect();
    Some((name, args))
}

pub struct CommandHandler {
    config: Arc<Config>,
    status: Arc<StatusService>,
    responder: Arc<Responder>,
    transport: Arc<dyn Transport>,
    countdown: ExamCountdown,
    bot_username: String,
}

impl CommandHandler {
    pub fn new(
        config: Arc<Config>,
        status: Arc<StatusService>,
        responder: Arc<Responder>,
        transport: Arc<dyn Transport>,
        bot_username: String,
    ) -> Self {
        let countdown = ExamCountdown::new(config.exam_date);
        Self { config, status, responder, transport, countdown, bot_username }
    }

    fn is_admin(&self, user_id: Option<UserId>) -> bool {
        user_id.is_some_and(|id| self.config.is_admin(id))
    }

    pub async fn handle_message(&self, msg: &IncomingMessage) {
        if let Some((name, args)) = parse_command(&msg.text, COMMAND_PREFIX) {
            match Command::parse(name, &args) {
                Some(command) => self.handle_command(msg, command).await,
                None => debug!("Ignoring unknown command: {}", msg.text),
            }
            return;
        }

        // Syllabus questions are answered without a tag or reply
        if is_syllabus_query(&msg.text) {
            let reply = self.responder.respond(&msg.text).await;
            self.reply(msg.chat_id, &reply).await;
            return;
        }

        if msg.mentions_bot || msg.replies_to_bot {
            if let Err(e) = self.transport.send_typing(msg.chat_id).await {
                debug!("Typing indicator failed: {e}");
            }
            let preview: String = msg.text.chars().take(50).collect();
            info!("💬 Question in chat {}: \"{}\"", msg.chat_id, preview);
            let reply = self.responder.respond(&msg.text).await;
            self.reply(msg.chat_id, &reply).await;
        }
    }

    pub async fn handle_command(&self, msg: &IncomingMessage, command: Command) {
        if command.is_admin_only() && !self.is_admin(msg.user_id) {
            info!("⛔ {:?} denied for user {:?}", command, msg.user_id);
            self.reply(msg.chat_id, ADMIN_ONLY).await;
            return;
        }

        match command {
            Command::Days => self.reply(msg.chat_id, &self.countdown.message()).await,
            Command::Help => {
                let text = help_text(&self.bot_username, self.is_admin(msg.user_id));
                self.reply(msg.chat_id, &text).await;
            }
            Command::Broadcast(text) => self.broadcast(msg.chat_id, &text).await,
            Command::Stats => {
                let status = self.status.status().await;
                self.reply(msg.chat_id, &stats_text(&status)).await;
            }
            Command::Status => {
                let status = self.status.status().await;
                self.reply(msg.chat_id, &status_text(&status)).await;
            }
        }
    }

    /// Queue `text` for every known group and report real delivery results.
    async fn broadcast(&self, chat_id: i64, text: &str) {
        if text.trim().is_empty() {
            self.reply(chat_id, EMPTY_BROADCAST).await;
            return;
        }

        let groups = self.status.groups().await;
        info!("📣 Broadcasting to {} group(s)", groups.len());

        let mut deliveries = Vec::with_capacity(groups.len());
        for group in &groups {
            deliveries.push(self.status.queue_message_with_ack(group.id, text).await);
        }

        let (mut success, mut failed) = (0, 0);
        for delivery in deliveries {
            if delivery.outcome().await {
                success += 1;
            } else {
                failed += 1;
            }
        }

        info!("📣 Broadcast done: {success} ok, {failed} failed");
        self.reply(chat_id, &broadcast_report(success, failed)).await;
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            warn!("Failed to reply in chat {}: {}", chat_id, e);
        }
    }
}

pub fn broadcast_report(success: usize, failed: usize) -> String {
    format!("Broadcast complete! ✅\nSuccess: {success}\nFailed: {failed}")
}

pub fn help_text(bot_username: &str, is_admin: bool) -> String {
    let admin_section = if is_admin {
        "🔧 Admin Commands:\n\
         .broadcast <message> - Send message to all groups\n\
         .stats - View bot statistics\n\
         .status - Check detailed bot status\n\n"
    } else {
        ""
    };

    format!(
        "Hey! I'm Friday, your NIMCET study buddy! Here's what I can do:\n\n\
         📚 Public Commands:\n\
         .days - Check remaining days until NIMCET exam\n\
         .help - Show this help message\n\n\
         💡 Tips:\n\
         • Tag me (@{bot_username}) or reply to my messages to chat with me\n\
         • Ask about syllabus anytime (no need to tag me)\n\
         • I'll help explain complex topics with real-life examples\n\n\
         {admin_section}\
         Need help with a specific topic? Just ask! 😊"
    )
}

pub fn stats_text(status: &StatusSnapshot) -> String {
    format!(
        "📊 Bot Statistics:\n\n\
         👥 Groups: {}\n\
         💬 Total Messages: {}\n\
         ⏰ Uptime: {}\n\
         📝 Pending Messages: {}",
        status.groups.len(),
        status.total_messages(),
        status.uptime.short(),
        status.total_pending()
    )
}

pub fn status_text(status: &StatusSnapshot) -> String {
    let groups = if status.groups.is_empty() {
        "• none".to_string()
    } else {
        status
            .groups
            .iter()
            .map(|g| format!("• {} ({} msgs)", g.name, g.message_count))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let queues = if status.queues.is_empty() {
        "• empty".to_string()
    } else {
        status
            .queues
            .iter()
            .map(|q| format!("• Group {}: {} pending", q.group_id, q.pending))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mem = &status.memory;
    format!(
        "🔍 Detailed Status:\n\n\
         ⏰ Uptime: {}\n\n\
         👥 Groups ({}):\n{}\n\n\
         📝 Message Queue:\n{}\n\n\
         💾 Memory Usage:\n\
         • Process Resident: {}MB\n\
         • Process Virtual: {}MB\n\
         • System: {}MB / {}MB",
        status.uptime.long(),
        status.groups.len(),
        groups,
        queues,
        mem.process_resident,
        mem.process_virtual,
        mem.system_used,
        mem.system_total
    )
}
