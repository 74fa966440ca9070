//! Startup report, group membership events, and admin notifications.

use std::sync::Arc;

use teloxide::types::{ChatMemberStatus, UserId};
use tracing::{error, info};

use crate::status::{MemoryUsage, StatusService};
use crate::telegram::{BotIdentity, Transport};

pub const WELCOME: &str =
    "Hey everyone! 👋 I'm Friday, your NIMCET study buddy! Use .help to see what I can do! 😊";

/// The bot's membership status in a chat, as named by the Bot API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "creator",
            Self::Administrator => "administrator",
            Self::Member => "member",
            Self::Restricted => "restricted",
            Self::Left => "left",
            Self::Kicked => "kicked",
        }
    }
}

impl From<ChatMemberStatus> for MemberStatus {
    fn from(status: ChatMemberStatus) -> Self {
        match status {
            ChatMemberStatus::Owner => Self::Owner,
            ChatMemberStatus::Administrator => Self::Administrator,
            ChatMemberStatus::Member => Self::Member,
            ChatMemberStatus::Restricted => Self::Restricted,
            ChatMemberStatus::Left => Self::Left,
            ChatMemberStatus::Banned => Self::Kicked,
        }
    }
}

/// The bot's own membership changed in some chat.
#[derive(Debug, Clone)]
pub struct MembershipChange {
    pub chat_id: i64,
    pub title: String,
    pub chat_type: String,
    pub old_status: MemberStatus,
    pub new_status: MemberStatus,
}

pub struct Lifecycle {
    admins: Vec<UserId>,
    status: Arc<StatusService>,
    transport: Arc<dyn Transport>,
}

impl Lifecycle {
    pub fn new(admins: Vec<UserId>, status: Arc<StatusService>, transport: Arc<dyn Transport>) -> Self {
        Self { admins, status, transport }
    }

    /// Send `text` to every admin directly, bypassing the group queue.
    ///
    /// Returns how many admins were reached.
    pub async fn notify_admins(&self, text: &str) -> usize {
        let mut delivered = 0;
        for admin in &self.admins {
            match self.transport.send_text(admin.0 as i64, text).await {
                Ok(()) => delivered += 1,
                Err(e) => error!("Failed to notify admin {}: {}", admin, e),
            }
        }
        delivered
    }

    pub async fn on_startup(&self, me: &BotIdentity) {
        info!("🤖 Bot username: @{}", me.username);
        let groups = self.status.groups().await;
        let uptime = self.status.uptime();
        let memory = MemoryUsage::current();

        let text = format!(
            "🚀 Bot Started!\n\n\
             📋 Bot Info:\n\
             • Username: @{}\n\
             • ID: {}\n\
             • First Name: {}\n\
             • Last Name: {}\n\n\
             📊 Current Status:\n\
             • Groups: {}\n\
             • Uptime: {}\n\n\
             💻 System Status:\n\
             • Version: {} {}\n\
             • Platform: {}\n\
             • Memory: {}MB",
            me.username,
            me.id,
            me.first_name,
            me.last_name.as_deref().unwrap_or("N/A"),
            groups.len(),
            uptime.short(),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            memory.process_resident,
        );

        let reached = self.notify_admins(&text).await;
        info!("Startup report sent to {}/{} admin(s)", reached, self.admins.len());
    }

    pub async fn on_membership_change(&self, change: &MembershipChange) {
        match change.new_status {
            MemberStatus::Member | MemberStatus::Administrator => self.joined(change).await,
            MemberStatus::Left | MemberStatus::Kicked => self.left(change).await,
            other => info!("Membership in {} changed to {}, ignoring", change.chat_id, other.as_str()),
        }
    }

    async fn joined(&self, change: &MembershipChange) {
        self.status.add_group(change.chat_id, &change.title).await;

        if let Err(e) = self.transport.send_text(change.chat_id, WELCOME).await {
            error!("Failed to greet group {}: {}", change.chat_id, e);
        }

        let status = self.status.status().await;
        let text = format!(
            "🆕 Bot joined new group!\n\n\
             📋 Group Details:\n\
             • Name: {}\n\
             • ID: {}\n\
             • Type: {}\n\
             • Status: {}\n\n\
             📊 Current Status:\n\
             • Total Groups: {}\n\
             • Total Messages: {}\n\
             • Uptime: {}",
            change.title,
            change.chat_id,
            change.chat_type,
            change.new_status.as_str(),
            status.groups.len(),
            status.total_messages(),
            status.uptime.short(),
        );
        self.notify_admins(&text).await;
    }

    async fn left(&self, change: &MembershipChange) {
        self.status.remove_group(change.chat_id).await;

        let text = format!(
            "❌ Bot left group!\n\n\
             📋 Group Details:\n\
             • Name: {}\n\
             • ID: {}\n\
             • Type: {}\n\
             • Previous Status: {}\n\
             • New Status: {}\n\n\
             Current groups: {}",
            change.title,
            change.chat_id,
            change.chat_type,
            change.old_status.as_str(),
            change.new_status.as_str(),
            self.status.groups().await.len(),
        );
        self.notify_admins(&text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::mock::MockTransport;
    use std::time::Duration;

    async fn setup(admins: &[u64]) -> (Lifecycle, Arc<StatusService>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let status = StatusService::new(Duration::from_millis(1));
        status.attach_transport(transport.clone()).await;
        let lifecycle = Lifecycle::new(
            admins.iter().copied().map(UserId).collect(),
            status.clone(),
            transport.clone(),
        );
        (lifecycle, status, transport)
    }

    fn change(old: MemberStatus, new: MemberStatus) -> MembershipChange {
        MembershipChange {
            chat_id: -100,
            title: "NIMCET Prep".into(),
            chat_type: "supergroup".into(),
            old_status: old,
            new_status: new,
        }
    }

    #[tokio::test]
    async fn test_notify_continues_past_failures() {
        let (lifecycle, _status, transport) = setup(&[1, 2, 3]).await;
        transport.fail_chat(2);
        assert_eq!(lifecycle.notify_admins("hello").await, 2);
        assert_eq!(transport.sent_to(1), vec!["hello".to_string()]);
        assert_eq!(transport.sent_to(3), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_join_registers_group_and_reports() {
        let (lifecycle, status, transport) = setup(&[1]).await;
        lifecycle
            .on_membership_change(&change(MemberStatus::Left, MemberStatus::Member))
            .await;

        let groups = status.groups().await;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "NIMCET Prep");
        assert_eq!(transport.sent_to(-100), vec![WELCOME.to_string()]);
        let report = &transport.sent_to(1)[0];
        assert!(report.contains("🆕 Bot joined new group!"));
        assert!(report.contains("• Type: supergroup"));
        assert!(report.contains("• Total Groups: 1"));
    }

    #[tokio::test]
    async fn test_kick_removes_group() {
        let (lifecycle, status, transport) = setup(&[1]).await;
        status.add_group(-100, "NIMCET Prep").await;
        lifecycle
            .on_membership_change(&change(MemberStatus::Member, MemberStatus::Kicked))
            .await;

        assert!(status.groups().await.is_empty());
        let report = &transport.sent_to(1)[0];
        assert!(report.contains("• Previous Status: member"));
        assert!(report.contains("• New Status: kicked"));
        assert!(report.contains("Current groups: 0"));
    }

    #[tokio::test]
    async fn test_restricted_is_ignored() {
        let (lifecycle, status, transport) = setup(&[1]).await;
        lifecycle
            .on_membership_change(&change(MemberStatus::Member, MemberStatus::Restricted))
            .await;
        assert!(status.groups().await.is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_startup_report() {
        let (lifecycle, _status, transport) = setup(&[1, 2]).await;
        let me = transport.get_me().await.unwrap();
        lifecycle.on_startup(&me).await;
        for admin in [1, 2] {
            let sent = transport.sent_to(admin);
            assert_eq!(sent.len(), 1);
            assert!(sent[0].contains("• Username: @FridayTestBot"));
            assert!(sent[0].contains("• Last Name: N/A"));
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(MemberStatus::from(ChatMemberStatus::Banned), MemberStatus::Kicked);
        assert_eq!(MemberStatus::from(ChatMemberStatus::Administrator).as_str(), "administrator");
    }
}
