//! Friday: a Telegram study-group bot with an exam countdown, a relayed
//! Q&A responder, and paced broadcasts to every joined group.

pub mod classifier;
pub mod commands;
pub mod config;
pub mod exam;
pub mod lifecycle;
pub mod responder;
pub mod scheduler;
pub mod status;
pub mod telegram;
pub mod telegram_log;

pub use commands::{Command, CommandHandler, IncomingMessage};
pub use config::Config;
pub use lifecycle::{Lifecycle, MemberStatus, MembershipChange};
pub use responder::Responder;
pub use status::StatusService;
pub use telegram::{BotIdentity, TelegramClient, Transport, TransportError};
