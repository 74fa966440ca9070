//! Environment configuration.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use teloxide::types::{ChatId, UserId};

use crate::exam::parse_exam_date;

/// Prefix that marks a message as a bot command.
pub const COMMAND_PREFIX: char = '.';

const DEFAULT_SYLLABUS_LINK: &str = "https://t.me/nimcet_resources/5";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is not set.
    MissingVar(&'static str),
    /// `ADMIN_IDS` is empty or contains a non-integer entry.
    InvalidAdminIds(String),
    /// Token does not look like `123456789:secret`.
    InvalidToken,
    /// `EXAM_DATE` does not parse to a calendar instant.
    InvalidExamDate(String),
    /// `TIMEZONE` is not a known IANA zone.
    InvalidTimezone(String),
    /// `LOG_CHAT_ID` is not an integer.
    InvalidChatId(String),
    /// Failed to read a dotenv file.
    ReadFile { path: PathBuf, source: dotenvy::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "missing required environment variable {name}"),
            Self::InvalidAdminIds(value) => {
                write!(f, "ADMIN_IDS must be a comma-separated list of integers, got '{value}'")
            }
            Self::InvalidToken => write!(
                f,
                "TELEGRAM_BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)"
            ),
            Self::InvalidExamDate(value) => write!(f, "invalid exam date '{value}'"),
            Self::InvalidTimezone(value) => write!(f, "unknown timezone '{value}'"),
            Self::InvalidChatId(value) => write!(f, "LOG_CHAT_ID must be an integer, got '{value}'"),
            Self::ReadFile { path, source } => {
                write!(f, "failed to read env file '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// Users allowed to run admin commands and receive lifecycle reports.
    pub admin_ids: Vec<UserId>,
    /// Base URL of the completion endpoint.
    pub chatgpt_api_url: String,
    pub exam_date: DateTime<Utc>,
    /// Kept for reference only; the daily notification always fires at 05:00.
    pub notification_time: Option<String>,
    /// Zone for the daily trigger. `None` means server local time.
    pub timezone: Option<Tz>,
    pub log_chat_id: Option<ChatId>,
    pub log_dir: PathBuf,
    pub persona: Option<String>,
    pub syllabus_link: String,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a dotenv-formatted file without touching the process environment.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let read_err = |source| ConfigError::ReadFile { path: path.clone(), source };
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(&path).map_err(read_err)? {
            let (key, value) = item.map_err(read_err)?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));

        let telegram_bot_token = require("TELEGRAM_BOT_TOKEN")?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        match telegram_bot_token.split_once(':') {
            Some((id, secret)) if id.parse::<u64>().is_ok() && !secret.is_empty() => {}
            _ => return Err(ConfigError::InvalidToken),
        }

        let admin_ids = parse_admin_ids(&require("ADMIN_IDS")?)?;
        let chatgpt_api_url = require("CHATGPT_API_URL")?;
        let exam_date = parse_exam_date(&require("EXAM_DATE")?)?;

        let timezone = get("TIMEZONE")
            .map(|tz| tz.trim().parse::<Tz>().map_err(|_| ConfigError::InvalidTimezone(tz)))
            .transpose()?;

        let log_chat_id = get("LOG_CHAT_ID")
            .map(|id| {
                id.trim()
                    .parse::<i64>()
                    .map(ChatId)
                    .map_err(|_| ConfigError::InvalidChatId(id))
            })
            .transpose()?;

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            chatgpt_api_url,
            exam_date,
            notification_time: get("NOTIFICATION_TIME"),
            timezone,
            log_chat_id,
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("logs")),
            persona: get("BOT_PERSONA"),
            syllabus_link: get("SYLLABUS_LINK").unwrap_or_else(|| DEFAULT_SYLLABUS_LINK.to_string()),
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().map(UserId))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidAdminIds(raw.to_string()))?;

    if ids.is_empty() {
        return Err(ConfigError::InvalidAdminIds(raw.to_string()));
    }
    Ok(ids)
}
