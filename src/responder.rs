//! Client for the external completion endpoint.

use serde::Deserialize;
use tracing::{debug, error, info};

use crate::classifier::is_syllabus_query;

/// Shown to users whenever the completion endpoint cannot produce a reply.
pub const APOLOGY: &str = "Oops! Something went wrong. Can you try asking again? 😅";

pub const DEFAULT_PERSONA: &str = "You're Riya, a 24-year-old friendly senior who helps NIMCET aspirants \
(mostly 20-21 year olds) prepare, like a chill didi who has their back. Explain ideas with everyday \
comparisons, e.g. \"binary search is like finding your friend in a packed canteen, half the crowd gone \
with one look!\" Keep it short and casual with a bit of desi fun (\"Haha, easy karo!\", the odd 😜), \
stay supportive and never judgmental, and nudge them back to studying. You only see messages where \
you were tagged or replied to, so if something is unclear say \"Bhai, yeh kya bol raha? Thoda clear \
kar na!\" and if you don't know, admit it and ask for a hint. No textbook lectures: 2-3 lines of \
relatable help that keeps them motivated.";

#[derive(Deserialize)]
struct ApiResponse {
    message: Option<String>,
}

#[derive(Debug)]
pub enum ResponderError {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for ResponderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponderError::Http(e) => write!(f, "HTTP error: {e}"),
            ResponderError::Api(e) => write!(f, "API error: {e}"),
            ResponderError::Parse(e) => write!(f, "Parse error: {e}"),
            ResponderError::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for ResponderError {}

pub struct Responder {
    api_url: String,
    persona: String,
    syllabus_link: String,
    http: reqwest::Client,
}

impl Responder {
    pub fn new(api_url: String, persona: Option<String>, syllabus_link: String) -> Self {
        Self {
            api_url,
            persona: persona.unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            syllabus_link,
            http: reqwest::Client::new(),
        }
    }

    /// Fixed reply for syllabus questions.
    pub fn syllabus_reply(&self) -> String {
        format!(
            "Hey! Here's the NIMCET syllabus link: {}\n\nFeel free to ask me if you need help \
             understanding any specific topic from the syllabus! 😊",
            self.syllabus_link
        )
    }

    /// Full prompt sent to the endpoint.
    pub fn prompt(&self, text: &str) -> String {
        format!("{}\n\nUser: {}\n\nAssistant:", self.persona, text)
    }

    /// Answer a user message. Never fails: errors degrade to [`APOLOGY`].
    pub async fn respond(&self, text: &str) -> String {
        if is_syllabus_query(text) {
            info!("📚 Syllabus query, answering with resource link");
            return self.syllabus_reply();
        }

        match self.ask(&self.prompt(text)).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error getting completion response: {e}");
                APOLOGY.to_string()
            }
        }
    }

    /// One GET to the endpoint with the prompt as the `chat` query parameter.
    pub async fn ask(&self, prompt: &str) -> Result<String, ResponderError> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[("chat", prompt)])
            .send()
            .await
            .map_err(|e| ResponderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ResponderError::Api(format!("{status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResponderError::Http(e.to_string()))?;
        debug!("Completion response: {} bytes", body.len());

        let parsed: ApiResponse =
            serde_json::from_str(&body).map_err(|e| ResponderError::Parse(e.to_string()))?;
        parsed.message.ok_or(ResponderError::Empty)
    }
}
