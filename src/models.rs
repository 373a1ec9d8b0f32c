use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::UpstreamError;

// One turn of the conversation, as sent by the browser and forwarded upstream
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

// Browser request body, kept loose so shape errors can be reported per
// field. `website` and `email` are honeypot fields the page hides from humans.
#[derive(Deserialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
    #[serde(default)]
    pub website: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub remaining: u32,
}

// Messages API request format
#[derive(Serialize, Debug)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a str,
    pub messages: &'a [ChatMessage],
}

// Messages API response format; only the parts we read
#[derive(Deserialize, Debug, Default)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

// Upstream job - conversation plus a one-time channel for the reply text
pub struct UpstreamJob {
    pub messages: Vec<ChatMessage>,
    pub response_tx: oneshot::Sender<Result<String, UpstreamError>>,
}
