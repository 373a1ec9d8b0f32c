use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::UpstreamError;
use crate::models::{ChatMessage, MessagesRequest, MessagesResponse, UpstreamJob};

// Everything needed to call the messages API
pub struct UpstreamSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub system_prompt: String,
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

// Background worker -> takes jobs off the queue and runs each upstream call
// on its own task so one slow answer does not hold up the rest
pub async fn upstream_worker(
    mut rx: mpsc::Receiver<UpstreamJob>,
    client: reqwest::Client,
    settings: Arc<UpstreamSettings>,
) {
    info!(url = %settings.base_url, model = %settings.model, "upstream worker started");

    while let Some(job) = rx.recv().await {
        let client = client.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            let result = call_messages_api(&client, &settings, &job.messages).await;
            if let Err(e) = &result {
                warn!(error = %e, "upstream call failed");
            }
            // the handler may have given up already
            if job.response_tx.send(result).is_err() {
                debug!("caller left before the upstream reply arrived");
            }
        });
    }

    info!("upstream worker stopped");
}

pub async fn call_messages_api(
    client: &reqwest::Client,
    settings: &UpstreamSettings,
    messages: &[ChatMessage],
) -> Result<String, UpstreamError> {
    let body = MessagesRequest {
        model: &settings.model,
        max_tokens: settings.max_tokens,
        system: &settings.system_prompt,
        messages,
    };

    let res = client
        .post(format!("{}/v1/messages", settings.base_url.trim_end_matches('/')))
        .header("x-api-key", settings.api_key.as_str())
        .header("anthropic-version", settings.anthropic_version.as_str())
        .json(&body)
        .send()
        .await?;

    let status = res.status();
    let text = res.text().await?;
    parse_reply(status, &text)
}

// Reply text is every text block, joined by newlines
pub fn parse_reply(status: StatusCode, body: &str) -> Result<String, UpstreamError> {
    let parsed: MessagesResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => {
            return Err(UpstreamError::Api(format!("status {}", status)));
        }
        Err(e) => return Err(UpstreamError::Parse(e.to_string())),
    };

    if let Some(error) = parsed.error {
        return Err(UpstreamError::Api(error.to_string()));
    }
    if !status.is_success() {
        return Err(UpstreamError::Api(format!("status {}", status)));
    }

    let reply = parsed
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");

    if reply.is_empty() {
        Err(UpstreamError::EmptyReply)
    } else {
        Ok(reply)
    }
}
