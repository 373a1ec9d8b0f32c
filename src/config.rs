use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::guard::GatewayLimits;
use crate::rate_limit::AdmissionConfig;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "doc-chat-gateway")]
#[command(about = "Chat proxy that answers questions about one document through a hosted model")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Base url of the model API
    #[arg(long, env = "UPSTREAM_URL", default_value = "https://api.anthropic.com")]
    pub upstream_url: String,

    #[arg(long, env = "MODEL", default_value = "claude-sonnet-4-20250514")]
    pub model: String,

    #[arg(long, env = "MAX_TOKENS", default_value_t = 4096)]
    pub max_tokens: u32,

    #[arg(long, env = "ANTHROPIC_VERSION", default_value = "2023-06-01")]
    pub anthropic_version: String,

    // Without a key the gateway still starts but refuses chat requests
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "ACCESS_CODE", hide_env_values = true)]
    pub access_code: String,

    // Text of the document injected into the system prompt
    #[arg(short, long, env = "DOCUMENT_PATH")]
    pub document: PathBuf,

    // Replaces the built-in instruction preamble
    #[arg(long, env = "PREAMBLE_PATH")]
    pub preamble: Option<PathBuf>,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    // Max questions per client per window
    #[arg(long, env = "RATE_LIMIT", default_value_t = 20)]
    pub rate_limit: u32,

    #[arg(long, env = "RATE_WINDOW_MS", default_value_t = 86_400_000)]
    pub rate_window_ms: u64,

    // Estimated spend ceiling across all clients, per spend window
    #[arg(long, env = "DAILY_SPEND_CAP", default_value_t = 50.0)]
    pub daily_spend_cap: f64,

    #[arg(long, env = "COST_PER_QUERY", default_value_t = 0.15)]
    pub cost_per_query: f64,

    #[arg(long, env = "SPEND_WINDOW_MS", default_value_t = 86_400_000)]
    pub spend_window_ms: u64,

    // Only the most recent messages are forwarded
    #[arg(long, env = "MAX_HISTORY", default_value_t = 10)]
    pub max_history: usize,

    #[arg(long, env = "MAX_MESSAGE_CHARS", default_value_t = 2000)]
    pub max_message_chars: usize,

    #[arg(long, env = "FIRST_MESSAGE_MAX_CHARS", default_value_t = 500)]
    pub first_message_max_chars: usize,
}

impl Args {
    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_requests_per_window: self.rate_limit,
            window_ms: self.rate_window_ms,
            daily_spend_cap: self.daily_spend_cap,
            estimated_cost_per_query: self.cost_per_query,
            spend_window_ms: self.spend_window_ms,
        }
    }

    pub fn gateway_limits(&self) -> GatewayLimits {
        GatewayLimits {
            max_history: self.max_history,
            max_message_chars: self.max_message_chars,
            first_message_max_chars: self.first_message_max_chars,
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
