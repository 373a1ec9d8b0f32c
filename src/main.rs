use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use doc_chat_gateway::app::build_router;
use doc_chat_gateway::clock::SystemClock;
use doc_chat_gateway::config::Args;
use doc_chat_gateway::guard::AccessCode;
use doc_chat_gateway::models::UpstreamJob;
use doc_chat_gateway::prompt::load_system_prompt;
use doc_chat_gateway::rate_limit::AdmissionController;
use doc_chat_gateway::state::AppState;
use doc_chat_gateway::worker::{UpstreamSettings, build_client, upstream_worker};

#[tokio::main]
async fn main() -> ExitCode {
    // parse cli arguments
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let system_prompt = match load_system_prompt(&args.document, args.preamble.as_deref()) {
        Ok(prompt) => prompt,
        Err(e) => {
            error!(error = %e, "could not build system prompt");
            return ExitCode::from(1);
        }
    };

    // the worker only exists when there is a key to call upstream with
    let upstream_tx = match args.api_key.clone() {
        Some(api_key) => {
            let client = match build_client(args.upstream_timeout()) {
                Ok(client) => client,
                Err(e) => {
                    error!(error = %e, "could not build http client");
                    return ExitCode::from(1);
                }
            };
            let settings = Arc::new(UpstreamSettings {
                base_url: args.upstream_url.clone(),
                api_key,
                model: args.model.clone(),
                max_tokens: args.max_tokens,
                anthropic_version: args.anthropic_version.clone(),
                system_prompt,
            });
            let (tx, rx) = mpsc::channel::<UpstreamJob>(100);
            tokio::spawn(upstream_worker(rx, client, settings));
            Some(tx)
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set, chat requests will be refused");
            None
        }
    };

    let admission_config = args.admission_config();
    info!(
        rate_limit = admission_config.max_requests_per_window,
        rate_window_ms = admission_config.window_ms,
        spend_cap = admission_config.daily_spend_cap,
        cost_per_query = admission_config.estimated_cost_per_query,
        "admission limits (per instance)"
    );

    // creating shared state
    let state = Arc::new(AppState {
        admission: AdmissionController::new(admission_config, Arc::new(SystemClock::new())),
        access_code: AccessCode::new(&args.access_code),
        limits: args.gateway_limits(),
        upstream_tx,
    });

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "could not bind");
            return ExitCode::from(1);
        }
    };

    info!(port = args.port, upstream = %args.upstream_url, "gateway listening");

    // peer addresses are the last fallback for client keys
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        error!(error = %e, "server error");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
