use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, UpstreamError};
use crate::guard::{self, Screening};
use crate::metrics::{
    DENIED_TOTAL, ESTIMATED_SPEND, REQUEST_TOTAL, TRACKED_CLIENTS, UPSTREAM_FAILURES,
    UPSTREAM_LATENCY,
};
use crate::models::{ChatReply, UpstreamJob};
use crate::rate_limit::{Decision, DenialKind, UNKNOWN_CLIENT};
use crate::state::AppState;

// what a bot sees after tripping the honeypot
const HONEYPOT_REPLY: &str = "Thanks for your question! The answer can be found in the document.";

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Result<Response, GatewayError> {
    REQUEST_TOTAL.inc();

    let messages = match guard::screen(&headers, &body, &state.access_code, &state.limits)? {
        Screening::Proceed(messages) => messages,
        Screening::Honeypot => {
            info!("honeypot field filled, answering without forwarding");
            return Ok(Json(ChatReply {
                reply: HONEYPOT_REPLY.to_string(),
                remaining: 99,
            })
            .into_response());
        }
    };

    let Some(upstream_tx) = state.upstream_tx.as_ref() else {
        error!("no API key configured, refusing chat request");
        return Err(GatewayError::NotConfigured);
    };

    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = guard::client_key(&headers, peer);
    let client = guard::fingerprint(key.as_deref().unwrap_or(UNKNOWN_CLIENT));

    let decision = state.admission.check(key.as_deref());
    TRACKED_CLIENTS.set(state.admission.tracked_clients() as f64);
    // check may have rolled the spend window over
    ESTIMATED_SPEND.set(state.admission.total_spend());

    let remaining = match decision {
        Decision::Allowed { remaining } => remaining,
        Decision::Denied { kind, reason } => {
            let label = match kind {
                DenialKind::GlobalCapReached => "global_cap",
                DenialKind::PerClientLimitReached { .. } => "per_client",
            };
            DENIED_TOTAL.with_label_values(&[label]).inc();
            info!(%client, reason = label, "request denied by admission control");
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": reason, "remaining": 0 })),
            )
                .into_response());
        }
    };

    let start_time = Instant::now();
    let (response_tx, response_rx) = oneshot::channel();
    upstream_tx
        .send(UpstreamJob {
            messages,
            response_tx,
        })
        .await
        .map_err(|_| GatewayError::WorkerUnavailable)?;

    // settling runs on its own task: if the client hangs up and this future
    // is dropped, an answer that was paid for still gets recorded
    let settle = tokio::spawn(settle_upstream(
        state.clone(),
        client.clone(),
        start_time,
        response_rx,
    ));
    let reply = settle
        .await
        .map_err(|_| GatewayError::WorkerUnavailable)??;

    info!(%client, remaining, "answered chat request");
    Ok(Json(ChatReply { reply, remaining }).into_response())
}

// waits for the worker and records spend exactly once per successful answer
async fn settle_upstream(
    state: Arc<AppState>,
    client: String,
    start_time: Instant,
    response_rx: oneshot::Receiver<Result<String, UpstreamError>>,
) -> Result<String, GatewayError> {
    let result = response_rx
        .await
        .map_err(|_| GatewayError::WorkerUnavailable)?;
    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    match result {
        Ok(reply) => {
            state.admission.record_spend();
            let spend = state.admission.total_spend();
            ESTIMATED_SPEND.set(spend);
            debug!(%client, spend, "spend recorded");
            Ok(reply)
        }
        Err(e) => {
            UPSTREAM_FAILURES.inc();
            warn!(%client, error = %e, "no answer from upstream, spend not recorded");
            Err(e.into())
        }
    }
}
