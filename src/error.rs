use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

// Failures talking to the model API
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream returned an error: {0}")]
    Api(String),
    #[error("could not parse upstream response: {0}")]
    Parse(String),
    #[error("upstream returned no text")]
    EmptyReply,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Parse(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

// Everything the chat endpoint can answer with other than a reply.
// Admission denials are not here, the handler renders those itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid request.")]
    InvalidRequest,
    #[error("Invalid access code.")]
    InvalidAccessCode,
    #[error("Please try a shorter question.")]
    SuspiciousFirstMessage,
    #[error("Invalid request. Messages array is required.")]
    MissingMessages,
    #[error("Invalid message format.")]
    InvalidMessageFormat,
    #[error("Message too long. Please keep questions under {0} characters.")]
    MessageTooLong(usize),
    #[error("Service not configured. Please contact the administrator.")]
    NotConfigured,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Something went wrong. Please try again in a moment.")]
    WorkerUnavailable,
    #[error("startup failed: {0}")]
    Startup(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest
            | GatewayError::MissingMessages
            | GatewayError::InvalidMessageFormat
            | GatewayError::MessageTooLong(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidAccessCode => StatusCode::FORBIDDEN,
            GatewayError::SuspiciousFirstMessage => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::NotConfigured
            | GatewayError::WorkerUnavailable
            | GatewayError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // text shown to the browser; upstream details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Upstream(UpstreamError::EmptyReply) => {
                "No response received from AI. Please try again.".to_string()
            }
            GatewayError::Upstream(UpstreamError::Timeout) => {
                "The AI service took too long to respond. Please try again in a moment.".to_string()
            }
            GatewayError::Upstream(_) => {
                "The AI service is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            GatewayError::Startup(_) => {
                "Something went wrong. Please try again in a moment.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_details_are_not_exposed() {
        let err = GatewayError::from(UpstreamError::Api("overloaded_error: key sk-123".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.public_message().contains("sk-123"));
    }

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(GatewayError::InvalidAccessCode.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::SuspiciousFirstMessage.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::from(UpstreamError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::MessageTooLong(2000).public_message(),
            "Message too long. Please keep questions under 2000 characters."
        );
    }
}
