use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("No {provider} service provisioned for app {app_id}")]
    ServiceNotFound { app_id: String, provider: String },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Got {tokens} tokens but {payloads} payloads")]
    ArityMismatch { tokens: usize, payloads: usize },
    #[error("Feedback stream ended with {0} bytes of a partial record")]
    TruncatedStream(usize),
    #[error("Could not parse auth token from login response: {0}")]
    TokenParse(String),
    #[error("Timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Authentication rejected by provider")]
    Authentication,
    #[error("Invalid registration id")]
    InvalidRegistration,
    #[error("Registration id is no longer registered")]
    NotRegistered,
    #[error("Provider responded with status {code}")]
    Upstream { code: u16 },
    #[error("Provider rejected notification: {0}")]
    Push(String),
}

pub type Result<T> = std::result::Result<T, PushError>;

impl IntoResponse for PushError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownProvider(_)
            | Self::Configuration(_)
            | Self::Encoding(_)
            | Self::ArityMismatch { .. } => {
                tracing::debug!(error = %self, "Rejected request");
                StatusCode::BAD_REQUEST
            }
            Self::ServiceNotFound { .. } => {
                tracing::debug!(error = %self, "Service not found");
                StatusCode::NOT_FOUND
            }
            Self::NotRegistered => StatusCode::GONE,
            Self::InvalidRegistration => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout(_) => {
                tracing::warn!(error = %self, "Provider request timed out");
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Connection(_) => {
                tracing::warn!(error = %self, "Provider connection failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::TruncatedStream(_)
            | Self::TokenParse(_)
            | Self::Authentication
            | Self::Upstream { .. }
            | Self::Push(_) => {
                tracing::error!(error = %self, "Provider error");
                StatusCode::BAD_GATEWAY
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
