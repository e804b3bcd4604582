use crate::adapters::c2dm::auth::{AuthToken, TokenAuthClient};
use crate::adapters::c2dm::{FORM_CONTENT_TYPE, transport_error};
use crate::domain::Payload;
use crate::error::{PushError, Result};
use opentelemetry::{KeyValue, global, metrics::Counter};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// C2DM `Error=` codes with a dedicated error kind. Anything else becomes `PushError::Push`.
static ERROR_CODES: &[(&str, fn() -> PushError)] = &[
    ("InvalidRegistration", || PushError::InvalidRegistration),
    ("NotRegistered", || PushError::NotRegistered),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted(String),
    Unauthorized,
}

#[derive(Debug)]
pub struct PushSender {
    http: reqwest::Client,
    send_url: String,
    timeout: Duration,
    auth: Arc<TokenAuthClient>,
    sends_total: Counter<u64>,
}

impl PushSender {
    #[must_use]
    pub fn new(http: reqwest::Client, send_url: String, timeout: Duration, auth: Arc<TokenAuthClient>) -> Self {
        let sends_total = global::meter("pns-gateway")
            .u64_counter("c2dm_sends_total")
            .with_description("C2DM send requests, by outcome")
            .build();
        Self { http, send_url, timeout, auth, sends_total }
    }

    /// Sends one message and returns the id C2DM assigned to it.
    ///
    /// A rejected auth token is refreshed and the send retried once.
    ///
    /// # Errors
    /// Returns `PushError::Authentication` if the refreshed token is rejected
    /// too, or the provider's terminal error for the registration id.
    #[tracing::instrument(skip(self, payload), fields(registration_id = %registration_id))]
    pub async fn notify(&self, registration_id: &str, payload: &Payload) -> Result<String> {
        let token = self.auth.get_token(false).await?;
        if let SendOutcome::Accepted(id) = self.send_once(&token, registration_id, payload).await? {
            return Ok(id);
        }

        tracing::info!("Auth token rejected, refreshing and retrying once");
        let token = self.auth.refresh(&token).await?;
        match self.send_once(&token, registration_id, payload).await? {
            SendOutcome::Accepted(id) => Ok(id),
            SendOutcome::Unauthorized => {
                self.auth.invalidate(&token).await;
                Err(PushError::Authentication)
            }
        }
    }

    /// Performs a single POST with `token`.
    ///
    /// # Errors
    /// Returns transport failures and terminal provider rejections. A 401 is
    /// reported as `SendOutcome::Unauthorized` so the caller can refresh.
    pub async fn send_once(&self, token: &AuthToken, registration_id: &str, payload: &Payload) -> Result<SendOutcome> {
        let body = encode_form(registration_id, payload, &hex::encode(rand::random::<[u8; 16]>()));

        let response = self
            .http
            .post(&self.send_url)
            .header(AUTHORIZATION, format!("GoogleLogin auth={}", token.value))
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(&e, self.timeout))?;

        let outcome = match response.status() {
            StatusCode::OK => {
                let text = response.text().await.map_err(|e| transport_error(&e, self.timeout))?;
                parse_response(&text).map(SendOutcome::Accepted)
            }
            StatusCode::UNAUTHORIZED => Ok(SendOutcome::Unauthorized),
            status => Err(PushError::Upstream { code: status.as_u16() }),
        };

        let status = match &outcome {
            Ok(SendOutcome::Accepted(_)) => "accepted",
            Ok(SendOutcome::Unauthorized) => "unauthorized",
            Err(_) => "rejected",
        };
        self.sends_total.add(1, &[KeyValue::new("status", status)]);

        outcome
    }
}

/// Form body with `collapse_key`, `registration_id` and one `data.<key>` field per payload entry.
#[must_use]
pub fn encode_form(registration_id: &str, payload: &Payload, collapse_key: &str) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("collapse_key", collapse_key);
    form.append_pair("registration_id", registration_id);
    for (key, value) in payload {
        let name = format!("data.{key}");
        match value {
            Value::String(text) => form.append_pair(&name, text),
            other => form.append_pair(&name, &other.to_string()),
        };
    }
    form.finish()
}

/// Reads the `key=value` line of a 200 response.
///
/// # Errors
/// Maps `Error=<code>` through the error table; a body without `key=value` is a `PushError::Push`.
pub fn parse_response(body: &str) -> Result<String> {
    let line = body.lines().next().unwrap_or_default().trim();
    let Some((key, value)) = line.split_once('=') else {
        return Err(PushError::Push(format!("unexpected response: {line}")));
    };

    match key {
        "id" => Ok(value.to_string()),
        "Error" => Err(ERROR_CODES
            .iter()
            .find(|(code, _)| *code == value)
            .map_or_else(|| PushError::Push(value.to_string()), |(_, make)| make())),
        _ => Err(PushError::Push(format!("unexpected response key `{key}`"))),
    }
}
