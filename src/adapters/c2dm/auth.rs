use crate::adapters::c2dm::{FORM_CONTENT_TYPE, transport_error};
use crate::error::{PushError, Result};
use opentelemetry::{KeyValue, global, metrics::Counter};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const ACCOUNT_TYPE: &str = "HOSTED_OR_GOOGLE";
const LOGIN_SERVICE: &str = "ac2dm";
const LOGIN_SOURCE: &str = "pns-gateway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    pub obtained_at: Instant,
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).field("password", &"<redacted>").finish()
    }
}

/// Obtains and caches the `GoogleLogin` token used to authorize sends.
///
/// Logins are serialized: callers that arrive while a login is running wait
/// for it and reuse its token instead of starting their own.
#[derive(Debug)]
pub struct TokenAuthClient {
    http: reqwest::Client,
    login_url: String,
    credentials: Credentials,
    timeout: Duration,
    token: Mutex<Option<AuthToken>>,
    logins_total: Counter<u64>,
}

impl TokenAuthClient {
    #[must_use]
    pub fn new(http: reqwest::Client, login_url: String, credentials: Credentials, timeout: Duration) -> Self {
        let logins_total = global::meter("pns-gateway")
            .u64_counter("c2dm_logins_total")
            .with_description("C2DM ClientLogin exchanges, by outcome")
            .build();
        Self { http, login_url, credentials, timeout, token: Mutex::new(None), logins_total }
    }

    /// Returns the cached token, logging in first if there is none or `force_refresh` is set.
    ///
    /// `force_refresh` always performs a fresh login, one per caller, in
    /// turn. Callers reacting to a rejected token use [`Self::refresh`], which
    /// lets concurrent callers share one login.
    ///
    /// # Errors
    /// Returns the login failure: `PushError::Authentication` for rejected
    /// credentials, `PushError::TokenParse` for an unexpected response body.
    pub async fn get_token(&self, force_refresh: bool) -> Result<AuthToken> {
        let mut cached = self.token.lock().await;
        if !force_refresh && let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        *cached = None;
        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Replaces a token the push endpoint rejected.
    ///
    /// If another caller already refreshed past `stale`, its token is returned
    /// without a second login.
    ///
    /// # Errors
    /// Returns the login failure, see [`Self::get_token`].
    pub async fn refresh(&self, stale: &AuthToken) -> Result<AuthToken> {
        let mut cached = self.token.lock().await;
        if let Some(current) = cached.as_ref()
            && current != stale
        {
            return Ok(current.clone());
        }

        *cached = None;
        let token = self.login().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached token unless it has already been replaced.
    pub async fn invalidate(&self, stale: &AuthToken) {
        let mut cached = self.token.lock().await;
        if cached.as_ref() == Some(stale) {
            *cached = None;
        }
    }

    #[tracing::instrument(skip(self), fields(email = %self.credentials.email))]
    async fn login(&self) -> Result<AuthToken> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("accountType", ACCOUNT_TYPE)
            .append_pair("Email", &self.credentials.email)
            .append_pair("Passwd", &self.credentials.password)
            .append_pair("service", LOGIN_SERVICE)
            .append_pair("source", LOGIN_SOURCE)
            .finish();

        let result = async {
            let response = self
                .http
                .post(&self.login_url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| transport_error(&e, self.timeout))?;

            match response.status() {
                StatusCode::OK => {}
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(PushError::Authentication),
                status => return Err(PushError::Upstream { code: status.as_u16() }),
            }

            let text = response.text().await.map_err(|e| transport_error(&e, self.timeout))?;
            parse_token(&text)
        }
        .await;

        match result {
            Ok(value) => {
                tracing::info!("Obtained C2DM auth token");
                self.logins_total.add(1, &[KeyValue::new("status", "ok")]);
                Ok(AuthToken { value, obtained_at: Instant::now() })
            }
            Err(e) => {
                tracing::warn!(error = %e, "C2DM login failed");
                self.logins_total.add(1, &[KeyValue::new("status", "error")]);
                Err(e)
            }
        }
    }
}

/// Extracts the token from a ClientLogin body.
///
/// The body is `SID=..\nLSID=..\nAuth=..`; the token is the value on the third line.
///
/// # Errors
/// Returns `PushError::TokenParse` if there is no third line or it is not `key=value`.
pub fn parse_token(body: &str) -> Result<String> {
    let line = body
        .lines()
        .nth(2)
        .ok_or_else(|| PushError::TokenParse(format!("expected 3 lines, got {}", body.lines().count())))?;
    let (_, value) = line.split_once('=').ok_or_else(|| PushError::TokenParse("third line is not key=value".into()))?;
    Ok(value.to_string())
}
