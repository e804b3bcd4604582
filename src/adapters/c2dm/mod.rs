use crate::domain::notification;
use crate::domain::{Payloads, ProviderKind, ServiceConfig, Targets};
use crate::error::{PushError, Result};
use crate::services::provider::ProviderService;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod auth;
pub mod sender;

pub use auth::{AuthToken, Credentials, TokenAuthClient};
pub use sender::{PushSender, SendOutcome};

pub const CLIENT_LOGIN_URL: &str = "https://www.google.com/accounts/ClientLogin";
pub const C2DM_SEND_URL: &str = "https://android.apis.google.com/c2dm/send";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn transport_error(error: &reqwest::Error, timeout: Duration) -> PushError {
    if error.is_timeout() {
        PushError::Timeout(timeout)
    } else {
        PushError::Connection(error.to_string())
    }
}

/// Android Cloud to Device Messaging bound to one sender account.
#[derive(Debug)]
pub struct C2dmService {
    auth: Arc<TokenAuthClient>,
    sender: PushSender,
}

impl C2dmService {
    /// # Errors
    /// Returns `PushError::Configuration` if the account email or password is missing.
    pub fn from_config(config: &ServiceConfig, default_timeout: Duration) -> Result<Self> {
        let credentials = Credentials {
            email: ServiceConfig::require(config.email.as_ref(), "email")?.to_string(),
            password: ServiceConfig::require(config.password.as_ref(), "password")?.to_string(),
        };
        let timeout = config.timeout.map_or(default_timeout, Duration::from_secs);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Configuration(format!("cannot build HTTP client: {e}")))?;

        tracing::info!(email = %credentials.email, environment = ?config.environment, "Configured C2DM sender");

        let auth = Arc::new(TokenAuthClient::new(
            http.clone(),
            config.login_url.clone().unwrap_or_else(|| CLIENT_LOGIN_URL.to_string()),
            credentials,
            timeout,
        ));
        let sender = PushSender::new(
            http,
            config.send_url.clone().unwrap_or_else(|| C2DM_SEND_URL.to_string()),
            timeout,
            Arc::clone(&auth),
        );

        Ok(Self { auth, sender })
    }

    #[must_use]
    pub fn auth(&self) -> &TokenAuthClient {
        &self.auth
    }

    #[must_use]
    pub const fn sender(&self) -> &PushSender {
        &self.sender
    }
}

#[async_trait]
impl ProviderService for C2dmService {
    fn provider(&self) -> ProviderKind {
        ProviderKind::C2dm
    }

    #[tracing::instrument(skip_all, fields(targets = targets.len()))]
    async fn notify(&self, targets: Targets, payloads: Payloads) -> Result<()> {
        let pairs = notification::pair(targets, payloads)?;
        if pairs.is_empty() {
            return Err(PushError::Encoding("no registration ids given".into()));
        }
        let ids = futures::future::try_join_all(
            pairs.iter().map(|(registration_id, payload)| self.sender.notify(registration_id, payload)),
        )
        .await?;
        tracing::debug!(ids = ?ids, "C2DM accepted notifications");
        Ok(())
    }
}
