use crate::domain::{Environment, FeedbackRecord, Payloads, ProviderKind, ServiceConfig, Targets};
use crate::error::Result;
use crate::services::provider::ProviderService;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod codec;
pub mod connection;
pub mod feedback;
pub mod transport;

pub use connection::{ConnectionState, PushConnection, ReconnectPolicy};
pub use feedback::FeedbackFetcher;
pub use transport::{CertificateSource, Connector, Endpoint, TcpConnector, TlsConnector};

/// Apple Push Notification service bound to one app certificate.
#[derive(Debug)]
pub struct ApnsService {
    environment: Environment,
    connection: PushConnection,
    feedback: FeedbackFetcher,
    timeout: Duration,
}

impl ApnsService {
    /// Loads the app certificate and prepares the push and feedback connectors.
    ///
    /// Nothing is dialled until the first notification.
    ///
    /// # Errors
    /// Returns `PushError::Configuration` if `cert` is missing or unusable.
    pub fn from_config(config: &ServiceConfig, policy: ReconnectPolicy, default_timeout: Duration) -> Result<Self> {
        let cert = ServiceConfig::require(config.cert.as_ref(), "cert")?;
        let source = CertificateSource::detect(cert);
        match &source {
            CertificateSource::Path(path) => tracing::info!(cert = %path.display(), "Loading APNs certificate"),
            CertificateSource::Pem(_) => tracing::info!(cert = "inline", "Loading APNs certificate"),
        }
        let tls = transport::client_config(&source)?;

        let push_endpoint = match &config.push_endpoint {
            Some(value) => Endpoint::parse(value)?,
            None => Endpoint::gateway(config.environment),
        };
        let feedback_endpoint = match &config.feedback_endpoint {
            Some(value) => Endpoint::parse(value)?,
            None => Endpoint::feedback(config.environment),
        };

        let push: Arc<dyn Connector> = Arc::new(TlsConnector::new(push_endpoint, Arc::clone(&tls))?);
        let feedback: Arc<dyn Connector> = Arc::new(TlsConnector::new(feedback_endpoint, tls)?);
        let timeout = config.timeout.map_or(default_timeout, Duration::from_secs);

        Ok(Self::with_connectors(config.environment, push, feedback, policy, timeout))
    }

    #[must_use]
    pub fn with_connectors(
        environment: Environment,
        push: Arc<dyn Connector>,
        feedback: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            environment,
            connection: PushConnection::spawn(push, policy),
            feedback: FeedbackFetcher::new(feedback),
            timeout,
        }
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Like [`ProviderService::notify`] with a caller-chosen deadline.
    ///
    /// # Errors
    /// Returns encoding errors before anything is queued, and
    /// `PushError::Timeout` if no connection accepted the frames in time.
    pub async fn notify_with_timeout(&self, targets: Targets, payloads: Payloads, timeout: Duration) -> Result<()> {
        let frame = codec::encode_notifications(targets, payloads)?;
        self.connection.send(frame, timeout).await
    }
}

#[async_trait]
impl ProviderService for ApnsService {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Apns
    }

    #[tracing::instrument(skip_all, fields(targets = targets.len()))]
    async fn notify(&self, targets: Targets, payloads: Payloads) -> Result<()> {
        self.notify_with_timeout(targets, payloads, self.timeout).await
    }

    #[tracing::instrument(skip_all)]
    async fn feedback(&self) -> Result<Vec<FeedbackRecord>> {
        self.feedback.fetch(self.timeout).await
    }
}
