use crate::domain::Environment;
use crate::error::{PushError, Result};
use async_trait::async_trait;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

const GATEWAY_SANDBOX_HOST: &str = "gateway.sandbox.push.apple.com";
const GATEWAY_HOST: &str = "gateway.push.apple.com";
const GATEWAY_PORT: u16 = 2195;
const FEEDBACK_SANDBOX_HOST: &str = "feedback.sandbox.push.apple.com";
const FEEDBACK_HOST: &str = "feedback.push.apple.com";
const FEEDBACK_PORT: u16 = 2196;
const PEM_CERTIFICATE_MARKER: &str = "BEGIN CERTIFICATE";

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens byte streams to one fixed remote endpoint.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Dials the endpoint.
    ///
    /// # Errors
    /// Returns the I/O error of the failed TCP connect or TLS handshake.
    async fn connect(&self) -> io::Result<BoxedStream>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    #[must_use]
    pub fn gateway(environment: Environment) -> Self {
        match environment {
            Environment::Sandbox => Self::new(GATEWAY_SANDBOX_HOST, GATEWAY_PORT),
            Environment::Production => Self::new(GATEWAY_HOST, GATEWAY_PORT),
        }
    }

    #[must_use]
    pub fn feedback(environment: Environment) -> Self {
        match environment {
            Environment::Sandbox => Self::new(FEEDBACK_SANDBOX_HOST, FEEDBACK_PORT),
            Environment::Production => Self::new(FEEDBACK_HOST, FEEDBACK_PORT),
        }
    }

    /// Parses a `host:port` pair.
    ///
    /// # Errors
    /// Returns `PushError::Configuration` if the port is missing or not a number.
    pub fn parse(value: &str) -> Result<Self> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| PushError::Configuration(format!("endpoint `{value}` is not host:port")))?;
        let port = port.parse().map_err(|_| PushError::Configuration(format!("invalid port in endpoint `{value}`")))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where the client certificate and private key come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    Pem(String),
    Path(PathBuf),
}

impl CertificateSource {
    #[must_use]
    pub fn detect(value: &str) -> Self {
        if value.contains(PEM_CERTIFICATE_MARKER) {
            Self::Pem(value.to_string())
        } else {
            Self::Path(PathBuf::from(value))
        }
    }

    /// Reads the certificate chain and private key, both expected in the same PEM document.
    ///
    /// # Errors
    /// Returns `PushError::Configuration` if the file cannot be read or holds no usable certificate or key.
    pub fn load(&self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let pem = match self {
            Self::Pem(text) => text.as_bytes().to_vec(),
            Self::Path(path) => std::fs::read(path).map_err(|e| {
                PushError::Configuration(format!("cannot read certificate file {}: {e}", path.display()))
            })?,
        };

        let certs = CertificateDer::pem_slice_iter(&pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PushError::Configuration(format!("invalid certificate: {e}")))?;
        if certs.is_empty() {
            return Err(PushError::Configuration("no certificate found in PEM data".into()));
        }

        let key = PrivateKeyDer::from_pem_slice(&pem)
            .map_err(|e| PushError::Configuration(format!("invalid private key: {e}")))?;

        Ok((certs, key))
    }
}

/// Builds the rustls client configuration presenting the app's certificate.
///
/// # Errors
/// Returns `PushError::Configuration` if the certificate material is unusable.
pub fn client_config(source: &CertificateSource) -> Result<Arc<rustls::ClientConfig>> {
    let (certs, key) = source.load()?;

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| PushError::Configuration(format!("unsupported TLS setup: {e}")))?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| PushError::Configuration(format!("certificate rejected: {e}")))?;

    Ok(Arc::new(config))
}

#[derive(Clone)]
pub struct TlsConnector {
    endpoint: Endpoint,
    server_name: ServerName<'static>,
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// # Errors
    /// Returns `PushError::Configuration` if the endpoint host is not a valid TLS server name.
    pub fn new(endpoint: Endpoint, config: Arc<rustls::ClientConfig>) -> Result<Self> {
        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|e| PushError::Configuration(format!("invalid server name `{}`: {e}", endpoint.host)))?;
        Ok(Self { endpoint, server_name, inner: tokio_rustls::TlsConnector::from(config) })
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        let tcp = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)).await?;
        tcp.set_nodelay(true)?;
        let tls = self.inner.connect(self.server_name.clone(), tcp).await?;
        tracing::debug!(endpoint = %self.endpoint, "TLS session established");
        Ok(Box::new(tls))
    }
}

/// Plaintext connector for local relays that terminate TLS themselves.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    endpoint: Endpoint,
}

impl TcpConnector {
    #[must_use]
    pub const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        let tcp = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)).await?;
        tcp.set_nodelay(true)?;
        Ok(Box::new(tcp))
    }
}
