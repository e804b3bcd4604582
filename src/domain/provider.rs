use crate::error::PushError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Apns,
    C2dm,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Apns => "apns",
            Self::C2dm => "c2dm",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apns" => Ok(Self::Apns),
            "c2dm" => Ok(Self::C2dm),
            other => Err(PushError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub app_id: String,
    pub provider: ProviderKind,
}

impl ServiceKey {
    #[must_use]
    pub fn new(app_id: impl Into<String>, provider: ProviderKind) -> Self {
        Self { app_id: app_id.into(), provider }
    }
}

/// Per-application provisioning values handed to a provider factory.
///
/// Every provider reads the fields it needs and rejects missing ones, so the
/// same shape can be loaded from the apps file or the provisioning endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Per-request timeout in seconds.
    pub timeout: Option<u64>,
    /// APNs client certificate and key, either PEM text or a path to a PEM file.
    pub cert: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// `host:port` override for the APNs gateway.
    pub push_endpoint: Option<String>,
    /// `host:port` override for the APNs feedback service.
    pub feedback_endpoint: Option<String>,
    pub login_url: Option<String>,
    pub send_url: Option<String>,
}

impl ServiceConfig {
    /// # Errors
    /// Returns `PushError::Configuration` naming the missing field.
    pub fn require<'a>(value: Option<&'a String>, field: &str) -> Result<&'a str, PushError> {
        value
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PushError::Configuration(format!("missing `{field}`")))
    }
}
