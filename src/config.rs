use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,

    #[command(flatten)]
    pub apns: ApnsConfig,

    #[command(flatten)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "PNS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the notification API
    #[arg(long, env = "PNS_PORT", default_value_t = 7077)]
    pub port: u16,

    /// Port for liveness probes
    #[arg(long, env = "PNS_MGMT_PORT", default_value_t = 7078)]
    pub mgmt_port: u16,

    /// How long to wait for in-flight requests during shutdown
    #[arg(long, env = "PNS_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 7077, mgmt_port: 7078, shutdown_timeout_secs: 5 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; traces and metrics are only exported when set
    #[arg(long, env = "PNS_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "PNS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, Args)]
pub struct ApnsConfig {
    /// First delay before reconnecting to the APNs gateway
    #[arg(long, env = "PNS_APNS_MIN_BACKOFF_MS", default_value_t = 500)]
    pub min_backoff_ms: u64,

    /// Upper bound for the APNs reconnect delay
    #[arg(long, env = "PNS_APNS_MAX_BACKOFF_SECS", default_value_t = 60)]
    pub max_backoff_secs: u64,

    /// Abandon a single gateway dial (TCP connect plus TLS handshake) after this long
    #[arg(long, env = "PNS_APNS_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self { min_backoff_ms: 500, max_backoff_secs: 60, connect_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ProvisioningConfig {
    /// JSON file listing the apps to provision at startup
    #[arg(long, env = "PNS_APPS_FILE")]
    pub apps_file: Option<PathBuf>,

    /// Request timeout for apps that do not set their own
    #[arg(long, env = "PNS_DEFAULT_TIMEOUT_SECS", default_value_t = 15)]
    pub default_timeout_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { apps_file: None, default_timeout_secs: 15 }
    }
}

impl ProvisioningConfig {
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_args() {
        let config = Config::try_parse_from(["pns-gateway"]).unwrap();
        assert_eq!(config.server.port, 7077);
        assert_eq!(config.server.mgmt_port, 7078);
        assert_eq!(config.provisioning.default_timeout(), Duration::from_secs(15));
        assert_eq!(config.apns.min_backoff_ms, 500);
        assert_eq!(config.apns.connect_timeout_secs, 10);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
        assert!(config.provisioning.apps_file.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "pns-gateway",
            "--port",
            "9000",
            "--log-format",
            "json",
            "--apps-file",
            "/etc/pns/apps.json",
            "--default-timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.provisioning.apps_file, Some(PathBuf::from("/etc/pns/apps.json")));
        assert_eq!(config.provisioning.default_timeout(), Duration::from_secs(3));
    }
}
