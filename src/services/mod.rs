use crate::adapters::apns::{ApnsService, ReconnectPolicy};
use crate::adapters::c2dm::C2dmService;
use crate::config::{ApnsConfig, ProvisioningConfig};
use crate::domain::{ProviderKind, ServiceConfig};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod provider;
pub mod registry;

pub use provider::ProviderService;
pub use registry::{ServiceFactory, ServiceRegistry};

/// Registers the `apns` and `c2dm` factories.
pub fn register_builtin_factories(registry: &ServiceRegistry, apns: &ApnsConfig, provisioning: &ProvisioningConfig) {
    let policy = ReconnectPolicy {
        min_delay: Duration::from_millis(apns.min_backoff_ms),
        max_delay: Duration::from_secs(apns.max_backoff_secs),
        connect_timeout: Duration::from_secs(apns.connect_timeout_secs),
    };
    let default_timeout = provisioning.default_timeout();

    registry.register_factory(ProviderKind::Apns, move |config| {
        Ok(Arc::new(ApnsService::from_config(config, policy, default_timeout)?) as Arc<dyn ProviderService>)
    });
    registry.register_factory(ProviderKind::C2dm, move |config| {
        Ok(Arc::new(C2dmService::from_config(config, default_timeout)?) as Arc<dyn ProviderService>)
    });
}

/// One entry of the apps file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppProvision {
    pub app_id: String,
    pub provider: String,
    #[serde(flatten)]
    pub config: ServiceConfig,
}

/// Provisions every app listed in a JSON array file.
///
/// # Errors
/// Fails on the first unreadable entry or rejected configuration.
pub fn provision_from_file(registry: &ServiceRegistry, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)?;
    let apps: Vec<AppProvision> = serde_json::from_str(&raw)?;
    for app in &apps {
        registry
            .create_service(&app.app_id, &app.provider, &app.config)
            .map_err(|e| anyhow::anyhow!("provisioning {} for {} failed: {e}", app.provider, app.app_id))?;
    }
    Ok(apps.len())
}
