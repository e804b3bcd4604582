use crate::domain::{ProviderKind, ServiceConfig, ServiceKey};
use crate::error::{PushError, Result};
use crate::services::provider::ProviderService;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

pub type ServiceFactory = Arc<dyn Fn(&ServiceConfig) -> Result<Arc<dyn ProviderService>> + Send + Sync>;

/// Maps `(app_id, provider)` to a running provider service.
///
/// Factories are registered once at startup. Services are added by
/// provisioning and never evicted; provisioning the same key again replaces
/// the entry while requests already running on the old instance finish on it.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    factories: Arc<DashMap<ProviderKind, ServiceFactory>>,
    services: Arc<DashMap<ServiceKey, Arc<dyn ProviderService>>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("factories", &self.factories.iter().map(|e| *e.key()).collect::<Vec<_>>())
            .field("services", &self.services.len())
            .finish()
    }
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_factory<F>(&self, provider: ProviderKind, factory: F)
    where
        F: Fn(&ServiceConfig) -> Result<Arc<dyn ProviderService>> + Send + Sync + 'static,
    {
        tracing::info!(provider = %provider, "Registered provider factory");
        self.factories.insert(provider, Arc::new(factory));
    }

    /// Builds a service for `app_id` and installs it, replacing any previous one.
    ///
    /// # Errors
    /// Returns `PushError::UnknownProvider` if no factory handles `provider`, or
    /// whatever the factory reports for a bad configuration.
    #[tracing::instrument(skip(self, config), fields(app_id = %app_id, provider = %provider))]
    pub fn create_service(&self, app_id: &str, provider: &str, config: &ServiceConfig) -> Result<()> {
        let kind: ProviderKind = provider.parse()?;
        let factory = self
            .factories
            .get(&kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PushError::UnknownProvider(provider.to_string()))?;

        let service = factory(config)?;
        if self.services.insert(ServiceKey::new(app_id, kind), service).is_some() {
            tracing::info!("Replaced provisioned service");
        } else {
            tracing::info!("Provisioned service");
        }
        Ok(())
    }

    /// # Errors
    /// Returns `PushError::ServiceNotFound` if nothing was provisioned for the pair.
    pub fn get_service(&self, app_id: &str, provider: &str) -> Result<Arc<dyn ProviderService>> {
        let not_found = || PushError::ServiceNotFound { app_id: app_id.to_string(), provider: provider.to_string() };
        let kind: ProviderKind = provider.parse().map_err(|_| not_found())?;
        self.services.get(&ServiceKey::new(app_id, kind)).map(|entry| Arc::clone(entry.value())).ok_or_else(not_found)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
