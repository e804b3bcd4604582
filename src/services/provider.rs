use crate::domain::{FeedbackRecord, Payloads, ProviderKind, Targets};
use crate::error::{PushError, Result};
use async_trait::async_trait;

#[async_trait]
pub trait ProviderService: Send + Sync + std::fmt::Debug {
    fn provider(&self) -> ProviderKind;

    /// Sends `payloads` to `targets`.
    ///
    /// # Errors
    /// Returns the provider's failure as one of the `PushError` kinds.
    async fn notify(&self, targets: Targets, payloads: Payloads) -> Result<()>;

    /// Lists device tokens the provider reports as gone.
    ///
    /// # Errors
    /// Providers without a feedback service return `PushError::Configuration`.
    async fn feedback(&self) -> Result<Vec<FeedbackRecord>> {
        Err(PushError::Configuration(format!("{} has no feedback service", self.provider())))
    }
}
