use crate::domain::{FeedbackRecord, Payloads, Targets};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    pub targets: Targets,
    pub payload: Payloads,
}

impl NotifyRequest {
    /// Rejects requests with nothing to send before they reach a provider.
    ///
    /// # Errors
    /// Returns a message describing the empty field.
    pub fn validate(&self) -> Result<(), String> {
        if self.targets.is_empty() {
            return Err("targets cannot be empty".into());
        }
        if self.payload.is_empty() {
            return Err("payload cannot be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackEntry {
    /// Unix seconds at which the token stopped being valid.
    pub expired_at: i64,
    pub token: String,
}

impl From<FeedbackRecord> for FeedbackEntry {
    fn from(record: FeedbackRecord) -> Self {
        Self { expired_at: record.expired_at().unix_timestamp(), token: record.token.to_hex() }
    }
}
