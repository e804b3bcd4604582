use crate::domain::device_token::DeviceToken;
use time::OffsetDateTime;

/// A device token reported by the APNs feedback service as no longer valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRecord {
    /// Seconds since the Unix epoch at which the token became invalid.
    pub timestamp: u32,
    pub token: DeviceToken,
}

impl FeedbackRecord {
    #[must_use]
    pub fn expired_at(&self) -> OffsetDateTime {
        // Any u32 is within the representable range.
        OffsetDateTime::from_unix_timestamp(i64::from(self.timestamp)).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}
