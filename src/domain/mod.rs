pub mod device_token;
pub mod feedback;
pub mod notification;
pub mod provider;

pub use device_token::DeviceToken;
pub use feedback::FeedbackRecord;
pub use notification::{OneOrMany, Payload, Payloads, Targets};
pub use provider::{Environment, ProviderKind, ServiceConfig, ServiceKey};
