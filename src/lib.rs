//! APNs Push Library
//!
//! Sends notifications to Apple devices over the APNs HTTP/2 provider API with
//! token-based (JWT) authentication, retrying transient failures and
//! classifying the rest.

pub mod auth;
pub mod clients;
pub mod config;
pub mod errors;
pub mod payload;
pub mod request;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use auth::TokenProvider;
pub use clients::{ApnsClient, AsyncApnsClient, DeliveryStats};
pub use config::{ApnsConfig, Config, ConfigManager};
pub use errors::{ApnsError, ApnsResult, FailureKind, TimeoutPhase};
pub use payload::{NotificationPayload, Payload, RawPayload};
pub use request::{Endpoint, NotificationOptions, Priority, PushType};
