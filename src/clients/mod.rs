//! APNs delivery clients
//!
//! ## Architecture
//!
//! - **AsyncApnsClient**: async delivery controller with retry and error classification
//! - **ApnsClient**: blocking wrapper around `AsyncApnsClient`
//! - **Transport**: the network seam; `ReqwestTransport` is the HTTP/2 implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use apns_push::clients::AsyncApnsClient;
//! use apns_push::config::ApnsConfig;
//! use apns_push::payload::Payload;
//! use apns_push::request::NotificationOptions;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = ApnsConfig::new("ABCDE12345", "KEY1234567", "com.example.app")
//!     .with_key_path("AuthKey_KEY1234567.p8")
//!     .with_sandbox(true);
//! let client = AsyncApnsClient::new(config)?;
//!
//! let payload = Payload::new("Hello", "From the server");
//! client
//!     .send_notification("a1b2c3...", &payload, &NotificationOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod apns;
pub mod traits;
pub mod transport;

pub use apns::{ApnsClient, AsyncApnsClient};
pub use traits::{
    ApnsResponse, ClientConfigInfo, DeliveryStats, ErrorBody, RetryConfig, Transport,
    TransportOutcome,
};
pub use transport::ReqwestTransport;
