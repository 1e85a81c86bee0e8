//! HTTP/2 transport over reqwest
//!
//! One [`ReqwestTransport`] owns one connection pool for its lifetime. HTTP/2
//! is negotiated through ALPN, so many requests share a connection; a
//! semaphore caps how many are in flight at once, and waiting for a slot has
//! its own deadline separate from the connect and read deadlines.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::traits::{ApnsResponse, ErrorBody, Transport, TransportOutcome};
use crate::config::TransportConfig;
use crate::errors::{ApnsError, ApnsResult, TimeoutPhase};
use crate::request::ApnsRequest;

const USER_AGENT: &str = concat!("apns-push/", env!("CARGO_PKG_VERSION"));

/// Transport backed by a pooled reqwest client
pub struct ReqwestTransport {
    client: RwLock<Option<Client>>,
    permits: Semaphore,
    connect_timeout: Duration,
    read_timeout: Duration,
    pool_timeout: Duration,
}

impl ReqwestTransport {
    /// Build the connection pool. `read_timeout` bounds each read from the socket.
    pub fn new(read_timeout: Duration, config: &TransportConfig) -> ApnsResult<Self> {
        config.validate()?;

        // Overall deadline for one exchange once a slot is held.
        let exchange_timeout = config.connect_timeout() + config.write_timeout() + read_timeout;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout())
            .read_timeout(read_timeout)
            .timeout(exchange_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.keepalive())
            .tcp_keepalive(Duration::from_secs(60))
            .http2_keep_alive_interval(config.keepalive())
            .http2_keep_alive_while_idle(true)
            .build()
            .map_err(|e| ApnsError::config_with_source("Failed to create HTTP client", e))?;

        info!(
            max_connections = config.max_connections,
            read_timeout_secs = read_timeout.as_secs(),
            "Created APNs connection pool"
        );

        Ok(Self {
            client: RwLock::new(Some(client)),
            permits: Semaphore::new(config.max_connections),
            connect_timeout: config.connect_timeout(),
            read_timeout,
            pool_timeout: config.pool_timeout(),
        })
    }

    fn client(&self) -> Option<Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn exchange(&self, client: &Client, request: &ApnsRequest) -> TransportOutcome {
        let response = match client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return self.outcome_from_error(e),
        };

        let status = response.status().as_u16();
        let apns_id = response
            .headers()
            .get("apns-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let error = if status == 200 {
            None
        } else {
            match response.bytes().await {
                // Empty or non-JSON bodies carry no reason.
                Ok(bytes) => serde_json::from_slice::<ErrorBody>(&bytes).ok(),
                Err(e) => return self.outcome_from_error(e),
            }
        };

        TransportOutcome::Response(ApnsResponse {
            status,
            apns_id,
            error,
        })
    }

    fn outcome_from_error(&self, err: reqwest::Error) -> TransportOutcome {
        if !err.is_timeout() {
            return TransportOutcome::ConnectionError(err.to_string());
        }

        if err.is_connect() {
            TransportOutcome::Timeout {
                phase: TimeoutPhase::Connect,
                after: self.connect_timeout,
            }
        } else {
            TransportOutcome::Timeout {
                phase: TimeoutPhase::Read,
                after: self.read_timeout,
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApnsRequest) -> TransportOutcome {
        let Some(client) = self.client() else {
            return TransportOutcome::ConnectionError("transport is closed".to_string());
        };

        let _permit = match tokio::time::timeout(self.pool_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return TransportOutcome::ConnectionError("transport is closed".to_string())
            }
            Err(_) => {
                debug!("Timed out waiting for a free APNs connection slot");
                return TransportOutcome::Timeout {
                    phase: TimeoutPhase::PoolAcquire,
                    after: self.pool_timeout,
                };
            }
        };

        self.exchange(&client, request).await
    }

    fn close(&self) -> bool {
        let mut client = self.client.write().unwrap_or_else(PoisonError::into_inner);
        match client.take() {
            Some(_) => {
                self.permits.close();
                debug!("Closed APNs connection pool");
                true
            }
            None => false,
        }
    }

    fn is_closed(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_creation() {
        let transport = ReqwestTransport::new(Duration::from_secs(10), &TransportConfig::default());
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport =
            ReqwestTransport::new(Duration::from_secs(10), &TransportConfig::default()).unwrap();

        assert!(!transport.is_closed());
        assert!(transport.close());
        assert!(transport.is_closed());
        assert!(!transport.close());
    }

    #[test]
    fn test_oversized_pool_is_config_error() {
        let config = TransportConfig {
            max_connections: usize::MAX,
            ..Default::default()
        };

        let err = ReqwestTransport::new(Duration::from_secs(10), &config).err().unwrap();
        assert!(matches!(err, ApnsError::InvalidConfigValue { .. }));
    }

    #[tokio::test]
    async fn test_pool_acquire_deadline() {
        let config = TransportConfig {
            max_connections: 1,
            pool_timeout_secs: 1,
            ..Default::default()
        };
        let transport = ReqwestTransport::new(Duration::from_secs(10), &config).unwrap();
        let _held = transport.permits.acquire().await.unwrap();

        let request = ApnsRequest {
            device_token: "abc".to_string(),
            url: "http://127.0.0.1:9/3/device/abc".to_string(),
            headers: Default::default(),
            body: serde_json::json!({}),
        };

        assert_eq!(
            transport.send(&request).await,
            TransportOutcome::Timeout {
                phase: TimeoutPhase::PoolAcquire,
                after: Duration::from_secs(1),
            }
        );
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let transport =
            ReqwestTransport::new(Duration::from_secs(10), &TransportConfig::default()).unwrap();
        transport.close();

        let request = ApnsRequest {
            device_token: "abc".to_string(),
            url: "http://127.0.0.1:9/3/device/abc".to_string(),
            headers: Default::default(),
            body: serde_json::json!({}),
        };

        assert!(matches!(
            transport.send(&request).await,
            TransportOutcome::ConnectionError(_)
        ));
    }
}
