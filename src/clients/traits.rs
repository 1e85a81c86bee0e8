use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::errors::TimeoutPhase;
use crate::request::ApnsRequest;

/// Network leg of a delivery: performs one HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single request. Failures are reported in the outcome, never raised.
    async fn send(&self, request: &ApnsRequest) -> TransportOutcome;

    /// Release pooled connections.
    ///
    /// Returns `true` if this call performed the teardown and `false` if the
    /// transport was already closed.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// What came back from one HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The server answered with a status code
    Response(ApnsResponse),
    /// A deadline passed before the exchange completed
    Timeout { phase: TimeoutPhase, after: Duration },
    /// The exchange failed below HTTP
    ConnectionError(String),
}

/// Status and error details of an APNs response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApnsResponse {
    pub status: u16,
    pub apns_id: Option<String>,
    pub error: Option<ErrorBody>,
}

impl ApnsResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_reason(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            apns_id: None,
            error: Some(ErrorBody {
                reason: Some(reason.into()),
                timestamp: None,
            }),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.reason.as_deref())
    }
}

/// JSON body APNs sends with a non-200 status
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    pub reason: Option<String>,
    /// Milliseconds since the epoch at which the token stopped being valid (410 only)
    pub timestamp: Option<i64>,
}

/// Delivery statistics for a client
#[derive(Debug, Clone)]
pub struct DeliveryStats {
    /// Notifications accepted by APNs
    pub notifications_sent: u64,
    /// Notifications that ended in an error
    pub notifications_failed: u64,
    pub average_latency_ms: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub last_error: Option<String>,
    /// Retries performed after retryable failures
    pub retry_attempts: u64,
    pub uptime: Duration,
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self {
            notifications_sent: 0,
            notifications_failed: 0,
            average_latency_ms: 0,
            min_latency_ms: u64::MAX,
            max_latency_ms: 0,
            last_error: None,
            retry_attempts: 0,
            uptime: Duration::new(0, 0),
        }
    }
}

impl DeliveryStats {
    pub fn record_success(&mut self, latency_ms: u64) {
        self.notifications_sent += 1;
        // Running mean over all successful sends.
        let n = self.notifications_sent;
        self.average_latency_ms = (self.average_latency_ms * (n - 1) + latency_ms) / n;
        self.min_latency_ms = self.min_latency_ms.min(latency_ms);
        self.max_latency_ms = self.max_latency_ms.max(latency_ms);
    }

    pub fn record_failure(&mut self, error: String) {
        self.notifications_failed += 1;
        self.last_error = Some(error);
    }

    pub fn record_retry(&mut self) {
        self.retry_attempts += 1;
    }

    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.notifications_sent + self.notifications_failed;
        if total == 0 {
            0.0
        } else {
            (self.notifications_sent as f64 / total as f64) * 100.0
        }
    }
}

/// Non-secret summary of a client's configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfigInfo {
    pub endpoint: String,
    pub topic: String,
    pub team_id: String,
    pub key_id: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Retry policy for retryable delivery failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay added per retry: the n-th retry waits `n * base_delay_ms`
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn linear(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Delay before the given retry (1-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(retry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_delay(1), Duration::from_millis(500));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_delivery_stats() {
        let mut stats = DeliveryStats::default();
        stats.record_success(100);
        stats.record_success(200);
        stats.record_success(300);

        assert_eq!(stats.notifications_sent, 3);
        assert_eq!(stats.average_latency_ms, 200);
        assert_eq!(stats.min_latency_ms, 100);
        assert_eq!(stats.max_latency_ms, 300);
        assert_eq!(stats.success_rate(), 100.0);

        stats.record_failure("Unregistered".to_string());
        assert_eq!(stats.notifications_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("Unregistered"));
        assert_eq!(stats.success_rate(), 75.0);
    }

    #[test]
    fn test_error_body_parsing() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"reason":"Unregistered","timestamp":1700000000000}"#).unwrap();
        assert_eq!(body.reason.as_deref(), Some("Unregistered"));
        assert_eq!(body.timestamp, Some(1_700_000_000_000));
    }
}
