use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::traits::{
    ApnsResponse, ClientConfigInfo, DeliveryStats, RetryConfig, Transport, TransportOutcome,
};
use super::transport::ReqwestTransport;
use crate::auth::TokenProvider;
use crate::config::ApnsConfig;
use crate::errors::{token_prefix, ApnsError, ApnsResult};
use crate::payload::NotificationPayload;
use crate::request::{ApnsRequest, NotificationOptions, RequestBuilder};

/// 403 reasons that mean the provider token itself was refused
const PROVIDER_TOKEN_REASONS: &[&str] = &["ExpiredProviderToken", "InvalidProviderToken"];

/// Result of a single delivery attempt
#[derive(Debug)]
enum Attempt {
    Delivered(ApnsResponse),
    Retryable { status: Option<u16>, reason: String },
    Terminal(ApnsError),
}

impl Attempt {
    /// Map a transport outcome onto the retry state machine
    fn from_outcome(device_token: &str, outcome: TransportOutcome) -> Self {
        let response = match outcome {
            TransportOutcome::Response(response) => response,
            TransportOutcome::Timeout { phase, after } => {
                return Self::Terminal(ApnsError::Timeout {
                    device_token: device_token.to_string(),
                    phase,
                    timeout_secs: after.as_secs(),
                })
            }
            TransportOutcome::ConnectionError(message) => {
                return Self::Retryable {
                    status: None,
                    reason: format!("network error: {message}"),
                }
            }
        };

        let status = response.status;
        let reason = response.reason().map(str::to_string);

        match status {
            200 => Self::Delivered(response),
            400 => {
                let reason = reason.unwrap_or_else(|| "BadRequest".to_string());
                if reason == "BadDeviceToken" {
                    Self::Terminal(ApnsError::InvalidDeviceToken {
                        device_token: device_token.to_string(),
                        status,
                        reason,
                    })
                } else {
                    Self::Terminal(ApnsError::Rejected {
                        device_token: device_token.to_string(),
                        status,
                        reason,
                    })
                }
            }
            403 => Self::Terminal(ApnsError::Rejected {
                device_token: device_token.to_string(),
                status,
                reason: match reason {
                    Some(reason) => format!("certificate or token is not valid ({reason})"),
                    None => "certificate or token is not valid".to_string(),
                },
            }),
            410 => Self::Terminal(ApnsError::InvalidDeviceToken {
                device_token: device_token.to_string(),
                status,
                reason: reason.unwrap_or_else(|| "Unregistered".to_string()),
            }),
            _ => Self::Retryable {
                status: Some(status),
                reason: reason.unwrap_or_else(|| "Unknown".to_string()),
            },
        }
    }
}

/// Asynchronous APNs client
///
/// Owns one token provider, one request builder and one transport. Each
/// notification is tried until it is delivered, fails terminally, or the retry
/// budget runs out; retryable failures back off linearly (0.5 s, 1 s, 1.5 s, ...).
/// Timeouts are never retried.
///
/// The connection pool is released by [`close`](Self::close) or on drop.
pub struct AsyncApnsClient {
    tokens: Arc<TokenProvider>,
    requests: RequestBuilder,
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    timeout_secs: u64,
    stats: Arc<Mutex<DeliveryStats>>,
    created_at: Instant,
}

impl AsyncApnsClient {
    /// Create a client with the reqwest transport.
    ///
    /// Fails if the configuration is incomplete or the private key cannot be
    /// read and parsed.
    pub fn new(config: ApnsConfig) -> ApnsResult<Self> {
        config.validate()?;

        let key = config.load_private_key()?;
        let tokens = TokenProvider::new(&config.team_id, &config.key_id, &key)?;
        let transport = ReqwestTransport::new(config.read_timeout(), &config.transport)?;

        let client = Self::with_transport(&config, tokens, Arc::new(transport))?;

        info!(
            "Initialized APNs client for topic={}, endpoint={}",
            client.requests.topic(),
            client.requests.endpoint()
        );

        Ok(client)
    }

    /// Create a client from already-built parts
    pub fn with_transport(
        config: &ApnsConfig,
        tokens: TokenProvider,
        transport: Arc<dyn Transport>,
    ) -> ApnsResult<Self> {
        let requests = RequestBuilder::new(config.endpoint_url(), config.topic())?;

        Ok(Self {
            tokens: Arc::new(tokens),
            requests,
            transport,
            retry: config.retry_config(),
            timeout_secs: config.timeout_secs,
            stats: Arc::new(Mutex::new(DeliveryStats::default())),
            created_at: Instant::now(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Wrap this client for use from synchronous code
    pub fn blocking(self) -> ApnsResult<ApnsClient> {
        ApnsClient::new(self)
    }

    /// Send one notification.
    ///
    /// `Ok(())` means APNs answered 200. Invalid or unregistered device tokens
    /// yield [`ApnsError::InvalidDeviceToken`], timeouts [`ApnsError::Timeout`],
    /// and an exhausted retry budget [`ApnsError::RetriesExhausted`].
    pub async fn send_notification<P>(
        &self,
        device_token: &str,
        payload: &P,
        options: &NotificationOptions,
    ) -> ApnsResult<()>
    where
        P: NotificationPayload + ?Sized,
    {
        let start = Instant::now();

        let result = self.send_with_retry(device_token, payload, options).await;

        let elapsed = start.elapsed().as_millis() as u64;
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(()) => stats.record_success(elapsed),
            Err(e) => stats.record_failure(e.to_string()),
        }
        drop(stats);

        result
    }

    /// Send the same notification to several devices, one after another.
    ///
    /// Every token gets an entry: `true` if delivered, `false` for any error.
    /// A failing token never stops the batch.
    pub async fn send_bulk_notifications<S, P>(
        &self,
        device_tokens: &[S],
        payload: &P,
        options: &NotificationOptions,
    ) -> HashMap<String, bool>
    where
        S: AsRef<str>,
        P: NotificationPayload + ?Sized,
    {
        let mut results = HashMap::with_capacity(device_tokens.len());

        for device_token in device_tokens {
            let device_token = device_token.as_ref();
            let delivered = match self.send_notification(device_token, payload, options).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        token = %token_prefix(device_token),
                        kind = e.kind().as_str(),
                        "Bulk delivery failed: {e}"
                    );
                    false
                }
            };
            results.insert(device_token.to_string(), delivered);
        }

        results
    }

    /// Build the request that would be sent, without sending it
    pub fn preview_request<P>(
        &self,
        device_token: &str,
        payload: &P,
        options: &NotificationOptions,
    ) -> ApnsResult<ApnsRequest>
    where
        P: NotificationPayload + ?Sized,
    {
        let auth_token = self.tokens.get_token()?;
        self.requests
            .build(&auth_token, device_token, payload.to_json()?, options)
    }

    /// Release the connection pool. Calling this more than once is harmless.
    pub fn close(&self) {
        if self.transport.close() {
            info!("APNs client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    pub fn get_stats(&self) -> DeliveryStats {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.uptime = self.created_at.elapsed();
        stats.clone()
    }

    pub fn get_config_info(&self) -> ClientConfigInfo {
        ClientConfigInfo {
            endpoint: self.requests.endpoint().to_string(),
            topic: self.requests.topic().to_string(),
            team_id: self.tokens.team_id().to_string(),
            key_id: self.tokens.key_id().to_string(),
            timeout_secs: self.timeout_secs,
            max_retries: self.retry.max_retries,
            retry_delay_ms: self.retry.base_delay_ms,
        }
    }

    async fn send_with_retry<P>(
        &self,
        device_token: &str,
        payload: &P,
        options: &NotificationOptions,
    ) -> ApnsResult<()>
    where
        P: NotificationPayload + ?Sized,
    {
        if self.transport.is_closed() {
            return Err(ApnsError::ClientClosed);
        }

        let body = payload.to_json()?;
        let mut retries = 0;

        loop {
            let attempt = retries + 1;
            debug!(token = %token_prefix(device_token), attempt, "Sending APNs notification");

            match self.attempt(device_token, &body, options).await {
                Attempt::Delivered(response) => {
                    info!(
                        "APNs notification sent successfully to token {} (apns_id: {:?})",
                        token_prefix(device_token),
                        response.apns_id
                    );
                    return Ok(());
                }
                Attempt::Terminal(err) => {
                    error!(token = %token_prefix(device_token), attempt, "APNs send failed: {err}");
                    return Err(err);
                }
                Attempt::Retryable { status, reason } => {
                    if retries >= self.retry.max_retries {
                        error!(
                            token = %token_prefix(device_token),
                            attempts = attempt,
                            "APNs retries exhausted: {reason}"
                        );
                        return Err(ApnsError::RetriesExhausted {
                            device_token: device_token.to_string(),
                            attempts: attempt,
                            status,
                            reason,
                        });
                    }

                    retries += 1;
                    self.stats
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .record_retry();

                    let delay = self.retry.calculate_delay(retries);
                    warn!(
                        token = %token_prefix(device_token),
                        status = ?status,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable APNs failure: {reason}"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        device_token: &str,
        body: &Value,
        options: &NotificationOptions,
    ) -> Attempt {
        let auth_token = match self.tokens.get_token() {
            Ok(token) => token,
            Err(e) => return Attempt::Terminal(e),
        };

        let request = match self
            .requests
            .build(&auth_token, device_token, body.clone(), options)
        {
            Ok(request) => request,
            Err(e) => return Attempt::Terminal(e),
        };

        let outcome = self.transport.send(&request).await;

        if let TransportOutcome::Response(response) = &outcome {
            self.inspect_response(device_token, response);
        }

        Attempt::from_outcome(device_token, outcome)
    }

    fn inspect_response(&self, device_token: &str, response: &ApnsResponse) {
        match (response.status, response.reason()) {
            (403, Some(reason)) if PROVIDER_TOKEN_REASONS.contains(&reason) => {
                warn!("APNs refused provider token ({reason}); it will be re-signed");
                self.tokens.invalidate();
            }
            (410, _) => {
                if let Some(timestamp) = response.error.as_ref().and_then(|e| e.timestamp) {
                    debug!(
                        token = %token_prefix(device_token),
                        timestamp,
                        "Device token unregistered"
                    );
                }
            }
            _ => {}
        }
    }
}

impl Drop for AsyncApnsClient {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// Synchronous wrapper around [`AsyncApnsClient`]
///
/// Outside a tokio runtime it drives requests on a private current-thread
/// runtime. Inside a multi-thread runtime it blocks the worker with
/// `block_in_place` instead; calling it from a current-thread runtime panics.
pub struct ApnsClient {
    inner: AsyncApnsClient,
    runtime: Option<tokio::runtime::Runtime>,
}

impl ApnsClient {
    pub fn new(inner: AsyncApnsClient) -> ApnsResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ApnsError::config_with_source("Failed to create runtime", e))?;

        Ok(Self {
            inner,
            runtime: Some(runtime),
        })
    }

    /// Create a blocking client with the reqwest transport
    pub fn with_config(config: ApnsConfig) -> ApnsResult<Self> {
        Self::new(AsyncApnsClient::new(config)?)
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match (tokio::runtime::Handle::try_current(), &self.runtime) {
            (Ok(handle), _) => tokio::task::block_in_place(|| handle.block_on(future)),
            (Err(_), Some(runtime)) => runtime.block_on(future),
            (Err(_), None) => unreachable!("runtime is only taken on drop"),
        }
    }

    pub fn send_notification<P>(
        &self,
        device_token: &str,
        payload: &P,
        options: &NotificationOptions,
    ) -> ApnsResult<()>
    where
        P: NotificationPayload + ?Sized,
    {
        self.block_on(self.inner.send_notification(device_token, payload, options))
    }

    pub fn send_bulk_notifications<S, P>(
        &self,
        device_tokens: &[S],
        payload: &P,
        options: &NotificationOptions,
    ) -> HashMap<String, bool>
    where
        S: AsRef<str>,
        P: NotificationPayload + ?Sized,
    {
        self.block_on(
            self.inner
                .send_bulk_notifications(device_tokens, payload, options),
        )
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn get_stats(&self) -> DeliveryStats {
        self.inner.get_stats()
    }

    pub fn get_config_info(&self) -> ClientConfigInfo {
        self.inner.get_config_info()
    }
}

impl Drop for ApnsClient {
    fn drop(&mut self) {
        // A runtime may not be dropped from async context; shutting it down in
        // the background is always allowed.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
