//! Request construction
//!
//! Turns a device token, payload and options into the URL, headers and body of
//! one `POST /3/device/<token>` call. Nothing here touches the network.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use url::Url;

use crate::errors::{ApnsError, ApnsResult};

pub const APNS_TOPIC: &str = "apns-topic";
pub const APNS_PUSH_TYPE: &str = "apns-push-type";
pub const APNS_PRIORITY: &str = "apns-priority";
pub const APNS_EXPIRATION: &str = "apns-expiration";
pub const APNS_COLLAPSE_ID: &str = "apns-collapse-id";

/// APNs server environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    #[default]
    Production,
    Sandbox,
}

impl Endpoint {
    pub fn from_sandbox_flag(use_sandbox: bool) -> Self {
        if use_sandbox {
            Self::Sandbox
        } else {
            Self::Production
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            Self::Production => "https://api.push.apple.com",
            Self::Sandbox => "https://api.development.push.apple.com",
        }
    }
}

/// Value of the `apns-push-type` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushType {
    #[default]
    Alert,
    Background,
    Voip,
    Complication,
    FileProvider,
    Mdm,
    Location,
    LiveActivity,
    PushToTalk,
}

impl PushType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Background => "background",
            Self::Voip => "voip",
            Self::Complication => "complication",
            Self::FileProvider => "fileprovider",
            Self::Mdm => "mdm",
            Self::Location => "location",
            Self::LiveActivity => "liveactivity",
            Self::PushToTalk => "pushtotalk",
        }
    }
}

impl fmt::Display for PushType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushType {
    type Err = ApnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alert" => Ok(Self::Alert),
            "background" => Ok(Self::Background),
            "voip" => Ok(Self::Voip),
            "complication" => Ok(Self::Complication),
            "fileprovider" => Ok(Self::FileProvider),
            "mdm" => Ok(Self::Mdm),
            "location" => Ok(Self::Location),
            "liveactivity" => Ok(Self::LiveActivity),
            "pushtotalk" => Ok(Self::PushToTalk),
            other => Err(ApnsError::invalid_value("push_type", format!("unknown push type '{other}'"))),
        }
    }
}

/// Value of the `apns-priority` header.
///
/// APNs documents 10 (deliver immediately) and 5 (conserve power). Other
/// values are forwarded unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority(pub u8);

impl Priority {
    pub const IMMEDIATE: Priority = Priority(10);
    pub const POWER_CONSIDERATE: Priority = Priority(5);

    pub fn is_documented(&self) -> bool {
        *self == Self::IMMEDIATE || *self == Self::POWER_CONSIDERATE
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::IMMEDIATE
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-notification delivery options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationOptions {
    pub push_type: PushType,
    pub priority: Priority,
    /// Unix time after which APNs stops trying to deliver
    pub expiration: Option<i64>,
    pub collapse_id: Option<String>,
}

impl NotificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_push_type(mut self, push_type: PushType) -> Self {
        self.push_type = push_type;
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_expiration(mut self, expiration: i64) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_collapse_id(mut self, collapse_id: impl Into<String>) -> Self {
        self.collapse_id = Some(collapse_id.into());
        self
    }
}

/// A fully assembled notification request
#[derive(Debug, Clone)]
pub struct ApnsRequest {
    pub device_token: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApnsRequest {
    /// Header value as a string, if present and printable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Builds requests against one endpoint and topic
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: Url,
    topic: String,
}

impl RequestBuilder {
    pub fn new(endpoint: &str, topic: impl Into<String>) -> ApnsResult<Self> {
        let mut base_url = Url::parse(endpoint).map_err(|e| {
            ApnsError::config_with_source(format!("invalid APNs endpoint '{endpoint}'"), e)
        })?;

        // Device paths join relative to the base, so a path prefix must end in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            topic: topic.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn endpoint(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Build the request for one device
    pub fn build(
        &self,
        auth_token: &str,
        device_token: &str,
        body: Value,
        options: &NotificationOptions,
    ) -> ApnsResult<ApnsRequest> {
        let url = self.build_url(device_token)?;
        let headers = self.build_headers(auth_token, options)?;

        Ok(ApnsRequest {
            device_token: device_token.to_string(),
            url,
            headers,
            body,
        })
    }

    fn build_url(&self, device_token: &str) -> ApnsResult<String> {
        let url = self
            .base_url
            .join(&format!("3/device/{device_token}"))
            .map_err(|e| ApnsError::request_with_source("failed to build device URL", e))?;
        Ok(url.to_string())
    }

    fn build_headers(&self, auth_token: &str, options: &NotificationOptions) -> ApnsResult<HeaderMap> {
        if !options.priority.is_documented() {
            warn!(priority = options.priority.0, "Forwarding undocumented apns-priority value");
        }

        let mut headers = HeaderMap::new();
        let mut authorization = header_value("authorization", &format!("bearer {auth_token}"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(HeaderName::from_static(APNS_TOPIC), header_value(APNS_TOPIC, &self.topic)?);
        headers.insert(
            HeaderName::from_static(APNS_PUSH_TYPE),
            HeaderValue::from_static(options.push_type.as_str()),
        );
        headers.insert(
            HeaderName::from_static(APNS_PRIORITY),
            HeaderValue::from(u16::from(options.priority.0)),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(expiration) = options.expiration {
            headers.insert(HeaderName::from_static(APNS_EXPIRATION), HeaderValue::from(expiration));
        }

        if let Some(collapse_id) = &options.collapse_id {
            headers.insert(
                HeaderName::from_static(APNS_COLLAPSE_ID),
                header_value(APNS_COLLAPSE_ID, collapse_id)?,
            );
        }

        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> ApnsResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ApnsError::request_with_source(format!("invalid {name} header value"), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::DEVICE_TOKEN;
    use serde_json::json;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(Endpoint::Production.url(), "com.example.app").unwrap()
    }

    #[test]
    fn test_url_building() {
        let request = builder()
            .build("jwt", DEVICE_TOKEN, json!({"aps": {}}), &NotificationOptions::default())
            .unwrap();
        assert_eq!(
            request.url,
            format!("https://api.push.apple.com/3/device/{DEVICE_TOKEN}")
        );

        let sandbox = RequestBuilder::new(Endpoint::Sandbox.url(), "com.example.app").unwrap();
        let request = sandbox
            .build("jwt", "abc", json!({}), &NotificationOptions::default())
            .unwrap();
        assert_eq!(request.url, "https://api.development.push.apple.com/3/device/abc");
    }

    #[test]
    fn test_endpoint_with_path_prefix() {
        for endpoint in ["http://127.0.0.1:8080/apns", "http://127.0.0.1:8080/apns/"] {
            let builder = RequestBuilder::new(endpoint, "com.example.app").unwrap();
            assert_eq!(builder.endpoint(), "http://127.0.0.1:8080/apns");

            let request = builder
                .build("jwt", "abc", json!({}), &NotificationOptions::default())
                .unwrap();
            assert_eq!(request.url, "http://127.0.0.1:8080/apns/3/device/abc");
        }
    }

    #[test]
    fn test_authorization_hidden_from_debug() {
        let request = builder()
            .build("secret-jwt", DEVICE_TOKEN, json!({}), &NotificationOptions::default())
            .unwrap();

        assert!(request.headers["authorization"].is_sensitive());
        assert!(!format!("{request:?}").contains("secret-jwt"));
        assert_eq!(request.header("authorization"), Some("bearer secret-jwt"));
    }

    #[test]
    fn test_default_headers() {
        let request = builder()
            .build("jwt-token", DEVICE_TOKEN, json!({}), &NotificationOptions::default())
            .unwrap();

        assert_eq!(request.header("authorization"), Some("bearer jwt-token"));
        assert_eq!(request.header(APNS_TOPIC), Some("com.example.app"));
        assert_eq!(request.header(APNS_PUSH_TYPE), Some("alert"));
        assert_eq!(request.header(APNS_PRIORITY), Some("10"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header(APNS_EXPIRATION), None);
        assert_eq!(request.header(APNS_COLLAPSE_ID), None);
    }

    #[test]
    fn test_optional_headers() {
        let options = NotificationOptions::new()
            .with_push_type(PushType::Background)
            .with_priority(5)
            .with_expiration(1_700_000_000)
            .with_collapse_id("score-update");

        let request = builder().build("jwt", DEVICE_TOKEN, json!({}), &options).unwrap();

        assert_eq!(request.header(APNS_PUSH_TYPE), Some("background"));
        assert_eq!(request.header(APNS_PRIORITY), Some("5"));
        assert_eq!(request.header(APNS_EXPIRATION), Some("1700000000"));
        assert_eq!(request.header(APNS_COLLAPSE_ID), Some("score-update"));
    }

    #[test]
    fn test_undocumented_priority_is_forwarded() {
        let options = NotificationOptions::new().with_priority(7);
        let request = builder().build("jwt", DEVICE_TOKEN, json!({}), &options).unwrap();
        assert_eq!(request.header(APNS_PRIORITY), Some("7"));
    }

    #[test]
    fn test_invalid_collapse_id_is_request_error() {
        let options = NotificationOptions::new().with_collapse_id("bad\nvalue");
        let err = builder().build("jwt", DEVICE_TOKEN, json!({}), &options).unwrap_err();
        assert!(matches!(err, ApnsError::Request { .. }));
    }

    #[test]
    fn test_body_is_passed_through() {
        let body = json!({"aps": {"alert": "hi"}, "id": 1});
        let request = builder()
            .build("jwt", DEVICE_TOKEN, body.clone(), &NotificationOptions::default())
            .unwrap();
        assert_eq!(request.body, body);
    }

    #[test]
    fn test_push_type_parsing() {
        assert_eq!("voip".parse::<PushType>().unwrap(), PushType::Voip);
        assert_eq!("Alert".parse::<PushType>().unwrap(), PushType::Alert);
        assert!("carrier-pigeon".parse::<PushType>().is_err());
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(RequestBuilder::new("not a url", "topic").is_err());
    }
}
