//! Notification payloads
//!
//! Anything that can produce the notification JSON document implements
//! [`NotificationPayload`]. [`Payload`] builds the common `aps` dictionary plus
//! custom keys; [`RawPayload`] passes an already-assembled document through.

use serde_json::{json, Map, Value};

use crate::errors::{ApnsError, ApnsResult};

/// A value that serializes to an APNs notification body
pub trait NotificationPayload: Send + Sync {
    fn to_json(&self) -> ApnsResult<Value>;
}

/// Builder for the standard notification document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub alert_title: Option<String>,
    pub alert_subtitle: Option<String>,
    pub alert_body: Option<String>,
    pub sound: Option<String>,
    pub badge: Option<u32>,
    pub category: Option<String>,
    pub thread_id: Option<String>,
    pub content_available: bool,
    pub mutable_content: bool,
    pub custom_data: Map<String, Value>,
}

impl Payload {
    /// Create an alert payload with a title and body
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            alert_title: Some(title.into()),
            alert_body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Create a silent payload that only wakes the app
    pub fn background() -> Self {
        Self {
            content_available: true,
            ..Default::default()
        }
    }

    pub fn set_title(mut self, title: impl Into<String>) -> Self {
        self.alert_title = Some(title.into());
        self
    }

    pub fn set_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.alert_subtitle = Some(subtitle.into());
        self
    }

    pub fn set_body(mut self, body: impl Into<String>) -> Self {
        self.alert_body = Some(body.into());
        self
    }

    pub fn set_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn set_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn set_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn set_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn set_content_available(mut self, enabled: bool) -> Self {
        self.content_available = enabled;
        self
    }

    pub fn set_mutable_content(mut self, enabled: bool) -> Self {
        self.mutable_content = enabled;
        self
    }

    /// Add a top-level custom key alongside `aps`
    pub fn add_custom_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_data.insert(key.into(), value.into());
        self
    }

    fn alert(&self) -> Option<Value> {
        let mut alert = Map::new();
        if let Some(title) = &self.alert_title {
            alert.insert("title".to_string(), json!(title));
        }
        if let Some(subtitle) = &self.alert_subtitle {
            alert.insert("subtitle".to_string(), json!(subtitle));
        }
        if let Some(body) = &self.alert_body {
            alert.insert("body".to_string(), json!(body));
        }

        if alert.is_empty() {
            None
        } else {
            Some(Value::Object(alert))
        }
    }
}

impl NotificationPayload for Payload {
    fn to_json(&self) -> ApnsResult<Value> {
        let mut aps = Map::new();

        if let Some(alert) = self.alert() {
            aps.insert("alert".to_string(), alert);
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), json!(sound));
        }
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), json!(badge));
        }
        if let Some(category) = &self.category {
            aps.insert("category".to_string(), json!(category));
        }
        if let Some(thread_id) = &self.thread_id {
            aps.insert("thread-id".to_string(), json!(thread_id));
        }
        if self.content_available {
            aps.insert("content-available".to_string(), json!(1));
        }
        if self.mutable_content {
            aps.insert("mutable-content".to_string(), json!(1));
        }

        let mut body = Map::new();
        for (key, value) in &self.custom_data {
            if key == "aps" {
                return Err(ApnsError::request("custom data may not use the reserved key 'aps'"));
            }
            body.insert(key.clone(), value.clone());
        }
        body.insert("aps".to_string(), Value::Object(aps));

        Ok(Value::Object(body))
    }
}

/// A pre-built notification document sent as-is
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload(pub Value);

impl RawPayload {
    pub fn new(document: Value) -> Self {
        Self(document)
    }
}

impl NotificationPayload for RawPayload {
    fn to_json(&self) -> ApnsResult<Value> {
        if !self.0.is_object() {
            return Err(ApnsError::request("notification body must be a JSON object"));
        }
        Ok(self.0.clone())
    }
}

impl NotificationPayload for Value {
    fn to_json(&self) -> ApnsResult<Value> {
        RawPayload(self.clone()).to_json()
    }
}
