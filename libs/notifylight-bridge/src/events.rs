//! Events emitted to host subscribers
//!
//! Every platform callback produces exactly one [`BridgeEvent`]. Events are
//! wrapped in an [`EventEnvelope`] carrying a sequence number so subscribers can
//! verify ordering, and converted to the host's `(name, payload)` shape with
//! [`BridgeEvent::to_host_payload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Event kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TokenReceived,
    TokenRefresh,
    NotificationReceived,
    NotificationOpened,
    RegistrationError,
    DeliveryError,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::TokenReceived,
        EventKind::TokenRefresh,
        EventKind::NotificationReceived,
        EventKind::NotificationOpened,
        EventKind::RegistrationError,
        EventKind::DeliveryError,
    ];

    /// Event name used on the host side of the bridge
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::TokenReceived => "NotifyLightTokenReceived",
            EventKind::TokenRefresh => "NotifyLightTokenRefresh",
            EventKind::NotificationReceived => "NotifyLightNotificationReceived",
            EventKind::NotificationOpened => "NotifyLightNotificationOpened",
            EventKind::RegistrationError => "NotifyLightRegistrationError",
            EventKind::DeliveryError => "NotifyLightDeliveryError",
        }
    }
}

/// `{code, message}` pair carried by error events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BridgeEvent {
    TokenReceived { token: String },
    TokenRefresh { token: String },
    NotificationReceived(NotificationEvent),
    NotificationOpened(NotificationEvent),
    RegistrationError(ErrorPayload),
    DeliveryError(ErrorPayload),
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::TokenReceived { .. } => EventKind::TokenReceived,
            BridgeEvent::TokenRefresh { .. } => EventKind::TokenRefresh,
            BridgeEvent::NotificationReceived(_) => EventKind::NotificationReceived,
            BridgeEvent::NotificationOpened(_) => EventKind::NotificationOpened,
            BridgeEvent::RegistrationError(_) => EventKind::RegistrationError,
            BridgeEvent::DeliveryError(_) => EventKind::DeliveryError,
        }
    }

    /// Event name and JSON payload as the host event emitter expects them.
    ///
    /// Token events carry the bare token string, notification events the
    /// normalized map, error events `{code, message}`.
    pub fn to_host_payload(&self) -> (&'static str, Value) {
        let payload = match self {
            BridgeEvent::TokenReceived { token } | BridgeEvent::TokenRefresh { token } => {
                Value::String(token.clone())
            }
            BridgeEvent::NotificationReceived(notification)
            | BridgeEvent::NotificationOpened(notification) => notification.to_value(),
            BridgeEvent::RegistrationError(error) | BridgeEvent::DeliveryError(error) => {
                serde_json::json!({ "code": error.code, "message": error.message })
            }
        };

        (self.kind().event_name(), payload)
    }
}

/// An event as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    /// Monotonic per bridge, starting at 1
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    pub event: BridgeEvent,
}

impl EventEnvelope {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Notification payload must be a map, got {0}")]
    NotAMap(&'static str),
}

impl PayloadError {
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::NotAMap(_) => "invalid_payload",
        }
    }
}

/// Notification normalized for the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Alias of `body`
    pub message: String,
    pub data: Map<String, Value>,
    pub platform: String,
    /// Epoch milliseconds
    pub received_at: i64,
    /// Whether the app was in the foreground; absent for opened notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<bool>,
}

impl NotificationEvent {
    /// Normalize a platform payload.
    ///
    /// `title` and `body` are read from the top level. Custom values come from
    /// a `data` map when present, otherwise from the remaining top-level keys.
    /// Only scalar values survive into `data`.
    pub fn from_payload(
        payload: &Value,
        platform: &str,
        foreground: Option<bool>,
    ) -> Result<Self, PayloadError> {
        let map = match payload {
            Value::Object(map) => map,
            other => return Err(PayloadError::NotAMap(json_type_name(other))),
        };

        let title = string_field(map, "title");
        let body = string_field(map, "body");

        let data: Map<String, Value> = match map.get("data") {
            Some(Value::Object(data)) => scalar_entries(data.iter()),
            _ => scalar_entries(
                map.iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "title" | "body" | "data")),
            ),
        };

        let id = match data.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            id,
            title,
            message: body.clone(),
            body,
            data,
            platform: platform.to_string(),
            received_at: Utc::now().timestamp_millis(),
            foreground,
        })
    }

    /// In-app messages are tagged with `data.type == "in-app"`
    pub fn is_in_app(&self) -> bool {
        matches!(self.data.get("type"), Some(Value::String(t)) if t == "in-app")
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// First 20 characters of a device token, for logs
pub fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(20).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn scalar_entries<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Map<String, Value> {
    entries
        .filter(|(_, value)| matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_prefix() {
        assert_eq!(token_prefix("short"), "short");
        assert_eq!(
            token_prefix("0123456789abcdefghijKLMNOP"),
            "0123456789abcdefghij..."
        );
    }

    #[test]
    fn test_event_names_are_distinct() {
        let mut names: Vec<_> = EventKind::ALL.iter().map(|k| k.event_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
        assert_eq!(
            EventKind::TokenReceived.event_name(),
            "NotifyLightTokenReceived"
        );
    }

    #[test]
    fn test_normalize_payload_with_data_map() {
        let payload = json!({
            "title": "Order shipped",
            "body": "Your package is on the way",
            "data": {
                "id": "msg-42",
                "type": "in-app",
                "count": 3,
                "nested": { "ignored": true }
            }
        });

        let event = NotificationEvent::from_payload(&payload, "ios", Some(true)).unwrap();
        assert_eq!(event.id, "msg-42");
        assert_eq!(event.title, "Order shipped");
        assert_eq!(event.message, event.body);
        assert_eq!(event.platform, "ios");
        assert_eq!(event.foreground, Some(true));
        assert!(event.is_in_app());
        assert_eq!(event.data.get("count"), Some(&json!(3)));
        assert!(!event.data.contains_key("nested"));
    }

    #[test]
    fn test_normalize_payload_without_data_map() {
        let payload = json!({ "body": "hello", "campaign": "spring", "list": [1, 2] });

        let event = NotificationEvent::from_payload(&payload, "ios", None).unwrap();
        assert_eq!(event.title, "");
        assert_eq!(event.body, "hello");
        assert_eq!(event.data.get("campaign"), Some(&json!("spring")));
        assert!(!event.data.contains_key("list"));
        assert!(!event.data.contains_key("body"));
        assert!(Uuid::parse_str(&event.id).is_ok());
        assert!(!event.is_in_app());
    }

    #[test]
    fn test_normalize_rejects_non_map() {
        let err = NotificationEvent::from_payload(&json!("hello"), "ios", None).unwrap_err();
        assert_eq!(err, PayloadError::NotAMap("string"));
        assert_eq!(err.code(), "invalid_payload");
    }

    #[test]
    fn test_host_payload_shapes() {
        let (name, payload) = BridgeEvent::TokenRefresh {
            token: "tok-456".to_string(),
        }
        .to_host_payload();
        assert_eq!(name, "NotifyLightTokenRefresh");
        assert_eq!(payload, json!("tok-456"));

        let (name, payload) =
            BridgeEvent::RegistrationError(ErrorPayload::new("network", "timeout"))
                .to_host_payload();
        assert_eq!(name, "NotifyLightRegistrationError");
        assert_eq!(payload, json!({ "code": "network", "message": "timeout" }));
    }

    #[test]
    fn test_opened_notification_omits_foreground() {
        let event = NotificationEvent::from_payload(&json!({ "title": "t" }), "ios", None).unwrap();
        let value = event.to_value();
        assert!(value.get("foreground").is_none());
        assert!(value.get("receivedAt").is_some());
    }
}
