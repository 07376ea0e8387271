use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::error::{BridgeError, ConfigError, Result};

/// Options accepted by `initialize`.
///
/// Deserialized from the host's option map. Missing keys take their defaults
/// and unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitOptions {
    /// Show notifications visually while the app is in the foreground
    pub show_notifications_when_in_foreground: bool,
}

impl InitOptions {
    pub fn with_foreground_display(mut self, show: bool) -> Self {
        self.show_notifications_when_in_foreground = show;
        self
    }

    /// Parse the host's option map. `null` means all defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| BridgeError::InvalidOptions(e.to_string())),
            other => Err(BridgeError::InvalidOptions(format!(
                "expected an options map, got {}",
                other
            ))),
        }
    }
}

/// Bridge runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long `get_token` waits for an in-flight registration.
    /// Zero rejects immediately with `NoTokenAvailable`.
    pub token_wait_timeout: Duration,
    /// Events held for the first subscriber while none is attached
    pub replay_capacity: usize,
    /// Overrides the platform label stamped on notification events
    pub platform_label: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            token_wait_timeout: Duration::from_secs(10),
            replay_capacity: 64,
            platform_label: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the environment (and `.env` if present)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let token_wait_timeout = match env::var("NOTIFYLIGHT_TOKEN_WAIT_MS") {
            Ok(raw) => Duration::from_millis(parse_var("NOTIFYLIGHT_TOKEN_WAIT_MS", &raw)?),
            Err(_) => defaults.token_wait_timeout,
        };

        let replay_capacity = match env::var("NOTIFYLIGHT_REPLAY_CAPACITY") {
            Ok(raw) => parse_var("NOTIFYLIGHT_REPLAY_CAPACITY", &raw)?,
            Err(_) => defaults.replay_capacity,
        };

        let platform_label = env::var("NOTIFYLIGHT_PLATFORM_LABEL")
            .ok()
            .filter(|label| !label.trim().is_empty());

        Ok(Self {
            token_wait_timeout,
            replay_capacity,
            platform_label,
        })
    }

    pub fn with_token_wait_timeout(mut self, timeout: Duration) -> Self {
        self.token_wait_timeout = timeout;
        self
    }

    pub fn with_replay_capacity(mut self, capacity: usize) -> Self {
        self.replay_capacity = capacity;
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    raw: &str,
) -> std::result::Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
