//! Error types for the NotifyLight bridge

use thiserror::Error;

use crate::platform::PlatformError;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to the host application.
///
/// Every variant maps to a stable code string (see [`BridgeError::code`]) so the
/// host can branch on it without parsing messages. A denied permission prompt
/// is not an error: it resolves as `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Operation attempted before `initialize`
    #[error("NotifyLight is not initialized")]
    NotInitialized,

    /// The platform push service rejected registration
    #[error("Registration failed: {0}")]
    RegistrationFailed(PlatformError),

    /// No token has been issued and none is in flight
    #[error("No token available")]
    NoTokenAvailable,

    /// The platform could not even issue the authorization request
    #[error("Failed to request notification permissions: {0}")]
    PermissionRequestFailed(PlatformError),

    /// `initialize` options had the wrong shape
    #[error("Invalid initialization options: {0}")]
    InvalidOptions(String),

    /// The dispatcher has shut down
    #[error("NotifyLight bridge is closed")]
    BridgeClosed,
}

impl BridgeError {
    /// Stable error kind string handed across the bridge boundary
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NotInitialized => "NOT_INITIALIZED",
            BridgeError::RegistrationFailed(_) => "REGISTRATION_FAILED",
            BridgeError::NoTokenAvailable => "NO_TOKEN",
            BridgeError::PermissionRequestFailed(_) => "PERMISSION_REQUEST_FAILED",
            BridgeError::InvalidOptions(_) => "INIT_ERROR",
            BridgeError::BridgeClosed => "BRIDGE_CLOSED",
        }
    }

    /// Check if the caller may retry after registering again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::RegistrationFailed(_) | BridgeError::NoTokenAvailable
        )
    }
}

/// Errors raised while loading [`crate::config::BridgeConfig`] from the environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
