//! Seam between the bridge and the operating system's push service.
//!
//! The bridge only consumes four facts from the platform: registration
//! succeeded with a token, registration failed, a notification arrived, and a
//! notification was opened. [`PushPlatform`] covers the calls the bridge makes
//! into the platform; [`PlatformSink`] is the handle the platform uses to report
//! back. Callbacks are queued, never executed on the caller's thread, so a
//! platform callback can never observe or corrupt a half-updated session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::bridge::Command;

/// Error reported by the platform push service
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct PlatformError {
    pub code: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Which alert styles to ask the user for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationOptions {
    pub alert: bool,
    pub sound: bool,
    pub badge: bool,
}

impl Default for AuthorizationOptions {
    fn default() -> Self {
        Self {
            alert: true,
            sound: true,
            badge: true,
        }
    }
}

/// Outcome of an authorization prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationStatus {
    pub granted: bool,
    pub alert: bool,
    pub sound: bool,
    pub badge: bool,
}

impl AuthorizationStatus {
    /// Everything requested was granted
    pub fn granted(options: AuthorizationOptions) -> Self {
        Self {
            granted: true,
            alert: options.alert,
            sound: options.sound,
            badge: options.badge,
        }
    }

    /// The user declined
    pub fn denied() -> Self {
        Self {
            granted: false,
            alert: false,
            sound: false,
            badge: false,
        }
    }
}

/// Calls the bridge makes into the platform push service
#[async_trait::async_trait]
pub trait PushPlatform: Send + Sync {
    /// Ask the user for notification authorization.
    ///
    /// A denial is `Ok` with `granted == false`. `Err` means the request could
    /// not be issued at all.
    async fn request_authorization(
        &self,
        options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus, PlatformError>;

    /// Start registration with the push service.
    ///
    /// The token (or failure) is reported later through `sink`. Returning `Err`
    /// means registration could not be started.
    async fn register_for_notifications(&self, sink: PlatformSink) -> Result<(), PlatformError>;

    /// Apply the foreground display preference
    fn set_foreground_presentation(&self, show: bool);

    /// Label stamped on normalized notification events
    fn platform_name(&self) -> &'static str {
        "ios"
    }
}

/// Callback raised by the platform
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    TokenReceived(String),
    TokenRefresh(String),
    NotificationReceived { payload: Value, foreground: bool },
    NotificationOpened { payload: Value },
    RegistrationFailed(PlatformError),
}

impl PlatformEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformEvent::TokenReceived(_) => "token_received",
            PlatformEvent::TokenRefresh(_) => "token_refresh",
            PlatformEvent::NotificationReceived { .. } => "notification_received",
            PlatformEvent::NotificationOpened { .. } => "notification_opened",
            PlatformEvent::RegistrationFailed(_) => "registration_failed",
        }
    }
}

/// Handle the platform uses to push callbacks into the bridge queue.
///
/// Cheap to clone and safe to call from any thread. None of its methods block
/// or panic; once the bridge has shut down callbacks are dropped with a warning.
#[derive(Clone)]
pub struct PlatformSink {
    commands: mpsc::UnboundedSender<Command>,
}

impl PlatformSink {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    pub fn token_received(&self, token: impl Into<String>) {
        self.push(PlatformEvent::TokenReceived(token.into()));
    }

    pub fn token_refreshed(&self, token: impl Into<String>) {
        self.push(PlatformEvent::TokenRefresh(token.into()));
    }

    pub fn notification_received(&self, payload: Value, foreground: bool) {
        self.push(PlatformEvent::NotificationReceived {
            payload,
            foreground,
        });
    }

    pub fn notification_opened(&self, payload: Value) {
        self.push(PlatformEvent::NotificationOpened { payload });
    }

    pub fn registration_failed(&self, error: PlatformError) {
        self.push(PlatformEvent::RegistrationFailed(error));
    }

    /// Queue a raw platform event
    pub fn push(&self, event: PlatformEvent) {
        let name = event.name();
        if self.commands.send(Command::Platform(event)).is_err() {
            warn!("NotifyLight bridge is closed, dropping {} callback", name);
        }
    }

    /// Whether the bridge is still accepting callbacks
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Handle that does not keep the bridge queue alive
    pub fn downgrade(&self) -> WeakPlatformSink {
        WeakPlatformSink {
            commands: self.commands.downgrade(),
        }
    }
}

/// Non-owning [`PlatformSink`] for platforms that hold on to the sink past
/// registration. Once every bridge handle is gone it no longer upgrades.
#[derive(Clone)]
pub struct WeakPlatformSink {
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl WeakPlatformSink {
    pub fn upgrade(&self) -> Option<PlatformSink> {
        self.commands.upgrade().map(PlatformSink::new)
    }
}

impl std::fmt::Debug for PlatformSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformSink")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::new("network", "timeout");
        assert_eq!(err.to_string(), "network: timeout");
    }

    #[test]
    fn test_authorization_status_constructors() {
        let options = AuthorizationOptions {
            alert: true,
            sound: false,
            badge: true,
        };
        let granted = AuthorizationStatus::granted(options);
        assert!(granted.granted);
        assert!(!granted.sound);

        let denied = AuthorizationStatus::denied();
        assert!(!denied.granted);
        assert!(!denied.alert);
    }

    #[test]
    fn test_sink_queues_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = PlatformSink::new(tx);

        sink.token_received("tok-1");
        sink.notification_opened(serde_json::json!({ "title": "hi" }));

        match rx.try_recv() {
            Ok(Command::Platform(PlatformEvent::TokenReceived(token))) => {
                assert_eq!(token, "tok-1")
            }
            other => panic!("unexpected command: {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(Command::Platform(PlatformEvent::NotificationOpened { .. }))
        ));
    }

    #[test]
    fn test_sink_after_close_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = PlatformSink::new(tx);
        drop(rx);

        assert!(!sink.is_open());
        sink.token_refreshed("tok-2");
        sink.registration_failed(PlatformError::new("network", "offline"));
    }
}
