//! NotifyLight Bridge
//!
//! Native side of the NotifyLight push-notification SDK. It sits between the
//! operating system's push service and the host application layer.
//!
//! It handles:
//! - Idempotent initialization and registration with the push service
//! - Device token lifecycle (issue, refresh, failure, retry)
//! - Authorization requests, where denial is a result and not an error
//! - Ordered delivery of token/notification/error events to host subscribers,
//!   with replay for a subscriber that attaches late
//!
//! # Example
//!
//! ```rust,no_run
//! use notifylight_bridge::{mock::ScriptedPlatform, BridgeConfig, InitOptions, NotificationBridge};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = Arc::new(ScriptedPlatform::issuing("tok-123"));
//!     let bridge = NotificationBridge::start(platform, BridgeConfig::default());
//!     let mut events = bridge.subscribe();
//!
//!     bridge
//!         .initialize(InitOptions::default().with_foreground_display(true))
//!         .await
//!         .unwrap();
//!     let token = bridge.get_token().await.unwrap();
//!     assert_eq!(token, "tok-123");
//!
//!     while let Some(envelope) = events.try_recv() {
//!         let (name, payload) = envelope.event.to_host_payload();
//!         println!("{name}: {payload}");
//!     }
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod mock;
pub mod platform;
pub mod session;
pub mod subscribers;

pub use bridge::{NotificationBridge, SessionSnapshot};
pub use config::{BridgeConfig, InitOptions};
pub use error::{BridgeError, ConfigError, Result};
pub use events::{
    token_prefix, BridgeEvent, ErrorPayload, EventEnvelope, EventKind, NotificationEvent,
};
pub use platform::{
    AuthorizationOptions, AuthorizationStatus, PlatformError, PlatformEvent, PlatformSink,
    PushPlatform, WeakPlatformSink,
};
pub use session::{InitOutcome, RegistrationStart, SessionPhase};
pub use subscribers::EventSubscription;
