//! Scripted in-process push platform.
//!
//! Stands in for the operating system's push service in tests and in the host
//! simulator. Each registration follows the configured [`RegistrationScript`];
//! the sink handed over at registration is kept, without owning the bridge
//! queue, so callers can raise further callbacks (refreshes, notifications)
//! later.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use crate::platform::{
    AuthorizationOptions, AuthorizationStatus, PlatformError, PlatformSink, PushPlatform,
    WeakPlatformSink,
};

/// How the platform answers a registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationScript {
    /// Report a token through the sink
    IssueToken(String),
    /// Report a registration failure through the sink
    Fail(PlatformError),
    /// Refuse to start registration at all
    Reject(PlatformError),
    /// Accept and stay silent until the test drives the sink
    Hold,
}

impl RegistrationScript {
    fn label(&self) -> &'static str {
        match self {
            RegistrationScript::IssueToken(_) => "issue_token",
            RegistrationScript::Fail(_) => "fail",
            RegistrationScript::Reject(_) => "reject",
            RegistrationScript::Hold => "hold",
        }
    }
}

/// How the platform answers an authorization prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationScript {
    Grant,
    Deny,
    Fail(PlatformError),
}

pub struct ScriptedPlatform {
    registration: Mutex<RegistrationScript>,
    authorization: Mutex<AuthorizationScript>,
    sink: Mutex<Option<WeakPlatformSink>>,
    registrations: AtomicUsize,
    authorization_requests: AtomicUsize,
    show_in_foreground: AtomicBool,
}

impl ScriptedPlatform {
    pub fn new(registration: RegistrationScript, authorization: AuthorizationScript) -> Self {
        Self {
            registration: Mutex::new(registration),
            authorization: Mutex::new(authorization),
            sink: Mutex::new(None),
            registrations: AtomicUsize::new(0),
            authorization_requests: AtomicUsize::new(0),
            show_in_foreground: AtomicBool::new(false),
        }
    }

    /// Grants permissions and issues `token` on registration
    pub fn issuing(token: impl Into<String>) -> Self {
        Self::new(
            RegistrationScript::IssueToken(token.into()),
            AuthorizationScript::Grant,
        )
    }

    pub fn set_registration(&self, script: RegistrationScript) {
        *self.registration.lock() = script;
    }

    pub fn set_authorization(&self, script: AuthorizationScript) {
        *self.authorization.lock() = script;
    }

    /// Sink captured by the most recent registration, while the bridge is alive
    pub fn sink(&self) -> Option<PlatformSink> {
        self.sink.lock().as_ref().and_then(WeakPlatformSink::upgrade)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn authorization_request_count(&self) -> usize {
        self.authorization_requests.load(Ordering::SeqCst)
    }

    pub fn shows_in_foreground(&self) -> bool {
        self.show_in_foreground.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PushPlatform for ScriptedPlatform {
    async fn request_authorization(
        &self,
        options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus, PlatformError> {
        self.authorization_requests.fetch_add(1, Ordering::SeqCst);

        let script = self.authorization.lock().clone();
        match script {
            AuthorizationScript::Grant => Ok(AuthorizationStatus::granted(options)),
            AuthorizationScript::Deny => Ok(AuthorizationStatus::denied()),
            AuthorizationScript::Fail(error) => Err(error),
        }
    }

    async fn register_for_notifications(&self, sink: PlatformSink) -> Result<(), PlatformError> {
        let attempt = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self.registration.lock().clone();
        debug!("Scripted registration #{}: {}", attempt, script.label());

        *self.sink.lock() = Some(sink.downgrade());

        match script {
            RegistrationScript::IssueToken(token) => sink.token_received(token),
            RegistrationScript::Fail(error) => sink.registration_failed(error),
            RegistrationScript::Reject(error) => return Err(error),
            RegistrationScript::Hold => {}
        }
        Ok(())
    }

    fn set_foreground_presentation(&self, show: bool) {
        self.show_in_foreground.store(show, Ordering::SeqCst);
    }
}
