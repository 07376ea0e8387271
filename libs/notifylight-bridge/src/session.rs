//! Session state machine
//!
//! ```text
//! Uninitialized --initialize--> Initializing --(token | registration error)--> Ready
//!
//! NoToken --register--> Pending --token--> Current --refresh--> Current
//!                          |
//!                          +--registration error--> NoToken
//! ```
//!
//! The session is plain data. It is owned by the bridge dispatcher, which is the
//! only thing that mutates it, so none of the transitions below need locking.

use serde::Serialize;

use crate::config::InitOptions;
use crate::error::{BridgeError, Result};
use crate::platform::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Pending,
    Current(String),
}

impl TokenState {
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::NoToken => "no_token",
            TokenState::Pending => "pending",
            TokenState::Current(_) => "current",
        }
    }
}

/// Result of applying `initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitOutcome {
    /// First call; registration must be started
    Initialized,
    /// Already initialized, options changed
    Reconfigured,
    /// Already initialized with identical options
    AlreadyInitialized,
}

impl InitOutcome {
    /// Value the host's `initialize` promise resolves with
    pub fn to_host_payload(&self) -> serde_json::Value {
        serde_json::json!({ "success": true })
    }
}

/// Result of asking for (re-)registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStart {
    Started,
    AlreadyPending,
}

/// What a token callback did to the current token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenUpdate {
    Issued,
    Replaced { previous: String },
    Unchanged,
}

/// What `get_token` should do right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenQuery {
    Ready(String),
    Wait,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Session {
    phase: SessionPhase,
    token: TokenState,
    options: InitOptions,
    registration_attempts: u32,
    // Set from a registration request until the platform answers it
    registration_in_flight: bool,
    last_error: Option<PlatformError>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            token: TokenState::NoToken,
            options: InitOptions::default(),
            registration_attempts: 0,
            registration_in_flight: false,
            last_error: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn token_state(&self) -> &TokenState {
        &self.token
    }

    pub fn options(&self) -> &InitOptions {
        &self.options
    }

    pub fn registration_attempts(&self) -> u32 {
        self.registration_attempts
    }

    /// Whether a registration request is waiting on the platform
    pub fn is_registering(&self) -> bool {
        self.registration_in_flight
    }

    pub fn last_error(&self) -> Option<&PlatformError> {
        self.last_error.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase != SessionPhase::Uninitialized
    }

    pub fn current_token(&self) -> Option<&str> {
        match &self.token {
            TokenState::Current(token) => Some(token),
            _ => None,
        }
    }

    /// Apply `initialize`. Registration is started only on the first call;
    /// later calls update local configuration.
    pub fn initialize(&mut self, options: InitOptions) -> InitOutcome {
        if self.is_initialized() {
            if self.options == options {
                return InitOutcome::AlreadyInitialized;
            }
            self.options = options;
            return InitOutcome::Reconfigured;
        }

        self.options = options;
        self.phase = SessionPhase::Initializing;
        self.mark_registration_started();
        InitOutcome::Initialized
    }

    /// Explicitly re-trigger registration
    pub fn begin_registration(&mut self) -> Result<RegistrationStart> {
        if !self.is_initialized() {
            return Err(BridgeError::NotInitialized);
        }
        if self.registration_in_flight {
            return Ok(RegistrationStart::AlreadyPending);
        }

        self.mark_registration_started();
        Ok(RegistrationStart::Started)
    }

    fn mark_registration_started(&mut self) {
        self.registration_attempts += 1;
        self.registration_in_flight = true;
        // A held token stays readable while it is being renewed
        if self.current_token().is_none() {
            self.token = TokenState::Pending;
        }
    }

    /// A token was issued or refreshed by the platform
    pub fn token_received(&mut self, token: String) -> TokenUpdate {
        let update = match std::mem::replace(&mut self.token, TokenState::NoToken) {
            TokenState::Current(previous) if previous == token => TokenUpdate::Unchanged,
            TokenState::Current(previous) => TokenUpdate::Replaced { previous },
            TokenState::NoToken | TokenState::Pending => TokenUpdate::Issued,
        };

        self.token = TokenState::Current(token);
        self.registration_in_flight = false;
        self.last_error = None;
        if self.phase == SessionPhase::Initializing {
            self.phase = SessionPhase::Ready;
        }
        update
    }

    /// Registration failed. A pending token falls back to `NoToken`; a current
    /// token stays valid.
    pub fn registration_failed(&mut self, error: PlatformError) {
        if self.token == TokenState::Pending {
            self.token = TokenState::NoToken;
        }
        self.registration_in_flight = false;
        self.last_error = Some(error);
        if self.phase == SessionPhase::Initializing {
            self.phase = SessionPhase::Ready;
        }
    }

    pub fn query_token(&self) -> Result<TokenQuery> {
        if !self.is_initialized() {
            return Err(BridgeError::NotInitialized);
        }

        Ok(match &self.token {
            TokenState::Current(token) => TokenQuery::Ready(token.clone()),
            TokenState::Pending => TokenQuery::Wait,
            TokenState::NoToken => TokenQuery::Unavailable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreground() -> InitOptions {
        InitOptions::default().with_foreground_display(true)
    }

    #[test]
    fn test_every_init_outcome_reports_success() {
        for outcome in [
            InitOutcome::Initialized,
            InitOutcome::Reconfigured,
            InitOutcome::AlreadyInitialized,
        ] {
            assert_eq!(outcome.to_host_payload()["success"], true);
        }
    }

    #[test]
    fn test_new_session_is_uninitialized() {
        let session = Session::new();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert_eq!(session.token_state(), &TokenState::NoToken);
        assert_eq!(session.query_token(), Err(BridgeError::NotInitialized));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut session = Session::new();

        assert_eq!(session.initialize(foreground()), InitOutcome::Initialized);
        assert_eq!(session.phase(), SessionPhase::Initializing);
        assert_eq!(session.token_state(), &TokenState::Pending);

        assert_eq!(
            session.initialize(foreground()),
            InitOutcome::AlreadyInitialized
        );
        assert_eq!(
            session.initialize(InitOptions::default()),
            InitOutcome::Reconfigured
        );
        assert!(!session.options().show_notifications_when_in_foreground);
        assert_eq!(session.registration_attempts(), 1);
    }

    #[test]
    fn test_token_lifecycle() {
        let mut session = Session::new();
        session.initialize(foreground());
        assert_eq!(session.query_token(), Ok(TokenQuery::Wait));

        assert_eq!(
            session.token_received("tok-123".to_string()),
            TokenUpdate::Issued
        );
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(
            session.query_token(),
            Ok(TokenQuery::Ready("tok-123".to_string()))
        );

        assert_eq!(
            session.token_received("tok-456".to_string()),
            TokenUpdate::Replaced {
                previous: "tok-123".to_string()
            }
        );
        assert_eq!(session.current_token(), Some("tok-456"));

        assert_eq!(
            session.token_received("tok-456".to_string()),
            TokenUpdate::Unchanged
        );
    }

    #[test]
    fn test_registration_error_before_token() {
        let mut session = Session::new();
        session.initialize(InitOptions::default());

        session.registration_failed(PlatformError::new("network", "timeout"));

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.token_state(), &TokenState::NoToken);
        assert_eq!(session.query_token(), Ok(TokenQuery::Unavailable));
        assert_eq!(session.last_error().map(|e| e.code.as_str()), Some("network"));
    }

    #[test]
    fn test_registration_error_keeps_current_token() {
        let mut session = Session::new();
        session.initialize(InitOptions::default());
        session.token_received("tok-1".to_string());

        assert_eq!(session.begin_registration(), Ok(RegistrationStart::Started));
        assert_eq!(session.current_token(), Some("tok-1"));

        session.registration_failed(PlatformError::new("network", "offline"));
        assert_eq!(session.current_token(), Some("tok-1"));
    }

    #[test]
    fn test_renewal_with_current_token_is_not_duplicated() {
        let mut session = Session::new();
        session.initialize(InitOptions::default());
        session.token_received("tok-1".to_string());
        assert!(!session.is_registering());

        assert_eq!(session.begin_registration(), Ok(RegistrationStart::Started));
        assert!(session.is_registering());
        assert_eq!(
            session.begin_registration(),
            Ok(RegistrationStart::AlreadyPending)
        );
        assert_eq!(session.query_token(), Ok(TokenQuery::Ready("tok-1".to_string())));
        assert_eq!(session.registration_attempts(), 2);

        session.token_received("tok-2".to_string());
        assert!(!session.is_registering());
        assert_eq!(session.begin_registration(), Ok(RegistrationStart::Started));
    }

    #[test]
    fn test_retry_after_failure() {
        let mut session = Session::new();
        assert_eq!(
            session.begin_registration(),
            Err(BridgeError::NotInitialized)
        );

        session.initialize(InitOptions::default());
        assert_eq!(
            session.begin_registration(),
            Ok(RegistrationStart::AlreadyPending)
        );

        session.registration_failed(PlatformError::new("network", "timeout"));
        assert_eq!(session.begin_registration(), Ok(RegistrationStart::Started));
        assert_eq!(session.token_state(), &TokenState::Pending);
        assert_eq!(session.registration_attempts(), 2);
    }

    #[test]
    fn test_token_before_initialize_is_kept() {
        let mut session = Session::new();
        session.token_received("early".to_string());

        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert_eq!(session.query_token(), Err(BridgeError::NotInitialized));

        session.initialize(InitOptions::default());
        assert_eq!(
            session.query_token(),
            Ok(TokenQuery::Ready("early".to_string()))
        );
    }
}
