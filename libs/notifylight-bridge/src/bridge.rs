//! Notification bridge
//!
//! [`NotificationBridge`] is the host-facing handle. All session state lives in
//! a single dispatcher task that drains one FIFO queue of commands: application
//! calls (`initialize`, `get_token`, ...) and platform callbacks pushed through
//! [`PlatformSink`] share that queue, so a callback raised before a call is
//! always applied before it.
//!
//! Async answers travel back on `oneshot` channels: each resolves at most once,
//! and the dispatcher answers every request it accepts, even when the caller
//! has already given up on it.

use serde::Serialize;
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, InitOptions};
use crate::error::{BridgeError, Result};
use crate::events::{token_prefix, BridgeEvent, ErrorPayload, NotificationEvent};
use crate::platform::{
    AuthorizationOptions, AuthorizationStatus, PlatformError, PlatformEvent, PlatformSink,
    PushPlatform,
};
use crate::session::{InitOutcome, RegistrationStart, Session, SessionPhase, TokenQuery, TokenUpdate};
use crate::subscribers::{EventSender, EventSubscription, SubscriberRegistry};

type Responder<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    Initialize {
        options: InitOptions,
        respond: Responder<InitOutcome>,
    },
    RequestPermissions {
        options: AuthorizationOptions,
        respond: Responder<AuthorizationStatus>,
    },
    GetToken {
        wait: bool,
        respond: Responder<String>,
    },
    Register {
        respond: Responder<RegistrationStart>,
    },
    Subscribe {
        sender: EventSender,
    },
    Snapshot {
        respond: Responder<SessionSnapshot>,
    },
    Platform(PlatformEvent),
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub token_state: &'static str,
    pub has_token: bool,
    pub show_notifications_when_in_foreground: bool,
    pub registration_attempts: u32,
    pub registering: bool,
    pub subscribers: usize,
    pub buffered_events: usize,
    pub dropped_events: u64,
    pub pending_token_requests: usize,
}

/// Host-facing handle to the bridge. Cheap to clone.
#[derive(Clone)]
pub struct NotificationBridge {
    commands: mpsc::UnboundedSender<Command>,
    config: BridgeConfig,
}

impl NotificationBridge {
    /// Start the dispatcher on the current Tokio runtime
    pub fn start(platform: Arc<dyn PushPlatform>, config: BridgeConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();

        let platform_label = config
            .platform_label
            .clone()
            .unwrap_or_else(|| platform.platform_name().to_string());

        let dispatcher = Dispatcher {
            platform,
            commands: commands.downgrade(),
            session: Session::new(),
            subscribers: SubscriberRegistry::new(config.replay_capacity),
            token_waiters: Vec::new(),
            platform_label,
        };

        info!(
            "Starting NotifyLight bridge (platform={}, replay_capacity={}, token_wait={:?})",
            dispatcher.platform_label, config.replay_capacity, config.token_wait_timeout
        );
        tokio::spawn(dispatcher.run(receiver));

        Self { commands, config }
    }

    /// Handle for the platform's callbacks
    pub fn platform_sink(&self) -> PlatformSink {
        PlatformSink::new(self.commands.clone())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Initialize the session and register with the push service.
    ///
    /// Registration runs only on the first call. Later calls update local
    /// configuration; use [`NotificationBridge::register`] to re-register.
    pub async fn initialize(&self, options: InitOptions) -> Result<InitOutcome> {
        self.call(|respond| Command::Initialize { options, respond })
            .await
    }

    /// Initialize from the host's raw option map
    pub async fn initialize_with_value(&self, options: &Value) -> Result<InitOutcome> {
        let options = InitOptions::from_value(options)?;
        self.initialize(options).await
    }

    /// Ask for notification authorization. Denial resolves `false`.
    pub async fn request_permissions(&self) -> Result<bool> {
        self.request_permissions_detailed(AuthorizationOptions::default())
            .await
            .map(|status| status.granted)
    }

    pub async fn request_permissions_detailed(
        &self,
        options: AuthorizationOptions,
    ) -> Result<AuthorizationStatus> {
        self.call(|respond| Command::RequestPermissions { options, respond })
            .await
    }

    /// Current device token.
    ///
    /// While a registration is in flight this waits up to the configured token
    /// wait timeout for its outcome. With no token and nothing in flight (or on
    /// timeout) it rejects with `NoTokenAvailable`.
    pub async fn get_token(&self) -> Result<String> {
        let timeout = self.config.token_wait_timeout;
        let wait = !timeout.is_zero();

        let (respond, answer) = oneshot::channel();
        self.send(Command::GetToken { wait, respond })?;

        if !wait {
            return answer.await.map_err(|_| BridgeError::BridgeClosed)?;
        }

        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::BridgeClosed),
            Err(_) => {
                debug!("Timed out after {:?} waiting for a token", timeout);
                Err(BridgeError::NoTokenAvailable)
            }
        }
    }

    /// Re-trigger registration, e.g. after a registration error
    pub async fn register(&self) -> Result<RegistrationStart> {
        self.call(|respond| Command::Register { respond }).await
    }

    /// Attach a subscriber.
    ///
    /// The first subscriber receives any events buffered while nobody was
    /// listening. After shutdown the subscription yields nothing.
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        if self.send(Command::Subscribe { sender }).is_err() {
            debug!("Subscribing to a closed NotifyLight bridge");
        }
        EventSubscription::new(receiver)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.call(|respond| Command::Snapshot { respond }).await
    }

    /// Stop the dispatcher. Pending token requests reject with `BridgeClosed`
    /// and subscriptions end.
    pub async fn shutdown(&self) {
        let (respond, done) = oneshot::channel();
        if self.send(Command::Shutdown { respond }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::BridgeClosed)
    }

    async fn call<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Result<T> {
        let (respond, answer) = oneshot::channel();
        self.send(build(respond))?;
        answer.await.map_err(|_| BridgeError::BridgeClosed)?
    }
}

struct Dispatcher {
    platform: Arc<dyn PushPlatform>,
    // Weak so that the dispatcher alone does not keep its own queue open
    commands: mpsc::WeakUnboundedSender<Command>,
    session: Session,
    subscribers: SubscriberRegistry,
    token_waiters: Vec<Responder<String>>,
    platform_label: String,
}

impl Dispatcher {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        let mut acknowledge = None;
        while let Some(command) = receiver.recv().await {
            if let ControlFlow::Break(respond) = self.handle(command) {
                acknowledge = Some(respond);
                break;
            }
        }

        receiver.close();
        self.shutdown();
        if let Some(respond) = acknowledge {
            let _ = respond.send(());
        }
    }

    fn handle(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Initialize { options, respond } => {
                let _ = respond.send(Ok(self.initialize(options)));
            }
            Command::RequestPermissions { options, respond } => {
                self.request_permissions(options, respond);
            }
            Command::GetToken { wait, respond } => self.get_token(wait, respond),
            Command::Register { respond } => {
                let result = self.session.begin_registration();
                match result {
                    Ok(RegistrationStart::Started) => {
                        info!("Re-registering for remote notifications");
                        self.start_registration();
                    }
                    Ok(RegistrationStart::AlreadyPending) => {
                        debug!("Registration already in flight");
                    }
                    Err(_) => {}
                }
                let _ = respond.send(result);
            }
            Command::Subscribe { sender } => self.subscribers.attach(sender),
            Command::Snapshot { respond } => {
                let _ = respond.send(Ok(self.snapshot()));
            }
            Command::Platform(event) => self.handle_platform_event(event),
            Command::Shutdown { respond } => return ControlFlow::Break(respond),
        }
        ControlFlow::Continue(())
    }

    fn initialize(&mut self, options: InitOptions) -> InitOutcome {
        let show = options.show_notifications_when_in_foreground;
        let outcome = self.session.initialize(options);

        match outcome {
            InitOutcome::Initialized => {
                info!(
                    "Initializing NotifyLight (show_notifications_when_in_foreground={})",
                    show
                );
                self.platform.set_foreground_presentation(show);
                self.start_registration();
            }
            InitOutcome::Reconfigured => {
                info!(
                    "NotifyLight already initialized, updating configuration (show_notifications_when_in_foreground={})",
                    show
                );
                self.platform.set_foreground_presentation(show);
            }
            InitOutcome::AlreadyInitialized => {
                info!("NotifyLight already initialized");
            }
        }

        outcome
    }

    fn start_registration(&self) {
        let Some(sender) = self.commands.upgrade() else {
            warn!("NotifyLight bridge is closing, skipping registration");
            return;
        };
        let sink = PlatformSink::new(sender);
        let platform = Arc::clone(&self.platform);

        tokio::spawn(async move {
            if let Err(e) = platform.register_for_notifications(sink.clone()).await {
                warn!("Failed to start registration for remote notifications: {}", e);
                sink.registration_failed(e);
            }
        });
    }

    fn request_permissions(
        &self,
        options: AuthorizationOptions,
        respond: Responder<AuthorizationStatus>,
    ) {
        if !self.session.is_initialized() {
            let _ = respond.send(Err(BridgeError::NotInitialized));
            return;
        }

        let platform = Arc::clone(&self.platform);
        tokio::spawn(async move {
            let result = match platform.request_authorization(options).await {
                Ok(status) => {
                    if status.granted {
                        info!("Notification permission granted");
                    } else {
                        warn!("Notification permission was not granted");
                    }
                    Ok(status)
                }
                Err(e) => {
                    error!("Failed to request notification permission: {}", e);
                    Err(BridgeError::PermissionRequestFailed(e))
                }
            };
            let _ = respond.send(result);
        });
    }

    fn get_token(&mut self, wait: bool, respond: Responder<String>) {
        let answer = match self.session.query_token() {
            Err(e) => Err(e),
            Ok(TokenQuery::Ready(token)) => Ok(token),
            Ok(TokenQuery::Wait) if wait => {
                self.token_waiters.retain(|waiter| !waiter.is_closed());
                self.token_waiters.push(respond);
                return;
            }
            Ok(TokenQuery::Wait) | Ok(TokenQuery::Unavailable) => {
                Err(BridgeError::NoTokenAvailable)
            }
        };
        let _ = respond.send(answer);
    }

    fn handle_platform_event(&mut self, event: PlatformEvent) {
        debug!("Platform callback: {}", event.name());

        match event {
            PlatformEvent::TokenReceived(token) => self.on_token(token, false),
            PlatformEvent::TokenRefresh(token) => self.on_token(token, true),
            PlatformEvent::NotificationReceived {
                payload,
                foreground,
            } => {
                if foreground {
                    debug!(
                        "Notification received in foreground (display={})",
                        self.session
                            .options()
                            .show_notifications_when_in_foreground
                    );
                }
                self.on_notification(&payload, Some(foreground), false);
            }
            PlatformEvent::NotificationOpened { payload } => {
                self.on_notification(&payload, None, true)
            }
            PlatformEvent::RegistrationFailed(error) => self.on_registration_error(error),
        }
    }

    fn on_token(&mut self, token: String, refresh: bool) {
        if token.trim().is_empty() {
            warn!("Platform reported an empty token");
            self.on_registration_error(PlatformError::new(
                "invalid_token",
                "Platform issued an empty token",
            ));
            return;
        }

        match self.session.token_received(token.clone()) {
            TokenUpdate::Issued => info!("Token received: {}", token_prefix(&token)),
            TokenUpdate::Replaced { previous } => info!(
                "Token refreshed: {} -> {}",
                token_prefix(&previous),
                token_prefix(&token)
            ),
            TokenUpdate::Unchanged => debug!("Token unchanged: {}", token_prefix(&token)),
        }

        for waiter in self.token_waiters.drain(..) {
            let _ = waiter.send(Ok(token.clone()));
        }

        let event = if refresh {
            BridgeEvent::TokenRefresh { token }
        } else {
            BridgeEvent::TokenReceived { token }
        };
        self.subscribers.publish(event);
    }

    fn on_notification(&mut self, payload: &Value, foreground: Option<bool>, opened: bool) {
        let event = match NotificationEvent::from_payload(payload, &self.platform_label, foreground)
        {
            Ok(notification) => {
                debug!(
                    "Notification {} {}",
                    notification.id,
                    if opened { "opened" } else { "received" }
                );
                if opened {
                    BridgeEvent::NotificationOpened(notification)
                } else {
                    BridgeEvent::NotificationReceived(notification)
                }
            }
            Err(e) => {
                warn!("Dropping malformed notification payload: {}", e);
                BridgeEvent::DeliveryError(ErrorPayload::new(e.code(), e.to_string()))
            }
        };

        self.subscribers.publish(event);
    }

    fn on_registration_error(&mut self, error: PlatformError) {
        error!("Registration for remote notifications failed: {}", error);
        self.session.registration_failed(error.clone());

        for waiter in self.token_waiters.drain(..) {
            let _ = waiter.send(Err(BridgeError::RegistrationFailed(error.clone())));
        }

        self.subscribers.publish(BridgeEvent::RegistrationError(ErrorPayload::new(
            error.code,
            error.message,
        )));
    }

    fn snapshot(&mut self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.session.phase(),
            token_state: self.session.token_state().label(),
            has_token: self.session.current_token().is_some(),
            show_notifications_when_in_foreground: self
                .session
                .options()
                .show_notifications_when_in_foreground,
            registration_attempts: self.session.registration_attempts(),
            registering: self.session.is_registering(),
            subscribers: self.subscribers.subscriber_count(),
            buffered_events: self.subscribers.pending_count(),
            dropped_events: self.subscribers.dropped_count(),
            pending_token_requests: self
                .token_waiters
                .iter()
                .filter(|waiter| !waiter.is_closed())
                .count(),
        }
    }

    fn shutdown(&mut self) {
        if !self.token_waiters.is_empty() {
            debug!(
                "Rejecting {} pending token requests on shutdown",
                self.token_waiters.len()
            );
        }
        for waiter in self.token_waiters.drain(..) {
            let _ = waiter.send(Err(BridgeError::BridgeClosed));
        }
        self.subscribers.close();
        info!("NotifyLight bridge shut down");
    }
}
