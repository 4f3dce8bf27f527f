//! Session store with FSM-tracked lifecycle and proactive token refresh.
//!
//! [`SessionStore`] owns the in-memory [`SessionState`], coordinates with the
//! [`AuthBackend`] and mirrors session metadata through
//! [`SessionPersistence`]. Operations never return errors: backend and
//! storage failures end up in [`SessionState::error`].
//!
//! Concurrent `refresh_session` calls are not deduplicated. A manual refresh
//! racing the scheduled one sends two refresh requests; whichever result
//! arrives after the machine has left `Refreshing` is discarded.

use crate::auth_fsm::{RefreshConfig, SessionMachine, SessionMachineInput, SessionPhase};
use crate::backend::{AuthBackend, AuthResponse, LoginRequest};
use crate::credentials::{Credentials, FieldError};
use crate::http_backend::USER_AGENT;
use crate::scheduler::RefreshScheduler;
use crate::state::{reduce, SessionAction, SessionState, TrialStatus, User};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use session_config_and_utils::Config;
use session_storage::{SessionMetadata, SessionPersistence};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your email and password.";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Please check your connection and try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const LOGIN_IN_PROGRESS_MESSAGE: &str = "Another sign-in is already in progress.";
pub const SIGN_OUT_IN_PROGRESS_MESSAGE: &str =
    "Signing out. Please wait a moment and try again.";
pub const LOGIN_INTERRUPTED_MESSAGE: &str = "Sign-in was interrupted. Please try again.";
pub const STORE_CLOSED_MESSAGE: &str = "The session has been closed.";

/// Store tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long before expiry the proactive refresh fires.
    pub refresh_lead: Duration,
    /// Lifetime assumed when the backend omits `expiresIn`.
    pub fallback_lifetime: chrono::Duration,
    pub refresh: RefreshConfig,
    /// Recorded in session metadata.
    pub user_agent: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_lead: Duration::from_secs(
                session_config_and_utils::DEFAULT_REFRESH_LEAD_SECS,
            ),
            fallback_lifetime: chrono::Duration::seconds(
                session_config_and_utils::DEFAULT_FALLBACK_SESSION_LIFETIME_SECS,
            ),
            refresh: RefreshConfig::default(),
            user_agent: Some(USER_AGENT.to_string()),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_lead: config.refresh_lead(),
            fallback_lifetime: chrono::Duration::seconds(config.fallback_session_lifetime_secs),
            ..Self::default()
        }
    }
}

/// Result of [`SessionStore::login`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub success: bool,
    pub user: Option<User>,
    pub error: Option<String>,
    /// Local validation problems; the backend was not contacted.
    pub field_errors: Vec<FieldError>,
}

impl LoginOutcome {
    fn success(user: User) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
            field_errors: Vec::new(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(message.into()),
            field_errors: Vec::new(),
        }
    }

    fn invalid(field_errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            user: None,
            error: None,
            field_errors,
        }
    }
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    #[serde(flatten)]
    pub state: SessionState,
    pub next_refresh_at: Option<DateTime<Utc>>,
}

/// Callback type for state change notifications.
pub type SessionStateCallback = Box<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Holds the authentication state for one client.
///
/// Created behind an `Arc` so the refresh timer can call back into it
/// without keeping it alive.
pub struct SessionStore {
    weak_self: Weak<SessionStore>,
    backend: Arc<dyn AuthBackend>,
    persistence: SessionPersistence,
    scheduler: RefreshScheduler,
    config: SessionConfig,
    device_id: Option<String>,
    fsm: Mutex<SessionMachine>,
    state: Mutex<SessionState>,
    mounted: AtomicBool,
    state_callback: Mutex<Option<Arc<dyn Fn(&SessionSnapshot) + Send + Sync>>>,
}

impl SessionStore {
    /// Create a store. The remember-me preference and device id are loaded
    /// from durable storage; call [`bootstrap`](Self::bootstrap) next.
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        persistence: SessionPersistence,
        config: SessionConfig,
    ) -> Arc<Self> {
        let device_id = match persistence.ensure_device_id() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Failed to load device id, continuing without one: {}", e);
                None
            }
        };
        let remember_me = persistence.remember_me();
        if let Some(jar) = persistence.session_cookies() {
            backend.import_cookies(&jar);
        }

        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            backend,
            persistence,
            scheduler: RefreshScheduler::new(config.refresh_lead),
            config,
            device_id,
            fsm: Mutex::new(SessionMachine::new()),
            state: Mutex::new(SessionState::with_remember_me(remember_me)),
            mounted: AtomicBool::new(true),
            state_callback: Mutex::new(None),
        })
    }

    /// Set a callback to be notified of state changes.
    pub fn set_state_callback(&self, callback: SessionStateCallback) {
        *self.state_callback.lock() = Some(Arc::from(callback));
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from(self.fsm.lock().state())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_of(self.state())
    }

    fn snapshot_of(&self, state: SessionState) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            state,
            next_refresh_at: self.scheduler.next_fire_at(),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// When the proactive refresh will fire.
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_fire_at()
    }

    /// Stop scheduling refreshes and ignore results of calls still in
    /// flight.
    pub fn shutdown(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            self.scheduler.disarm();
            info!("Session store shut down");
        }
    }

    fn transition(&self, input: SessionMachineInput) -> AuthResult<SessionPhase> {
        let mut fsm = self.fsm.lock();
        let old_phase = SessionPhase::from(fsm.state());

        fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_phase = SessionPhase::from(fsm.state());
        if old_phase != new_phase {
            debug!(from = %old_phase, to = %new_phase, "Session phase changed");
        }
        Ok(new_phase)
    }

    fn dispatch(&self, action: SessionAction) {
        let next = {
            let mut state = self.state.lock();
            let next = reduce(std::mem::take(&mut *state), &action);
            *state = next.clone();
            next
        };

        let callback = self.state_callback.lock().clone();
        if let Some(callback) = callback {
            callback(&self.snapshot_of(next));
        }
    }

    /// Reconcile the backend session with cached metadata.
    ///
    /// A live backend session wins. Otherwise unexpired cached metadata with
    /// a cached profile is adopted. Anything else clears both storage tiers.
    pub async fn bootstrap(&self) -> SessionSnapshot {
        if !self.is_mounted() {
            return self.snapshot();
        }
        if let Err(e) = self.transition(SessionMachineInput::BootstrapStarted) {
            debug!("Skipping bootstrap: {}", e);
            return self.snapshot();
        }
        self.dispatch(SessionAction::LoadingStarted);

        let live = self.backend.check_session().await;
        if !self.is_mounted() {
            debug!("Store shut down during bootstrap, dropping result");
            return self.snapshot();
        }
        let now = Utc::now();

        match live {
            Ok(Some(response)) => {
                let user = response
                    .user
                    .clone()
                    .or_else(|| self.persistence.cached_user::<User>());
                match user {
                    Some(user) => return self.adopt_live_session(&response, user, now),
                    None => debug!("Backend session carries no user profile, ignoring it"),
                }
            }
            Ok(None) => debug!("No active backend session"),
            Err(e) => warn!("Session check failed, trying cached metadata: {}", e),
        }

        if let Some(meta) = self.persistence.read() {
            if meta.is_expired_at(now) {
                info!(
                    session_id = %meta.session_id,
                    expired_at = %meta.expires_at.to_rfc3339(),
                    "Discarding expired cached session"
                );
            } else if let Some(user) = self.persistence.cached_user::<User>() {
                return self.restore_cached_session(meta, user, now);
            } else {
                info!(session_id = %meta.session_id, "Cached session has no user profile, discarding it");
            }
        }

        if let Err(e) = self.transition(SessionMachineInput::NoSession) {
            debug!("Discarding stale bootstrap result: {}", e);
            return self.snapshot();
        }
        self.scheduler.disarm();
        self.clear_session_data();
        self.dispatch(SessionAction::SignedOut);
        info!("No session found on startup");
        self.snapshot()
    }

    fn adopt_live_session(
        &self,
        response: &AuthResponse,
        user: User,
        now: DateTime<Utc>,
    ) -> SessionSnapshot {
        if let Err(e) = self.transition(SessionMachineInput::LiveSessionFound) {
            debug!("Discarding stale bootstrap result: {}", e);
            return self.snapshot();
        }

        let expires_at = response.expires_at(now, self.config.fallback_lifetime);
        let meta = self.renewed_metadata(response.session_id.clone(), now, expires_at);
        self.persist_session(&meta, &user);

        info!(
            user_id = %user.id,
            expires_at = %expires_at.to_rfc3339(),
            "Adopted live backend session"
        );
        self.dispatch(SessionAction::Authenticated {
            user,
            expires_at,
            now,
        });
        self.sync_refresh_timer(expires_at);
        self.snapshot()
    }

    fn restore_cached_session(
        &self,
        meta: SessionMetadata,
        user: User,
        now: DateTime<Utc>,
    ) -> SessionSnapshot {
        if let Err(e) = self.transition(SessionMachineInput::CachedSessionRestored) {
            debug!("Discarding stale bootstrap result: {}", e);
            return self.snapshot();
        }

        info!(
            session_id = %meta.session_id,
            user_id = %user.id,
            expires_at = %meta.expires_at.to_rfc3339(),
            "Restored session from cached metadata"
        );
        self.dispatch(SessionAction::Authenticated {
            user,
            expires_at: meta.expires_at,
            now,
        });
        self.sync_refresh_timer(meta.expires_at);
        self.snapshot()
    }

    /// Submit credentials. Never fails; the outcome reports what happened.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        if let Err(field_errors) = credentials.validate() {
            debug!(count = field_errors.len(), "Login rejected by validation");
            return LoginOutcome::invalid(field_errors);
        }
        if !self.is_mounted() {
            return LoginOutcome::failure(STORE_CLOSED_MESSAGE);
        }
        if let Err(e) = self.transition(SessionMachineInput::LoginAttempt) {
            debug!("Login refused: {}", e);
            let message = match self.phase() {
                SessionPhase::LoggingOut => SIGN_OUT_IN_PROGRESS_MESSAGE,
                _ => LOGIN_IN_PROGRESS_MESSAGE,
            };
            return LoginOutcome::failure(message);
        }

        self.set_remember_me(credentials.remember_me);
        self.dispatch(SessionAction::LoginStarted);

        let request = LoginRequest {
            email: credentials.normalized_email().to_string(),
            password: credentials.password.clone(),
            remember_me: credentials.remember_me,
            device_id: self.device_id.clone(),
        };
        let result = self.backend.login(&request).await;
        if !self.is_mounted() {
            debug!("Store shut down during login, dropping result");
            return LoginOutcome::failure(STORE_CLOSED_MESSAGE);
        }
        let now = Utc::now();

        let message = match result {
            Ok(response) if response.success => match response.user.clone() {
                Some(user) => return self.complete_login(&response, user, now),
                None => {
                    warn!("Login response carried no user profile");
                    LOGIN_FAILED_MESSAGE.to_string()
                }
            },
            Ok(response) => {
                warn!(email = %request.email, "Login rejected by backend");
                response
                    .first_error()
                    .unwrap_or(LOGIN_FAILED_MESSAGE)
                    .to_string()
            }
            Err(e) if e.is_transient() => {
                warn!("Login failed with transient error: {}", e);
                NETWORK_ERROR_MESSAGE.to_string()
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                LOGIN_FAILED_MESSAGE.to_string()
            }
        };

        if let Err(e) = self.transition(SessionMachineInput::LoginFailed) {
            debug!("Discarding stale login result: {}", e);
            return LoginOutcome::failure(message);
        }
        self.scheduler.disarm();
        self.dispatch(SessionAction::Failed {
            message: message.clone(),
        });
        LoginOutcome::failure(message)
    }

    fn complete_login(&self, response: &AuthResponse, user: User, now: DateTime<Utc>) -> LoginOutcome {
        if let Err(e) = self.transition(SessionMachineInput::LoginSuccess) {
            debug!("Discarding stale login result: {}", e);
            return LoginOutcome::failure(LOGIN_INTERRUPTED_MESSAGE);
        }

        if response.expires_in.is_none() {
            debug!("Login response has no expiresIn, using fallback lifetime");
        }
        let expires_at = response.expires_at(now, self.config.fallback_lifetime);
        let meta = self.new_metadata(response.session_id.clone(), now, expires_at);
        self.persist_session(&meta, &user);

        info!(
            user_id = %user.id,
            expires_at = %expires_at.to_rfc3339(),
            "Login successful"
        );
        self.dispatch(SessionAction::Authenticated {
            user: user.clone(),
            expires_at,
            now,
        });
        self.sync_refresh_timer(expires_at);
        LoginOutcome::success(user)
    }

    /// Log out locally, telling the backend on a best-effort basis.
    pub async fn logout(&self) {
        if let Err(e) = self.transition(SessionMachineInput::LogoutRequested) {
            debug!("Logout already under way: {}", e);
        }
        self.scheduler.disarm();
        self.dispatch(SessionAction::LoadingStarted);

        if let Err(e) = self.backend.logout().await {
            warn!("Backend logout failed, clearing local session anyway: {}", e);
        }

        self.clear_session_data();
        if let Err(e) = self.transition(SessionMachineInput::LogoutComplete) {
            debug!("Logout completion ignored: {}", e);
        }
        self.dispatch(SessionAction::SignedOut);
        info!("Logged out");
    }

    /// Renew the session. Returns whether the session is still valid.
    ///
    /// On failure the session is cleared and the state carries
    /// [`SESSION_EXPIRED_MESSAGE`].
    pub async fn refresh_session(&self) -> bool {
        if !self.is_mounted() {
            return false;
        }
        if let Err(e) = self.transition(SessionMachineInput::RefreshStarted) {
            debug!("Skipping refresh: {}", e);
            return false;
        }
        self.dispatch(SessionAction::LoadingStarted);

        let result = self.refresh_with_retry().await;
        if !self.is_mounted() {
            debug!("Store shut down during refresh, dropping result");
            return false;
        }
        let now = Utc::now();

        match result {
            Ok(response) if response.success => {
                let user = response
                    .user
                    .clone()
                    .or_else(|| self.state.lock().user.clone());
                match user {
                    Some(user) => self.complete_refresh(&response, user, now),
                    None => {
                        warn!("Refresh succeeded but no user profile is known");
                        self.fail_refresh()
                    }
                }
            }
            Ok(response) => {
                warn!(
                    reason = response.first_error().unwrap_or("unspecified"),
                    "Refresh rejected by backend"
                );
                self.fail_refresh()
            }
            Err(e) => {
                warn!("Refresh failed: {}", e);
                self.fail_refresh()
            }
        }
    }

    async fn refresh_with_retry(&self) -> AuthResult<AuthResponse> {
        let max_attempts = self.config.refresh.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.backend.refresh().await {
                Err(e) if e.is_transient() && attempt + 1 < max_attempts && self.still_refreshing() => {
                    let delay = self.config.refresh.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient refresh failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    if !self.still_refreshing() {
                        debug!(phase = %self.phase(), "Refresh superseded during backoff");
                        return Err(e);
                    }
                }
                result => return result,
            }
        }
    }

    /// Retries stop once logout, a login or shutdown has moved the store on.
    fn still_refreshing(&self) -> bool {
        self.is_mounted() && self.phase() == SessionPhase::Refreshing
    }

    fn complete_refresh(&self, response: &AuthResponse, user: User, now: DateTime<Utc>) -> bool {
        if let Err(e) = self.transition(SessionMachineInput::RefreshSuccess) {
            debug!("Discarding stale refresh result: {}", e);
            return false;
        }

        let expires_at = response.expires_at(now, self.config.fallback_lifetime);
        let meta = self.renewed_metadata(response.session_id.clone(), now, expires_at);
        self.persist_session(&meta, &user);

        info!(
            user_id = %user.id,
            expires_at = %expires_at.to_rfc3339(),
            "Session refreshed"
        );
        self.dispatch(SessionAction::Refreshed {
            user: Some(user),
            expires_at,
        });
        self.sync_refresh_timer(expires_at);
        true
    }

    fn fail_refresh(&self) -> bool {
        if let Err(e) = self.transition(SessionMachineInput::RefreshFailed) {
            debug!("Discarding stale refresh failure: {}", e);
            return false;
        }

        self.scheduler.disarm();
        self.clear_session_data();
        self.dispatch(SessionAction::Failed {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
        });
        false
    }

    /// Re-arm the proactive refresh for a new expiry.
    fn sync_refresh_timer(&self, expires_at: DateTime<Utc>) {
        let store = self.weak_self.clone();
        self.scheduler
            .arm(expires_at, Utc::now(), move || async move {
                if let Some(store) = store.upgrade() {
                    debug!("Proactive session refresh firing");
                    store.refresh_session().await;
                }
            });
    }

    pub fn set_remember_me(&self, remember_me: bool) {
        if let Err(e) = self.persistence.set_remember_me(remember_me) {
            warn!("Failed to persist remember-me preference: {}", e);
        }
        self.dispatch(SessionAction::RememberMeChanged(remember_me));
    }

    /// Set or clear the user-facing error. Clearing it after a failure
    /// returns the machine to `Anonymous`.
    pub fn set_error(&self, error: Option<String>) {
        if error.is_none() && self.phase() == SessionPhase::Failed {
            if let Err(e) = self.transition(SessionMachineInput::ErrorCleared) {
                debug!("Error clear ignored: {}", e);
            }
        }
        self.dispatch(SessionAction::ErrorChanged(error));
    }

    /// Stamp user activity; ignored while anonymous.
    pub fn record_activity(&self) {
        self.dispatch(SessionAction::ActivityRecorded(Utc::now()));
    }

    pub fn trial_status(&self) -> TrialStatus {
        self.state.lock().trial_status_at(Utc::now())
    }

    /// Trial-expiry gate for paid content.
    pub fn has_full_access(&self) -> bool {
        self.state.lock().has_full_access_at(Utc::now())
    }

    fn new_metadata(
        &self,
        session_id: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> SessionMetadata {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        SessionMetadata::new(session_id, issued_at, expires_at)
            .with_device_id(self.device_id.clone())
            .with_user_agent(self.config.user_agent.clone())
    }

    /// Metadata for a renewed session, keeping what was recorded at login.
    fn renewed_metadata(
        &self,
        session_id: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> SessionMetadata {
        match self.persistence.read() {
            Some(previous) => previous.renewed(session_id, issued_at, expires_at),
            None => self.new_metadata(session_id, issued_at, expires_at),
        }
    }

    fn persist_session(&self, meta: &SessionMetadata, user: &User) {
        match self.persistence.persist(meta) {
            Ok(tier) => debug!(session_id = %meta.session_id, tier = %tier, "Session persisted"),
            Err(e) => warn!("Failed to persist session metadata: {}", e),
        }
        if let Err(e) = self.persistence.cache_user(user) {
            warn!("Failed to cache user profile: {}", e);
        }
        if let Some(jar) = self.backend.export_cookies() {
            if let Err(e) = self.persistence.save_session_cookies(&jar) {
                warn!("Failed to persist session cookies: {}", e);
            }
        }
    }

    /// Drop every trace of the session: stored tiers and backend cookies.
    fn clear_session_data(&self) {
        self.backend.clear_cookies();
        if let Err(e) = self.persistence.clear() {
            warn!("Failed to clear session storage: {}", e);
        }
    }
}
