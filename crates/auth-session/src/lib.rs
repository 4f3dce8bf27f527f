//! Client-side authentication session lifecycle for LearnHub.
//!
//! This crate provides:
//! - An FSM-tracked [`SessionStore`] with login, logout, bootstrap and refresh
//! - A pure reducer over the public [`SessionState`]
//! - Proactive refresh scheduling ahead of session expiry
//! - The [`AuthBackend`] seam and its HTTP implementation
//! - Trial-expiry gating on the cached user profile

mod auth_fsm;
mod backend;
mod credentials;
mod error;
mod http_backend;
mod scheduler;
mod session;
mod state;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    RefreshConfig, SessionMachine, SessionMachineInput, SessionMachineState, SessionPhase,
};
pub use backend::{ApiError, AuthBackend, AuthResponse, LoginRequest, MAX_SESSION_LIFETIME_DAYS};
pub use credentials::{Credentials, FieldError};
pub use error::{AuthError, AuthResult};
pub use http_backend::{HttpAuthBackend, USER_AGENT};
pub use scheduler::{refresh_delay, RefreshScheduler};
pub use session::{
    LoginOutcome, SessionConfig, SessionSnapshot, SessionStateCallback, SessionStore,
    LOGIN_FAILED_MESSAGE, LOGIN_INTERRUPTED_MESSAGE, LOGIN_IN_PROGRESS_MESSAGE,
    NETWORK_ERROR_MESSAGE, SESSION_EXPIRED_MESSAGE, SIGN_OUT_IN_PROGRESS_MESSAGE,
    STORE_CLOSED_MESSAGE,
};
pub use state::{reduce, SessionAction, SessionState, TrialStatus, User};
