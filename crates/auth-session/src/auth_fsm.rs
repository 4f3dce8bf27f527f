//! Session state machine using rust-fsm.
//!
//! The machine tracks which lifecycle operation is in flight. The public
//! [`SessionState`](crate::SessionState) is derived alongside it by the
//! reducer; the machine's job is to reject transitions that no longer make
//! sense, which is how the store recognises stale results (a refresh that
//! completes after logout, a bootstrap overtaken by a login).
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌─────────────────┐
//!      ┌─────────►│    Anonymous    │ (initial) ◄──────────────┐
//!      │          └────────┬────────┘                          │
//!      │                   │ BootstrapStarted / LoginAttempt   │ ErrorCleared
//!      │ NoSession         ▼                                   │
//! ┌────┴────────────┐ ┌─────────────────┐  LoginFailed  ┌──────┴──────┐
//! │  Bootstrapping  │ │    LoggingIn    │ ─────────────►│   Failed    │
//! └────────┬────────┘ └────────┬────────┘               └─────────────┘
//!          │ LiveSessionFound  │ LoginSuccess                  ▲
//!          │ CachedSession...  ▼                               │
//!          │          ┌─────────────────┐  RefreshStarted ┌─────┴───────┐
//!          └─────────►│  Authenticated  │ ───────────────►│ Refreshing  │
//!                     └────────┬────────┘ ◄───────────────└─────────────┘
//!                              │ LogoutRequested  RefreshSuccess  (RefreshFailed ▲)
//!                              ▼
//!                     ┌─────────────────┐  LogoutComplete
//!                     │   LoggingOut    │ ───────────────► Anonymous
//!                     └─────────────────┘
//! ```
//!
//! `LogoutRequested` is accepted from every resting and in-flight phase.
//! `LoginAttempt` is also accepted while `Refreshing`; the refresh result
//! then goes stale.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Anonymous)

    Anonymous => {
        BootstrapStarted => Bootstrapping,
        LoginAttempt => LoggingIn,
        // Reactive refresh with no live session; fails back to Failed
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut
    },
    Failed => {
        BootstrapStarted => Bootstrapping,
        LoginAttempt => LoggingIn,
        RefreshStarted => Refreshing,
        ErrorCleared => Anonymous,
        LogoutRequested => LoggingOut
    },
    Bootstrapping => {
        // Backend reports an active session
        LiveSessionFound => Authenticated,
        // Backend had nothing, unexpired cached metadata adopted
        CachedSessionRestored => Authenticated,
        NoSession => Anonymous,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    LoggingIn => {
        LoginSuccess => Authenticated,
        LoginFailed => Failed,
        LogoutRequested => LoggingOut
    },
    Authenticated => {
        RefreshStarted => Refreshing,
        BootstrapStarted => Bootstrapping,
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    Refreshing => {
        // Manual refresh racing the scheduled one; both requests go out
        RefreshStarted => Refreshing,
        RefreshSuccess => Authenticated,
        RefreshFailed => Failed,
        // Explicit sign-in supersedes the refresh; its result goes stale
        LoginAttempt => LoggingIn,
        LogoutRequested => LoggingOut
    },
    LoggingOut => {
        LogoutComplete => Anonymous
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Lifecycle phase exposed to UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Anonymous,
    Bootstrapping,
    LoggingIn,
    Authenticated,
    Refreshing,
    LoggingOut,
    /// Anonymous, carrying the error of the last failed operation.
    Failed,
}

impl SessionPhase {
    /// Returns true while a backend call is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SessionPhase::Bootstrapping
                | SessionPhase::LoggingIn
                | SessionPhase::Refreshing
                | SessionPhase::LoggingOut
        )
    }
}

impl From<&SessionMachineState> for SessionPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Anonymous => SessionPhase::Anonymous,
            SessionMachineState::Bootstrapping => SessionPhase::Bootstrapping,
            SessionMachineState::LoggingIn => SessionPhase::LoggingIn,
            SessionMachineState::Authenticated => SessionPhase::Authenticated,
            SessionMachineState::Refreshing => SessionPhase::Refreshing,
            SessionMachineState::LoggingOut => SessionPhase::LoggingOut,
            SessionMachineState::Failed => SessionPhase::Failed,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Anonymous => "anonymous",
            SessionPhase::Bootstrapping => "bootstrapping",
            SessionPhase::LoggingIn => "logging_in",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Refreshing => "refreshing",
            SessionPhase::LoggingOut => "logging_out",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Retry behaviour for a single refresh call.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
